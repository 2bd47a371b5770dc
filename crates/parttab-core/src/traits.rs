//! Core traits for partition table I/O

use crate::error::{Error, Result};
use crate::types::Zone;
use std::io::{Read, Seek, SeekFrom, Write};

/// A seekable byte source addressed by absolute offset
///
/// The codecs only ever read the sectors they need, so the medium does not
/// have to fit in memory.
pub trait ByteSource {
    /// Fill `buf` with the bytes starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if the source ends before `buf` is full.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total length of the source in bytes
    fn byte_len(&mut self) -> Result<u64>;
}

/// A seekable byte sink addressed by absolute offset
pub trait ByteSink {
    /// Write all of `bytes` starting at `offset`
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()>;

    /// Push buffered writes down to the medium
    fn sync(&mut self) -> Result<()>;
}

impl<T: Read + Seek + ?Sized> ByteSource for T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let available = self.byte_len()?;
        let needed = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Error::invalid_zone_table(format!("read offset {} overflows", offset)))?;

        if needed > available {
            return Err(Error::truncated(
                format!("{} bytes at offset {}", buf.len(), offset),
                needed,
                available,
            ));
        }

        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)?;
        Ok(())
    }

    fn byte_len(&mut self) -> Result<u64> {
        let position = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(position))?;
        Ok(end)
    }
}

impl<T: Write + Seek + ?Sized> ByteSink for T {
    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(bytes)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}

/// Trait for partition tables (zone tables)
pub trait ZoneTable {
    /// Get a human-readable identifier for this zone table type
    fn identify(&self) -> &str;

    /// Get all occupied zones in on-disk order
    fn enumerate_zones(&self) -> Vec<Zone>;

    /// Get a specific zone by its position in [`ZoneTable::enumerate_zones`]
    fn get_zone(&self, index: usize) -> Option<Zone> {
        self.enumerate_zones().into_iter().nth(index)
    }
}

/// Combined trait for Read + Seek, for boxing read-only media of different kinds
pub trait ReadSeek: Read + Seek + Send {}

/// Blanket implementation for any type that implements Read + Seek
impl<T: Read + Seek + Send> ReadSeek for T {}

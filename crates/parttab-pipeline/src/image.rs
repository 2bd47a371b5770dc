//! Disk image files opened for in-place table edits

use parttab_core::SectorSize;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Configuration for opening a disk image
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Open the image for writing as well as reading
    pub writable: bool,
    /// Make `flush` push written data to stable storage
    pub sync_on_flush: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            writable: false,
            sync_on_flush: true,
        }
    }
}

impl ImageConfig {
    /// Read-write configuration for repair and initialisation
    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Self::default()
        }
    }
}

/// A disk image file
///
/// The image has a fixed size: writes that would run past its end fail
/// instead of growing the file. Implements `Read + Write + Seek`, which makes it both a
/// [`parttab_core::ByteSource`] and a [`parttab_core::ByteSink`]. Only the
/// sectors touched by a codec are ever read or written.
///
/// # Example
///
/// ```rust,no_run
/// use parttab_pipeline::{DiskImage, ImageConfig};
/// use parttab_core::SectorSize;
/// use std::path::Path;
///
/// let image = DiskImage::open(Path::new("disk.img"), ImageConfig::writable()).unwrap();
/// println!("{} sectors", image.sector_count(SectorSize::default()));
/// ```
#[derive(Debug)]
pub struct DiskImage {
    file: File,
    length: u64,
    config: ImageConfig,
}

impl DiskImage {
    /// Open an existing image file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened with the requested access
    pub fn open(path: &Path, config: ImageConfig) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(config.writable)
            .create(false)
            .truncate(false)
            .open(path)?;
        let length = file.metadata()?.len();

        tracing::debug!(
            "Opened image {} ({} bytes, writable: {})",
            path.display(),
            length,
            config.writable
        );

        Ok(Self {
            file,
            length,
            config,
        })
    }

    /// Create a new zero-filled image of `length` bytes
    ///
    /// The file is extended with `set_len`, so on most filesystems it starts
    /// out sparse. An existing file is truncated first.
    pub fn create(path: &Path, length: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(length)?;

        tracing::info!("Created image {} ({} bytes)", path.display(), length);

        Ok(Self {
            file,
            length,
            config: ImageConfig::writable(),
        })
    }

    /// Length of the image in bytes
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Check if the image is empty
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of whole sectors in the image
    pub fn sector_count(&self, sector_size: SectorSize) -> u64 {
        sector_size.sector_count(self.length)
    }

    /// Whether the image was opened for writing
    pub fn is_writable(&self) -> bool {
        self.config.writable
    }
}

impl Read for DiskImage {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for DiskImage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let position = self.file.stream_position()?;
        let end = position.saturating_add(buf.len() as u64);
        if end > self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "write of {} bytes at offset {} runs past the end of the image ({} bytes)",
                    buf.len(),
                    position,
                    self.length
                ),
            ));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.config.writable && self.config.sync_on_flush {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

impl Seek for DiskImage {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parttab_core::{ByteSink, ByteSource};
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_and_reopen() {
        let tmpfile = NamedTempFile::new().unwrap();

        let image = DiskImage::create(tmpfile.path(), 64 * 512).unwrap();
        assert_eq!(image.len(), 64 * 512);
        assert_eq!(image.sector_count(SectorSize::LOGICAL_512), 64);
        assert!(image.is_writable());
        drop(image);

        let image = DiskImage::open(tmpfile.path(), ImageConfig::default()).unwrap();
        assert_eq!(image.len(), 64 * 512);
        assert!(!image.is_writable());
    }

    #[test]
    fn test_write_at_then_read_at() {
        let tmpfile = NamedTempFile::new().unwrap();
        let mut image = DiskImage::create(tmpfile.path(), 4096).unwrap();

        image.write_at(1024, b"EFI PART").unwrap();
        image.sync().unwrap();

        let mut reopened = DiskImage::open(tmpfile.path(), ImageConfig::default()).unwrap();
        let mut buf = [0u8; 8];
        reopened.read_at(1024, &mut buf).unwrap();
        assert_eq!(&buf, b"EFI PART");
    }

    #[test]
    fn test_write_past_end_is_rejected() {
        let tmpfile = NamedTempFile::new().unwrap();
        let mut image = DiskImage::create(tmpfile.path(), 512).unwrap();

        assert!(image.write_at(1000, &[1, 2, 3, 4]).is_err());
        assert!(image.write_at(510, &[1, 2, 3, 4]).is_err());
        image.write_at(508, &[1, 2, 3, 4]).unwrap();
        assert_eq!(image.len(), 512);
        assert_eq!(image.byte_len().unwrap(), 512);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let tmpfile = NamedTempFile::new().unwrap();
        DiskImage::create(tmpfile.path(), 512).unwrap();

        let mut image = DiskImage::open(tmpfile.path(), ImageConfig::default()).unwrap();
        assert!(image.write_at(0, &[0xFF]).is_err());
    }
}

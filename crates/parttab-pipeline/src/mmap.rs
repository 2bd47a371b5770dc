//! Memory-mapped pipeline for read-only inspection of disk images

use memmap2::Mmap;
use parttab_core::{SectorSize, MAX_MMAP_SIZE};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only pipeline backed by a memory-mapped image file.
///
/// Implements `Read + Seek`, so it is a [`parttab_core::ByteSource`] and can be
/// handed straight to the MBR and GPT decoders.
///
/// # Example
///
/// ```rust,no_run
/// use parttab_pipeline::MmapPipeline;
/// use std::path::Path;
///
/// let pipeline = MmapPipeline::open(Path::new("disk.img")).unwrap();
/// println!("{} bytes mapped", pipeline.len());
/// ```
pub struct MmapPipeline {
    mmap: Mmap,
    position: u64,
}

impl MmapPipeline {
    /// Open an image file with memory mapping
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, is not a
    /// regular file, or exceeds [`MAX_MMAP_SIZE`].
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file)
    }

    /// Create a memory-mapped pipeline from an existing file
    ///
    /// # Safety
    ///
    /// Uses `unsafe` for memory mapping. The file must not be truncated by
    /// another process while the mapping is alive.
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;

        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Only regular files can be memory-mapped",
            ));
        }

        if metadata.len() > MAX_MMAP_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "File size {} exceeds memory mapping limit {}",
                    metadata.len(),
                    MAX_MMAP_SIZE
                ),
            ));
        }

        // SAFETY: regular file, size checked, read-only mapping.
        let mmap = unsafe { Mmap::map(file)? };
        tracing::debug!("Mapped {} bytes read-only", mmap.len());

        Ok(Self { mmap, position: 0 })
    }

    /// Get the length of the mapped region
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Check if the mapped region is empty
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Get the current position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get remaining bytes from current position
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position)
    }

    /// Number of whole sectors in the mapping
    pub fn sector_count(&self, sector_size: SectorSize) -> u64 {
        sector_size.sector_count(self.len())
    }
}

impl Read for MmapPipeline {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining() as usize;
        if remaining == 0 {
            return Ok(0); // EOF
        }

        let to_read = buf.len().min(remaining);
        let start = self.position as usize;
        let end = start + to_read;

        buf[..to_read].copy_from_slice(&self.mmap[start..end]);
        self.position += to_read as u64;

        Ok(to_read)
    }
}

impl Seek for MmapPipeline {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek before beginning of image",
            ));
        }

        // Seeking past EOF is allowed; reads there return 0
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parttab_core::{ByteSource, Error};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_of(len: usize) -> NamedTempFile {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0u8..=255).cycle().take(len).collect();
        tmpfile.write_all(&data).unwrap();
        tmpfile.flush().unwrap();
        tmpfile
    }

    #[test]
    fn test_mmap_pipeline_basic() {
        let tmpfile = image_of(100);
        let pipeline = MmapPipeline::open(tmpfile.path()).unwrap();

        assert_eq!(pipeline.len(), 100);
        assert_eq!(pipeline.position(), 0);
        assert_eq!(pipeline.remaining(), 100);
        assert!(!pipeline.is_empty());
    }

    #[test]
    fn test_mmap_pipeline_seek_and_read() {
        let tmpfile = image_of(100);
        let mut pipeline = MmapPipeline::open(tmpfile.path()).unwrap();

        pipeline.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 5];
        pipeline.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &[50, 51, 52, 53, 54]);
        assert_eq!(pipeline.position(), 55);
    }

    #[test]
    fn test_mmap_pipeline_as_byte_source() {
        let tmpfile = image_of(2048);
        let mut pipeline = MmapPipeline::open(tmpfile.path()).unwrap();

        let mut buf = [0u8; 4];
        pipeline.read_at(512, &mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(pipeline.byte_len().unwrap(), 2048);

        let mut big = vec![0u8; 1024];
        assert!(matches!(
            pipeline.read_at(1536, &mut big),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_mmap_pipeline_sector_count() {
        let tmpfile = image_of(1536 + 100);
        let pipeline = MmapPipeline::open(tmpfile.path()).unwrap();

        assert_eq!(pipeline.sector_count(SectorSize::LOGICAL_512), 3);
        assert_eq!(pipeline.sector_count(SectorSize::NATIVE_4K), 0);
    }
}

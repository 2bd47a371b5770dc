//! # parttab pipeline
//!
//! File plumbing for the partition table crates.
//!
//! This crate provides the stream types the codecs are usually pointed at:
//! - **DiskImage**: an image file opened read-only or read-write, for repairs
//! - **MmapPipeline**: memory-mapped read-only access, for inspection
//! - **open_read_only**: picks one of the two for an image of any size
//!
//! Both implement the standard `Read`/`Seek` (and `Write` for `DiskImage`)
//! traits, so they pick up `ByteSource`/`ByteSink` from `parttab-core`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use parttab_pipeline::{DiskImage, ImageConfig, MmapPipeline};
//! use parttab_core::ByteSource;
//! use std::path::Path;
//!
//! let mut mapped = MmapPipeline::open(Path::new("disk.img")).unwrap();
//! let mut mbr = [0u8; 512];
//! mapped.read_at(0, &mut mbr).unwrap();
//!
//! let image = DiskImage::open(Path::new("disk.img"), ImageConfig::writable()).unwrap();
//! assert_eq!(image.len(), mapped.len());
//! ```

pub mod image;
pub mod mmap;

pub use image::{DiskImage, ImageConfig};
pub use mmap::MmapPipeline;

use parttab_core::{ReadSeek, MAX_MMAP_SIZE};
use std::io;
use std::path::Path;

/// Open an image for reading only
///
/// Images up to [`MAX_MMAP_SIZE`] are memory-mapped. Larger ones are read
/// through a read-only [`DiskImage`], since the codecs only touch the
/// sectors they decode.
pub fn open_read_only(path: &Path) -> io::Result<Box<dyn ReadSeek>> {
    let length = std::fs::metadata(path)?.len();
    if length <= MAX_MMAP_SIZE {
        Ok(Box::new(MmapPipeline::open(path)?))
    } else {
        tracing::debug!(
            "{} is {} bytes, over the mapping limit; reading it directly",
            path.display(),
            length
        );
        Ok(Box::new(DiskImage::open(path, ImageConfig::default())?))
    }
}

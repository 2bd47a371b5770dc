//! # parttab core
//!
//! Core traits, types, and error handling shared by the partition table crates.
//!
//! This crate provides the foundational abstractions:
//! - **ByteSource / ByteSink**: offset-addressed I/O the codecs read from and write to
//! - **ZoneTable**: a uniform read-only view over MBR and GPT partitions
//! - **SectorSize**: a validated sector size threaded through every codec call
//!
//! ## Example
//!
//! ```rust
//! use parttab_core::{ByteSource, Result, SectorSize};
//! use std::io::Cursor;
//!
//! fn first_sector(disk: &mut dyn ByteSource, sector_size: SectorSize) -> Result<Vec<u8>> {
//!     let mut buf = vec![0u8; sector_size.as_usize()];
//!     disk.read_at(0, &mut buf)?;
//!     Ok(buf)
//! }
//!
//! let mut disk = Cursor::new(vec![0u8; 4096]);
//! let sector = first_sector(&mut disk, SectorSize::default()).unwrap();
//! assert_eq!(sector.len(), 512);
//! ```

pub mod error;
pub mod security;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{Error, Result};
pub use security::*;
pub use traits::{ByteSink, ByteSource, ReadSeek, ZoneTable};
pub use types::{SectorSize, Zone};

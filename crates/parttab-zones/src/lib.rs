//! # parttab zones
//!
//! Binary codecs for the partition tables of PC-compatible media.
//!
//! ## Supported Formats
//!
//! - **MBR**: Master Boot Record, including the protective MBR of GPT disks
//! - **GPT**: GUID Partition Table, primary and secondary copies
//!
//! Every structure is encoded and decoded field by field at its published
//! little-endian offset. Both GPT checksums are verified on decode and
//! recomputed on encode.
//!
//! ## Example
//!
//! ```rust
//! use parttab_core::SectorSize;
//! use parttab_zones::gpt::{self, GptCopy, GuidPartitionTable};
//! use std::io::Cursor;
//! use uuid::Uuid;
//!
//! let ss = SectorSize::default();
//! let table = GuidPartitionTable::new(Uuid::new_v4(), 2048, ss).unwrap();
//!
//! let mut disk = Cursor::new(vec![0u8; 2048 * 512]);
//! gpt::write_disk(&mut disk, &table, ss).unwrap();
//!
//! let backup = gpt::decode(&mut disk, GptCopy::Secondary, ss).unwrap();
//! assert!(backup.is_consistent());
//! ```

pub mod crc;
pub mod gpt;
pub mod layout;
pub mod mbr;
pub mod scheme;

pub use gpt::types::{GptAttributes, GptHeader, GptPartitionEntry, PartitionTypeGuid};
pub use gpt::{EncodedGpt, GptCopy, GuidPartitionTable};
pub use mbr::types::{CHSAddress, MbrPartitionEntry, MbrPartitionType};
pub use mbr::MasterBootRecord;
pub use scheme::{detect, PartitionScheme};

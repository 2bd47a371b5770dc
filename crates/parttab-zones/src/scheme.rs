//! Partitioning scheme detection

use crate::gpt::codec::last_lba;
use crate::gpt::types::GptHeader;
use crate::mbr::MasterBootRecord;
use parttab_core::{ByteSource, Result, SectorSize};
use serde::Serialize;
use std::fmt;

/// Partitioning scheme found on a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionScheme {
    /// No valid MBR boot signature
    None,
    /// Legacy MBR partitioning
    Mbr,
    /// Protective MBR followed by at least one GPT header signature
    Gpt,
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionScheme::None => write!(f, "none"),
            PartitionScheme::Mbr => write!(f, "MBR"),
            PartitionScheme::Gpt => write!(f, "GPT"),
        }
    }
}

/// Identify the partitioning scheme of `source`
///
/// Only signatures are checked. A GPT with one damaged header still counts
/// as GPT as long as the other header carries "EFI PART".
///
/// # Errors
///
/// Only transport failures are returned. A medium too short to hold a
/// structure simply does not have it.
pub fn detect<S: ByteSource + ?Sized>(
    source: &mut S,
    sector_size: SectorSize,
) -> Result<PartitionScheme> {
    let mbr = match MasterBootRecord::read_from(source) {
        Ok(mbr) => mbr,
        Err(e) if e.is_format_error() => return Ok(PartitionScheme::None),
        Err(e) => return Err(e),
    };

    if !mbr.is_valid() {
        return Ok(PartitionScheme::None);
    }

    if !mbr.is_gpt_protective() {
        return Ok(PartitionScheme::Mbr);
    }

    if has_gpt_signature(source, 1, sector_size)? {
        return Ok(PartitionScheme::Gpt);
    }

    let secondary = match last_lba(source, sector_size) {
        Ok(lba) => lba,
        Err(e) if e.is_format_error() => return Ok(PartitionScheme::Mbr),
        Err(e) => return Err(e),
    };

    if has_gpt_signature(source, secondary, sector_size)? {
        Ok(PartitionScheme::Gpt)
    } else {
        tracing::debug!("Protective MBR present but no GPT header signature found");
        Ok(PartitionScheme::Mbr)
    }
}

fn has_gpt_signature<S: ByteSource + ?Sized>(
    source: &mut S,
    lba: u64,
    sector_size: SectorSize,
) -> Result<bool> {
    let mut signature = [0u8; 8];
    match source.read_at(sector_size.offset_of(lba)?, &mut signature) {
        Ok(()) => Ok(&signature == GptHeader::SIGNATURE),
        Err(e) if e.is_format_error() => Ok(false),
        Err(e) => Err(e),
    }
}

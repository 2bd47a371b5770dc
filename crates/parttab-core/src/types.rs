//! Core types for partition tables

use crate::error::{Error, Result};
use crate::security::checked_multiply_u64;
use serde::Serialize;
use std::fmt;

/// Sector size of a medium, always a positive multiple of 512 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SectorSize(u32);

impl SectorSize {
    /// The classic 512-byte logical sector
    pub const LOGICAL_512: Self = Self(512);

    /// Advanced Format 4Kn sector
    pub const NATIVE_4K: Self = Self(4096);

    /// Validate a sector size
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSectorSize`] for zero or anything that is
    /// not a multiple of 512.
    pub fn new(bytes: u32) -> Result<Self> {
        if bytes == 0 || bytes % 512 != 0 {
            return Err(Error::UnsupportedSectorSize(bytes));
        }
        Ok(Self(bytes))
    }

    /// Sector size in bytes
    pub fn get(self) -> u32 {
        self.0
    }

    /// Sector size in bytes, widened for offset arithmetic
    pub fn bytes(self) -> u64 {
        self.0 as u64
    }

    /// Sector size in bytes as a buffer length
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of an LBA
    pub fn offset_of(self, lba: u64) -> Result<u64> {
        checked_multiply_u64(lba, self.bytes(), "LBA byte offset")
    }

    /// Number of whole sectors needed to hold `len` bytes
    pub fn sectors_for(self, len: u64) -> u64 {
        len.div_ceil(self.bytes())
    }

    /// Number of complete sectors in a medium of `len` bytes
    pub fn sector_count(self, len: u64) -> u64 {
        len / self.bytes()
    }
}

impl Default for SectorSize {
    fn default() -> Self {
        Self::LOGICAL_512
    }
}

impl TryFrom<u32> for SectorSize {
    type Error = Error;

    fn try_from(bytes: u32) -> Result<Self> {
        Self::new(bytes)
    }
}

impl fmt::Display for SectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// A zone (partition) described by a partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    /// Slot index in the table this zone came from
    pub index: usize,

    /// First LBA of the zone
    pub first_lba: u64,

    /// Last LBA of the zone (inclusive)
    pub last_lba: u64,

    /// Type of zone (e.g., "EFI System", "Linux")
    pub zone_type: String,

    /// Optional label stored in the table (GPT partition name)
    pub label: Option<String>,
}

impl Zone {
    /// Create a new zone
    pub fn new(index: usize, first_lba: u64, last_lba: u64, zone_type: String) -> Self {
        Self {
            index,
            first_lba,
            last_lba,
            zone_type,
            label: None,
        }
    }

    /// Set the label
    pub fn with_label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }

    /// Number of sectors covered by this zone
    pub fn sector_count(&self) -> u64 {
        if self.last_lba >= self.first_lba {
            self.last_lba - self.first_lba + 1
        } else {
            0
        }
    }

    /// Byte offset of the zone for a given sector size
    pub fn byte_offset(&self, sector_size: SectorSize) -> u64 {
        self.first_lba.saturating_mul(sector_size.bytes())
    }

    /// Byte length of the zone for a given sector size
    pub fn byte_length(&self, sector_size: SectorSize) -> u64 {
        self.sector_count().saturating_mul(sector_size.bytes())
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Zone {} [{} @ LBA {}..={}, {} sectors]",
            self.index,
            self.zone_type,
            self.first_lba,
            self.last_lba,
            self.sector_count()
        )?;
        if let Some(ref label) = self.label {
            write!(f, " \"{}\"", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_size_validation() {
        assert!(SectorSize::new(512).is_ok());
        assert!(SectorSize::new(4096).is_ok());
        assert!(SectorSize::new(1024).is_ok());

        for bad in [0, 100, 513, 4095] {
            assert!(matches!(
                SectorSize::new(bad),
                Err(Error::UnsupportedSectorSize(b)) if b == bad
            ));
        }
    }

    #[test]
    fn test_sector_arithmetic() {
        let ss = SectorSize::LOGICAL_512;
        assert_eq!(ss.offset_of(2).unwrap(), 1024);
        assert_eq!(ss.sectors_for(16384), 32);
        assert_eq!(ss.sectors_for(16385), 33);
        assert_eq!(ss.sectors_for(0), 0);
        assert_eq!(ss.sector_count(1000), 1);
        assert!(ss.offset_of(u64::MAX).is_err());
    }

    #[test]
    fn test_zone_creation() {
        let zone = Zone::new(0, 2048, 4095, "Linux filesystem".to_string())
            .with_label("root".to_string());
        assert_eq!(zone.sector_count(), 2048);
        assert_eq!(zone.byte_offset(SectorSize::LOGICAL_512), 2048 * 512);
        assert_eq!(zone.byte_length(SectorSize::NATIVE_4K), 2048 * 4096);
        assert!(zone.to_string().contains("\"root\""));
    }

    #[test]
    fn test_inverted_zone_is_empty() {
        let zone = Zone::new(1, 10, 5, "Broken".to_string());
        assert_eq!(zone.sector_count(), 0);
    }
}

//! MBR partition entries, type codes and CHS addressing

use crate::layout::{read_array, read_u32_le, write_bytes, write_u32_le};
use serde::Serialize;
use std::fmt;

/// MBR partition type codes
///
/// Known codes get a named variant. Anything else is carried verbatim in
/// `Unknown` so that decode followed by encode never changes the type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MbrPartitionType {
    /// Empty/unused partition entry
    Empty,
    /// FAT12, CHS
    Fat12,
    /// FAT16 < 32MB, CHS
    Fat16Small,
    /// Extended partition, CHS
    Extended,
    /// FAT16 >= 32MB, CHS
    Fat16,
    /// NTFS/exFAT/HPFS
    Ntfs,
    /// FAT32, CHS
    Fat32Chs,
    /// FAT32, LBA
    Fat32Lba,
    /// FAT16, LBA
    Fat16Lba,
    /// Extended partition, LBA
    ExtendedLba,
    /// Linux swap
    LinuxSwap,
    /// Linux native (ext2/ext3/ext4)
    LinuxNative,
    /// GPT protective MBR
    GptProtective,
    /// EFI system partition
    EfiSystem,
    /// Any other type byte
    Unknown(u8),
}

impl MbrPartitionType {
    /// Create a partition type from a byte value
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::Empty,
            0x01 => Self::Fat12,
            0x04 => Self::Fat16Small,
            0x05 => Self::Extended,
            0x06 => Self::Fat16,
            0x07 => Self::Ntfs,
            0x0B => Self::Fat32Chs,
            0x0C => Self::Fat32Lba,
            0x0E => Self::Fat16Lba,
            0x0F => Self::ExtendedLba,
            0x82 => Self::LinuxSwap,
            0x83 => Self::LinuxNative,
            0xEE => Self::GptProtective,
            0xEF => Self::EfiSystem,
            _ => Self::Unknown(b),
        }
    }

    /// Get the byte value of this partition type
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::Fat12 => 0x01,
            Self::Fat16Small => 0x04,
            Self::Extended => 0x05,
            Self::Fat16 => 0x06,
            Self::Ntfs => 0x07,
            Self::Fat32Chs => 0x0B,
            Self::Fat32Lba => 0x0C,
            Self::Fat16Lba => 0x0E,
            Self::ExtendedLba => 0x0F,
            Self::LinuxSwap => 0x82,
            Self::LinuxNative => 0x83,
            Self::GptProtective => 0xEE,
            Self::EfiSystem => 0xEF,
            Self::Unknown(b) => b,
        }
    }

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Fat12 => "FAT12",
            Self::Fat16Small => "FAT16 (<32MB)",
            Self::Extended => "Extended",
            Self::Fat16 => "FAT16",
            Self::Ntfs => "NTFS/exFAT",
            Self::Fat32Chs => "FAT32 (CHS)",
            Self::Fat32Lba => "FAT32 (LBA)",
            Self::Fat16Lba => "FAT16 (LBA)",
            Self::ExtendedLba => "Extended (LBA)",
            Self::LinuxSwap => "Linux swap",
            Self::LinuxNative => "Linux",
            Self::GptProtective => "GPT Protective",
            Self::EfiSystem => "EFI System",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for MbrPartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(b) => write!(f, "Unknown (0x{:02X})", b),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// CHS (Cylinder-Head-Sector) address
///
/// Maximum values: 1023 cylinders, 255 heads, 63 sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CHSAddress {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl CHSAddress {
    /// Heads per cylinder assumed when converting from LBA
    pub const HEADS: u32 = 255;

    /// Sectors per track assumed when converting from LBA
    pub const SECTORS_PER_TRACK: u32 = 63;

    /// Parse CHS address from 3 bytes
    ///
    /// Format:
    /// - Byte 0: Head (0-255)
    /// - Byte 1: Sector (bits 0-5) + Cylinder high (bits 6-7)
    /// - Byte 2: Cylinder low (bits 0-7)
    pub fn from_bytes(bytes: &[u8; 3]) -> Self {
        let head = bytes[0];
        let sector = bytes[1] & 0x3F;
        let cyl_high = ((bytes[1] & 0xC0) as u16) << 2;
        let cylinder = cyl_high | bytes[2] as u16;

        Self {
            cylinder,
            head,
            sector,
        }
    }

    /// Convert CHS to bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        let cyl_high = ((self.cylinder >> 8) & 0x03) as u8;
        let cyl_low = (self.cylinder & 0xFF) as u8;

        [self.head, (self.sector & 0x3F) | (cyl_high << 6), cyl_low]
    }

    /// The saturated address used for anything past cylinder 1023
    pub fn max() -> Self {
        Self {
            cylinder: 1023,
            head: 255,
            sector: 63,
        }
    }

    /// Convert an LBA with the 255-head, 63-sector translation geometry
    ///
    /// Addresses beyond the CHS range saturate to [`CHSAddress::max`].
    pub fn from_lba(lba: u64) -> Self {
        let per_cylinder = (Self::HEADS * Self::SECTORS_PER_TRACK) as u64;
        let cylinder = lba / per_cylinder;
        if cylinder > 1023 {
            return Self::max();
        }

        let rest = lba % per_cylinder;
        Self {
            cylinder: cylinder as u16,
            head: (rest / Self::SECTORS_PER_TRACK as u64) as u8,
            sector: (rest % Self::SECTORS_PER_TRACK as u64) as u8 + 1,
        }
    }

    /// Convert CHS to LBA for the given geometry
    pub fn to_lba(&self, heads_per_cylinder: u16, sectors_per_track: u16) -> u32 {
        let c = self.cylinder as u32;
        let h = self.head as u32;
        let s = self.sector.saturating_sub(1) as u32; // Sectors are 1-indexed

        (c * heads_per_cylinder as u32 + h) * sectors_per_track as u32 + s
    }
}

impl fmt::Display for CHSAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/H:{}/S:{}", self.cylinder, self.head, self.sector)
    }
}

/// One of the four 16-byte MBR partition entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MbrPartitionEntry {
    /// Status byte, bit 7 marks the active partition
    pub status: u8,
    pub chs_start: CHSAddress,
    pub partition_type: MbrPartitionType,
    pub chs_end: CHSAddress,
    pub first_lba: u32,
    pub sector_count: u32,
}

impl MbrPartitionEntry {
    /// Size of an entry on disk
    pub const SIZE: usize = 16;

    /// Status value of a bootable entry
    pub const BOOTABLE: u8 = 0x80;

    /// An all-zero entry
    pub fn empty() -> Self {
        Self {
            status: 0,
            chs_start: CHSAddress::default(),
            partition_type: MbrPartitionType::Empty,
            chs_end: CHSAddress::default(),
            first_lba: 0,
            sector_count: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        Self {
            status: bytes[0],
            chs_start: CHSAddress::from_bytes(&read_array(bytes, 1)),
            partition_type: MbrPartitionType::from_byte(bytes[4]),
            chs_end: CHSAddress::from_bytes(&read_array(bytes, 5)),
            first_lba: read_u32_le(bytes, 8),
            sector_count: read_u32_le(bytes, 12),
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.status;
        write_bytes(&mut buf, 1, &self.chs_start.to_bytes());
        buf[4] = self.partition_type.to_byte();
        write_bytes(&mut buf, 5, &self.chs_end.to_bytes());
        write_u32_le(&mut buf, 8, self.first_lba);
        write_u32_le(&mut buf, 12, self.sector_count);
        buf
    }

    pub fn is_bootable(&self) -> bool {
        self.status & Self::BOOTABLE != 0
    }

    /// An entry is unused when its type is empty or it covers no sectors
    pub fn is_empty(&self) -> bool {
        self.partition_type == MbrPartitionType::Empty || self.sector_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_type_from_byte() {
        assert_eq!(MbrPartitionType::from_byte(0x00), MbrPartitionType::Empty);
        assert_eq!(MbrPartitionType::from_byte(0x0B), MbrPartitionType::Fat32Chs);
        assert_eq!(MbrPartitionType::from_byte(0xEE), MbrPartitionType::GptProtective);
        assert_eq!(MbrPartitionType::from_byte(0xFF), MbrPartitionType::Unknown(0xFF));
    }

    #[test]
    fn test_partition_type_bytes_round_trip() {
        for b in 0..=255u8 {
            assert_eq!(MbrPartitionType::from_byte(b).to_byte(), b);
        }
    }

    #[test]
    fn test_partition_type_display() {
        assert_eq!(MbrPartitionType::Fat32Lba.to_string(), "FAT32 (LBA)");
        assert_eq!(MbrPartitionType::Unknown(0x42).to_string(), "Unknown (0x42)");
    }

    #[test]
    fn test_chs_bytes() {
        let chs = CHSAddress::from_bytes(&[0x01, 0x01, 0x00]);
        assert_eq!(chs.cylinder, 0);
        assert_eq!(chs.head, 1);
        assert_eq!(chs.sector, 1);

        let chs = CHSAddress {
            cylinder: 1000,
            head: 5,
            sector: 10,
        };
        assert_eq!(CHSAddress::from_bytes(&chs.to_bytes()), chs);
    }

    #[test]
    fn test_chs_from_lba() {
        assert_eq!(CHSAddress::from_lba(1).to_bytes(), [0x00, 0x02, 0x00]);

        let chs = CHSAddress::from_lba(16_065 + 63);
        assert_eq!((chs.cylinder, chs.head, chs.sector), (1, 1, 1));
        assert_eq!(chs.to_lba(255, 63), 16_065 + 63);

        assert_eq!(CHSAddress::from_lba(u32::MAX as u64).to_bytes(), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_entry_layout() {
        let entry = MbrPartitionEntry {
            status: MbrPartitionEntry::BOOTABLE,
            chs_start: CHSAddress::from_lba(2048),
            partition_type: MbrPartitionType::LinuxNative,
            chs_end: CHSAddress::from_lba(4095),
            first_lba: 2048,
            sector_count: 2048,
        };
        let bytes = entry.to_bytes();

        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[4], 0x83);
        assert_eq!(&bytes[8..12], &2048u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &2048u32.to_le_bytes());
        assert_eq!(MbrPartitionEntry::from_bytes(&bytes), entry);
        assert!(entry.is_bootable());
        assert!(!entry.is_empty());
        assert!(MbrPartitionEntry::empty().is_empty());
    }
}

//! GPT wire structures: header, partition entry, type GUIDs and attributes

use crate::crc::{crc32, header_crc32};
use crate::layout::{
    read_array, read_guid, read_u32_le, read_u64_le, read_utf16_name, write_bytes, write_guid,
    write_u32_le, write_u64_le, write_utf16_name,
};
use parttab_core::{Error, Result, SectorSize};
use serde::Serialize;
use std::fmt;
use uuid::{uuid, Uuid};

/// GPT partition type GUID
///
/// Well-known partition type GUIDs used in GPT partition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PartitionTypeGuid(pub Uuid);

impl PartitionTypeGuid {
    /// Unused entry
    pub const UNUSED: Self = Self(Uuid::nil());

    /// EFI System Partition
    pub const EFI_SYSTEM: Self = Self(uuid!("C12A7328-F81F-11D2-BA4B-00A0C93EC93B"));

    /// BIOS boot partition (GRUB core image)
    pub const BIOS_BOOT: Self = Self(uuid!("21686148-6449-6E6F-744E-656564454649"));

    /// Microsoft Basic Data (FAT, NTFS, exFAT)
    pub const MICROSOFT_BASIC_DATA: Self = Self(uuid!("EBD0A0A2-B9E5-4433-87C0-68B6B72699C7"));

    /// Microsoft Reserved
    pub const MICROSOFT_RESERVED: Self = Self(uuid!("E3C9E316-0B5C-4DB8-817D-F92DF00215AE"));

    /// Linux filesystem
    pub const LINUX_FILESYSTEM: Self = Self(uuid!("0FC63DAF-8483-4772-8E79-3D69D8477DE4"));

    /// Linux swap
    pub const LINUX_SWAP: Self = Self(uuid!("0657FD6D-A4AB-43C4-84E5-0933C84B4F4F"));

    /// Legacy MBR partition scheme nested in GPT
    pub const MBR_PARTITION_SCHEME: Self = Self(uuid!("024DEE41-33E7-11D3-9D69-0008C781F39F"));

    const KNOWN: [(Self, &'static str); 8] = [
        (Self::UNUSED, "Unused"),
        (Self::EFI_SYSTEM, "EFI System"),
        (Self::BIOS_BOOT, "BIOS boot"),
        (Self::MICROSOFT_BASIC_DATA, "Microsoft Basic Data"),
        (Self::MICROSOFT_RESERVED, "Microsoft Reserved"),
        (Self::LINUX_FILESYSTEM, "Linux filesystem"),
        (Self::LINUX_SWAP, "Linux swap"),
        (Self::MBR_PARTITION_SCHEME, "MBR partition scheme"),
    ];

    /// Get a human-readable name for this partition type
    pub fn name(&self) -> &'static str {
        Self::KNOWN
            .iter()
            .find(|(guid, _)| guid == self)
            .map(|(_, name)| *name)
            .unwrap_or("Unknown")
    }

    pub fn is_unused(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for PartitionTypeGuid {
    fn from(guid: Uuid) -> Self {
        Self(guid)
    }
}

impl fmt::Display for PartitionTypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// GPT partition attribute flags
///
/// Bits 0 to 2 are defined by UEFI. Bits 48 to 63 belong to the partition
/// type; the named ones here are the Microsoft basic-data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct GptAttributes(pub u64);

impl GptAttributes {
    /// Platform required partition
    pub const REQUIRED: u64 = 1 << 0;
    /// Firmware must not produce a block IO protocol for this partition
    pub const NO_BLOCK_IO: u64 = 1 << 1;
    /// Legacy BIOS bootable
    pub const LEGACY_BIOS_BOOTABLE: u64 = 1 << 2;
    pub const READ_ONLY: u64 = 1 << 60;
    pub const SHADOW_COPY: u64 = 1 << 61;
    pub const HIDDEN: u64 = 1 << 62;
    pub const NO_DRIVE_LETTER: u64 = 1 << 63;

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    /// Return a copy with `flag` set or cleared
    pub fn with(self, flag: u64, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }

    pub fn is_required(self) -> bool {
        self.contains(Self::REQUIRED)
    }

    pub fn no_block_io(self) -> bool {
        self.contains(Self::NO_BLOCK_IO)
    }

    pub fn is_legacy_bios_bootable(self) -> bool {
        self.contains(Self::LEGACY_BIOS_BOOTABLE)
    }

    pub fn is_read_only(self) -> bool {
        self.contains(Self::READ_ONLY)
    }

    pub fn is_shadow_copy(self) -> bool {
        self.contains(Self::SHADOW_COPY)
    }

    pub fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }

    pub fn no_drive_letter(self) -> bool {
        self.contains(Self::NO_DRIVE_LETTER)
    }
}

/// GPT partition entry
///
/// Each partition entry is 128 bytes and describes one partition on the disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GptPartitionEntry {
    /// Partition type GUID
    pub partition_type: PartitionTypeGuid,
    /// Unique partition GUID
    pub unique_guid: Uuid,
    /// First LBA (inclusive)
    pub first_lba: u64,
    /// Last LBA (inclusive)
    pub last_lba: u64,
    /// Attribute flags
    pub attributes: GptAttributes,
    /// Partition name, at most 36 UTF-16 code units on disk
    pub name: String,
    /// Array slot this entry was decoded from
    pub slot: Option<u32>,
}

impl GptPartitionEntry {
    /// Size of a partition entry in bytes
    pub const ENTRY_SIZE: usize = 128;

    /// Offset of the UTF-16LE name field
    pub const NAME_OFFSET: usize = 56;

    /// Length of the name field in bytes
    pub const NAME_BYTES: usize = 72;

    /// Create an entry with no attributes and no assigned slot
    pub fn new(
        partition_type: PartitionTypeGuid,
        unique_guid: Uuid,
        first_lba: u64,
        last_lba: u64,
        name: impl Into<String>,
    ) -> Self {
        Self {
            partition_type,
            unique_guid,
            first_lba,
            last_lba,
            attributes: GptAttributes::default(),
            name: name.into(),
            slot: None,
        }
    }

    /// Set the attribute flags
    pub fn with_attributes(mut self, attributes: GptAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Parse a partition entry from the first 128 bytes of `bytes`
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`Self::ENTRY_SIZE`].
    pub fn from_bytes(bytes: &[u8], slot: Option<u32>) -> Self {
        Self {
            partition_type: PartitionTypeGuid(read_guid(bytes, 0)),
            unique_guid: read_guid(bytes, 16),
            first_lba: read_u64_le(bytes, 32),
            last_lba: read_u64_le(bytes, 40),
            attributes: GptAttributes(read_u64_le(bytes, 48)),
            name: read_utf16_name(&bytes[Self::NAME_OFFSET..Self::NAME_OFFSET + Self::NAME_BYTES]),
            slot,
        }
    }

    /// Encode into `buf`, zeroing anything past the 128 defined bytes
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`Self::ENTRY_SIZE`].
    pub fn write_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        write_guid(buf, 0, &self.partition_type.0);
        write_guid(buf, 16, &self.unique_guid);
        write_u64_le(buf, 32, self.first_lba);
        write_u64_le(buf, 40, self.last_lba);
        write_u64_le(buf, 48, self.attributes.bits());
        write_utf16_name(
            &mut buf[Self::NAME_OFFSET..Self::NAME_OFFSET + Self::NAME_BYTES],
            &self.name,
        );
    }

    /// Check if this entry is unused
    pub fn is_unused(&self) -> bool {
        self.partition_type.is_unused()
    }

    /// Get the size of this partition in LBA sectors
    pub fn size_lba(&self) -> u64 {
        if self.last_lba >= self.first_lba {
            self.last_lba - self.first_lba + 1
        } else {
            0
        }
    }

    /// True when the two inclusive LBA ranges share a sector
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first_lba <= other.last_lba && other.first_lba <= self.last_lba
    }
}

/// GPT header as laid out on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GptHeader {
    /// Header signature ("EFI PART")
    pub signature: [u8; 8],
    /// GPT revision (usually 0x00010000)
    pub revision: u32,
    /// Header size in bytes (usually 92)
    pub header_size: u32,
    /// CRC32 checksum of header
    pub header_crc32: u32,
    /// Reserved (must be zero)
    pub reserved: u32,
    /// Current LBA (location of this header)
    pub current_lba: u64,
    /// Backup LBA (location of the other header)
    pub backup_lba: u64,
    /// First usable LBA for partitions
    pub first_usable_lba: u64,
    /// Last usable LBA for partitions
    pub last_usable_lba: u64,
    /// Disk GUID
    pub disk_guid: Uuid,
    /// Starting LBA of partition entries
    pub partition_entries_lba: u64,
    /// Number of partition entries
    pub num_partition_entries: u32,
    /// Size of each partition entry
    pub partition_entry_size: u32,
    /// CRC32 of partition entries array
    pub partition_entries_crc32: u32,
}

impl GptHeader {
    /// GPT header signature
    pub const SIGNATURE: &'static [u8; 8] = b"EFI PART";

    /// Size of the defined header fields
    pub const HEADER_SIZE: usize = 92;

    /// Revision 1.0
    pub const REVISION_1_0: u32 = 0x0001_0000;

    /// Parse GPT header from bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] for fewer than 92 bytes and
    /// [`Error::InvalidSignature`] if the signature is not "EFI PART".
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_SIZE {
            return Err(Error::truncated(
                "GPT header",
                Self::HEADER_SIZE as u64,
                bytes.len() as u64,
            ));
        }

        let signature: [u8; 8] = read_array(bytes, 0);
        if &signature != Self::SIGNATURE {
            return Err(Error::invalid_signature(format!(
                "expected GPT signature \"EFI PART\", found {:02X?}",
                signature
            )));
        }

        Ok(Self {
            signature,
            revision: read_u32_le(bytes, 8),
            header_size: read_u32_le(bytes, 12),
            header_crc32: read_u32_le(bytes, 16),
            reserved: read_u32_le(bytes, 20),
            current_lba: read_u64_le(bytes, 24),
            backup_lba: read_u64_le(bytes, 32),
            first_usable_lba: read_u64_le(bytes, 40),
            last_usable_lba: read_u64_le(bytes, 48),
            disk_guid: read_guid(bytes, 56),
            partition_entries_lba: read_u64_le(bytes, 72),
            num_partition_entries: read_u32_le(bytes, 80),
            partition_entry_size: read_u32_le(bytes, 84),
            partition_entries_crc32: read_u32_le(bytes, 88),
        })
    }

    /// Encode into a zero-padded sector, with the stored checksum fields as they are
    pub fn to_bytes(&self, sector_size: SectorSize) -> Vec<u8> {
        let mut buf = vec![0u8; sector_size.as_usize()];
        write_bytes(&mut buf, 0, &self.signature);
        write_u32_le(&mut buf, 8, self.revision);
        write_u32_le(&mut buf, 12, self.header_size);
        write_u32_le(&mut buf, 16, self.header_crc32);
        write_u32_le(&mut buf, 20, self.reserved);
        write_u64_le(&mut buf, 24, self.current_lba);
        write_u64_le(&mut buf, 32, self.backup_lba);
        write_u64_le(&mut buf, 40, self.first_usable_lba);
        write_u64_le(&mut buf, 48, self.last_usable_lba);
        write_guid(&mut buf, 56, &self.disk_guid);
        write_u64_le(&mut buf, 72, self.partition_entries_lba);
        write_u32_le(&mut buf, 80, self.num_partition_entries);
        write_u32_le(&mut buf, 84, self.partition_entry_size);
        write_u32_le(&mut buf, 88, self.partition_entries_crc32);
        buf
    }

    /// Header CRC32 over the first `header_size` bytes of `raw`
    ///
    /// `raw` is the sector the header was read from. The span is clamped to
    /// what `raw` holds.
    pub fn compute_header_crc32(&self, raw: &[u8]) -> u32 {
        let len = (self.header_size as usize)
            .max(Self::HEADER_SIZE)
            .min(raw.len());
        header_crc32(&raw[..len])
    }

    /// Verify the header CRC32 against the sector it was read from
    pub fn verify_header_crc32(&self, raw: &[u8]) -> bool {
        self.compute_header_crc32(raw) == self.header_crc32
    }

    /// Verify the partition entries CRC32 over `count * entry_size` bytes of `array`
    pub fn verify_partition_entries_crc32(&self, array: &[u8]) -> bool {
        let len = (self.num_partition_entries as usize)
            .saturating_mul(self.partition_entry_size as usize)
            .min(array.len());
        crc32(&array[..len]) == self.partition_entries_crc32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_type_guid_on_disk_bytes() {
        let mut buf = [0u8; 16];
        write_guid(&mut buf, 0, &PartitionTypeGuid::EFI_SYSTEM.0);
        assert_eq!(
            buf,
            [
                0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11,
                0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9, 0x3b,
            ]
        );
    }

    #[test]
    fn test_partition_type_names() {
        assert_eq!(PartitionTypeGuid::EFI_SYSTEM.name(), "EFI System");
        assert_eq!(PartitionTypeGuid::LINUX_SWAP.to_string(), "Linux swap");
        assert_eq!(PartitionTypeGuid(Uuid::from_u128(42)).name(), "Unknown");
        assert!(PartitionTypeGuid::UNUSED.is_unused());
    }

    #[test]
    fn test_attribute_bits() {
        let attrs = GptAttributes::default()
            .with(GptAttributes::REQUIRED, true)
            .with(GptAttributes::HIDDEN, true)
            .with(GptAttributes::NO_DRIVE_LETTER, true);

        assert_eq!(attrs.bits(), 0xC000_0000_0000_0001);
        assert!(attrs.is_required());
        assert!(attrs.is_hidden());
        assert!(attrs.no_drive_letter());
        assert!(!attrs.is_read_only());
        assert!(!attrs.is_shadow_copy());
        assert!(!attrs.with(GptAttributes::HIDDEN, false).is_hidden());

        assert!(GptAttributes(1 << 60).is_read_only());
        assert!(GptAttributes(1 << 61).is_shadow_copy());
        assert!(GptAttributes(1 << 2).is_legacy_bios_bootable());
        assert!(GptAttributes(1 << 1).no_block_io());
    }

    #[test]
    fn test_entry_layout() {
        let entry = GptPartitionEntry::new(
            PartitionTypeGuid::MICROSOFT_BASIC_DATA,
            Uuid::from_u128(0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10),
            2048,
            206_847,
            "DATA",
        )
        .with_attributes(GptAttributes(GptAttributes::READ_ONLY));

        let mut buf = [0xAAu8; 128];
        entry.write_into(&mut buf);

        assert_eq!(&buf[0..4], &[0xa2, 0xa0, 0xd0, 0xeb]);
        assert_eq!(&buf[32..40], &2048u64.to_le_bytes());
        assert_eq!(&buf[40..48], &206_847u64.to_le_bytes());
        assert_eq!(buf[55], 0x10);
        assert_eq!(&buf[56..60], &[b'D', 0, b'A', 0]);
        assert!(buf[64..].iter().all(|&b| b == 0));

        let decoded = GptPartitionEntry::from_bytes(&buf, Some(3));
        assert_eq!(decoded.slot, Some(3));
        assert_eq!(decoded, GptPartitionEntry { slot: Some(3), ..entry });
        assert_eq!(decoded.size_lba(), 204_800);
    }

    #[test]
    fn test_entry_overlap() {
        let a = GptPartitionEntry::new(PartitionTypeGuid::LINUX_FILESYSTEM, Uuid::nil(), 100, 199, "");
        let b = GptPartitionEntry::new(PartitionTypeGuid::LINUX_FILESYSTEM, Uuid::nil(), 199, 300, "");
        let c = GptPartitionEntry::new(PartitionTypeGuid::LINUX_FILESYSTEM, Uuid::nil(), 200, 300, "");
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    fn sample_header() -> GptHeader {
        GptHeader {
            signature: *GptHeader::SIGNATURE,
            revision: GptHeader::REVISION_1_0,
            header_size: 92,
            header_crc32: 0,
            reserved: 0,
            current_lba: 1,
            backup_lba: 2047,
            first_usable_lba: 34,
            last_usable_lba: 2014,
            disk_guid: Uuid::from_u128(7),
            partition_entries_lba: 2,
            num_partition_entries: 128,
            partition_entry_size: 128,
            partition_entries_crc32: crc32(&[0u8; 128 * 128]),
        }
    }

    #[test]
    fn test_header_bytes() {
        let mut header = sample_header();
        let raw = header.to_bytes(SectorSize::LOGICAL_512);
        assert_eq!(raw.len(), 512);
        assert_eq!(&raw[0..8], b"EFI PART");
        assert_eq!(&raw[8..12], &[0x00, 0x00, 0x01, 0x00]);

        header.header_crc32 = header.compute_header_crc32(&raw);
        let raw = header.to_bytes(SectorSize::LOGICAL_512);
        let parsed = GptHeader::from_bytes(&raw).unwrap();

        assert_eq!(parsed, header);
        assert!(parsed.verify_header_crc32(&raw));
        assert!(parsed.verify_partition_entries_crc32(&[0u8; 128 * 128]));
    }

    #[test]
    fn test_header_crc_mismatch() {
        let mut header = sample_header();
        let raw = header.to_bytes(SectorSize::LOGICAL_512);
        header.header_crc32 = header.compute_header_crc32(&raw) ^ 1;
        let raw = header.to_bytes(SectorSize::LOGICAL_512);

        let parsed = GptHeader::from_bytes(&raw).unwrap();
        assert!(!parsed.verify_header_crc32(&raw));
    }

    #[test]
    fn test_header_errors() {
        assert!(matches!(
            GptHeader::from_bytes(&[0u8; 50]),
            Err(Error::Truncated { needed: 92, .. })
        ));
        assert!(matches!(
            GptHeader::from_bytes(&[0u8; 92]),
            Err(Error::InvalidSignature(_))
        ));
    }
}

//! MBR (Master Boot Record) codec

pub mod types;

use crate::layout::{read_array, read_u32_le, write_bytes};
use parttab_core::{ByteSink, ByteSource, Error, Result, SectorSize, Zone, ZoneTable};
use serde::Serialize;
use types::{CHSAddress, MbrPartitionEntry, MbrPartitionType};

/// Master Boot Record
///
/// The legacy partitioning scheme used by BIOS-based systems, and the
/// protective sector that precedes every GPT disk.
///
/// # Structure
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x000   446   Bootstrap code (disk signature at 0x1B8)
/// 0x1BE   16    Partition entry 1
/// 0x1CE   16    Partition entry 2
/// 0x1DE   16    Partition entry 3
/// 0x1EE   16    Partition entry 4
/// 0x1FE   2     Boot signature (0x55 0xAA)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterBootRecord {
    /// Opaque boot code, carried through encode unchanged
    #[serde(skip)]
    pub bootstrap: [u8; 446],
    pub entries: [MbrPartitionEntry; 4],
    pub boot_signature: [u8; 2],
}

impl MasterBootRecord {
    /// Size of the MBR in bytes (always 512)
    pub const MBR_SIZE: usize = 512;

    /// Size of the bootstrap area
    pub const BOOTSTRAP_SIZE: usize = 446;

    /// Offset of the first partition entry
    pub const PARTITION_TABLE_OFFSET: usize = 0x1BE;

    /// Offset of the disk signature
    pub const DISK_SIGNATURE_OFFSET: usize = 0x1B8;

    /// Offset of the boot signature
    pub const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

    /// The boot signature bytes as stored on disk
    pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Number of partition entries in MBR
    pub const NUM_PARTITIONS: usize = 4;

    /// An MBR with no partitions and a valid boot signature
    pub fn empty() -> Self {
        Self {
            bootstrap: [0u8; Self::BOOTSTRAP_SIZE],
            entries: [MbrPartitionEntry::empty(); Self::NUM_PARTITIONS],
            boot_signature: Self::BOOT_SIGNATURE,
        }
    }

    /// Decode an MBR from the first 512 bytes of `bytes`
    ///
    /// A bad boot signature is not an error here; check [`Self::is_valid`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] if fewer than 512 bytes are given.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::MBR_SIZE {
            return Err(Error::truncated(
                "MBR",
                Self::MBR_SIZE as u64,
                bytes.len() as u64,
            ));
        }

        let mut entries = [MbrPartitionEntry::empty(); Self::NUM_PARTITIONS];
        for (i, entry) in entries.iter_mut().enumerate() {
            let offset = Self::PARTITION_TABLE_OFFSET + i * MbrPartitionEntry::SIZE;
            *entry = MbrPartitionEntry::from_bytes(&read_array(bytes, offset));
        }

        Ok(Self {
            bootstrap: read_array(bytes, 0),
            entries,
            boot_signature: read_array(bytes, Self::BOOT_SIGNATURE_OFFSET),
        })
    }

    /// Encode to the 512-byte on-disk form
    pub fn encode(&self) -> [u8; 512] {
        let mut buf = [0u8; Self::MBR_SIZE];
        write_bytes(&mut buf, 0, &self.bootstrap);
        for (i, entry) in self.entries.iter().enumerate() {
            let offset = Self::PARTITION_TABLE_OFFSET + i * MbrPartitionEntry::SIZE;
            write_bytes(&mut buf, offset, &entry.to_bytes());
        }
        write_bytes(&mut buf, Self::BOOT_SIGNATURE_OFFSET, &self.boot_signature);
        buf
    }

    /// Build the protective MBR of a GPT disk with `total_sectors` sectors
    ///
    /// One 0xEE entry covers LBA 1 to the end of the disk, clamped to what
    /// a 32-bit sector count can describe.
    ///
    /// `total_sectors` is already in units of the medium's sector size, so no
    /// sector size is needed here: the entry counts sectors, not bytes, and
    /// the MBR itself always occupies the first 512 bytes of LBA 0. To start
    /// from a byte length and a sector size, use
    /// [`MasterBootRecord::protective_for_len`], which is
    /// `protective(sector_size.sector_count(len))`.
    pub fn protective(total_sectors: u64) -> Self {
        let sector_count = total_sectors.saturating_sub(1).min(u32::MAX as u64) as u32;

        let mut mbr = Self::empty();
        mbr.entries[0] = MbrPartitionEntry {
            status: 0,
            chs_start: CHSAddress::from_lba(1),
            partition_type: MbrPartitionType::GptProtective,
            chs_end: CHSAddress::from_lba(sector_count as u64),
            first_lba: 1,
            sector_count,
        };
        mbr
    }

    /// Protective MBR for a medium of `len` bytes with `sector_size` sectors
    ///
    /// Partial trailing sectors are not counted.
    pub fn protective_for_len(len: u64, sector_size: SectorSize) -> Self {
        Self::protective(sector_size.sector_count(len))
    }

    /// Read and decode sector 0 of `source`
    pub fn read_from<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self> {
        let mut buf = [0u8; Self::MBR_SIZE];
        source.read_at(0, &mut buf)?;
        Self::decode(&buf)
    }

    /// Write this MBR as sector 0 of `sink`, zero-filling the rest of the sector
    pub fn write_to<W: ByteSink + ?Sized>(&self, sink: &mut W, sector_size: SectorSize) -> Result<()> {
        let mut sector = vec![0u8; sector_size.as_usize()];
        write_bytes(&mut sector, 0, &self.encode());
        sink.write_at(0, &sector)
    }

    /// True when the boot signature is 0x55 0xAA
    pub fn is_valid(&self) -> bool {
        self.boot_signature == Self::BOOT_SIGNATURE
    }

    /// The boot signature as a little-endian word (0xAA55 when valid)
    pub fn boot_signature(&self) -> u16 {
        u16::from_le_bytes(self.boot_signature)
    }

    /// The 32-bit disk signature stored in the bootstrap area
    pub fn disk_signature(&self) -> u32 {
        read_u32_le(&self.bootstrap, Self::DISK_SIGNATURE_OFFSET)
    }

    /// Check if this MBR contains a GPT protective partition
    pub fn is_gpt_protective(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.partition_type == MbrPartitionType::GptProtective)
    }
}

impl ZoneTable for MasterBootRecord {
    fn identify(&self) -> &str {
        "Master Boot Record"
    }

    fn enumerate_zones(&self) -> Vec<Zone> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_empty())
            .map(|(i, e)| {
                let first = e.first_lba as u64;
                Zone::new(
                    i,
                    first,
                    first + e.sector_count as u64 - 1,
                    e.partition_type.name().to_string(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn create_test_mbr() -> Vec<u8> {
        let mut mbr = vec![0u8; 512];

        // Disk signature
        mbr[0x1B8..0x1BC].copy_from_slice(&0x1234_5678u32.to_le_bytes());

        // Partition 1: FAT32 LBA, starts at sector 2048, 100MB
        let p1 = 0x1BE;
        mbr[p1] = 0x80;
        mbr[p1 + 4] = 0x0C;
        mbr[p1 + 8..p1 + 12].copy_from_slice(&2048u32.to_le_bytes());
        mbr[p1 + 12..p1 + 16].copy_from_slice(&204_800u32.to_le_bytes());

        // Partition 3: Linux, leaving entry 2 empty
        let p3 = 0x1DE;
        mbr[p3 + 4] = 0x83;
        mbr[p3 + 8..p3 + 12].copy_from_slice(&206_848u32.to_le_bytes());
        mbr[p3 + 12..p3 + 16].copy_from_slice(&409_600u32.to_le_bytes());

        mbr[510] = 0x55;
        mbr[511] = 0xAA;
        mbr
    }

    #[test]
    fn test_decode() {
        let mbr = MasterBootRecord::decode(&create_test_mbr()).unwrap();

        assert!(mbr.is_valid());
        assert_eq!(mbr.boot_signature(), 0xAA55);
        assert_eq!(mbr.disk_signature(), 0x1234_5678);
        assert!(!mbr.is_gpt_protective());
        assert_eq!(mbr.entries[0].partition_type, MbrPartitionType::Fat32Lba);
        assert!(mbr.entries[0].is_bootable());
        assert!(mbr.entries[1].is_empty());
    }

    #[test]
    fn test_decode_tolerates_bad_signature() {
        let mut bytes = create_test_mbr();
        bytes[510] = 0;
        let mbr = MasterBootRecord::decode(&bytes).unwrap();
        assert!(!mbr.is_valid());
    }

    #[test]
    fn test_decode_truncated() {
        let result = MasterBootRecord::decode(&[0u8; 100]);
        assert!(matches!(
            result,
            Err(Error::Truncated {
                needed: 512,
                available: 100,
                ..
            })
        ));
    }

    #[test]
    fn test_encode_is_byte_exact() {
        let mut bytes = create_test_mbr();
        bytes[0] = 0xFA; // some boot code
        bytes[100] = 0x33;
        let mbr = MasterBootRecord::decode(&bytes).unwrap();
        assert_eq!(mbr.encode().to_vec(), bytes);
    }

    #[test]
    fn test_protective() {
        let mbr = MasterBootRecord::protective(2048);
        let bytes = mbr.encode();

        assert!(mbr.is_valid());
        assert!(mbr.is_gpt_protective());
        assert_eq!(bytes[446 + 4], 0xEE);
        assert_eq!(&bytes[446 + 1..446 + 4], &[0x00, 0x02, 0x00]);
        assert_eq!(&bytes[446 + 8..446 + 12], &1u32.to_le_bytes());
        assert_eq!(&bytes[446 + 12..446 + 16], &2047u32.to_le_bytes());
        assert!(bytes[462..510].iter().all(|&b| b == 0));
        assert_eq!(&bytes[510..], &[0x55, 0xAA]);
    }

    #[test]
    fn test_protective_clamps_large_disks() {
        let mbr = MasterBootRecord::protective(1 << 40);
        assert_eq!(mbr.entries[0].sector_count, 0xFFFF_FFFF);
        assert_eq!(mbr.entries[0].chs_end.to_bytes(), [0xFF, 0xFF, 0xFF]);

        let mbr = MasterBootRecord::protective_for_len(4096 * 100, SectorSize::NATIVE_4K);
        assert_eq!(mbr.entries[0].sector_count, 99);
    }

    #[test]
    fn test_read_write_stream() {
        let mut disk = Cursor::new(vec![0xFFu8; 8192]);
        MasterBootRecord::protective(2)
            .write_to(&mut disk, SectorSize::NATIVE_4K)
            .unwrap();

        let data = disk.get_ref();
        assert!(data[512..4096].iter().all(|&b| b == 0));
        assert_eq!(data[4096], 0xFF);

        let mbr = MasterBootRecord::read_from(&mut disk).unwrap();
        assert_eq!(mbr.entries[0].sector_count, 1);
    }

    #[test]
    fn test_zone_table() {
        let mbr = MasterBootRecord::decode(&create_test_mbr()).unwrap();
        assert_eq!(mbr.identify(), "Master Boot Record");

        let zones = mbr.enumerate_zones();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].first_lba, 2048);
        assert_eq!(zones[0].last_lba, 2048 + 204_800 - 1);
        assert_eq!(zones[0].zone_type, "FAT32 (LBA)");
        assert_eq!(zones[1].index, 2);
        assert_eq!(mbr.get_zone(1).unwrap().zone_type, "Linux");
    }
}

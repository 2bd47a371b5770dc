//! GPT (GUID Partition Table) model and codec

pub mod codec;
pub mod types;

pub use codec::{decode, decode_at, encode, last_lba, write, write_disk, write_encoded, EncodedGpt};

use parttab_core::{Error, Result, SectorSize, Zone, ZoneTable};
use serde::Serialize;
use std::fmt;
use types::{GptHeader, GptPartitionEntry};
use uuid::Uuid;

/// Which of the two on-disk copies of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GptCopy {
    /// Header at LBA 1, array right after it
    Primary,
    /// Header at the last LBA, array right before it
    Secondary,
}

impl GptCopy {
    pub fn name(self) -> &'static str {
        match self {
            GptCopy::Primary => "primary",
            GptCopy::Secondary => "secondary",
        }
    }
}

impl fmt::Display for GptCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GUID Partition Table
///
/// A decoded (or freshly built) table. The model does not depend on which
/// copy it came from: `primary_header_lba` and `secondary_header_lba` always
/// name the primary and secondary header locations, so it can be encoded as
/// either copy.
///
/// # Structure
///
/// ```text
/// LBA 0:      Protective MBR
/// LBA 1:      Primary GPT header
/// LBA 2-33:   Primary partition entries (typically 128 entries x 128 bytes)
/// LBA 34+:    Partitions
/// LBA -33:    Backup partition entries
/// LBA -1:     Backup GPT header
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuidPartitionTable {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub primary_header_lba: u64,
    pub secondary_header_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Uuid,
    /// Array location of the copy this model was decoded from
    pub partition_array_lba: u64,
    pub partition_count: u32,
    pub partition_entry_size: u32,
    /// Header checksum as stored on disk, whether or not it matched
    pub stored_header_crc32: u32,
    /// Array checksum as stored on disk, whether or not it matched
    pub stored_partition_array_crc32: u32,
    /// The header's record of its own LBA, which may disagree with where it was read
    pub stored_header_lba: u64,
    pub header_checksum_valid: bool,
    pub partition_array_checksum_valid: bool,
    /// Copy the model was decoded from
    pub source: GptCopy,
    /// Non-empty entries in slot order
    pub partitions: Vec<GptPartitionEntry>,
}

impl GuidPartitionTable {
    /// Number of entries in a standard partition array
    pub const DEFAULT_PARTITION_COUNT: u32 = 128;

    /// Standard partition entry size
    pub const DEFAULT_ENTRY_SIZE: u32 = 128;

    /// Build an empty table with the standard layout for a medium of `total_sectors`
    ///
    /// The primary array sits at LBA 2 and the backup array directly before the
    /// last LBA. A freshly built table has no stored checksums to disagree
    /// with, so both checksum flags start out true.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the medium cannot hold both
    /// copies and at least one usable sector.
    pub fn new(disk_guid: Uuid, total_sectors: u64, sector_size: SectorSize) -> Result<Self> {
        let array_sectors = sector_size.sectors_for(
            Self::DEFAULT_PARTITION_COUNT as u64 * Self::DEFAULT_ENTRY_SIZE as u64,
        );
        let minimum = 2 * array_sectors + 4;
        if total_sectors < minimum {
            return Err(Error::invalid_operation(format!(
                "a GPT needs at least {} sectors of {} bytes, medium has {}",
                minimum,
                sector_size.get(),
                total_sectors
            )));
        }

        let secondary_header_lba = total_sectors - 1;

        Ok(Self {
            signature: *GptHeader::SIGNATURE,
            revision: GptHeader::REVISION_1_0,
            header_size: GptHeader::HEADER_SIZE as u32,
            primary_header_lba: 1,
            secondary_header_lba,
            first_usable_lba: 2 + array_sectors,
            last_usable_lba: secondary_header_lba - array_sectors - 1,
            disk_guid,
            partition_array_lba: 2,
            partition_count: Self::DEFAULT_PARTITION_COUNT,
            partition_entry_size: Self::DEFAULT_ENTRY_SIZE,
            stored_header_crc32: 0,
            stored_partition_array_crc32: 0,
            stored_header_lba: 1,
            header_checksum_valid: true,
            partition_array_checksum_valid: true,
            source: GptCopy::Primary,
            partitions: Vec::new(),
        })
    }

    /// Get the partition entries
    pub fn partitions(&self) -> &[GptPartitionEntry] {
        &self.partitions
    }

    /// Check the header signature is "EFI PART"
    pub fn has_valid_signature(&self) -> bool {
        &self.signature == GptHeader::SIGNATURE
    }

    /// Both checksums matched when this copy was decoded
    pub fn is_consistent(&self) -> bool {
        self.header_checksum_valid && self.partition_array_checksum_valid
    }

    /// Size of the partition entry array in bytes
    pub fn partition_array_len(&self) -> u64 {
        self.partition_count as u64 * self.partition_entry_size as u64
    }

    /// Number of sectors the partition entry array occupies
    pub fn partition_array_sectors(&self, sector_size: SectorSize) -> u64 {
        sector_size.sectors_for(self.partition_array_len())
    }

    /// Add a partition
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for an unused type GUID, a range
    /// outside the usable area, an overlap with an existing partition, a
    /// duplicate unique GUID, a taken slot, or a full array.
    pub fn add_partition(&mut self, entry: GptPartitionEntry) -> Result<()> {
        if entry.is_unused() {
            return Err(Error::invalid_operation(
                "partition type GUID must not be all zero",
            ));
        }

        if entry.first_lba > entry.last_lba
            || entry.first_lba < self.first_usable_lba
            || entry.last_lba > self.last_usable_lba
        {
            return Err(Error::invalid_operation(format!(
                "partition LBA {}..={} is outside the usable range {}..={}",
                entry.first_lba, entry.last_lba, self.first_usable_lba, self.last_usable_lba
            )));
        }

        if let Some(existing) = self.partitions.iter().find(|p| p.overlaps(&entry)) {
            return Err(Error::invalid_operation(format!(
                "partition LBA {}..={} overlaps \"{}\" at {}..={}",
                entry.first_lba, entry.last_lba, existing.name, existing.first_lba, existing.last_lba
            )));
        }

        if self
            .partitions
            .iter()
            .any(|p| p.unique_guid == entry.unique_guid)
        {
            return Err(Error::invalid_operation(format!(
                "unique partition GUID {} is already in use",
                entry.unique_guid
            )));
        }

        if self.partitions.len() >= self.partition_count as usize {
            return Err(Error::invalid_operation(format!(
                "partition array is full ({} entries)",
                self.partition_count
            )));
        }

        if let Some(slot) = entry.slot {
            if slot >= self.partition_count || self.partitions.iter().any(|p| p.slot == Some(slot)) {
                return Err(Error::invalid_operation(format!(
                    "slot {} is not available",
                    slot
                )));
            }
        }

        self.partitions.push(entry);
        Ok(())
    }

    /// Remove the partition with the given unique GUID
    pub fn remove_partition(&mut self, unique_guid: Uuid) -> Option<GptPartitionEntry> {
        let index = self
            .partitions
            .iter()
            .position(|p| p.unique_guid == unique_guid)?;
        Some(self.partitions.remove(index))
    }

    /// Describe every layout invariant this table violates
    ///
    /// An empty list means the table is well-formed for a medium whose last
    /// LBA is `secondary_header_lba`.
    pub fn layout_problems(&self, sector_size: SectorSize) -> Vec<String> {
        let mut problems = Vec::new();
        let array_sectors = self.partition_array_sectors(sector_size);

        if !self.has_valid_signature() {
            problems.push("header signature is not \"EFI PART\"".to_string());
        }

        let read_from = match self.source {
            GptCopy::Primary => self.primary_header_lba,
            GptCopy::Secondary => self.secondary_header_lba,
        };
        if self.stored_header_lba != read_from {
            problems.push(format!(
                "{} header at LBA {} records its own location as LBA {}",
                self.source, read_from, self.stored_header_lba
            ));
        }

        if self.primary_header_lba != 1 {
            problems.push(format!(
                "primary header at LBA {}, expected 1",
                self.primary_header_lba
            ));
        }

        if self.secondary_header_lba <= self.primary_header_lba {
            problems.push(format!(
                "secondary header LBA {} is not after the primary header",
                self.secondary_header_lba
            ));
        }

        let primary_array_end = self.primary_header_lba.saturating_add(1 + array_sectors);
        if self.first_usable_lba < primary_array_end {
            problems.push(format!(
                "first usable LBA {} is inside the primary partition array (ends before {})",
                self.first_usable_lba, primary_array_end
            ));
        }

        let backup_array_start = self.secondary_header_lba.saturating_sub(array_sectors);
        if self.last_usable_lba >= backup_array_start {
            problems.push(format!(
                "last usable LBA {} reaches the backup partition array (starts at {})",
                self.last_usable_lba, backup_array_start
            ));
        }

        if self.first_usable_lba > self.last_usable_lba {
            problems.push(format!(
                "first usable LBA {} is after last usable LBA {}",
                self.first_usable_lba, self.last_usable_lba
            ));
        }

        if self.partitions.len() > self.partition_count as usize {
            problems.push(format!(
                "{} partitions do not fit in {} slots",
                self.partitions.len(),
                self.partition_count
            ));
        }

        for (i, p) in self.partitions.iter().enumerate() {
            if p.first_lba > p.last_lba {
                problems.push(format!(
                    "partition \"{}\" ends (LBA {}) before it starts (LBA {})",
                    p.name, p.last_lba, p.first_lba
                ));
            } else if p.first_lba < self.first_usable_lba || p.last_lba > self.last_usable_lba {
                problems.push(format!(
                    "partition \"{}\" at LBA {}..={} is outside the usable range",
                    p.name, p.first_lba, p.last_lba
                ));
            }

            for other in &self.partitions[i + 1..] {
                if p.overlaps(other) {
                    problems.push(format!(
                        "partitions \"{}\" and \"{}\" overlap",
                        p.name, other.name
                    ));
                }
            }
        }

        problems
    }

    /// True when `other` describes the same disk layout
    ///
    /// Compares the disk GUID, the mirrored header locations, the usable
    /// range, the array geometry and the partition list. Checksums and array
    /// locations differ between copies and are ignored.
    pub fn mirrors(&self, other: &Self) -> bool {
        self.disk_guid == other.disk_guid
            && self.primary_header_lba == other.primary_header_lba
            && self.secondary_header_lba == other.secondary_header_lba
            && self.first_usable_lba == other.first_usable_lba
            && self.last_usable_lba == other.last_usable_lba
            && self.partition_count == other.partition_count
            && self.partition_entry_size == other.partition_entry_size
            && self.partitions == other.partitions
    }
}

impl ZoneTable for GuidPartitionTable {
    fn identify(&self) -> &str {
        "GUID Partition Table"
    }

    fn enumerate_zones(&self) -> Vec<Zone> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let index = p.slot.map(|s| s as usize).unwrap_or(i);
                let zone = Zone::new(
                    index,
                    p.first_lba,
                    p.last_lba,
                    p.partition_type.name().to_string(),
                );
                if p.name.is_empty() {
                    zone
                } else {
                    zone.with_label(p.name.clone())
                }
            })
            .collect()
    }
}

//! GPT encode/decode against byte sources and sinks
//!
//! Decoding is read-only and never repairs: checksum mismatches are reported
//! through the flags on [`GuidPartitionTable`]. Encoding always recomputes
//! both checksums, so its output is self-consistent whatever the model's flags say.

use super::types::{GptHeader, GptPartitionEntry};
use super::{GptCopy, GuidPartitionTable};
use crate::crc::crc32;
use crate::layout::write_u32_le;
use crate::mbr::MasterBootRecord;
use parttab_core::{
    checked_sub_u64, partition_array_size, ByteSink, ByteSource, Error, Result, SectorSize,
};

/// Last LBA of `source`, where the secondary header lives
///
/// # Errors
///
/// Returns [`Error::Truncated`] if the source holds fewer than two sectors.
pub fn last_lba<S: ByteSource + ?Sized>(source: &mut S, sector_size: SectorSize) -> Result<u64> {
    let len = source.byte_len()?;
    let sectors = sector_size.sector_count(len);
    if sectors < 2 {
        return Err(Error::truncated(
            "secondary GPT header",
            2 * sector_size.bytes(),
            len,
        ));
    }
    Ok(sectors - 1)
}

/// Decode one copy of the GPT
///
/// The primary header is read from LBA 1, the secondary from the last LBA of
/// the source.
///
/// # Errors
///
/// - [`Error::Truncated`] if the header or array lies past the end of the source
/// - [`Error::InvalidSignature`] if the header signature is not "EFI PART"
/// - [`Error::InvalidZoneTable`] for an impossible header size, entry size or array size
pub fn decode<S: ByteSource + ?Sized>(
    source: &mut S,
    copy: GptCopy,
    sector_size: SectorSize,
) -> Result<GuidPartitionTable> {
    let header_lba = match copy {
        GptCopy::Primary => 1,
        GptCopy::Secondary => last_lba(source, sector_size)?,
    };
    decode_at(source, header_lba, copy, sector_size)
}

/// Decode a GPT copy whose header sits at `header_lba`
pub fn decode_at<S: ByteSource + ?Sized>(
    source: &mut S,
    header_lba: u64,
    copy: GptCopy,
    sector_size: SectorSize,
) -> Result<GuidPartitionTable> {
    let mut sector = vec![0u8; sector_size.as_usize()];
    source.read_at(sector_size.offset_of(header_lba)?, &mut sector)?;

    let header = GptHeader::from_bytes(&sector)?;

    if (header.header_size as usize) < GptHeader::HEADER_SIZE
        || header.header_size > sector_size.get()
    {
        return Err(Error::invalid_zone_table(format!(
            "{} GPT header size {} is outside {}..={}",
            copy,
            header.header_size,
            GptHeader::HEADER_SIZE,
            sector_size.get()
        )));
    }

    if (header.partition_entry_size as usize) < GptPartitionEntry::ENTRY_SIZE
        || header.partition_entry_size % 8 != 0
    {
        return Err(Error::invalid_zone_table(format!(
            "{} GPT partition entry size {} must be a multiple of 8 and at least {}",
            copy,
            header.partition_entry_size,
            GptPartitionEntry::ENTRY_SIZE
        )));
    }

    let header_checksum_valid = header.verify_header_crc32(&sector);
    if !header_checksum_valid {
        tracing::warn!(
            "{} GPT header at LBA {}: stored CRC32 0x{:08X} does not match 0x{:08X}",
            copy,
            header_lba,
            header.header_crc32,
            header.compute_header_crc32(&sector)
        );
    }

    let array_len = partition_array_size(header.num_partition_entries, header.partition_entry_size)?;
    let mut array = vec![0u8; array_len];
    source.read_at(sector_size.offset_of(header.partition_entries_lba)?, &mut array)?;

    let partition_array_checksum_valid = header.verify_partition_entries_crc32(&array);
    if !partition_array_checksum_valid {
        tracing::warn!(
            "{} GPT partition array at LBA {}: stored CRC32 0x{:08X} does not match 0x{:08X}",
            copy,
            header.partition_entries_lba,
            header.partition_entries_crc32,
            crc32(&array)
        );
    }

    let partitions: Vec<GptPartitionEntry> = array
        .chunks_exact(header.partition_entry_size as usize)
        .enumerate()
        .map(|(slot, raw)| GptPartitionEntry::from_bytes(raw, Some(slot as u32)))
        .filter(|entry| !entry.is_unused())
        .collect();

    // The copy's own location is where it was read, not what it claims
    let (primary_header_lba, secondary_header_lba) = match copy {
        GptCopy::Primary => (header_lba, header.backup_lba),
        GptCopy::Secondary => (header.backup_lba, header_lba),
    };
    if header.current_lba != header_lba {
        tracing::warn!(
            "{} GPT header at LBA {} records its own location as LBA {}",
            copy,
            header_lba,
            header.current_lba
        );
    }

    tracing::debug!(
        "Decoded {} GPT at LBA {}: {} partitions in {} slots, disk {}",
        copy,
        header_lba,
        partitions.len(),
        header.num_partition_entries,
        header.disk_guid
    );

    Ok(GuidPartitionTable {
        signature: header.signature,
        revision: header.revision,
        header_size: header.header_size,
        primary_header_lba,
        secondary_header_lba,
        first_usable_lba: header.first_usable_lba,
        last_usable_lba: header.last_usable_lba,
        disk_guid: header.disk_guid,
        partition_array_lba: header.partition_entries_lba,
        partition_count: header.num_partition_entries,
        partition_entry_size: header.partition_entry_size,
        stored_header_crc32: header.header_crc32,
        stored_partition_array_crc32: header.partition_entries_crc32,
        stored_header_lba: header.current_lba,
        header_checksum_valid,
        partition_array_checksum_valid,
        source: copy,
        partitions,
    })
}

/// One copy of the GPT, encoded and ready to write
#[derive(Debug, Clone)]
pub struct EncodedGpt {
    pub copy: GptCopy,
    pub header_lba: u64,
    /// Header sector, zero-padded to the sector size
    pub header: Vec<u8>,
    pub partition_array_lba: u64,
    /// Partition array, zero-padded to whole sectors
    pub partition_array: Vec<u8>,
    pub header_crc32: u32,
    pub partition_array_crc32: u32,
}

/// Assign every partition a slot
///
/// Entries go back into the slot they were decoded from when it is free.
/// The rest fill the lowest free slots in order. The array grows when the
/// partitions outnumber `count`.
fn place_entries(partitions: &[GptPartitionEntry], count: u32) -> Vec<Option<&GptPartitionEntry>> {
    let len = (count as usize).max(partitions.len());
    let mut slots: Vec<Option<&GptPartitionEntry>> = vec![None; len];
    let mut unplaced = Vec::new();

    for entry in partitions {
        match entry.slot.map(|s| s as usize) {
            Some(slot) if slot < len && slots[slot].is_none() => slots[slot] = Some(entry),
            _ => unplaced.push(entry),
        }
    }

    let mut free = 0;
    for entry in unplaced {
        while slots[free].is_some() {
            free += 1;
        }
        slots[free] = Some(entry);
    }

    slots
}

/// Encode one copy of `table`
///
/// The primary array is placed at the model's `partition_array_lba` when the
/// model came from the primary copy and right after the primary header
/// otherwise. The secondary array always ends right before the secondary header.
///
/// # Errors
///
/// Returns [`Error::InvalidZoneTable`] for an entry size below 128 bytes or
/// not a multiple of 8, an array over the allocation limit, or a secondary
/// header too close to the start of the disk to fit the array.
pub fn encode(
    table: &GuidPartitionTable,
    copy: GptCopy,
    sector_size: SectorSize,
) -> Result<EncodedGpt> {
    let entry_size = table.partition_entry_size as usize;
    if entry_size < GptPartitionEntry::ENTRY_SIZE || entry_size % 8 != 0 {
        return Err(Error::invalid_zone_table(format!(
            "partition entry size {} must be a multiple of 8 and at least {}",
            entry_size,
            GptPartitionEntry::ENTRY_SIZE
        )));
    }

    let header_size = if (GptHeader::HEADER_SIZE as u32..=sector_size.get()).contains(&table.header_size) {
        table.header_size
    } else {
        GptHeader::HEADER_SIZE as u32
    };

    let count = table
        .partition_count
        .max(u32::try_from(table.partitions.len()).unwrap_or(u32::MAX));
    let array_len = partition_array_size(count, table.partition_entry_size)?;
    let slots = place_entries(&table.partitions, count);
    let array_sectors = sector_size.sectors_for(array_len as u64);

    let mut partition_array = vec![0u8; array_sectors as usize * sector_size.as_usize()];
    for (slot, entry) in slots.iter().enumerate() {
        if let Some(entry) = entry {
            entry.write_into(&mut partition_array[slot * entry_size..(slot + 1) * entry_size]);
        }
    }
    let partition_array_crc32 = crc32(&partition_array[..array_len]);

    let (header_lba, backup_lba, partition_array_lba) = match copy {
        GptCopy::Primary => {
            let array_lba = if table.source == GptCopy::Primary {
                table.partition_array_lba
            } else {
                table.primary_header_lba + 1
            };
            (table.primary_header_lba, table.secondary_header_lba, array_lba)
        }
        GptCopy::Secondary => (
            table.secondary_header_lba,
            table.primary_header_lba,
            checked_sub_u64(
                table.secondary_header_lba,
                array_sectors,
                "secondary partition array LBA",
            )?,
        ),
    };

    let header = GptHeader {
        signature: *GptHeader::SIGNATURE,
        revision: table.revision,
        header_size,
        header_crc32: 0,
        reserved: 0,
        current_lba: header_lba,
        backup_lba,
        first_usable_lba: table.first_usable_lba,
        last_usable_lba: table.last_usable_lba,
        disk_guid: table.disk_guid,
        partition_entries_lba: partition_array_lba,
        num_partition_entries: count,
        partition_entry_size: table.partition_entry_size,
        partition_entries_crc32: partition_array_crc32,
    };

    let mut raw = header.to_bytes(sector_size);
    let header_crc32 = header.compute_header_crc32(&raw);
    write_u32_le(&mut raw, 16, header_crc32);

    Ok(EncodedGpt {
        copy,
        header_lba,
        header: raw,
        partition_array_lba,
        partition_array,
        header_crc32,
        partition_array_crc32,
    })
}

impl EncodedGpt {
    /// Last LBA the header or the array occupies
    pub fn end_lba(&self, sector_size: SectorSize) -> u64 {
        let array_sectors = self.partition_array.len() as u64 / sector_size.bytes();
        let array_end = self
            .partition_array_lba
            .saturating_add(array_sectors.saturating_sub(1));
        self.header_lba.max(array_end)
    }

    /// Why this copy cannot be written to a medium of `total_sectors`, if it cannot
    ///
    /// Both regions must lie inside the medium, outside the usable range of
    /// `table`, and apart from each other.
    pub fn placement_problem(
        &self,
        table: &GuidPartitionTable,
        total_sectors: u64,
        sector_size: SectorSize,
    ) -> Option<String> {
        let array_sectors = self.partition_array.len() as u64 / sector_size.bytes();
        let array = self.partition_array_lba..self.partition_array_lba.saturating_add(array_sectors);
        let usable = table.first_usable_lba..table.last_usable_lba.saturating_add(1);
        let overlaps = |r: &std::ops::Range<u64>| r.start < usable.end && usable.start < r.end;

        if self.header_lba == 0 || self.end_lba(sector_size) >= total_sectors {
            Some(format!(
                "{} GPT at LBA {}..={} does not fit a medium of {} sectors",
                self.copy,
                self.header_lba.min(self.partition_array_lba),
                self.end_lba(sector_size),
                total_sectors
            ))
        } else if array.contains(&self.header_lba) {
            Some(format!(
                "{} GPT header at LBA {} lies inside its own partition array",
                self.copy, self.header_lba
            ))
        } else if overlaps(&(self.header_lba..self.header_lba + 1)) || overlaps(&array) {
            Some(format!(
                "{} GPT at LBA {} (array at LBA {}) overlaps the usable range {}..={}",
                self.copy,
                self.header_lba,
                self.partition_array_lba,
                table.first_usable_lba,
                table.last_usable_lba
            ))
        } else {
            None
        }
    }
}

/// Encode one copy and write it: the array first, then the header
pub fn write<W: ByteSink + ?Sized>(
    sink: &mut W,
    table: &GuidPartitionTable,
    copy: GptCopy,
    sector_size: SectorSize,
) -> Result<EncodedGpt> {
    let encoded = encode(table, copy, sector_size)?;
    write_encoded(sink, &encoded, sector_size)?;
    Ok(encoded)
}

/// Write an already encoded copy: the array first, then the header
pub fn write_encoded<W: ByteSink + ?Sized>(
    sink: &mut W,
    encoded: &EncodedGpt,
    sector_size: SectorSize,
) -> Result<()> {
    sink.write_at(
        sector_size.offset_of(encoded.partition_array_lba)?,
        &encoded.partition_array,
    )?;
    sink.write_at(sector_size.offset_of(encoded.header_lba)?, &encoded.header)?;

    tracing::debug!(
        "Wrote {} GPT: header LBA {} (CRC32 0x{:08X}), array LBA {} (CRC32 0x{:08X})",
        encoded.copy,
        encoded.header_lba,
        encoded.header_crc32,
        encoded.partition_array_lba,
        encoded.partition_array_crc32
    );

    Ok(())
}

/// Write a complete GPT disk layout: protective MBR, primary copy, secondary copy
pub fn write_disk<W: ByteSink + ?Sized>(
    sink: &mut W,
    table: &GuidPartitionTable,
    sector_size: SectorSize,
) -> Result<()> {
    MasterBootRecord::protective(table.secondary_header_lba + 1).write_to(sink, sector_size)?;
    write(sink, table, GptCopy::Primary, sector_size)?;
    write(sink, table, GptCopy::Secondary, sector_size)?;
    sink.sync()?;

    tracing::info!(
        "Wrote GPT disk {} with {} partitions",
        table.disk_guid,
        table.partitions.len()
    );
    Ok(())
}

//! GPT checksum repair
//!
//! Reads both copies of a GPT, rewrites the requested copies with fresh
//! checksums at their own on-disk locations, then reads them back.

use crate::report::{CopyReport, RepairReport};
use parttab_core::{ByteSink, ByteSource, Error, Result, SectorSize};
use parttab_zones::gpt::{self, GptCopy, GuidPartitionTable};

/// Options for a repair run
#[derive(Debug, Clone)]
pub struct MenderConfig {
    /// Sector size of the target
    pub sector_size: SectorSize,
    /// Rewrite the primary copy
    pub repair_primary: bool,
    /// Rewrite the secondary copy
    pub repair_secondary: bool,
    /// Re-read every written copy and check its checksums
    pub verify: bool,
    /// Leave copies whose checksums are already valid untouched
    pub only_when_invalid: bool,
}

impl Default for MenderConfig {
    fn default() -> Self {
        Self {
            sector_size: SectorSize::default(),
            repair_primary: true,
            repair_secondary: true,
            verify: true,
            only_when_invalid: false,
        }
    }
}

impl MenderConfig {
    pub fn with_sector_size(mut self, sector_size: SectorSize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Choose which copies get rewritten
    pub fn with_copies(mut self, primary: bool, secondary: bool) -> Self {
        self.repair_primary = primary;
        self.repair_secondary = secondary;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_only_when_invalid(mut self, only_when_invalid: bool) -> Self {
        self.only_when_invalid = only_when_invalid;
        self
    }

    /// Whether `copy` is selected for repair
    pub fn repairs(&self, copy: GptCopy) -> bool {
        match copy {
            GptCopy::Primary => self.repair_primary,
            GptCopy::Secondary => self.repair_secondary,
        }
    }
}

/// GPT consistency engine
///
/// Each copy is authoritative for its own content: a copy is rewritten from
/// its own decoded model unless the caller hands in a replacement model.
/// Divergent copies are reported, never merged.
///
/// # Example
///
/// ```rust
/// use parttab_core::SectorSize;
/// use parttab_mender::{GptMender, MenderConfig};
/// use parttab_zones::gpt::{self, GuidPartitionTable};
/// use std::io::Cursor;
/// use uuid::Uuid;
///
/// let ss = SectorSize::default();
/// let table = GuidPartitionTable::new(Uuid::new_v4(), 2048, ss).unwrap();
/// let mut disk = Cursor::new(vec![0u8; 2048 * 512]);
/// gpt::write_disk(&mut disk, &table, ss).unwrap();
///
/// // Damage the primary header checksum
/// disk.get_mut()[512 + 16] ^= 0xFF;
///
/// let report = GptMender::new(MenderConfig::default()).repair(&mut disk).unwrap();
/// assert!(report.primary.repaired);
/// assert!(report.is_fully_consistent());
/// ```
pub struct GptMender {
    config: MenderConfig,
}

impl GptMender {
    /// Create an engine with the given options
    pub fn new(config: MenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MenderConfig {
        &self.config
    }

    /// Decode both copies independently
    ///
    /// The failure of one copy does not affect the other.
    pub fn read_copies<S: ByteSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> (Result<GuidPartitionTable>, Result<GuidPartitionTable>) {
        let ss = self.config.sector_size;
        let primary = gpt::decode(source, GptCopy::Primary, ss);
        let secondary = gpt::decode(source, GptCopy::Secondary, ss);

        for (copy, result) in [(GptCopy::Primary, &primary), (GptCopy::Secondary, &secondary)] {
            match result {
                Ok(table) => tracing::info!(
                    "{} GPT: header checksum {}, partition array checksum {}",
                    copy,
                    validity(table.header_checksum_valid),
                    validity(table.partition_array_checksum_valid)
                ),
                Err(e) => tracing::warn!("{} GPT unreadable: {}", copy, e),
            }
        }

        (primary, secondary)
    }

    /// Report the state of both copies without writing anything
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoValidTable`] if neither copy decodes.
    pub fn inspect<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<RepairReport> {
        let (primary, secondary) = self.read_copies(source);
        self.report_for(&primary, &secondary)
    }

    /// Build the report for copies already decoded with [`GptMender::read_copies`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoValidTable`] if neither copy decoded.
    pub fn report_for(
        &self,
        primary: &Result<GuidPartitionTable>,
        secondary: &Result<GuidPartitionTable>,
    ) -> Result<RepairReport> {
        ensure_any_readable(primary, secondary)?;

        let ss = self.config.sector_size;
        Ok(RepairReport {
            primary: CopyReport::from_read(GptCopy::Primary, primary, problems(primary, ss)),
            secondary: CopyReport::from_read(GptCopy::Secondary, secondary, problems(secondary, ss)),
            copies_agree: agreement(primary.as_ref().ok(), secondary.as_ref().ok()),
        })
    }

    /// Rewrite the configured copies from their own decoded content
    pub fn repair<T: ByteSource + ByteSink + ?Sized>(&self, target: &mut T) -> Result<RepairReport> {
        self.repair_with(target, None, None)
    }

    /// Rewrite the configured copies, optionally from caller-supplied models
    ///
    /// A supplied model replaces the decoded content of that copy, which is
    /// how a destroyed copy is rebuilt from the surviving one. Headers always
    /// go to LBA 1 and the last LBA of the target, whatever the model's
    /// header LBAs say. A copy that would land outside the medium or on the
    /// usable range, or whose write fails, is recorded in its
    /// [`CopyReport::write_error`] and the other copy is still processed.
    ///
    /// # Errors
    ///
    /// - [`Error::NoValidTable`] if neither copy decodes
    /// - [`Error::InternalRoundTrip`] if a written copy does not read back checksum-valid
    pub fn repair_with<T: ByteSource + ByteSink + ?Sized>(
        &self,
        target: &mut T,
        primary_model: Option<GuidPartitionTable>,
        secondary_model: Option<GuidPartitionTable>,
    ) -> Result<RepairReport> {
        let ss = self.config.sector_size;
        let (primary, secondary) = self.read_copies(target);
        let mut report = self.report_for(&primary, &secondary)?;

        let last = gpt::last_lba(target, ss)?;
        let mut finals = [primary.ok(), secondary.ok()];
        let supplied = [primary_model, secondary_model];

        for (i, (copy, model)) in [GptCopy::Primary, GptCopy::Secondary]
            .into_iter()
            .zip(supplied)
            .enumerate()
        {
            let copy_report = match copy {
                GptCopy::Primary => &mut report.primary,
                GptCopy::Secondary => &mut report.secondary,
            };
            copy_report.requested = self.config.repairs(copy);
            if !copy_report.requested {
                continue;
            }

            if model.is_none() && self.config.only_when_invalid && copy_report.was_consistent() {
                tracing::info!("{} GPT already consistent, leaving it untouched", copy);
                continue;
            }

            let Some(mut model) = model.or_else(|| finals[i].clone()) else {
                tracing::warn!("{} GPT has no readable content to rewrite, skipping", copy);
                continue;
            };

            if (model.primary_header_lba, model.secondary_header_lba) != (1, last) {
                tracing::warn!(
                    "{} GPT model places headers at LBA {} and {}, using 1 and {}",
                    copy,
                    model.primary_header_lba,
                    model.secondary_header_lba,
                    last
                );
                model.primary_header_lba = 1;
                model.secondary_header_lba = last;
            }

            let written = gpt::encode(&model, copy, ss).and_then(|encoded| {
                if let Some(problem) = encoded.placement_problem(&model, last + 1, ss) {
                    return Err(Error::invalid_operation(problem));
                }
                gpt::write_encoded(target, &encoded, ss)?;
                Ok(encoded)
            });
            let encoded = match written {
                Ok(encoded) => encoded,
                Err(e) => {
                    tracing::warn!("{} GPT not written: {}", copy, e);
                    copy_report.write_error = Some(e.to_string());
                    continue;
                }
            };

            copy_report.repaired = true;
            copy_report.header_lba = Some(encoded.header_lba);
            copy_report.written_header_crc32 = Some(encoded.header_crc32);
            copy_report.written_partition_array_crc32 = Some(encoded.partition_array_crc32);

            tracing::info!(
                "Rewrote {} GPT at LBA {}: header CRC32 0x{:08X}, partition array CRC32 0x{:08X}",
                copy,
                encoded.header_lba,
                encoded.header_crc32,
                encoded.partition_array_crc32
            );

            finals[i] = if self.config.verify {
                let reread = gpt::decode_at(target, encoded.header_lba, copy, ss).map_err(|e| {
                    Error::internal_round_trip(format!("{} GPT did not read back: {}", copy, e))
                })?;

                if !reread.is_consistent()
                    || reread.stored_header_crc32 != encoded.header_crc32
                    || reread.stored_partition_array_crc32 != encoded.partition_array_crc32
                {
                    copy_report.verified = Some(false);
                    return Err(Error::internal_round_trip(format!(
                        "{} GPT read back with header checksum {} and partition array checksum {}",
                        copy,
                        validity(reread.header_checksum_valid),
                        validity(reread.partition_array_checksum_valid)
                    )));
                }

                copy_report.verified = Some(true);
                tracing::debug!("{} GPT verified", copy);
                Some(reread)
            } else {
                Some(model)
            };
        }

        if report.any_repaired() {
            if let Err(e) = target.sync() {
                tracing::warn!("Sync after repair failed: {}", e);
                for copy_report in [&mut report.primary, &mut report.secondary] {
                    if copy_report.repaired {
                        copy_report.write_error = Some(format!("sync failed: {}", e));
                    }
                }
            }
        }

        report.copies_agree = agreement(finals[0].as_ref(), finals[1].as_ref());
        if report.copies_agree == Some(false) {
            tracing::warn!("Primary and secondary GPT describe different layouts");
        }

        Ok(report)
    }
}

fn validity(valid: bool) -> &'static str {
    if valid {
        "valid"
    } else {
        "INVALID"
    }
}

fn ensure_any_readable(
    primary: &Result<GuidPartitionTable>,
    secondary: &Result<GuidPartitionTable>,
) -> Result<()> {
    match (primary, secondary) {
        (Err(p), Err(s)) => Err(Error::no_valid_table(format!(
            "primary: {}; secondary: {}",
            p, s
        ))),
        _ => Ok(()),
    }
}

fn problems(result: &Result<GuidPartitionTable>, sector_size: SectorSize) -> Vec<String> {
    result
        .as_ref()
        .map(|table| table.layout_problems(sector_size))
        .unwrap_or_default()
}

fn agreement(primary: Option<&GuidPartitionTable>, secondary: Option<&GuidPartitionTable>) -> Option<bool> {
    Some(primary?.mirrors(secondary?))
}

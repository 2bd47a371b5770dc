//! Per-copy outcome of an inspection or repair

use parttab_core::Result;
use parttab_zones::{GptCopy, GuidPartitionTable};
use serde::Serialize;
use uuid::Uuid;

/// What happened to one GPT copy
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub copy: GptCopy,
    /// The copy decoded successfully
    pub read: bool,
    /// Why decoding failed
    pub read_error: Option<String>,
    /// Header checksum state as found, before any repair
    pub header_checksum_valid: bool,
    /// Partition array checksum state as found, before any repair
    pub partition_array_checksum_valid: bool,
    pub disk_guid: Option<Uuid>,
    /// Number of non-empty partition entries
    pub partitions: usize,
    /// Layout invariants the decoded copy violates
    pub layout_problems: Vec<String>,
    /// Repair of this copy was requested
    pub requested: bool,
    /// The copy was re-encoded and written
    pub repaired: bool,
    /// Outcome of re-reading the written copy, if verification ran
    pub verified: Option<bool>,
    /// Why the copy could not be written
    pub write_error: Option<String>,
    /// Where the header was written
    pub header_lba: Option<u64>,
    pub written_header_crc32: Option<u32>,
    pub written_partition_array_crc32: Option<u32>,
}

impl CopyReport {
    /// Report for a decode attempt, before any repair
    pub(crate) fn from_read(copy: GptCopy, result: &Result<GuidPartitionTable>, problems: Vec<String>) -> Self {
        let mut report = Self {
            copy,
            read: false,
            read_error: None,
            header_checksum_valid: false,
            partition_array_checksum_valid: false,
            disk_guid: None,
            partitions: 0,
            layout_problems: problems,
            requested: false,
            repaired: false,
            verified: None,
            write_error: None,
            header_lba: None,
            written_header_crc32: None,
            written_partition_array_crc32: None,
        };

        match result {
            Ok(table) => {
                report.read = true;
                report.header_checksum_valid = table.header_checksum_valid;
                report.partition_array_checksum_valid = table.partition_array_checksum_valid;
                report.disk_guid = Some(table.disk_guid);
                report.partitions = table.partitions.len();
            }
            Err(e) => report.read_error = Some(e.to_string()),
        }

        report
    }

    /// Both checksums were valid when the copy was read
    pub fn was_consistent(&self) -> bool {
        self.read && self.header_checksum_valid && self.partition_array_checksum_valid
    }

    /// The copy on the target is checksum-valid now
    ///
    /// A repaired copy counts as valid unless verification ran and failed.
    /// A copy whose write failed may be torn and never counts as valid.
    pub fn is_consistent(&self) -> bool {
        if self.write_error.is_some() {
            false
        } else if self.repaired {
            self.verified != Some(false)
        } else {
            self.was_consistent()
        }
    }
}

/// Outcome of [`crate::GptMender::inspect`] or [`crate::GptMender::repair`]
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub primary: CopyReport,
    pub secondary: CopyReport,
    pub(crate) copies_agree: Option<bool>,
}

impl RepairReport {
    /// Whether the two copies describe the same layout
    ///
    /// `None` when either copy is unavailable. Content is only compared,
    /// never reconciled.
    pub fn copies_agree(&self) -> Option<bool> {
        self.copies_agree
    }

    /// Report for one copy
    pub fn copy(&self, copy: GptCopy) -> &CopyReport {
        match copy {
            GptCopy::Primary => &self.primary,
            GptCopy::Secondary => &self.secondary,
        }
    }

    /// Any copy was written
    pub fn any_repaired(&self) -> bool {
        self.primary.repaired || self.secondary.repaired
    }

    /// Both copies are checksum-valid and agree with each other
    pub fn is_fully_consistent(&self) -> bool {
        self.primary.is_consistent()
            && self.secondary.is_consistent()
            && self.copies_agree == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parttab_core::{Error, SectorSize};

    fn table() -> GuidPartitionTable {
        GuidPartitionTable::new(Uuid::from_u128(3), 2048, SectorSize::LOGICAL_512).unwrap()
    }

    #[test]
    fn test_from_read_ok() {
        let mut t = table();
        t.partition_array_checksum_valid = false;
        let report = CopyReport::from_read(GptCopy::Primary, &Ok(t), Vec::new());

        assert!(report.read);
        assert!(report.header_checksum_valid);
        assert!(!report.partition_array_checksum_valid);
        assert!(!report.was_consistent());
        assert_eq!(report.disk_guid, Some(Uuid::from_u128(3)));
    }

    #[test]
    fn test_from_read_error() {
        let result = Err(Error::invalid_signature("bad"));
        let report = CopyReport::from_read(GptCopy::Secondary, &result, Vec::new());

        assert!(!report.read);
        assert!(report.read_error.unwrap().contains("bad"));
    }

    #[test]
    fn test_consistency_after_repair() {
        let mut report = CopyReport::from_read(GptCopy::Primary, &Err(Error::no_valid_table("x")), Vec::new());
        assert!(!report.is_consistent());

        report.repaired = true;
        report.verified = Some(true);
        assert!(report.is_consistent());

        report.verified = Some(false);
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_write_error_is_never_consistent() {
        let mut report = CopyReport::from_read(GptCopy::Secondary, &Ok(table()), Vec::new());
        assert!(report.is_consistent());

        report.write_error = Some("disk full".to_string());
        assert!(report.was_consistent());
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_fully_consistent_needs_agreement() {
        let ok = CopyReport::from_read(GptCopy::Primary, &Ok(table()), Vec::new());
        let mut report = RepairReport {
            primary: ok.clone(),
            secondary: CopyReport {
                copy: GptCopy::Secondary,
                ..ok
            },
            copies_agree: Some(true),
        };
        assert!(report.is_fully_consistent());
        assert!(!report.any_repaired());
        assert_eq!(report.copy(GptCopy::Secondary).copy, GptCopy::Secondary);

        report.copies_agree = Some(false);
        assert!(!report.is_fully_consistent());
    }
}

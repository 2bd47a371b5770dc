//! parttab CLI
//!
//! Inspects, repairs and creates MBR/GPT partition tables in disk image files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parttab_core::{ByteSource, SectorSize, ZoneTable};
use parttab_mender::{CopyReport, GptMender, MenderConfig, RepairReport};
use parttab_pipeline::{open_read_only, DiskImage, ImageConfig};
use parttab_zones::gpt::{self, GptCopy, GuidPartitionTable};
use parttab_zones::{detect, MasterBootRecord, PartitionScheme};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "parttab")]
#[command(about = "Inspect, repair and create MBR/GPT partition tables in disk images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Logical sector size in bytes
    #[arg(long, global = true, default_value = "512")]
    sector_size: u32,

    /// Log level
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Show the MBR and both GPT copies with their checksum state
    Inspect {
        /// Disk image file
        image: PathBuf,

        /// Print the full decoded structures as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute GPT checksums and rewrite the table copies in place
    Repair {
        /// Disk image file
        image: PathBuf,

        /// Only rewrite the primary copy
        #[arg(short, long, conflicts_with = "backup")]
        primary: bool,

        /// Only rewrite the backup copy
        #[arg(short, long)]
        backup: bool,

        /// Leave copies whose checksums are already valid untouched
        #[arg(long)]
        only_invalid: bool,

        /// Skip reading written copies back
        #[arg(long)]
        no_verify: bool,

        /// Rebuild the other copy from this one instead of from its own content
        #[arg(long, value_enum)]
        rebuild_from: Option<CopyArg>,
    },

    /// Create a zero-filled image with a protective MBR and an empty GPT
    Init {
        /// Disk image file to create
        image: PathBuf,

        /// Image size in bytes, with an optional K, M or G suffix
        #[arg(long, value_parser = parse_size)]
        size: u64,

        /// Disk GUID (random when omitted)
        #[arg(long)]
        disk_guid: Option<Uuid>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CopyArg {
    Primary,
    Backup,
}

impl From<CopyArg> for GptCopy {
    fn from(arg: CopyArg) -> Self {
        match arg {
            CopyArg::Primary => GptCopy::Primary,
            CopyArg::Backup => GptCopy::Secondary,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    let sector_size = SectorSize::new(cli.sector_size)?;

    match cli.command {
        Command::Inspect { image, json } => cmd_inspect(&image, sector_size, json),
        Command::Repair {
            image,
            primary,
            backup,
            only_invalid,
            no_verify,
            rebuild_from,
        } => {
            let (repair_primary, repair_secondary) = match (primary, backup) {
                (true, false) => (true, false),
                (false, true) => (false, true),
                _ => (true, true),
            };
            let config = MenderConfig::default()
                .with_sector_size(sector_size)
                .with_copies(repair_primary, repair_secondary)
                .with_only_when_invalid(only_invalid)
                .with_verify(!no_verify);
            cmd_repair(&image, config, rebuild_from.map(GptCopy::from))
        }
        Command::Init {
            image,
            size,
            disk_guid,
        } => cmd_init(&image, size, disk_guid.unwrap_or_else(Uuid::new_v4), sector_size),
    }
}

/// Everything `inspect --json` prints
#[derive(Serialize)]
struct Inspection {
    image: PathBuf,
    size: u64,
    sector_size: SectorSize,
    scheme: PartitionScheme,
    mbr: Option<MasterBootRecord>,
    primary: Option<GuidPartitionTable>,
    secondary: Option<GuidPartitionTable>,
    report: Option<RepairReport>,
}

fn inspect(image_path: &Path, sector_size: SectorSize) -> Result<Inspection> {
    let mut source = open_read_only(image_path)
        .with_context(|| format!("cannot open {}", image_path.display()))?;
    let size = source.byte_len()?;

    let scheme = detect(&mut source, sector_size)?;
    let mbr = MasterBootRecord::read_from(&mut source).ok();

    let (primary, secondary, report) = if scheme == PartitionScheme::Gpt {
        let mender = GptMender::new(MenderConfig::default().with_sector_size(sector_size));
        let (primary, secondary) = mender.read_copies(&mut source);
        let report = mender.report_for(&primary, &secondary).ok();
        (primary.ok(), secondary.ok(), report)
    } else {
        (None, None, None)
    };

    Ok(Inspection {
        image: image_path.to_path_buf(),
        size,
        sector_size,
        scheme,
        mbr,
        primary,
        secondary,
        report,
    })
}

fn cmd_inspect(image_path: &Path, sector_size: SectorSize, json: bool) -> Result<()> {
    let inspection = inspect(image_path, sector_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("=== Image ===");
    println!("Path:         {}", inspection.image.display());
    println!("Size:         {} ({} sectors of {})", format_bytes(inspection.size), sector_size.sector_count(inspection.size), sector_size);
    println!("Scheme:       {}", inspection.scheme);
    println!();

    if let Some(ref mbr) = inspection.mbr {
        println!("=== {} ===", mbr.identify());
        println!("Disk Sig:     0x{:08X}", mbr.disk_signature());
        println!(
            "Boot Sig:     0x{:04X} ({})",
            mbr.boot_signature(),
            if mbr.is_valid() { "valid" } else { "invalid" }
        );
        print_zones(mbr, sector_size);
        println!();
    }

    for table in [&inspection.primary, &inspection.secondary].into_iter().flatten() {
        println!("=== {} ({} copy) ===", table.identify(), table.source);
        println!("Disk GUID:    {}", table.disk_guid);
        println!("Headers:      LBA {} / LBA {}", table.primary_header_lba, table.secondary_header_lba);
        println!("Usable:       LBA {}..={}", table.first_usable_lba, table.last_usable_lba);
        println!(
            "Array:        LBA {}, {} x {} bytes",
            table.partition_array_lba, table.partition_count, table.partition_entry_size
        );
        println!(
            "Header CRC:   0x{:08X} ({})",
            table.stored_header_crc32,
            if table.header_checksum_valid { "valid" } else { "MISMATCH" }
        );
        println!(
            "Array CRC:    0x{:08X} ({})",
            table.stored_partition_array_crc32,
            if table.partition_array_checksum_valid { "valid" } else { "MISMATCH" }
        );
        print_zones(table, sector_size);
        for problem in table.layout_problems(sector_size) {
            println!("Warning: {}", problem);
        }
        println!();
    }

    if let Some(ref report) = inspection.report {
        for copy in [&report.primary, &report.secondary] {
            if let Some(ref error) = copy.read_error {
                println!("{} GPT unreadable: {}", copy.copy, error);
            }
        }
        match report.copies_agree() {
            Some(true) => println!("Primary and backup tables agree."),
            Some(false) => println!("Primary and backup tables DIFFER."),
            None => {}
        }
    }

    Ok(())
}

fn cmd_repair(image_path: &Path, config: MenderConfig, rebuild_from: Option<GptCopy>) -> Result<()> {
    let mut image = DiskImage::open(image_path, ImageConfig::writable())
        .with_context(|| format!("cannot open {} for writing", image_path.display()))?;

    tracing::info!("Repairing GPT in {}", image_path.display());
    let mender = GptMender::new(config);
    let report = match rebuild_from {
        None => mender.repair(&mut image)?,
        Some(source) => {
            let model = gpt::decode(&mut image, source, mender.config().sector_size)
                .with_context(|| format!("cannot rebuild from the {} copy", source))?;
            match source {
                GptCopy::Primary => mender.repair_with(&mut image, None, Some(model))?,
                GptCopy::Secondary => mender.repair_with(&mut image, Some(model), None)?,
            }
        }
    };

    print_copy_report(&report.primary);
    print_copy_report(&report.secondary);

    match report.copies_agree() {
        Some(false) => println!("Warning: primary and backup tables describe different layouts."),
        None => println!("Warning: only one table copy could be read."),
        Some(true) => {}
    }

    let failed: Vec<&CopyReport> = [&report.primary, &report.secondary]
        .into_iter()
        .filter(|c| c.requested && !c.is_consistent())
        .collect();
    if !failed.is_empty() {
        bail!(
            "{} copy could not be repaired",
            failed.iter().map(|c| c.copy.name()).collect::<Vec<_>>().join(" and ")
        );
    }

    Ok(())
}

fn print_copy_report(report: &CopyReport) {
    let state = if !report.read {
        "unreadable".to_string()
    } else {
        format!(
            "header CRC {}, array CRC {}",
            if report.header_checksum_valid { "ok" } else { "bad" },
            if report.partition_array_checksum_valid { "ok" } else { "bad" }
        )
    };

    let action = match (report.requested, report.repaired, report.verified) {
        (false, _, _) => "not selected".to_string(),
        (true, false, _) if report.write_error.is_some() => "NOT written".to_string(),
        (true, false, _) => "left untouched".to_string(),
        (true, true, Some(true)) => "rewritten and verified".to_string(),
        (true, true, Some(false)) => "rewritten, verification FAILED".to_string(),
        (true, true, None) => "rewritten".to_string(),
    };

    println!("{:<10} {:<32} {}", report.copy, state, action);
    if let Some(ref error) = report.write_error {
        println!("{:<10} write failed: {}", "", error);
    }
    if let (Some(header), Some(array)) = (report.written_header_crc32, report.written_partition_array_crc32) {
        println!("{:<10} new header CRC 0x{:08X}, array CRC 0x{:08X}", "", header, array);
    }
}

fn cmd_init(image_path: &Path, size: u64, disk_guid: Uuid, sector_size: SectorSize) -> Result<()> {
    let total_sectors = sector_size.sector_count(size);
    tracing::debug!("Initializing {} sectors of {}", total_sectors, sector_size);
    let table = GuidPartitionTable::new(disk_guid, total_sectors, sector_size)?;

    let mut image = DiskImage::create(image_path, total_sectors * sector_size.bytes())
        .with_context(|| format!("cannot create {}", image_path.display()))?;
    gpt::write_disk(&mut image, &table, sector_size)?;

    println!("Created {} ({})", image_path.display(), format_bytes(image.len()));
    println!("Disk GUID:    {}", table.disk_guid);
    println!("Usable:       LBA {}..={}", table.first_usable_lba, table.last_usable_lba);
    Ok(())
}

fn print_zones(table: &dyn ZoneTable, sector_size: SectorSize) {
    let zones = table.enumerate_zones();
    if zones.is_empty() {
        println!("No partitions found.");
        return;
    }

    println!("{:<5} {:<12} {:<12} {:<12} {:<22} {}", "Index", "First LBA", "Last LBA", "Size", "Type", "Name");
    println!("{}", "-".repeat(80));
    for zone in zones {
        println!(
            "{:<5} {:<12} {:<12} {:<12} {:<22} {}",
            zone.index,
            zone.first_lba,
            zone.last_lba,
            format_bytes(zone.byte_length(sector_size)),
            zone.zone_type,
            zone.label.unwrap_or_default()
        );
    }
}

/// Parse a byte count such as `1048576`, `512K`, `64M` or `2G`
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 'K' | 'k')) => (&s[..i], 1u64 << 10),
        Some((i, 'M' | 'm')) => (&s[..i], 1 << 20),
        Some((i, 'G' | 'g')) => (&s[..i], 1 << 30),
        Some((i, 'T' | 't')) => (&s[..i], 1 << 40),
        _ => (s, 1),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use parttab_core::ByteSink;
    use tempfile::NamedTempFile;

    const SS: SectorSize = SectorSize::LOGICAL_512;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("512K").unwrap(), 512 * 1024);
        assert_eq!(parse_size("64m").unwrap(), 64 << 20);
        assert_eq!(parse_size("2G").unwrap(), 2 << 30);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("").is_err());
        assert!(parse_size("99999999999T").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1 << 20), "1.00 MB");
    }

    #[test]
    fn test_repair_flags() {
        let cli = Cli::try_parse_from(["parttab", "repair", "disk.img", "--backup", "--no-verify"]).unwrap();
        match cli.command {
            Command::Repair { primary, backup, no_verify, .. } => {
                assert!(!primary);
                assert!(backup);
                assert!(no_verify);
            }
            _ => panic!("expected repair"),
        }

        assert!(Cli::try_parse_from(["parttab", "repair", "disk.img", "-p", "-b"]).is_err());
    }

    #[test]
    fn test_init_inspect_repair() {
        let tmpfile = NamedTempFile::new().unwrap();
        let guid = Uuid::from_u128(0x1234);
        cmd_init(tmpfile.path(), 1 << 20, guid, SS).unwrap();

        let inspection = inspect(tmpfile.path(), SS).unwrap();
        assert_eq!(inspection.scheme, PartitionScheme::Gpt);
        assert!(inspection.mbr.unwrap().is_gpt_protective());
        let primary = inspection.primary.unwrap();
        assert_eq!(primary.disk_guid, guid);
        assert!(primary.is_consistent());
        assert!(inspection.report.unwrap().is_fully_consistent());

        // Break the primary header checksum, then fix it
        let mut image = DiskImage::open(tmpfile.path(), ImageConfig::writable()).unwrap();
        image.write_at(512 + 16, &[0, 0, 0, 0]).unwrap();
        drop(image);

        let inspection = inspect(tmpfile.path(), SS).unwrap();
        assert!(!inspection.primary.unwrap().header_checksum_valid);

        cmd_repair(tmpfile.path(), MenderConfig::default(), None).unwrap();
        let inspection = inspect(tmpfile.path(), SS).unwrap();
        assert!(inspection.report.unwrap().is_fully_consistent());
    }

    #[test]
    fn test_rebuild_primary_from_backup() {
        let tmpfile = NamedTempFile::new().unwrap();
        cmd_init(tmpfile.path(), 1 << 20, Uuid::from_u128(7), SS).unwrap();

        let mut image = DiskImage::open(tmpfile.path(), ImageConfig::writable()).unwrap();
        image.write_at(512, &[0u8; 512]).unwrap();
        drop(image);

        let damaged = inspect(tmpfile.path(), SS).unwrap();
        assert!(damaged.primary.is_none());
        assert!(damaged.secondary.is_some());
        let report = damaged.report.unwrap();
        assert!(!report.primary.read);
        assert!(report.secondary.was_consistent());
        assert_eq!(report.copies_agree(), None);

        cmd_repair(tmpfile.path(), MenderConfig::default(), Some(GptCopy::Secondary)).unwrap();
        let inspection = inspect(tmpfile.path(), SS).unwrap();
        assert_eq!(inspection.primary.unwrap().disk_guid, Uuid::from_u128(7));
        assert!(inspection.report.unwrap().is_fully_consistent());
    }

    #[test]
    fn test_inspect_json() {
        let tmpfile = NamedTempFile::new().unwrap();
        cmd_init(tmpfile.path(), 1 << 20, Uuid::from_u128(1), SS).unwrap();

        let inspection = inspect(tmpfile.path(), SS).unwrap();
        let json = serde_json::to_value(&inspection).unwrap();
        assert_eq!(json["scheme"], "Gpt");
        assert_eq!(json["sector_size"], 512);
        assert_eq!(json["primary"]["disk_guid"], "00000000-0000-0000-0000-000000000001");
        assert_eq!(json["report"]["secondary"]["read"], true);
    }
}

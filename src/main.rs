//! sfdisk-backup - Main Entry Point
//!
//! Inspect partition tables and archive whole disks.

use clap::{Parser, Subcommand, ValueEnum};
use sfdisk_backup::*;
use std::path::PathBuf;
use std::process;

/// Partition table reader and disk archiver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
EXAMPLES:
    # List the partitions of a disk
    sfdisk-backup --sudo table /dev/sda

    # Print the table in sfdisk script format
    sfdisk-backup dump /dev/nvme0n1

    # Archive a disk with pxz compression
    sfdisk-backup --sudo archive /dev/sda --target /srv/backup/laptop

    # Dry run (recommended for testing)
    sfdisk-backup --dry-run archive /dev/sda --target /srv/backup/laptop
")]
struct Args {
    /// Run external tools through sudo
    #[arg(long, global = true)]
    sudo: bool,

    /// Dry run - show what would be done without making changes
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CommandArg,
}

#[derive(Subcommand, Debug)]
enum CommandArg {
    /// Print the partition table
    Table {
        /// Block device (e.g., /dev/sda)
        device: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the partition table in sfdisk script format
    Dump {
        /// Block device (e.g., /dev/sda)
        device: PathBuf,
    },

    /// Archive the boot header, table and every partition
    Archive {
        /// Block device (e.g., /dev/sda); taken from the config file when omitted
        device: Option<PathBuf>,

        /// Target directory
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Boot header file name
        #[arg(short, long)]
        mbr: Option<PathBuf>,

        /// Prefix of the produced files
        #[arg(short, long)]
        prefix: Option<String>,

        /// Compression for the partition archives
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,

        /// Keep uncompressed partclone images
        #[arg(long)]
        keep_raw: bool,

        /// Skip pre-flight system checks
        #[arg(short = 'S', long)]
        skip_preflight: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    Pxz,
    Xz,
    Zstd,
    Gzip,
    None,
}

impl From<CompressionArg> for Compression {
    fn from(comp: CompressionArg) -> Self {
        match comp {
            CompressionArg::Pxz => Compression::Pxz,
            CompressionArg::Xz => Compression::Xz,
            CompressionArg::Zstd => Compression::Zstd,
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::None => Compression::None,
        }
    }
}

fn main() {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(args) {
        Ok(()) => process::exit(0),
        Err(e) => {
            log::error!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(),
    };
    config.use_sudo |= args.sudo;
    config.dry_run |= args.dry_run;

    match args.command {
        CommandArg::Table { device, json } => {
            config.device = Some(device);
            print_table(&open_device(&config)?, json)
        }
        CommandArg::Dump { device } => {
            config.device = Some(device);
            print!("{}", open_device(&config)?.dump_partition_table()?);
            Ok(())
        }
        CommandArg::Archive {
            device,
            target,
            mbr,
            prefix,
            compression,
            keep_raw,
            skip_preflight,
        } => {
            if device.is_some() {
                config.device = device;
            }
            if target.is_some() {
                config.target_dir = target;
            }
            if let Some(mbr) = mbr {
                config.mbr_file = mbr;
            }
            if let Some(prefix) = prefix {
                config.prefix = prefix;
            }
            if let Some(compression) = compression {
                config.compression = compression.into();
            }
            config.keep_raw |= keep_raw;

            let report = run_archive(&config, skip_preflight)?;
            println!("Header:    {}", report.mbr.display());
            println!("Table:     {}", report.table_dump.display());
            for (name, image) in &report.images {
                println!("{:<10} {}", name, image.archive.display());
            }
            for (name, reason) in &report.skipped {
                println!("{:<10} skipped ({})", name, reason);
            }
            Ok(())
        }
    }
}

fn print_table(device: &BlockDevice, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(device.table())?);
        return Ok(());
    }

    println!(
        "Disk {}: label {}, id {}",
        device.path().display(),
        device.label().unwrap_or("none"),
        device.uuid().unwrap_or("none")
    );
    println!(
        "{:>3}  {:<20} {:>12} {:>12} {:>10}  {:<36}  {}",
        "#", "Device", "Start", "Sectors", "Size", "Type", "UUID"
    );
    for (index, partition) in device.partitions() {
        println!(
            "{:>3}  {:<20} {:>12} {:>12} {:>10}  {:<36}  {}{}",
            index,
            partition.node.display(),
            partition.start,
            partition.size,
            partition.size_human(),
            partition.type_id,
            partition.uuid.as_deref().unwrap_or("-"),
            if partition.bootable { " *" } else { "" }
        );
    }
    Ok(())
}

//! sfdisk output parsing
//!
//! Understands both `sfdisk --json` and the `sfdisk -d` script format as printed by
//! util-linux 2.3x.

use crate::disk::partition::{partition_index, Partition, DEFAULT_SECTOR_SIZE};
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Size of the GPT partition entry array in bytes (128 entries of 128 bytes)
const GPT_ENTRY_ARRAY_BYTES: u64 = 16384;

/// A parsed partition table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionTable {
    /// Table type (`dos`, `gpt`, ...)
    pub label: Option<String>,
    /// Disk identifier
    pub id: Option<String>,
    /// Device the table was read from
    pub device: Option<PathBuf>,
    /// First usable LBA (gpt)
    pub first_lba: Option<u64>,
    /// Last usable LBA (gpt)
    pub last_lba: Option<u64>,
    /// Logical sector size
    pub sector_size: u64,
    /// Partitions by index
    pub partitions: BTreeMap<u32, Partition>,
}

#[derive(Debug, Deserialize)]
struct SfdiskJson {
    partitiontable: RawTable,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    label: Option<String>,
    id: Option<String>,
    device: Option<PathBuf>,
    unit: Option<String>,
    firstlba: Option<u64>,
    lastlba: Option<u64>,
    sectorsize: Option<u64>,
    #[serde(default)]
    partitions: Vec<RawPartition>,
}

#[derive(Debug, Deserialize)]
struct RawPartition {
    node: PathBuf,
    start: u64,
    size: u64,
    #[serde(rename = "type")]
    type_id: String,
    uuid: Option<String>,
    name: Option<String>,
    #[serde(default)]
    bootable: bool,
}

impl PartitionTable {
    /// Parse `sfdisk --json` output
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: SfdiskJson = serde_json::from_str(json)?;
        let raw = parsed.partitiontable;
        check_unit(raw.unit.as_deref())?;

        let sector_size = raw.sectorsize.unwrap_or(DEFAULT_SECTOR_SIZE);
        let mut table = Self {
            label: non_empty(raw.label),
            id: non_empty(raw.id),
            device: raw.device,
            first_lba: raw.firstlba,
            last_lba: raw.lastlba,
            sector_size,
            partitions: BTreeMap::new(),
        };

        for entry in raw.partitions {
            table.insert(Partition {
                index: partition_index(&entry.node)?,
                node: entry.node,
                start: entry.start,
                size: entry.size,
                sector_size,
                type_id: entry.type_id,
                uuid: non_empty(entry.uuid),
                name: non_empty(entry.name),
                bootable: entry.bootable,
            })?;
        }

        Ok(table)
    }

    /// Parse `sfdisk -d` output
    pub fn from_dump(dump: &str) -> Result<Self> {
        let mut table = Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            ..Self::default()
        };
        let mut rows = Vec::new();

        for line in dump.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((node, fields)) = line.split_once(" : ") {
                rows.push((PathBuf::from(node.trim()), fields.to_string()));
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(BackupError::parse(format!("unexpected dump line '{}'", line)));
            };
            let value = value.trim();
            match key.trim() {
                "label" => table.label = non_empty(Some(value.to_string())),
                "label-id" => table.id = non_empty(Some(value.to_string())),
                "device" => table.device = Some(PathBuf::from(value)),
                "unit" => check_unit(Some(value))?,
                "first-lba" => table.first_lba = Some(parse_number(key, value)?),
                "last-lba" => table.last_lba = Some(parse_number(key, value)?),
                "sector-size" => table.sector_size = parse_number(key, value)?,
                other => log::debug!("Ignoring sfdisk dump header '{}'", other),
            }
        }

        // Rows are resolved after the header so sector-size applies regardless of order
        for (node, fields) in rows {
            let partition = parse_dump_row(node, &fields, table.sector_size)?;
            table.insert(partition)?;
        }

        Ok(table)
    }

    /// Number of sectors holding the boot header: the MBR, plus GPT header and
    /// entry array for gpt labels
    pub fn boot_header_sectors(&self) -> u64 {
        match self.label.as_deref() {
            Some("gpt") => 2 + GPT_ENTRY_ARRAY_BYTES.div_ceil(self.sector_size.max(1)),
            _ => 1,
        }
    }

    fn insert(&mut self, partition: Partition) -> Result<()> {
        let index = partition.index;
        if self.partitions.insert(index, partition).is_some() {
            return Err(BackupError::parse(format!(
                "partition number {} listed twice",
                index
            )));
        }
        Ok(())
    }
}

fn parse_dump_row(node: PathBuf, fields: &str, sector_size: u64) -> Result<Partition> {
    let mut start = None;
    let mut size = None;
    let mut type_id = None;
    let mut uuid = None;
    let mut name = None;
    let mut bootable = false;

    for field in split_fields(fields) {
        match field.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                let value = value.trim();
                match key {
                    "start" => start = Some(parse_number(key, value)?),
                    "size" => size = Some(parse_number(key, value)?),
                    "type" | "Id" => type_id = Some(value.to_string()),
                    "uuid" => uuid = Some(value.to_string()),
                    "name" => name = Some(unquote(value)),
                    _ => {}
                }
            }
            None if field.trim() == "bootable" => bootable = true,
            None => {}
        }
    }

    let missing = |what: &str| {
        BackupError::parse(format!("{} missing for {}", what, node.display()))
    };

    Ok(Partition {
        index: partition_index(&node)?,
        start: start.ok_or_else(|| missing("start"))?,
        size: size.ok_or_else(|| missing("size"))?,
        type_id: type_id.ok_or_else(|| missing("type"))?,
        sector_size,
        uuid: non_empty(uuid),
        name: non_empty(name),
        bootable,
        node,
    })
}

/// Split a dump row on commas that are not inside double quotes
fn split_fields(fields: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut begin = 0;

    for (i, c) in fields.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(fields[begin..i].trim());
                begin = i + 1;
            }
            _ => {}
        }
    }
    let last = fields[begin..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| BackupError::parse(format!("invalid {} '{}': {}", key, value, e)))
}

fn check_unit(unit: Option<&str>) -> Result<()> {
    match unit {
        None | Some("sectors") => Ok(()),
        Some(other) => Err(BackupError::parse(format!(
            "unsupported sfdisk unit '{}'",
            other
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

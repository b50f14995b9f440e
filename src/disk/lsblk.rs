//! lsblk JSON parsing (`lsblk -o NAME,TYPE,FSTYPE -b -J`)

use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    fstype: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Map partition name to filesystem type for the children of `disk_name`
///
/// Children without a filesystem are omitted. When `disk_name` is not listed but
/// lsblk reported exactly one device (the path given was a symlink), that device is used.
pub fn parse_fs_types(json: &str, disk_name: &str) -> Result<BTreeMap<String, String>> {
    let output: LsblkOutput = serde_json::from_str(json)?;

    let disk = match output.blockdevices.iter().find(|d| d.name == disk_name) {
        Some(disk) => disk,
        None if output.blockdevices.len() == 1 => {
            let only = &output.blockdevices[0];
            log::debug!("lsblk lists {} for {}", only.name, disk_name);
            only
        }
        None => {
            log::warn!("Device {} not listed by lsblk", disk_name);
            return Ok(BTreeMap::new());
        }
    };

    Ok(disk
        .children
        .iter()
        .filter(|child| child.kind.as_deref() != Some("disk"))
        .filter_map(|child| {
            child
                .fstype
                .as_ref()
                .filter(|fs| !fs.is_empty())
                .map(|fs| (child.name.clone(), fs.clone()))
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const LSBLK_JSON: &str = r#"{
   "blockdevices": [
      {"name": "sda", "type": "disk", "fstype": null,
         "children": [
            {"name": "sda1", "type": "part", "fstype": "vfat"},
            {"name": "sda2", "type": "part", "fstype": "ext4"}
         ]
      },
      {"name": "sdb", "type": "disk", "fstype": null,
         "children": [
            {"name": "sdb1", "type": "part", "fstype": "ntfs"},
            {"name": "sdb2", "type": "part", "fstype": null}
         ]
      },
      {"name": "sr0", "type": "rom", "fstype": null}
   ]
}"#;

    #[test]
    fn test_fs_types_for_disk() {
        let types = parse_fs_types(LSBLK_JSON, "sda").unwrap();
        let expected: BTreeMap<String, String> = [
            ("sda1".to_string(), "vfat".to_string()),
            ("sda2".to_string(), "ext4".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(types, expected);
    }

    #[test]
    fn test_children_without_fstype_skipped() {
        let types = parse_fs_types(LSBLK_JSON, "sdb").unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types.get("sdb1").map(String::as_str), Some("ntfs"));
    }

    #[test]
    fn test_unknown_disk_is_empty() {
        assert!(parse_fs_types(LSBLK_JSON, "nvme0n1").unwrap().is_empty());
    }

    #[test]
    fn test_single_device_used_for_symlinked_path() {
        let json = r#"{"blockdevices": [{"name": "vda", "type": "disk",
            "children": [{"name": "vda1", "type": "part", "fstype": "xfs"}]}]}"#;
        let types = parse_fs_types(json, "virtio-root").unwrap();
        assert_eq!(types.get("vda1").map(String::as_str), Some("xfs"));
    }
}

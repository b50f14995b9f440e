//! Shell-script stand-ins for sfdisk, lsblk, dd, partclone, tar and sudo

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

pub const SFDISK_JSON: &str = r#"{
   "partitiontable": {
      "label": "dos",
      "id": "0x1f2e3d4c",
      "device": "/dev/disk0",
      "unit": "sectors",
      "sectorsize": 512,
      "partitions": [
         {"node": "/dev/disk0p1", "start": 2048, "size": 524288, "type": "c", "bootable": true},
         {"node": "/dev/disk0p2", "start": 526336, "size": 8388608, "type": "83"},
         {"node": "/dev/disk0p3", "start": 8914944, "size": 2097152, "type": "82"}
      ]
   }
}"#;

pub const SFDISK_DUMP: &str = "label: dos
label-id: 0x1f2e3d4c
device: /dev/disk0
unit: sectors
sector-size: 512

/dev/disk0p1 : start=        2048, size=      524288, type=c, bootable
/dev/disk0p2 : start=      526336, size=     8388608, type=83
/dev/disk0p3 : start=     8914944, size=     2097152, type=82
";

pub const LSBLK_JSON: &str = r#"{
   "blockdevices": [
      {"name": "disk0", "type": "disk", "fstype": null,
         "children": [
            {"name": "disk0p1", "type": "part", "fstype": "vfat"},
            {"name": "disk0p2", "type": "part", "fstype": "ext4"},
            {"name": "disk0p3", "type": "part", "fstype": "swap"}
         ]
      }
   ]
}"#;

const LOG_CALL: &str = r#"echo "$(basename "$0") $*" >> "$(dirname "$0")/calls.log""#;

const WRITE_AFTER_FLAG: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "$FLAG" ]; then out="$2"; fi
  shift
done
printf '%s' "$CONTENT" > "$out""#;

/// Scratch workspace: `bin/` with fake tools, a fake `disk0` device and `out/`
pub struct FakeHost {
    pub dir: TempDir,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::create_dir(host.bin()).unwrap();
        fs::write(host.device(), b"").unwrap();

        fs::write(host.bin().join("sfdisk.json"), SFDISK_JSON).unwrap();
        fs::write(host.bin().join("sfdisk.dump"), SFDISK_DUMP).unwrap();
        fs::write(host.bin().join("lsblk.json"), LSBLK_JSON).unwrap();

        host.tool("sudo", "exec \"$@\"");
        host.tool(
            "sfdisk",
            &format!(
                "{}\ncase \"$1\" in\n  --json) cat \"$(dirname \"$0\")/sfdisk.json\" ;;\n  -d) cat \"$(dirname \"$0\")/sfdisk.dump\" ;;\n  *) exit 1 ;;\nesac",
                LOG_CALL
            ),
        );
        host.tool(
            "lsblk",
            &format!("{}\ncat \"$(dirname \"$0\")/lsblk.json\"", LOG_CALL),
        );
        host.tool(
            "dd",
            &format!(
                "{}\nfor arg in \"$@\"; do\n  case \"$arg\" in of=*) printf 'header' > \"${{arg#of=}}\" ;; esac\ndone",
                LOG_CALL
            ),
        );
        host.tool("umount", &format!("{}\nexit 32", LOG_CALL));
        host.tool("chmod", LOG_CALL);
        host.tool("pxz", LOG_CALL);
        host.tool("partclone.fat", &writer(LOG_CALL, "-o", "image"));
        host.tool("partclone.ext4", &writer(LOG_CALL, "-o", "image"));
        host.tool("partclone.dd", &writer(LOG_CALL, "-o", "image"));
        host.tool("tar", &writer(LOG_CALL, "-cf", "archive"));
        host
    }

    pub fn bin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn device(&self) -> PathBuf {
        self.dir.path().join("disk0")
    }

    pub fn target(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Install (or replace) a fake tool
    pub fn tool(&self, name: &str, body: &str) {
        let path = self.bin().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Make a tool fail with the given stderr
    pub fn failing_tool(&self, name: &str, stderr: &str) {
        self.tool(
            name,
            &format!("{}\necho '{}' >&2\nexit 1", LOG_CALL, stderr),
        );
    }

    /// Tool names in invocation order
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.bin().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(|line| line.split_whitespace().next().unwrap_or("").to_string())
            .collect()
    }

    /// Full logged command lines for one tool
    pub fn call_lines(&self, tool: &str) -> Vec<String> {
        fs::read_to_string(self.bin().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| line.split_whitespace().next() == Some(tool))
            .map(str::to_string)
            .collect()
    }

    /// Expose `disk0` and its partitions through by-id style links
    ///
    /// Returns the disk link; sfdisk reports the partitions under the link name.
    pub fn by_id_links(&self) -> PathBuf {
        let by_id = self.dir.path().join("by-id");
        fs::create_dir(&by_id).unwrap();
        let link = by_id.join("ata-FAKE_DISK");
        std::os::unix::fs::symlink(self.device(), &link).unwrap();
        for n in 1..=3 {
            let part = self.dir.path().join(format!("disk0p{}", n));
            fs::write(&part, b"").unwrap();
            std::os::unix::fs::symlink(&part, by_id.join(format!("ata-FAKE_DISK-part{}", n)))
                .unwrap();
        }
        let json = SFDISK_JSON
            .replace("/dev/disk0p", &format!("{}-part", link.display()))
            .replace("/dev/disk0", &link.display().to_string());
        fs::write(self.bin().join("sfdisk.json"), json).unwrap();
        link
    }

    /// Write a TOML config pointing at the fake tools
    pub fn config_file(&self) -> PathBuf {
        let path = self.dir.path().join("backup.toml");
        fs::write(
            &path,
            format!(
                "use_sudo = true\ntool_dirs = [\"{}\"]\n",
                self.bin().display()
            ),
        )
        .unwrap();
        path
    }
}

fn writer(log: &str, flag: &str, content: &str) -> String {
    format!(
        "{}\nFLAG='{}'\nCONTENT='{}'\n{}",
        log, flag, content, WRITE_AFTER_FLAG
    )
}

//! Request bodies of the agent HTTP API.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::tablespace::TablespaceInfo;

/// One primary segment to upgrade on the receiving host, enriched with its
/// tablespace layout and a scratch directory for `pg_upgrade` to run in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub content: i32,
    pub dbid: i32,
    pub source_data_dir: Utf8PathBuf,
    pub target_data_dir: Utf8PathBuf,
    pub source_port: u16,
    pub target_port: u16,
    pub work_dir: Utf8PathBuf,
    /// Tablespace oid -> layout, for every tablespace of this segment.
    pub tablespaces: BTreeMap<u32, TablespaceInfo>,
}

/// Request of the /upgrade_primaries API: the shared parameter bundle plus
/// the receiving host's slice of segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradePrimariesRequest {
    pub source_bin_dir: Utf8PathBuf,
    pub target_bin_dir: Utf8PathBuf,
    /// Coordinator-origin backup to restore into each target data directory.
    pub coordinator_backup_dir: Utf8PathBuf,
    /// Absolute path of the tablespace mapping file on the receiving host.
    /// Its parent directory also holds the coordinator-origin tablespace
    /// trees, keyed by oid.
    pub tablespaces_mapping_file: Utf8PathBuf,
    pub check_only: bool,
    pub use_link_mode: bool,
    pub segments: Vec<SegmentDescriptor>,
}

/// Request of the /archive_log_directory API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLogDirectoryRequest {
    pub old_dir: Utf8PathBuf,
    pub new_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePair {
    pub source: Utf8PathBuf,
    pub target: Utf8PathBuf,
    /// After archiving `source`, move `target` into `source`'s place.
    pub rename_target: bool,
}

/// Request of the /rename_directories API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameDirectoriesRequest {
    pub pairs: Vec<RenamePair>,
}

/// Request of the /delete_data_directories API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteDataDirectoriesRequest {
    pub datadirs: Vec<Utf8PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tablespace oids are u32 map keys, which JSON can only carry as
    // strings. Make sure they survive the wire representation.
    #[test]
    fn tablespace_oid_keys_survive_json() {
        let mut tablespaces = BTreeMap::new();
        tablespaces.insert(
            16386,
            TablespaceInfo {
                location: Utf8PathBuf::from("/tmp/tblspc/16386/2"),
                user_defined: true,
            },
        );
        let descriptor = SegmentDescriptor {
            content: 0,
            dbid: 2,
            source_data_dir: Utf8PathBuf::from("/data/seg0-old"),
            target_data_dir: Utf8PathBuf::from("/data/seg0"),
            source_port: 25432,
            target_port: 25433,
            work_dir: Utf8PathBuf::from("/state/pg_upgrade/seg-0"),
            tablespaces,
        };

        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"16386\""));

        let roundtripped: SegmentDescriptor = serde_json::from_str(&json).unwrap();
        let info = &roundtripped.tablespaces[&16386];
        assert_eq!(info.location, "/tmp/tblspc/16386/2");
        assert!(info.user_defined);
    }
}

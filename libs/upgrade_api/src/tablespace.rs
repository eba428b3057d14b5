//! Tablespace layout shared by the hub and the agents.
//!
//! The path derivation rules here are load-bearing: `pg_upgrade` consumes the
//! mapping file and expects the coordinator-origin tablespace trees and the
//! per-segment tablespace directories exactly where these helpers put them.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// The coordinator always has this dbid.
pub const COORDINATOR_DBID: i32 = 1;

/// Name of the CSV mapping file handed to `pg_upgrade`.
pub const TABLESPACES_MAPPING_FILE: &str = "tablespaces.txt";

/// Per-tablespace layout of one segment. Only user-defined tablespaces are
/// relocated and re-symlinked during upgrade; `pg_default` and `pg_global`
/// live inside the data directory and move with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablespaceInfo {
    pub location: Utf8PathBuf,
    pub user_defined: bool,
}

/// Where a segment with the given dbid keeps its copy of a tablespace:
/// `<location>/<dbid>`.
pub fn tablespace_location_for_dbid(info: &TablespaceInfo, dbid: i32) -> Utf8PathBuf {
    info.location.join(dbid.to_string())
}

/// Where the coordinator-origin copy of tablespace `oid` lives relative to
/// the mapping-file directory: `<base>/<oid>/<COORDINATOR_DBID>`.
pub fn coordinator_tablespace_location(base: &Utf8Path, oid: u32) -> Utf8PathBuf {
    base.join(oid.to_string()).join(COORDINATOR_DBID.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_location_appends_dbid() {
        let info = TablespaceInfo {
            location: Utf8PathBuf::from("/tmp/testfs/master/fsseg"),
            user_defined: true,
        };
        assert_eq!(
            tablespace_location_for_dbid(&info, 2),
            Utf8PathBuf::from("/tmp/testfs/master/fsseg/2")
        );
    }

    #[test]
    fn coordinator_location_appends_oid_and_coordinator_dbid() {
        assert_eq!(
            coordinator_tablespace_location(Utf8Path::new("/state/dir"), 16385),
            Utf8PathBuf::from("/state/dir/16385/1")
        );
    }
}

//! In-memory model of a cluster: one segment descriptor per database
//! instance, in the shape of `gp_segment_configuration`, plus the selectors
//! the upgrade steps operate on. The model is immutable once constructed.

use std::collections::HashSet;

use anyhow::{bail, Context};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tokio_postgres::Client;

/// Content id of the coordinator (and its standby).
pub const COORDINATOR_CONTENT_ID: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Mirror,
}

impl Role {
    fn from_catalog(role: &str) -> anyhow::Result<Role> {
        match role {
            "p" => Ok(Role::Primary),
            "m" => Ok(Role::Mirror),
            other => bail!("unexpected segment role {other:?} in gp_segment_configuration"),
        }
    }
}

/// One row of `gp_segment_configuration`, with the data directory resolved.
/// The standby is the `(content = -1, role = mirror)` entry; there is no
/// separate role for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegConfig {
    pub content_id: i32,
    pub dbid: i32,
    pub port: u16,
    pub hostname: String,
    pub data_dir: Utf8PathBuf,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    segments: Vec<SegConfig>,
}

impl Cluster {
    /// Validates the catalog invariants: dbids are unique, (content, role)
    /// pairs are unique, and exactly one coordinator exists.
    pub fn new(segments: Vec<SegConfig>) -> anyhow::Result<Cluster> {
        let mut dbids = HashSet::new();
        let mut content_roles = HashSet::new();
        for seg in &segments {
            if !dbids.insert(seg.dbid) {
                bail!("duplicate dbid {} in cluster configuration", seg.dbid);
            }
            if !content_roles.insert((seg.content_id, seg.role)) {
                bail!(
                    "duplicate (content id {}, role {:?}) in cluster configuration",
                    seg.content_id,
                    seg.role
                );
            }
        }

        let coordinators = segments
            .iter()
            .filter(|seg| seg.content_id == COORDINATOR_CONTENT_ID && seg.role == Role::Primary)
            .count();
        if coordinators != 1 {
            bail!("cluster configuration has {coordinators} coordinators, want exactly 1");
        }

        Ok(Cluster { segments })
    }

    /// Load the model from a connected coordinator. In Greenplum 5 the data
    /// directory lives in the `pg_system` filespace entry, not in
    /// `gp_segment_configuration` itself.
    pub async fn from_catalog(client: &Client) -> anyhow::Result<Cluster> {
        let rows = client
            .query(
                "SELECT s.content::int AS content,
                        s.dbid::int AS dbid,
                        s.port::int AS port,
                        s.hostname::text AS hostname,
                        e.fselocation::text AS datadir,
                        s.role::text AS role
                 FROM gp_segment_configuration s
                 JOIN pg_filespace_entry e ON s.dbid = e.fsedbid
                 JOIN pg_filespace f ON e.fsefsoid = f.oid
                 WHERE f.fsname = 'pg_system'
                 ORDER BY s.content, s.role",
                &[],
            )
            .await
            .context("querying gp_segment_configuration")?;

        let mut segments = Vec::with_capacity(rows.len());
        for row in rows {
            let port: i32 = row.get("port");
            let role: String = row.get("role");
            segments.push(SegConfig {
                content_id: row.get("content"),
                dbid: row.get("dbid"),
                port: u16::try_from(port).with_context(|| format!("segment port {port} out of range"))?,
                hostname: row.get("hostname"),
                data_dir: Utf8PathBuf::from(row.get::<_, String>("datadir")),
                role: Role::from_catalog(&role)?,
            });
        }

        Cluster::new(segments)
    }

    pub fn segments(&self) -> &[SegConfig] {
        &self.segments
    }

    pub fn coordinator(&self) -> &SegConfig {
        // Guaranteed by the constructor.
        self.segments
            .iter()
            .find(|seg| seg.content_id == COORDINATOR_CONTENT_ID && seg.role == Role::Primary)
            .unwrap()
    }

    pub fn standby(&self) -> Option<&SegConfig> {
        self.segments
            .iter()
            .find(|seg| seg.content_id == COORDINATOR_CONTENT_ID && seg.role == Role::Mirror)
    }

    /// All primary segments, excluding the coordinator.
    pub fn primaries(&self) -> Vec<SegConfig> {
        self.segments
            .iter()
            .filter(|seg| seg.role == Role::Primary && seg.content_id != COORDINATOR_CONTENT_ID)
            .cloned()
            .collect()
    }

    /// All mirrors, including the standby (which is encoded as the mirror of
    /// content id -1).
    pub fn mirrors_and_standby(&self) -> Vec<SegConfig> {
        self.segments
            .iter()
            .filter(|seg| seg.role == Role::Mirror)
            .cloned()
            .collect()
    }

    pub fn primary_for_content(&self, content_id: i32) -> Option<&SegConfig> {
        self.segments
            .iter()
            .find(|seg| seg.role == Role::Primary && seg.content_id == content_id)
    }

    /// Distinct hostnames across all segments, coordinator included.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| seg.hostname.clone())
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

//! The per-segment worker: restore the coordinator-origin backup, rebuild
//! the user-defined tablespace layout, then run `pg_upgrade`.
//!
//! The three steps are strictly ordered and the worker never continues past
//! a failing step for the same segment.

use std::sync::Arc;

use anyhow::Context;
use tokio::task;
use upgrade_api::requests::{SegmentDescriptor, UpgradePrimariesRequest};
use upgrade_api::tablespace::{coordinator_tablespace_location, tablespace_location_for_dbid};

use crate::filesystem::{recreate_symlink, Filesystem};
use crate::pg_upgrade::{self, ExecRunner, Segment, SegmentPair, UpgradeOptions};

/// Files the coordinator backup restores into each target data directory.
/// Everything else in the backup directory is left alone.
const COORDINATOR_BACKUP_WHITELIST: &[&str] = &[
    "internal.auto.conf",
    "postgresql.conf",
    "pg_hba.conf",
    "postmaster.opts",
    "gp_dbid",
    "gpssh.conf",
    "gpperfmon",
];

pub async fn upgrade_segment(
    fs: Arc<dyn Filesystem>,
    runner: &dyn ExecRunner,
    request: &UpgradePrimariesRequest,
    segment: &SegmentDescriptor,
    host: &str,
) -> anyhow::Result<()> {
    // The restore steps are filesystem-heavy; keep them off the async
    // workers.
    {
        let fs = fs.clone();
        let request = request.clone();
        let segment = segment.clone();
        let host = host.to_string();
        task::spawn_blocking(move || -> anyhow::Result<()> {
            restore_backup(fs.as_ref(), &request, &segment).with_context(|| {
                format!(
                    "failed to restore coordinator data directory backup on host {host} for content id {}",
                    segment.content
                )
            })?;
            restore_tablespaces(fs.as_ref(), &request, &segment).with_context(|| {
                format!(
                    "restore tablespace on host {host} for content id {}",
                    segment.content
                )
            })?;
            Ok(())
        })
        .await
        .context("restore task aborted")??;
    }

    perform_upgrade(runner, request, segment).await.with_context(|| {
        let action = if request.check_only { "check" } else { "upgrade" };
        format!(
            "failed to {action} primary on host {host} with content {}",
            segment.content
        )
    })?;

    Ok(())
}

/// Copy the whitelisted subset of the coordinator backup into the segment's
/// target data directory. Whitelist entries absent from the backup are
/// skipped silently; nothing outside the whitelist is ever copied.
fn restore_backup(
    fs: &dyn Filesystem,
    request: &UpgradePrimariesRequest,
    segment: &SegmentDescriptor,
) -> anyhow::Result<()> {
    if request.check_only {
        return Ok(());
    }

    for name in COORDINATOR_BACKUP_WHITELIST {
        let source = request.coordinator_backup_dir.join(name);
        if !fs.exists(&source) {
            continue;
        }
        let target = segment.target_data_dir.join(name);
        fs.copy_tree(&source, &target)
            .with_context(|| format!("copy {source:?} to {target:?}"))?;
    }

    Ok(())
}

/// Rebuild the segment's user-defined tablespaces from the coordinator-origin
/// copies next to the mapping file, then point `pg_tblspc/<oid>` at them.
fn restore_tablespaces(
    fs: &dyn Filesystem,
    request: &UpgradePrimariesRequest,
    segment: &SegmentDescriptor,
) -> anyhow::Result<()> {
    if request.check_only {
        return Ok(());
    }

    let mapping_dir = request
        .tablespaces_mapping_file
        .parent()
        .with_context(|| {
            format!(
                "tablespace mapping file {:?} has no parent directory",
                request.tablespaces_mapping_file
            )
        })?;

    for (&oid, tablespace) in &segment.tablespaces {
        if !tablespace.user_defined {
            continue;
        }

        let target_dir = tablespace_location_for_dbid(tablespace, segment.dbid);
        let source_dir = coordinator_tablespace_location(mapping_dir, oid);
        fs.copy_tree(&source_dir, &target_dir).with_context(|| {
            format!("copy coordinator tablespace directory {source_dir:?} to segment tablespace directory {target_dir:?}")
        })?;

        let link = segment
            .target_data_dir
            .join("pg_tblspc")
            .join(oid.to_string());
        recreate_symlink(fs, &target_dir, &link).context("failed to recreate symbolic link")?;
    }

    Ok(())
}

async fn perform_upgrade(
    runner: &dyn ExecRunner,
    request: &UpgradePrimariesRequest,
    segment: &SegmentDescriptor,
) -> anyhow::Result<()> {
    let pair = SegmentPair {
        source: Segment {
            bin_dir: request.source_bin_dir.clone(),
            data_dir: segment.source_data_dir.clone(),
            dbid: segment.dbid,
            port: segment.source_port,
        },
        target: Segment {
            bin_dir: request.target_bin_dir.clone(),
            data_dir: segment.target_data_dir.clone(),
            dbid: segment.dbid,
            port: segment.target_port,
        },
    };

    let mut options = UpgradeOptions {
        work_dir: Some(segment.work_dir.clone()),
        segment_mode: true,
        ..Default::default()
    };

    if request.check_only {
        options.check_only = true;
    } else {
        // The mapping file is only copied out to the hosts after the
        // coordinator itself has been upgraded, so a check run must not
        // reference it.
        options.tablespace_file = Some(request.tablespaces_mapping_file.clone());
    }

    if request.use_link_mode {
        options.link_mode = true;
    }

    pg_upgrade::run(&pair, &options, runner).await
}

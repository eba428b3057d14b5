//! Filesystem operations behind a seam.
//!
//! The agent mutates data directories, tablespace trees and symlinks. All of
//! those mutations go through the [`Filesystem`] trait, injected into the
//! agent server at construction time so tests can supply a fake and observe
//! or fail individual operations.

use std::io;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};

pub trait Filesystem: Send + Sync {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()>;
    /// Whether `path` exists as a directory entry, without following
    /// symlinks. A dangling symlink reports `true`.
    fn link_exists(&self, path: &Utf8Path) -> io::Result<bool>;
    /// Remove a file or symlink.
    fn remove(&self, path: &Utf8Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Utf8Path) -> io::Result<()>;
    fn symlink(&self, target: &Utf8Path, link: &Utf8Path) -> io::Result<()>;
    /// Recursive copy; `src` may be a file or a directory tree.
    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> io::Result<()>;
    fn exists(&self, path: &Utf8Path) -> bool;
}

/// The production implementation, backed by `std::fs`.
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn link_exists(&self, path: &Utf8Path) -> io::Result<bool> {
        match std::fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn remove(&self, path: &Utf8Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn symlink(&self, target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn copy_tree(&self, src: &Utf8Path, dst: &Utf8Path) -> io::Result<()> {
        utils::fs_ext::copy_tree(src, dst)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        path.exists()
    }
}

/// Recreate `link` pointing at `target`: an existing link is removed first,
/// a failing lstat (other than not-found) aborts. Idempotent.
pub fn recreate_symlink(
    fs: &dyn Filesystem,
    target: &Utf8Path,
    link: &Utf8Path,
) -> anyhow::Result<()> {
    if fs
        .link_exists(link)
        .with_context(|| format!("stat symbolic link {link:?}"))?
    {
        fs.remove(link)
            .with_context(|| format!("failed to unlink {link:?}"))?;
    }

    fs.symlink(target, link)
        .with_context(|| format!("create symbolic link {link:?} to directory {target:?}"))?;

    Ok(())
}

/// Archive name for a data directory that is being replaced:
/// `<source>-old-<timestamp>`.
pub fn archived_name(source: &Utf8Path, now: DateTime<Utc>) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{source}-old-{}", now.format("%Y%m%dT%H%M%SZ")))
}

/// Archive `source` under a stamped name and, if requested, move `target`
/// into `source`'s place. Each step is a single rename, so the directory is
/// always reachable under either its old or its new name.
pub fn archive_source(
    fs: &dyn Filesystem,
    source: &Utf8Path,
    target: &Utf8Path,
    rename_target: bool,
) -> anyhow::Result<()> {
    let archive = archived_name(source, Utc::now());
    fs.rename(source, &archive)
        .with_context(|| format!("archive {source:?} to {archive:?}"))?;

    if rename_target {
        fs.rename(target, source)
            .with_context(|| format!("rename {target:?} to {source:?}"))?;
    }

    Ok(())
}

/// Refuse to touch a directory that does not look like a database data
/// directory. Guards the delete operation against a mistyped path.
pub fn verify_data_directory(fs: &dyn Filesystem, dir: &Utf8Path) -> anyhow::Result<()> {
    for marker in ["postgresql.conf", "PG_VERSION"] {
        if !fs.exists(&dir.join(marker)) {
            anyhow::bail!("{dir:?} does not look like a data directory: missing {marker}");
        }
    }
    Ok(())
}

//! Invocation of `pg_upgrade` for a single segment.
//!
//! This module only knows how to compose and run the external command; it
//! owns no retry policy and no ordering. The caller decides when and for
//! which segments to run it.

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use tracing::info;

/// One side of an upgrade: where a segment's binaries and data live.
#[derive(Debug, Clone)]
pub struct Segment {
    pub bin_dir: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub dbid: i32,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct SegmentPair {
    pub source: Segment,
    pub target: Segment,
}

/// The recognized options, each independently composable. The set is closed;
/// an explicit struct beats a dynamic option stack here.
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Scratch directory `pg_upgrade` runs in; created if missing.
    pub work_dir: Option<Utf8PathBuf>,
    /// Pass `--mode=segment` (as opposed to the coordinator upgrade).
    pub segment_mode: bool,
    /// Pass `--check`: validate only, mutate nothing.
    pub check_only: bool,
    /// Pass `--link`: hardlink source heap files into the target.
    pub link_mode: bool,
    /// Pass `--old-tablespaces-file=<path>`.
    pub tablespace_file: Option<Utf8PathBuf>,
}

/// A fully composed external command, ready for an [`ExecRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub work_dir: Option<Utf8PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: Utf8PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// External-process seam, injected into the agent server at construction
/// time. Tests supply a recording implementation.
#[async_trait]
pub trait ExecRunner: Send + Sync {
    async fn run(&self, cmd: ExecCommand) -> Result<(), ExecError>;
}

/// Runs the command as a child process. `kill_on_drop` ensures that a
/// cancelled RPC aborts an outstanding `pg_upgrade` instead of orphaning it.
pub struct TokioExecRunner;

#[async_trait]
impl ExecRunner for TokioExecRunner {
    async fn run(&self, cmd: ExecCommand) -> Result<(), ExecError> {
        info!("running {} {}", cmd.program, cmd.args.join(" "));

        let mut command = tokio::process::Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| ExecError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                program: cmd.program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Compose the `pg_upgrade` command line from the options and run it.
pub async fn run(
    pair: &SegmentPair,
    options: &UpgradeOptions,
    runner: &dyn ExecRunner,
) -> anyhow::Result<()> {
    if let Some(dir) = &options.work_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create pg_upgrade working directory {dir:?}"))?;
    }

    runner
        .run(compose_command(pair, options))
        .await
        .map_err(anyhow::Error::new)
}

fn compose_command(pair: &SegmentPair, options: &UpgradeOptions) -> ExecCommand {
    let mut args = vec![
        format!("--old-bindir={}", pair.source.bin_dir),
        format!("--new-bindir={}", pair.target.bin_dir),
        format!("--old-datadir={}", pair.source.data_dir),
        format!("--new-datadir={}", pair.target.data_dir),
        format!("--old-port={}", pair.source.port),
        format!("--new-port={}", pair.target.port),
        format!("--old-gp-dbid={}", pair.source.dbid),
        format!("--new-gp-dbid={}", pair.target.dbid),
        // Keep the upgrade logs around for the operator.
        "--retain".to_string(),
    ];

    if options.segment_mode {
        args.push("--mode=segment".to_string());
    }
    if options.check_only {
        args.push("--check".to_string());
    }
    if options.link_mode {
        args.push("--link".to_string());
    }
    if let Some(file) = &options.tablespace_file {
        args.push(format!("--old-tablespaces-file={file}"));
    }

    ExecCommand {
        program: pair.target.bin_dir.join("pg_upgrade"),
        args,
        work_dir: options.work_dir.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> SegmentPair {
        SegmentPair {
            source: Segment {
                bin_dir: "/usr/local/gp5/bin".into(),
                data_dir: "/data/dbfast1/seg1".into(),
                dbid: 2,
                port: 25432,
            },
            target: Segment {
                bin_dir: "/usr/local/gp6/bin".into(),
                data_dir: "/data/dbfast1_new/seg1".into(),
                dbid: 2,
                port: 50432,
            },
        }
    }

    #[test]
    fn composes_base_command() {
        let cmd = compose_command(&pair(), &UpgradeOptions::default());

        assert_eq!(cmd.program, Utf8PathBuf::from("/usr/local/gp6/bin/pg_upgrade"));
        assert_eq!(cmd.work_dir, None);
        assert!(cmd.args.contains(&"--old-bindir=/usr/local/gp5/bin".to_string()));
        assert!(cmd.args.contains(&"--new-datadir=/data/dbfast1_new/seg1".to_string()));
        assert!(cmd.args.contains(&"--old-port=25432".to_string()));
        assert!(cmd.args.contains(&"--new-gp-dbid=2".to_string()));
        assert!(cmd.args.contains(&"--retain".to_string()));
        assert!(!cmd.args.iter().any(|a| a.starts_with("--mode")));
        assert!(!cmd.args.contains(&"--check".to_string()));
        assert!(!cmd.args.contains(&"--link".to_string()));
    }

    #[test]
    fn options_compose_independently() {
        let options = UpgradeOptions {
            work_dir: Some("/state/pg_upgrade/seg-0".into()),
            segment_mode: true,
            check_only: true,
            link_mode: true,
            tablespace_file: Some("/state/tablespaces.txt".into()),
        };
        let cmd = compose_command(&pair(), &options);

        assert_eq!(cmd.work_dir, Some(Utf8PathBuf::from("/state/pg_upgrade/seg-0")));
        assert!(cmd.args.contains(&"--mode=segment".to_string()));
        assert!(cmd.args.contains(&"--check".to_string()));
        assert!(cmd.args.contains(&"--link".to_string()));
        assert!(cmd
            .args
            .contains(&"--old-tablespaces-file=/state/tablespaces.txt".to_string()));
    }

    #[tokio::test]
    async fn surfaces_exit_status_and_stderr() {
        let runner = TokioExecRunner;
        let cmd = ExecCommand {
            program: "/bin/sh".into(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            work_dir: None,
        };

        let err = runner.run(cmd).await.unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("boom"), "{rendered}");
        assert!(rendered.contains("exit status: 3"), "{rendered}");
    }
}

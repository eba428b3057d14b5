//! Coordinator-side orchestrator. Each subcommand runs one upgrade step
//! against the per-host agents.

use std::process::exit;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use upgrade_api::tablespace::TABLESPACES_MAPPING_FILE;
use upgrade_hub::cluster::Cluster;
use upgrade_hub::fanout::AgentConn;
use upgrade_hub::steps;
use upgrade_hub::tablespace;
use utils::error_list::ErrorList;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser)]
#[command(about = "Cluster upgrade hub: orchestrates the per-host agents")]
struct Cli {
    /// JSON file holding the source and target cluster configurations.
    #[arg(long)]
    cluster_config: Utf8PathBuf,

    /// Connection string of the source coordinator. Used to load the source
    /// cluster from gp_segment_configuration when the config file carries no
    /// source, and to derive the tablespace mapping for upgrade-primaries.
    #[arg(long)]
    source_connstr: Option<String>,

    /// Port the agents listen on.
    #[arg(long, default_value_t = 6416)]
    agent_port: u16,

    /// Hub state directory; must match the agents' state directory layout.
    #[arg(long)]
    state_dir: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete the data directories of all mirrors and the standby.
    DeleteMirrorAndStandbyDataDirectories,
    /// Delete the data directories of all primaries (coordinator excluded).
    DeletePrimaryDataDirectories,
    /// Run pg_upgrade for every primary segment.
    UpgradePrimaries {
        #[arg(long)]
        source_bin_dir: Utf8PathBuf,
        #[arg(long)]
        target_bin_dir: Utf8PathBuf,
        /// Coordinator backup directory, as staged on the worker hosts.
        #[arg(long)]
        backup_dir: Utf8PathBuf,
        /// Dry-run validation only.
        #[arg(long)]
        check: bool,
        /// Hardlink source heap files into the target instead of copying.
        #[arg(long)]
        link: bool,
    },
    /// Swap the upgraded data directories into place.
    RenameDataDirectories,
    /// Archive the upgrade log directory on every host.
    ArchiveLogDirectories {
        #[arg(long)]
        old_dir: Utf8PathBuf,
        #[arg(long)]
        new_dir: Utf8PathBuf,
    },
}

/// Flat-file cluster state maintained by the (out of scope) initialization
/// workflow: the source cluster as found, the target cluster as initialized.
/// The source may be omitted, in which case it is loaded from the running
/// source coordinator's catalog instead.
#[derive(serde::Deserialize)]
struct ClusterConfig {
    source: Option<Vec<upgrade_hub::cluster::SegConfig>>,
    target: Vec<upgrade_hub::cluster::SegConfig>,
}

/// Connects to the source coordinator, spawning the connection driver.
async fn connect_source(connstr: &str) -> Result<tokio_postgres::Client> {
    let (client, connection) = tokio_postgres::connect(connstr, NoTls)
        .await
        .context("connect to source coordinator")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("source coordinator connection error: {e}");
        }
    });
    Ok(client)
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        match err.downcast_ref::<ErrorList>() {
            Some(list) => {
                for constituent in list.errors() {
                    error!("{constituent:#}");
                }
            }
            None => error!("{err:#}"),
        }
        exit(1);
    }
}

async fn run() -> Result<()> {
    utils::logging::init_logger(DEFAULT_LOG_LEVEL)?;

    let cli = Cli::parse();

    let config = std::fs::read_to_string(&cli.cluster_config)
        .with_context(|| format!("read cluster config {:?}", cli.cluster_config))?;
    let config: ClusterConfig =
        serde_json::from_str(&config).context("parse cluster config")?;
    let source = match (config.source, &cli.source_connstr) {
        (Some(segments), _) => Cluster::new(segments).context("source cluster")?,
        (None, Some(connstr)) => {
            let client = connect_source(connstr).await?;
            Cluster::from_catalog(&client).await.context("source cluster")?
        }
        (None, None) => anyhow::bail!(
            "cluster config has no source cluster and no --source-connstr was given"
        ),
    };
    let target = Cluster::new(config.target).context("target cluster")?;

    let mut conns = Vec::new();
    for host in source.hosts() {
        conns.push(AgentConn::connect(&host, cli.agent_port).await?);
    }

    let cancel = CancellationToken::new();

    match cli.command {
        Command::DeleteMirrorAndStandbyDataDirectories => {
            info!("deleting mirror and standby data directories");
            steps::delete_mirror_and_standby_data_directories(&conns, &source, &cancel).await
        }
        Command::DeletePrimaryDataDirectories => {
            info!("deleting primary data directories");
            steps::delete_primary_data_directories(&conns, &source, &cancel).await
        }
        Command::UpgradePrimaries {
            source_bin_dir,
            target_bin_dir,
            backup_dir,
            check,
            link,
        } => {
            info!("{} primary segments", if check { "checking" } else { "upgrading" });

            let connstr = cli
                .source_connstr
                .as_deref()
                .context("upgrade-primaries requires --source-connstr")?;
            let client = connect_source(connstr).await?;

            let mapping_file = cli.state_dir.join(TABLESPACES_MAPPING_FILE);
            let tablespaces = tablespace::tablespaces_from_db(&client, &mapping_file).await?;

            let params = steps::UpgradeParams {
                source_bin_dir,
                target_bin_dir,
                coordinator_backup_dir: backup_dir,
                state_dir: cli.state_dir.clone(),
                check_only: check,
                use_link_mode: link,
                tablespaces,
            };
            steps::upgrade_primaries(&conns, &source, &target, &params, &cancel).await
        }
        Command::RenameDataDirectories => {
            info!("renaming data directories");
            steps::rename_data_directories(&conns, &source, &target, &cancel).await
        }
        Command::ArchiveLogDirectories { old_dir, new_dir } => {
            info!("archiving log directories");
            steps::archive_log_directories(&conns, &old_dir, &new_dir, &cancel).await
        }
    }
}

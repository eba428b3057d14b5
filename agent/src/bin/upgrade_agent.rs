//! Per-host agent daemon. Runs on every worker host and executes
//! data-directory surgery and segment upgrades on behalf of the hub.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use upgrade_agent::filesystem::RealFilesystem;
use upgrade_agent::http;
use upgrade_agent::pg_upgrade::TokioExecRunner;
use upgrade_agent::server::AgentServer;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser)]
#[command(about = "Cluster upgrade agent: executes host-local upgrade work")]
struct Cli {
    /// Port the agent API listens on.
    #[arg(long, default_value_t = 6416)]
    port: u16,

    /// Hostname to report in errors; defaults to the system hostname.
    #[arg(long)]
    hostname: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init_logger(DEFAULT_LOG_LEVEL)?;

    let cli = Cli::parse();

    let host = match cli.hostname {
        Some(host) => host,
        None => nix::unistd::gethostname()
            .context("read system hostname")?
            .to_string_lossy()
            .into_owned(),
    };

    let server = Arc::new(AgentServer::new(
        Arc::new(RealFilesystem),
        Arc::new(TokioExecRunner),
        host,
    ));

    http::serve(server, cli.port).await
}

//! The hub-side fan-out engine: partition work by host, dispatch one agent
//! RPC per host in parallel, and aggregate per-host failures.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use utils::error_list::ErrorList;

use crate::agent_client::AgentClient;

/// Hub-side handle to one worker host's agent.
#[derive(Debug, Clone)]
pub struct AgentConn {
    pub host: String,
    pub client: AgentClient,
}

impl AgentConn {
    /// Build a connection handle for `host`, verifying the agent answers.
    pub async fn connect(host: &str, port: u16) -> anyhow::Result<AgentConn> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("build agent HTTP client")?;
        let client = AgentClient::new(client, host, port);
        client
            .status()
            .await
            .with_context(|| format!("agent on host {host} is unreachable"))?;

        Ok(AgentConn {
            host: host.to_string(),
            client,
        })
    }
}

/// Work items that know which host they belong to.
pub trait OnHost {
    fn host(&self) -> &str;
}

impl OnHost for crate::cluster::SegConfig {
    fn host(&self) -> &str {
        &self.hostname
    }
}

/// Generic host-tagged payload for steps whose work items are not segment
/// descriptors.
impl<T> OnHost for (String, T) {
    fn host(&self) -> &str {
        &self.0
    }
}

/// Partition `items` by host and call `f` once per host that has a
/// non-empty slice, in parallel. Hosts with no items get no RPC. The result
/// is `Ok` iff every host succeeded; otherwise the failing hosts' errors are
/// composed into one error (a single failure is returned unwrapped). The
/// order of constituents is unspecified.
pub async fn dispatch_to_hosts<S, F, Fut>(
    conns: &[AgentConn],
    items: Vec<S>,
    cancel: &CancellationToken,
    f: F,
) -> anyhow::Result<()>
where
    S: OnHost + Send + 'static,
    F: Fn(AgentConn, Vec<S>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut by_host: BTreeMap<String, Vec<S>> = BTreeMap::new();
    for item in items {
        by_host.entry(item.host().to_string()).or_default().push(item);
    }

    let mut errors = ErrorList::new();
    let mut tasks = JoinSet::new();
    for (host, slice) in by_host {
        let Some(conn) = conns.iter().find(|conn| conn.host == host) else {
            errors.push(anyhow!("no agent connection for host {host}"));
            continue;
        };

        let conn = conn.clone();
        let cancel = cancel.clone();
        let f = f.clone();
        tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(anyhow!("operation cancelled on host {host}")),
                result = f(conn, slice) => result.with_context(|| format!("on host {host}")),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(err),
            Err(join_err) => errors.push(anyhow!(join_err).context("host dispatch task aborted")),
        }
    }

    errors.into_result()
}

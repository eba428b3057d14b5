//! HTTP client for the per-host agent API.

use anyhow::Context;
use serde::Serialize;
use upgrade_api::requests::{
    ArchiveLogDirectoryRequest, DeleteDataDirectoriesRequest, RenameDirectoriesRequest,
    UpgradePrimariesRequest,
};
use upgrade_api::responses::ErrorResponse;
use utils::error_list::ErrorList;

#[derive(Debug, Clone)]
pub struct AgentClient {
    endpoint: String,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(client: reqwest::Client, host: &str, port: u16) -> Self {
        AgentClient {
            endpoint: format!("http://{host}:{port}"),
            client,
        }
    }

    pub async fn archive_log_directory(&self, request: &ArchiveLogDirectoryRequest) -> anyhow::Result<()> {
        self.post("archive_log_directory", request).await
    }

    pub async fn rename_directories(&self, request: &RenameDirectoriesRequest) -> anyhow::Result<()> {
        self.post("rename_directories", request).await
    }

    pub async fn delete_data_directories(
        &self,
        request: &DeleteDataDirectoriesRequest,
    ) -> anyhow::Result<()> {
        self.post("delete_data_directories", request).await
    }

    pub async fn upgrade_primaries(&self, request: &UpgradePrimariesRequest) -> anyhow::Result<()> {
        self.post("upgrade_primaries", request).await
    }

    /// Liveness probe used while establishing connections.
    pub async fn status(&self) -> anyhow::Result<()> {
        let uri = format!("{}/status", self.endpoint);
        let resp = self
            .client
            .get(&uri)
            .send()
            .await
            .with_context(|| format!("GET {uri}"))?;
        resp.error_for_status()
            .with_context(|| format!("GET {uri}"))?;
        Ok(())
    }

    /// All mutating operations reply empty-on-success; a failure reply
    /// carries the agent-side error constituents, which are rebuilt into an
    /// [`ErrorList`] so hub-side aggregation nests naturally.
    async fn post<R: Serialize>(&self, path: &str, request: &R) -> anyhow::Result<()> {
        let uri = format!("{}/{path}", self.endpoint);
        let resp = self
            .client
            .post(&uri)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {uri}"))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        match resp.json::<ErrorResponse>().await {
            Ok(body) if !body.errors.is_empty() => {
                let errors: Vec<anyhow::Error> =
                    body.errors.into_iter().map(anyhow::Error::msg).collect();
                ErrorList::from(errors)
                    .into_result()
                    .with_context(|| format!("agent returned {status}"))
            }
            Ok(_) | Err(_) => anyhow::bail!("agent returned {status} with an unreadable body"),
        }
    }
}

//! Aggregator and keep-alive notifications
//!
//! Every call here is best-effort: failures are logged and reported as
//! [`NotifyOutcome::Failed`], never as errors.

use argonode_proto::{decode_subscription, is_node_link};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_AUTO_ACCESS_URL: &str = "https://oooo.serv00.net/add-url";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Not configured, or nothing to send
    Skipped,
    Sent,
    /// Subscription URL was registered on an earlier run
    AlreadyRegistered,
    Failed,
}

#[derive(Debug, Serialize)]
struct NodesPayload<'a> {
    nodes: &'a [String],
}

#[derive(Debug, Serialize)]
struct SubscriptionPayload {
    subscription: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AutoAccessPayload<'a> {
    url: &'a str,
}

/// Pushes node information to the configured aggregator
#[derive(Debug, Clone)]
pub struct UploadNotifier {
    client: reqwest::Client,
    upload_url: Option<String>,
    project_url: Option<String>,
    sub_path: String,
    auto_access: bool,
    auto_access_url: String,
}

impl UploadNotifier {
    pub fn new(client: reqwest::Client, sub_path: impl Into<String>) -> Self {
        Self {
            client,
            upload_url: None,
            project_url: None,
            sub_path: sub_path.into(),
            auto_access: false,
            auto_access_url: DEFAULT_AUTO_ACCESS_URL.to_string(),
        }
    }

    pub fn with_upload_url(mut self, url: Option<&str>) -> Self {
        self.upload_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_project_url(mut self, url: Option<&str>) -> Self {
        self.project_url = url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_auto_access(mut self, enabled: bool) -> Self {
        self.auto_access = enabled;
        self
    }

    pub fn with_auto_access_url(mut self, url: impl Into<String>) -> Self {
        self.auto_access_url = url.into();
        self
    }

    /// Ask the aggregator to forget the nodes of a previous run
    ///
    /// Reads the base64 payload left in `sub_file`. A missing file or one
    /// without node links sends nothing.
    pub async fn delete_stale_nodes(&self, sub_file: &Path) -> NotifyOutcome {
        let Some(upload_url) = &self.upload_url else {
            return NotifyOutcome::Skipped;
        };

        let payload = match tokio::fs::read_to_string(sub_file).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!("No previous subscription at {:?}: {}", sub_file, e);
                return NotifyOutcome::Skipped;
            }
        };

        let nodes = match decode_subscription(&payload) {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("Previous subscription is not decodable: {}", e);
                return NotifyOutcome::Skipped;
            }
        };
        if nodes.is_empty() {
            return NotifyOutcome::Skipped;
        }

        let url = format!("{}/api/delete-nodes", upload_url);
        match self.post(&url, &NodesPayload { nodes: &nodes }).await {
            Ok(_) => {
                info!("Deleted {} stale node(s) from aggregator", nodes.len());
                NotifyOutcome::Sent
            }
            Err(e) => {
                debug!("Stale node deletion failed: {}", e);
                NotifyOutcome::Failed
            }
        }
    }

    /// Register the subscription URL, or push raw node links
    ///
    /// With a project URL the aggregator pulls `{project}/{sub_path}`
    /// itself; otherwise the lines of `list_file` are uploaded.
    pub async fn upload(&self, list_file: &Path) -> NotifyOutcome {
        let Some(upload_url) = &self.upload_url else {
            return NotifyOutcome::Skipped;
        };

        if let Some(project_url) = &self.project_url {
            return self.register_subscription(upload_url, project_url).await;
        }

        let content = match tokio::fs::read_to_string(list_file).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No node list at {:?}: {}", list_file, e);
                return NotifyOutcome::Skipped;
            }
        };

        let nodes: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| is_node_link(line))
            .map(str::to_string)
            .collect();
        if nodes.is_empty() {
            return NotifyOutcome::Skipped;
        }

        let url = format!("{}/api/add-nodes", upload_url);
        match self.post(&url, &NodesPayload { nodes: &nodes }).await {
            Ok(_) => {
                info!("📤 Uploaded {} node(s) to aggregator", nodes.len());
                NotifyOutcome::Sent
            }
            Err(e) => {
                warn!("Node upload failed: {}", e);
                NotifyOutcome::Failed
            }
        }
    }

    async fn register_subscription(&self, upload_url: &str, project_url: &str) -> NotifyOutcome {
        let url = format!("{}/api/add-subscriptions", upload_url);
        let payload = SubscriptionPayload {
            subscription: vec![format!("{}/{}", project_url, self.sub_path)],
        };

        match self.post(&url, &payload).await {
            Ok(_) => {
                info!("📤 Subscription registered with aggregator");
                NotifyOutcome::Sent
            }
            Err(NotifyError::Status { status: 400, .. }) => {
                info!("Subscription already registered with aggregator");
                NotifyOutcome::AlreadyRegistered
            }
            Err(e) => {
                warn!("Subscription registration failed: {}", e);
                NotifyOutcome::Failed
            }
        }
    }

    /// Add the project URL to the keep-alive service
    pub async fn register_auto_access(&self) -> NotifyOutcome {
        if !self.auto_access {
            return NotifyOutcome::Skipped;
        }
        let Some(project_url) = &self.project_url else {
            debug!("Auto-access enabled without a project URL, skipping");
            return NotifyOutcome::Skipped;
        };

        match self
            .post(&self.auto_access_url, &AutoAccessPayload { url: project_url })
            .await
        {
            Ok(_) => {
                info!("Automatic access task added");
                NotifyOutcome::Sent
            }
            Err(e) => {
                warn!("Failed to add automatic access task: {}", e);
                NotifyOutcome::Failed
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, NotifyError> {
        let response = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|source| NotifyError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

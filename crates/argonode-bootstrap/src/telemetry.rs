//! Monitoring agent command lines and config file
//!
//! Two agent generations are supported. When a separate port is configured
//! the agent is driven entirely by flags; otherwise the server address
//! carries the port and the agent reads a generated YAML file.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::artifacts::ArtifactRole;

/// Ports on which the monitoring server terminates TLS
const TLS_PORTS: [u16; 6] = [443, 8443, 2096, 2087, 2083, 2053];

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to serialize agent config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to write agent config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub server: String,
    pub port: Option<u16>,
    pub key: String,
}

impl TelemetryConfig {
    pub fn new(server: impl Into<String>, port: Option<u16>, key: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            key: key.into(),
        }
    }

    /// Which agent binary this configuration needs
    pub fn role(&self) -> ArtifactRole {
        if self.port.is_some() {
            ArtifactRole::TelemetryAgentV1
        } else {
            ArtifactRole::TelemetryAgentV0
        }
    }

    /// Whether the agent should talk TLS to the server
    ///
    /// Uses the explicit port, or the one embedded in `host:port`.
    pub fn tls(&self) -> bool {
        let port = self.port.or_else(|| {
            self.server
                .rsplit_once(':')
                .and_then(|(_, port)| port.parse().ok())
        });
        port.map(|p| TLS_PORTS.contains(&p)).unwrap_or(false)
    }

    /// Agent arguments; `config_file` is only used by the YAML-driven agent
    pub fn args(&self, config_file: &Path) -> Vec<String> {
        match self.port {
            Some(port) => {
                let mut args = vec![
                    "-s".to_string(),
                    format!("{}:{}", self.server, port),
                    "-p".to_string(),
                    self.key.clone(),
                ];
                if self.tls() {
                    args.push("--tls".to_string());
                }
                args.extend(
                    [
                        "--disable-auto-update",
                        "--report-delay",
                        "4",
                        "--skip-conn",
                        "--skip-procs",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                args
            }
            None => vec!["-c".to_string(), config_file.display().to_string()],
        }
    }

    /// YAML config for the port-less agent
    pub fn config_yaml(&self, agent_id: Uuid) -> Result<String, TelemetryError> {
        let config = AgentConfigFile {
            client_secret: self.key.clone(),
            debug: false,
            disable_auto_update: true,
            disable_command_execute: false,
            disable_force_update: true,
            disable_nat: false,
            disable_send_query: false,
            gpu: false,
            insecure_tls: true,
            ip_report_period: 1800,
            report_delay: 4,
            server: self.server.clone(),
            skip_connection_count: true,
            skip_procs_count: true,
            temperature: false,
            tls: self.tls(),
            use_gitee_to_upgrade: false,
            use_ipv6_country_code: false,
            uuid: agent_id.to_string(),
        };
        Ok(serde_yaml::to_string(&config)?)
    }

    /// Write the YAML config when this agent needs one
    pub async fn write_config(&self, path: &Path, agent_id: Uuid) -> Result<(), TelemetryError> {
        if self.port.is_some() {
            return Ok(());
        }

        let yaml = self.config_yaml(agent_id)?;
        tokio::fs::write(path, yaml)
            .await
            .map_err(|source| TelemetryError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Monitoring agent config written to {:?}", path);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AgentConfigFile {
    client_secret: String,
    debug: bool,
    disable_auto_update: bool,
    disable_command_execute: bool,
    disable_force_update: bool,
    disable_nat: bool,
    disable_send_query: bool,
    gpu: bool,
    insecure_tls: bool,
    ip_report_period: u32,
    report_delay: u32,
    server: String,
    skip_connection_count: bool,
    skip_procs_count: bool,
    temperature: bool,
    tls: bool,
    use_gitee_to_upgrade: bool,
    use_ipv6_country_code: bool,
    uuid: String,
}

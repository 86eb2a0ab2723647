//! Tunnel client modes and their command lines
//!
//! - **quick**: no credentials, the service assigns a random hostname that
//!   is only announced in the client's log file
//! - **token**: a dashboard-issued token, hostname known in advance
//! - **credentials**: a `TunnelSecret` JSON blob; a local ingress config is
//!   written next to it

use regex_lite::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

const TOKEN_PATTERN: &str = r"^[A-Za-z0-9=]{120,250}$";
const CREDENTIALS_MARKER: &str = "TunnelSecret";

/// Tunnel configuration errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Invalid tunnel credentials: {0}")]
    InvalidCredentials(String),

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize tunnel config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Files the tunnel client reads or writes inside the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelFiles {
    /// Quick-tunnel log scraped for the assigned hostname
    pub log_file: PathBuf,
    /// Credentials JSON, written verbatim
    pub credentials_file: PathBuf,
    /// Ingress config pointing at the credentials file
    pub config_file: PathBuf,
}

impl TunnelFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            log_file: dir.join("boot.log"),
            credentials_file: dir.join("tunnel.json"),
            config_file: dir.join("tunnel.yml"),
        }
    }
}

/// How the tunnel client authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelMode {
    Quick {
        local_port: u16,
    },
    Token {
        token: String,
        domain: String,
    },
    Credentials {
        credentials_json: String,
        tunnel_id: String,
        domain: String,
        local_port: u16,
    },
}

impl TunnelMode {
    /// Pick the mode from the configured auth value and domain
    ///
    /// Token and credentials tunnels are only used together with the
    /// domain they serve; without one the hostname has to be discovered,
    /// so the quick tunnel is used instead.
    pub fn from_settings(
        auth: Option<&str>,
        domain: Option<&str>,
        local_port: u16,
    ) -> Result<Self, TunnelError> {
        let auth = auth.map(str::trim).filter(|a| !a.is_empty());
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());

        let Some(auth) = auth else {
            return Ok(TunnelMode::Quick { local_port });
        };

        if token_pattern().is_match(auth) {
            let Some(domain) = domain else {
                warn!("Tunnel token given without a domain, falling back to a quick tunnel");
                return Ok(TunnelMode::Quick { local_port });
            };

            return Ok(TunnelMode::Token {
                token: auth.to_string(),
                domain: domain.to_string(),
            });
        }

        if auth.contains(CREDENTIALS_MARKER) {
            let Some(domain) = domain else {
                warn!("Tunnel credentials given without a domain, falling back to a quick tunnel");
                return Ok(TunnelMode::Quick { local_port });
            };

            return Ok(TunnelMode::Credentials {
                credentials_json: auth.to_string(),
                tunnel_id: tunnel_id_from_credentials(auth)?,
                domain: domain.to_string(),
                local_port,
            });
        }

        warn!("Unrecognised tunnel auth value, using a quick tunnel");
        Ok(TunnelMode::Quick { local_port })
    }

    /// Whether the hostname must be discovered from the log
    pub fn is_quick(&self) -> bool {
        matches!(self, TunnelMode::Quick { .. })
    }

    /// Hostname served by a token or credentials tunnel
    ///
    /// `None` for quick tunnels, whose hostname only shows up in the log.
    pub fn static_domain(&self) -> Option<&str> {
        match self {
            TunnelMode::Quick { .. } => None,
            TunnelMode::Token { domain, .. } | TunnelMode::Credentials { domain, .. } => {
                Some(domain)
            }
        }
    }

    /// Command line for the tunnel client
    pub fn args(&self, files: &TunnelFiles) -> Vec<String> {
        let mut args: Vec<String> = ["tunnel", "--edge-ip-version", "auto"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        match self {
            TunnelMode::Quick { local_port } => {
                args.extend([
                    "--no-autoupdate".to_string(),
                    "--protocol".to_string(),
                    "http2".to_string(),
                    "--logfile".to_string(),
                    files.log_file.display().to_string(),
                    "--loglevel".to_string(),
                    "info".to_string(),
                    "--url".to_string(),
                    format!("http://localhost:{}", local_port),
                ]);
            }
            TunnelMode::Token { token, .. } => {
                args.extend([
                    "--no-autoupdate".to_string(),
                    "--protocol".to_string(),
                    "http2".to_string(),
                    "run".to_string(),
                    "--token".to_string(),
                    token.clone(),
                ]);
            }
            TunnelMode::Credentials { .. } => {
                args.extend([
                    "--config".to_string(),
                    files.config_file.display().to_string(),
                    "run".to_string(),
                ]);
            }
        }

        args
    }

    /// Write `tunnel.json` and `tunnel.yml` for credential-file tunnels
    ///
    /// Other modes need no files.
    pub async fn write_files(&self, files: &TunnelFiles) -> Result<(), TunnelError> {
        let TunnelMode::Credentials {
            credentials_json,
            tunnel_id,
            domain,
            local_port,
        } = self
        else {
            return Ok(());
        };

        write(&files.credentials_file, credentials_json.as_bytes()).await?;

        let config = IngressConfig {
            tunnel: tunnel_id.clone(),
            credentials_file: files.credentials_file.display().to_string(),
            protocol: "http2".to_string(),
            ingress: vec![
                IngressRule {
                    hostname: Some(domain.clone()),
                    service: format!("http://localhost:{}", local_port),
                    origin_request: Some(OriginRequest {
                        no_tls_verify: true,
                    }),
                },
                IngressRule {
                    hostname: None,
                    service: "http_status:404".to_string(),
                    origin_request: None,
                },
            ],
        };
        let yaml = serde_yaml::to_string(&config)?;
        write(&files.config_file, yaml.as_bytes()).await?;

        info!("Tunnel credentials written for {}", domain);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct IngressConfig {
    tunnel: String,
    #[serde(rename = "credentials-file")]
    credentials_file: String,
    protocol: String,
    ingress: Vec<IngressRule>,
}

#[derive(Debug, Serialize)]
struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    service: String,
    #[serde(rename = "originRequest", skip_serializing_if = "Option::is_none")]
    origin_request: Option<OriginRequest>,
}

#[derive(Debug, Serialize)]
struct OriginRequest {
    #[serde(rename = "noTLSVerify")]
    no_tls_verify: bool,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("valid static pattern"))
}

fn tunnel_id_from_credentials(json: &str) -> Result<String, TunnelError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| TunnelError::InvalidCredentials(e.to_string()))?;

    value
        .get("TunnelID")
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| TunnelError::InvalidCredentials("missing TunnelID".to_string()))
}

async fn write(path: &Path, contents: &[u8]) -> Result<(), TunnelError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| TunnelError::Write {
            path: path.to_path_buf(),
            source,
        })
}

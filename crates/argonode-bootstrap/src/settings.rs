//! Runtime settings
//!
//! Every setting can be given as a flag or through the environment; flags
//! win. Empty values count as unset.

use argonode_proto::{
    Identity, DEFAULT_CLIENT_ID, DEFAULT_EDGE_ADDRESS, DEFAULT_EDGE_PORT, DEFAULT_TUNNEL_PORT,
};
use argonode_tunnel::{TunnelError, TunnelMode};
use clap::Args;
use std::path::PathBuf;
use uuid::Uuid;

use crate::telemetry::TelemetryConfig;

pub const DEFAULT_HTTP_PORT: u16 = 3000;

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Client UUID used by every protocol
    #[arg(long, env = "UUID", default_value = DEFAULT_CLIENT_ID)]
    pub uuid: Uuid,

    /// Node name prefixed to the ISP label in share links
    #[arg(long, env = "NAME")]
    pub name: Option<String>,

    /// CDN edge address advertised in share links
    #[arg(long = "cfip", env = "CFIP", default_value = DEFAULT_EDGE_ADDRESS)]
    pub edge_address: String,

    /// CDN edge port advertised in share links
    #[arg(long = "cfport", env = "CFPORT", default_value_t = DEFAULT_EDGE_PORT)]
    pub edge_port: u16,

    /// Local port the tunnel forwards to
    #[arg(long, env = "ARGO_PORT", default_value_t = DEFAULT_TUNNEL_PORT)]
    pub argo_port: u16,

    /// Fixed tunnel domain (requires --argo-auth)
    #[arg(long, env = "ARGO_DOMAIN")]
    pub argo_domain: Option<String>,

    /// Tunnel token or TunnelSecret credentials JSON
    #[arg(long, env = "ARGO_AUTH")]
    pub argo_auth: Option<String>,

    /// Monitoring server, `host` or `host:port`
    #[arg(long, env = "NEZHA_SERVER")]
    pub nezha_server: Option<String>,

    /// Monitoring server port; selects the flag-driven agent
    #[arg(long, env = "NEZHA_PORT")]
    pub nezha_port: Option<u16>,

    /// Monitoring agent secret
    #[arg(long, env = "NEZHA_KEY")]
    pub nezha_key: Option<String>,

    /// Aggregator receiving node lists or the subscription URL
    #[arg(long, env = "UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Public URL of this deployment
    #[arg(long, env = "PROJECT_URL")]
    pub project_url: Option<String>,

    /// Register PROJECT_URL with the keep-alive service
    #[arg(long, env = "AUTO_ACCESS", value_parser = clap::builder::BoolishValueParser::new())]
    pub auto_access: bool,

    /// Working directory for binaries and generated files
    #[arg(long, env = "FILE_PATH", default_value = "./tmp")]
    pub file_path: PathBuf,

    /// Path segment serving the subscription
    #[arg(long, env = "SUB_PATH", default_value = argonode_api::DEFAULT_SUB_PATH)]
    pub sub_path: String,

    /// HTTP server port
    #[arg(long, env = "SERVER_PORT")]
    pub server_port: Option<u16>,

    /// HTTP server port, used when SERVER_PORT is unset
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Tunnel hostname discovery rounds before giving up
    #[arg(long, env = "DISCOVERY_ROUNDS", default_value_t = 8)]
    pub discovery_rounds: u32,
}

impl Settings {
    pub fn http_port(&self) -> u16 {
        self.server_port.or(self.port).unwrap_or(DEFAULT_HTTP_PORT)
    }

    pub fn identity(&self) -> Identity {
        let identity = Identity::new(self.uuid)
            .with_listen_port(self.http_port())
            .with_tunnel_port(self.argo_port)
            .with_edge(self.edge_address.trim(), self.edge_port);

        match non_empty(&self.name) {
            Some(name) => identity.with_display_name(name),
            None => identity,
        }
    }

    /// Monitoring agent setup, when both server and key are configured
    pub fn telemetry(&self) -> Option<TelemetryConfig> {
        let server = non_empty(&self.nezha_server)?;
        let key = non_empty(&self.nezha_key)?;
        Some(TelemetryConfig::new(server, self.nezha_port, key))
    }

    pub fn tunnel_mode(&self) -> Result<TunnelMode, TunnelError> {
        TunnelMode::from_settings(
            non_empty(&self.argo_auth),
            non_empty(&self.argo_domain),
            self.argo_port,
        )
    }

    pub fn upload_url(&self) -> Option<&str> {
        non_empty(&self.upload_url).map(|url| url.trim_end_matches('/'))
    }

    pub fn project_url(&self) -> Option<&str> {
        non_empty(&self.project_url).map(|url| url.trim_end_matches('/'))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

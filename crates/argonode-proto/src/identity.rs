//! Node identity shared by the config generator and the link synthesizer

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static parameters describing this node
///
/// Built once at startup from settings and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Client UUID shared by every protocol (vless/vmess id, trojan password)
    pub client_id: Uuid,
    /// Operator-chosen node name (the ISP label is appended in links)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Port of the subscription HTTP server
    pub listen_port: u16,
    /// Port the tunnel forwards to; the public multiplexed inbound
    pub tunnel_port: u16,
    /// CDN edge address advertised to clients
    pub edge_address: String,
    /// CDN edge port advertised to clients
    pub edge_port: u16,
}

impl Identity {
    /// Create an identity with the default edge and port settings
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            display_name: None,
            listen_port: 3000,
            tunnel_port: crate::DEFAULT_TUNNEL_PORT,
            edge_address: crate::DEFAULT_EDGE_ADDRESS.to_string(),
            edge_port: crate::DEFAULT_EDGE_PORT,
        }
    }

    /// Set the node name; empty names are treated as unset
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }

    /// Set the subscription server port
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Set the tunnel-facing port
    pub fn with_tunnel_port(mut self, port: u16) -> Self {
        self.tunnel_port = port;
        self
    }

    /// Set the advertised edge address and port
    pub fn with_edge(mut self, address: impl Into<String>, port: u16) -> Self {
        self.edge_address = address.into();
        self.edge_port = port;
        self
    }
}

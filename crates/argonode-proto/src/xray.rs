//! Proxy engine configuration document
//!
//! One public vless inbound listens on the tunnel-facing port and routes
//! connections by websocket path to four loopback-only listeners:
//!
//! | path            | port | listener            |
//! |-----------------|------|---------------------|
//! | (default)       | 3001 | vless over tcp      |
//! | `/vless-argo`   | 3002 | vless over ws       |
//! | `/vmess-argo`   | 3003 | vmess over ws       |
//! | `/trojan-argo`  | 3004 | trojan over ws      |
//!
//! Engine logging is switched off entirely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Identity;

pub const INTERNAL_PLAIN_PORT: u16 = 3001;
pub const INTERNAL_VLESS_WS_PORT: u16 = 3002;
pub const INTERNAL_VMESS_WS_PORT: u16 = 3003;
pub const INTERNAL_TROJAN_WS_PORT: u16 = 3004;

pub const VLESS_WS_PATH: &str = "/vless-argo";
pub const VMESS_WS_PATH: &str = "/vmess-argo";
pub const TROJAN_WS_PATH: &str = "/trojan-argo";

const LOOPBACK: &str = "127.0.0.1";
const DOH_SERVER: &str = "https+local://8.8.8.8/dns-query";

/// Configuration document errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to serialize proxy config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Inbound protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundProtocol {
    Vless,
    Vmess,
    Trojan,
}

/// Stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tcp,
    Ws,
}

/// Engine log section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    pub access: String,
    pub error: String,
    pub loglevel: String,
}

impl LogSettings {
    /// No access log, no error log
    pub fn disabled() -> Self {
        Self {
            access: "/dev/null".to_string(),
            error: "/dev/null".to_string(),
            loglevel: "none".to_string(),
        }
    }
}

/// Client entry of an inbound
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u16>,
}

/// Path-keyed routing rule on the public inbound
///
/// A rule without a path is the default for bare connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub dest: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSettings {
    pub clients: Vec<Client>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decryption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<Fallback>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsSettings {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sniffing {
    pub enabled: bool,
    pub dest_override: Vec<String>,
    pub metadata_only: bool,
}

impl Sniffing {
    fn standard() -> Self {
        Self {
            enabled: true,
            dest_override: vec!["http".to_string(), "tls".to_string(), "quic".to_string()],
            metadata_only: false,
        }
    }
}

/// A listener of the proxy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub protocol: InboundProtocol,
    pub settings: InboundSettings,
    pub stream_settings: StreamSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffing: Option<Sniffing>,
}

impl Inbound {
    /// Whether this listener only accepts loopback connections
    pub fn is_loopback(&self) -> bool {
        self.listen.as_deref() == Some(LOOPBACK)
    }

    /// Websocket path, if the listener uses the ws transport
    pub fn ws_path(&self) -> Option<&str> {
        self.stream_settings
            .ws_settings
            .as_ref()
            .map(|ws| ws.path.as_str())
    }

    fn websocket(port: u16, protocol: InboundProtocol, client: Client, path: &str) -> Self {
        let decryption = match protocol {
            InboundProtocol::Vless => Some("none".to_string()),
            _ => None,
        };
        let security = match protocol {
            InboundProtocol::Vmess => None,
            _ => Some("none".to_string()),
        };

        Self {
            port,
            listen: Some(LOOPBACK.to_string()),
            protocol,
            settings: InboundSettings {
                clients: vec![client],
                decryption,
                fallbacks: None,
            },
            stream_settings: StreamSettings {
                network: Network::Ws,
                security,
                ws_settings: Some(WsSettings {
                    path: path.to_string(),
                }),
            },
            sniffing: Some(Sniffing::standard()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSettings {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub protocol: String,
    pub tag: String,
}

/// Complete proxy engine configuration (`config.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfigDocument {
    pub log: LogSettings,
    pub inbounds: Vec<Inbound>,
    pub dns: DnsSettings,
    pub outbounds: Vec<Outbound>,
}

impl ProxyConfigDocument {
    /// Build the configuration for this node
    ///
    /// Pure and deterministic: the same identity always yields the same document.
    pub fn generate(identity: &Identity) -> Self {
        let id = identity.client_id.to_string();

        let public = Inbound {
            port: identity.tunnel_port,
            listen: None,
            protocol: InboundProtocol::Vless,
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(id.clone()),
                    flow: Some("xtls-rprx-vision".to_string()),
                    ..Default::default()
                }],
                decryption: Some("none".to_string()),
                fallbacks: Some(vec![
                    Fallback {
                        path: None,
                        dest: INTERNAL_PLAIN_PORT,
                    },
                    Fallback {
                        path: Some(VLESS_WS_PATH.to_string()),
                        dest: INTERNAL_VLESS_WS_PORT,
                    },
                    Fallback {
                        path: Some(VMESS_WS_PATH.to_string()),
                        dest: INTERNAL_VMESS_WS_PORT,
                    },
                    Fallback {
                        path: Some(TROJAN_WS_PATH.to_string()),
                        dest: INTERNAL_TROJAN_WS_PORT,
                    },
                ]),
            },
            stream_settings: StreamSettings {
                network: Network::Tcp,
                security: None,
                ws_settings: None,
            },
            sniffing: None,
        };

        let plain = Inbound {
            port: INTERNAL_PLAIN_PORT,
            listen: Some(LOOPBACK.to_string()),
            protocol: InboundProtocol::Vless,
            settings: InboundSettings {
                clients: vec![Client {
                    id: Some(id.clone()),
                    ..Default::default()
                }],
                decryption: Some("none".to_string()),
                fallbacks: None,
            },
            stream_settings: StreamSettings {
                network: Network::Tcp,
                security: Some("none".to_string()),
                ws_settings: None,
            },
            sniffing: None,
        };

        let vless_ws = Inbound::websocket(
            INTERNAL_VLESS_WS_PORT,
            InboundProtocol::Vless,
            Client {
                id: Some(id.clone()),
                level: Some(0),
                ..Default::default()
            },
            VLESS_WS_PATH,
        );

        let vmess_ws = Inbound::websocket(
            INTERNAL_VMESS_WS_PORT,
            InboundProtocol::Vmess,
            Client {
                id: Some(id.clone()),
                alter_id: Some(0),
                ..Default::default()
            },
            VMESS_WS_PATH,
        );

        let trojan_ws = Inbound::websocket(
            INTERNAL_TROJAN_WS_PORT,
            InboundProtocol::Trojan,
            Client {
                password: Some(id),
                ..Default::default()
            },
            TROJAN_WS_PATH,
        );

        Self {
            log: LogSettings::disabled(),
            inbounds: vec![public, plain, vless_ws, vmess_ws, trojan_ws],
            dns: DnsSettings {
                servers: vec![DOH_SERVER.to_string()],
            },
            outbounds: vec![
                Outbound {
                    protocol: "freedom".to_string(),
                    tag: "direct".to_string(),
                },
                Outbound {
                    protocol: "blackhole".to_string(),
                    tag: "block".to_string(),
                },
            ],
        }
    }

    /// The public multiplexed inbound (the only one not bound to loopback)
    pub fn public_inbound(&self) -> Option<&Inbound> {
        self.inbounds.iter().find(|inbound| !inbound.is_loopback())
    }

    /// Loopback-only listeners the public inbound falls back to
    pub fn internal_inbounds(&self) -> impl Iterator<Item = &Inbound> {
        self.inbounds.iter().filter(|inbound| inbound.is_loopback())
    }

    /// Serialize as the engine expects it on disk
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity::new(Uuid::parse_str(crate::DEFAULT_CLIENT_ID).unwrap()).with_tunnel_port(8001)
    }

    #[test]
    fn test_listener_ports() {
        let doc = ProxyConfigDocument::generate(&identity());

        let ports: HashSet<u16> = doc.inbounds.iter().map(|i| i.port).collect();
        assert_eq!(ports, HashSet::from([8001, 3001, 3002, 3003, 3004]));
        assert_eq!(doc.internal_inbounds().count(), 4);
    }

    #[test]
    fn test_single_public_inbound_with_fallbacks() {
        let doc = ProxyConfigDocument::generate(&identity());

        let public: Vec<_> = doc.inbounds.iter().filter(|i| !i.is_loopback()).collect();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].port, 8001);
        assert_eq!(public[0].stream_settings.network, Network::Tcp);

        let fallbacks = public[0].settings.fallbacks.as_ref().unwrap();
        assert_eq!(fallbacks.len(), 4);
        assert_eq!(fallbacks.iter().filter(|f| f.path.is_none()).count(), 1);

        let routed: Vec<(Option<&str>, u16)> = fallbacks
            .iter()
            .map(|f| (f.path.as_deref(), f.dest))
            .collect();
        assert_eq!(
            routed,
            vec![
                (None, 3001),
                (Some("/vless-argo"), 3002),
                (Some("/vmess-argo"), 3003),
                (Some("/trojan-argo"), 3004),
            ]
        );
    }

    #[test]
    fn test_internal_listeners_match_fallback_paths() {
        let doc = ProxyConfigDocument::generate(&identity());

        for fallback in doc.public_inbound().unwrap().settings.fallbacks.iter().flatten() {
            let target = doc
                .internal_inbounds()
                .find(|i| i.port == fallback.dest)
                .expect("fallback points at an internal listener");
            assert_eq!(target.ws_path(), fallback.path.as_deref());
        }
    }

    #[test]
    fn test_trojan_uses_client_id_as_password() {
        let doc = ProxyConfigDocument::generate(&identity());
        let trojan = doc
            .inbounds
            .iter()
            .find(|i| i.protocol == InboundProtocol::Trojan)
            .unwrap();

        assert_eq!(
            trojan.settings.clients[0].password.as_deref(),
            Some(crate::DEFAULT_CLIENT_ID)
        );
        assert!(trojan.settings.clients[0].id.is_none());
    }

    #[test]
    fn test_serialized_field_names() {
        let doc = ProxyConfigDocument::generate(&identity());
        let json: serde_json::Value = serde_json::from_str(&doc.to_pretty_json().unwrap()).unwrap();

        assert_eq!(json["log"]["loglevel"], "none");
        assert_eq!(json["log"]["access"], "/dev/null");
        assert_eq!(json["inbounds"][0]["protocol"], "vless");
        assert_eq!(json["inbounds"][0]["settings"]["fallbacks"][0]["dest"], 3001);
        assert!(json["inbounds"][0]["settings"]["fallbacks"][0]
            .get("path")
            .is_none());
        assert_eq!(
            json["inbounds"][3]["streamSettings"]["wsSettings"]["path"],
            "/vmess-argo"
        );
        assert_eq!(json["inbounds"][3]["settings"]["clients"][0]["alterId"], 0);
        assert_eq!(
            json["inbounds"][2]["sniffing"]["destOverride"],
            serde_json::json!(["http", "tls", "quic"])
        );
        assert_eq!(json["outbounds"][1]["tag"], "block");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = ProxyConfigDocument::generate(&identity());
        let b = ProxyConfigDocument::generate(&identity());
        assert_eq!(a, b);
    }
}

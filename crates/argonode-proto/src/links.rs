//! Share-link encodings
//!
//! Three links are produced per node, all pointing at the CDN edge and
//! carrying the tunnel hostname as SNI and Host:
//!
//! - `vless://{id}@{edge}:{port}?...#{name}`
//! - `vmess://{base64(json)}`
//! - `trojan://{id}@{edge}:{port}?...#{name}`
//!
//! The subscription payload is the three links joined by newlines and
//! base64-encoded once more. Both envelopes use the standard alphabet with
//! padding and no line wrapping.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Identity;

/// URI schemes recognised as node lines in subscription and list files
pub const NODE_SCHEMES: &[&str] = &["vless", "vmess", "trojan", "hysteria2", "tuic"];

const VLESS_PATH_ENCODED: &str = "%2Fvless-argo%3Fed%3D2560";
const TROJAN_PATH_ENCODED: &str = "%2Ftrojan-argo%3Fed%3D2560";
const VMESS_PATH: &str = "/vmess-argo?ed=2560";
const FINGERPRINT: &str = "firefox";

/// Link decoding errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid vmess descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not a {expected} link: {link}")]
    Scheme { expected: &'static str, link: String },
}

/// Name shown for the node in client applications
///
/// `{name}-{isp}` when a node name is configured, `{isp}` otherwise.
pub fn display_name(configured: Option<&str>, isp_label: &str) -> String {
    match configured.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{}-{}", name, isp_label),
        None => isp_label.to_string(),
    }
}

/// vmess link body, serialized in this exact field order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmessDescriptor {
    pub v: String,
    pub ps: String,
    pub add: String,
    pub port: u16,
    pub id: String,
    pub aid: String,
    pub scy: String,
    pub net: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub path: String,
    pub tls: String,
    pub sni: String,
    pub alpn: String,
    pub fp: String,
}

impl VmessDescriptor {
    fn new(identity: &Identity, domain: &str, name: &str) -> Self {
        Self {
            v: "2".to_string(),
            ps: name.to_string(),
            add: identity.edge_address.clone(),
            port: identity.edge_port,
            id: identity.client_id.to_string(),
            aid: "0".to_string(),
            scy: "none".to_string(),
            net: "ws".to_string(),
            kind: "none".to_string(),
            host: domain.to_string(),
            path: VMESS_PATH.to_string(),
            tls: "tls".to_string(),
            sni: domain.to_string(),
            alpn: String::new(),
            fp: FINGERPRINT.to_string(),
        }
    }

    /// Decode a `vmess://` link back into its descriptor
    pub fn parse(link: &str) -> Result<Self, LinkError> {
        let body = link
            .strip_prefix("vmess://")
            .ok_or_else(|| LinkError::Scheme {
                expected: "vmess",
                link: link.to_string(),
            })?;
        let json = String::from_utf8(STANDARD.decode(body.trim())?)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// The three share links for one discovered hostname plus the combined payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBundle {
    pub vless: String,
    pub vmess: String,
    pub trojan: String,
    /// base64 of the newline-joined links; served verbatim as the subscription
    pub combined_base64: String,
}

impl LinkBundle {
    /// Build every link for `domain`
    ///
    /// Deterministic given its inputs; the ISP label must already be resolved.
    pub fn synthesize(identity: &Identity, domain: &str, isp_label: &str) -> Self {
        let name = display_name(identity.display_name.as_deref(), isp_label);
        let id = identity.client_id;
        let edge = &identity.edge_address;
        let port = identity.edge_port;

        let vless = format!(
            "vless://{id}@{edge}:{port}?encryption=none&security=tls&sni={domain}&fp={FINGERPRINT}&type=ws&host={domain}&path={VLESS_PATH_ENCODED}#{name}"
        );

        let descriptor = VmessDescriptor::new(identity, domain, &name);
        // A struct of plain strings and integers always serializes.
        let json = serde_json::to_string(&descriptor).unwrap_or_default();
        let vmess = format!("vmess://{}", STANDARD.encode(json));

        let trojan = format!(
            "trojan://{id}@{edge}:{port}?security=tls&sni={domain}&fp={FINGERPRINT}&type=ws&host={domain}&path={TROJAN_PATH_ENCODED}#{name}"
        );

        let combined_base64 = STANDARD.encode(format!("{}\n{}\n{}", vless, vmess, trojan));

        Self {
            vless,
            vmess,
            trojan,
            combined_base64,
        }
    }

    /// Links in subscription order
    pub fn links(&self) -> [&str; 3] {
        [&self.vless, &self.vmess, &self.trojan]
    }
}

/// Decode a subscription payload into its node lines
///
/// Blank lines and lines that are not node links are dropped.
pub fn decode_subscription(payload: &str) -> Result<Vec<String>, LinkError> {
    let text = String::from_utf8(STANDARD.decode(payload.trim())?)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| is_node_link(line))
        .map(str::to_string)
        .collect())
}

/// Whether a line carries one of the known node schemes
pub fn is_node_link(line: &str) -> bool {
    NODE_SCHEMES.iter().any(|scheme| {
        line.find("://")
            .map(|idx| line[..idx].ends_with(scheme))
            .unwrap_or(false)
    })
}

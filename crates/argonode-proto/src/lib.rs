//! Argonode wire formats
//!
//! This crate defines the node identity, the proxy engine configuration
//! document, and the share-link encodings (vless, vmess, trojan) consumed
//! by proxy client applications.

pub mod identity;
pub mod links;
pub mod xray;

pub use identity::Identity;
pub use links::{
    decode_subscription, display_name, is_node_link, LinkBundle, LinkError, VmessDescriptor,
    NODE_SCHEMES,
};
pub use xray::{
    ConfigError, Fallback, Inbound, InboundProtocol, Network, ProxyConfigDocument,
    INTERNAL_PLAIN_PORT, INTERNAL_TROJAN_WS_PORT, INTERNAL_VLESS_WS_PORT, INTERNAL_VMESS_WS_PORT,
    TROJAN_WS_PATH, VLESS_WS_PATH, VMESS_WS_PATH,
};

/// Default client UUID used when none is configured
pub const DEFAULT_CLIENT_ID: &str = "9afd1229-b893-40c1-84dd-51e7ce204913";

/// Default CDN edge address advertised in share links
pub const DEFAULT_EDGE_ADDRESS: &str = "cdns.doon.eu.org";

/// Default CDN edge port advertised in share links
pub const DEFAULT_EDGE_PORT: u16 = 443;

/// Default port the tunnel forwards to (public multiplexed inbound)
pub const DEFAULT_TUNNEL_PORT: u16 = 8001;

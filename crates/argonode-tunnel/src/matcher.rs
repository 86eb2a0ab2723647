//! Hostname extraction from tunnel client log lines

use regex_lite::Regex;
use std::sync::OnceLock;

/// Quick tunnels get a generated subdomain of the provider's free domain
const QUICK_TUNNEL_PATTERN: &str = r"https?://([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.trycloudflare\.com)";

/// Endpoint the client registers quick tunnels with; shows up in error lines
const QUICK_TUNNEL_API_HOST: &str = "api.trycloudflare.com";

/// Recognises the public hostname in one line of tunnel client output
///
/// Swapping the implementation changes what counts as "the address"
/// without touching the retry loop.
pub trait HostnameMatcher: Send + Sync {
    /// Hostname carried by `line`, if any
    fn find_hostname(&self, line: &str) -> Option<String>;
}

/// Matches `https://<words>.trycloudflare.com` announcements
#[derive(Debug, Clone)]
pub struct QuickTunnelMatcher {
    pattern: &'static Regex,
}

impl QuickTunnelMatcher {
    pub fn new() -> Self {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        Self {
            pattern: PATTERN
                .get_or_init(|| Regex::new(QUICK_TUNNEL_PATTERN).expect("valid static pattern")),
        }
    }
}

impl Default for QuickTunnelMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HostnameMatcher for QuickTunnelMatcher {
    fn find_hostname(&self, line: &str) -> Option<String> {
        self.pattern
            .captures_iter(line)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .find(|host| !host.eq_ignore_ascii_case(QUICK_TUNNEL_API_HOST))
            .map(str::to_string)
    }
}

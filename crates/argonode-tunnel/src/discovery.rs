//! Public hostname discovery
//!
//! ```text
//! AwaitingStaticConfig ──(domain + auth configured)──────────────► Resolved
//!          │
//!          ▼
//!     AwaitingLog ◄──────────────────────────────┐
//!          │ poll                                │ respawn
//!          ▼                                     │
//!     ParsingLog ──(match)──► Resolved       Retrying
//!          │                                     ▲
//!          └──(round deadline, no match)─────────┘
//!                         │
//!                         └──(max rounds)──► Failed
//! ```
//!
//! The first matching line in file order wins; later announcements in the
//! same log are ignored. Rounds never overlap.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::matcher::{HostnameMatcher, QuickTunnelMatcher};
use crate::process::ProcessError;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No tunnel hostname found after {attempts} round(s)")]
    Exhausted { attempts: u32 },
}

/// Restarts the tunnel client between discovery rounds
#[async_trait]
pub trait TunnelSupervisor: Send {
    /// Stop the running client, if any
    async fn stop(&mut self) -> Result<(), ProcessError>;

    /// Start a fresh client with the same arguments
    async fn start(&mut self) -> Result<(), ProcessError>;
}

/// Polling and retry parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryTimings {
    /// Delay between two reads of the log within a round
    pub poll_interval: Duration,
    /// How long one round waits for the hostname to show up
    pub round_timeout: Duration,
    /// Pause between stopping and restarting the client after round 1
    pub respawn_backoff: Duration,
    /// Upper bound for the doubling respawn pause
    pub max_backoff: Duration,
    /// Rounds before giving up
    pub max_rounds: u32,
}

impl Default for DiscoveryTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            round_timeout: Duration::from_secs(10),
            respawn_backoff: Duration::from_secs(3),
            max_backoff: Duration::from_secs(30),
            max_rounds: 8,
        }
    }
}

impl DiscoveryTimings {
    /// Pause before the respawn that follows round `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.respawn_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    AwaitingStaticConfig,
    AwaitingLog,
    ParsingLog,
    Retrying,
    Resolved,
    Failed,
}

/// Progress of one discovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDiscoveryState {
    pub phase: DiscoveryPhase,
    /// Rounds started so far
    pub attempts: u32,
    /// Bytes of the log already scanned without a match
    pub last_log_offset: u64,
    pub discovered_domain: Option<String>,
    /// Set on success and on giving up
    pub terminal: bool,
}

impl Default for TunnelDiscoveryState {
    fn default() -> Self {
        Self {
            phase: DiscoveryPhase::AwaitingStaticConfig,
            attempts: 0,
            last_log_offset: 0,
            discovered_domain: None,
            terminal: false,
        }
    }
}

/// Recovers the tunnel's public hostname
pub struct TunnelDomainExtractor {
    log_path: PathBuf,
    matcher: Box<dyn HostnameMatcher>,
    timings: DiscoveryTimings,
    static_domain: Option<String>,
    state: TunnelDiscoveryState,
}

impl TunnelDomainExtractor {
    /// Extractor reading `log_path` with the quick-tunnel matcher
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            matcher: Box::new(QuickTunnelMatcher::new()),
            timings: DiscoveryTimings::default(),
            static_domain: None,
            state: TunnelDiscoveryState::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl HostnameMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_timings(mut self, timings: DiscoveryTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Hostname known up front (fixed tunnel with domain and auth configured)
    pub fn with_static_domain(mut self, domain: Option<String>) -> Self {
        self.static_domain = domain.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn state(&self) -> &TunnelDiscoveryState {
        &self.state
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Run discovery to completion
    ///
    /// The tunnel client is expected to be running already; it is only
    /// restarted through `supervisor` between failed rounds. Calling this
    /// again after a terminal outcome returns that outcome.
    pub async fn discover<S>(&mut self, supervisor: &mut S) -> Result<String, DiscoveryError>
    where
        S: TunnelSupervisor + ?Sized,
    {
        if self.state.terminal {
            return self
                .state
                .discovered_domain
                .clone()
                .ok_or(DiscoveryError::Exhausted {
                    attempts: self.state.attempts,
                });
        }

        if let Some(domain) = self.static_domain.clone() {
            info!("Using configured tunnel domain: {}", domain);
            self.resolve(domain.clone());
            return Ok(domain);
        }

        loop {
            self.state.attempts += 1;
            let attempt = self.state.attempts;
            debug!(
                "Discovery round {}/{} reading {:?}",
                attempt, self.timings.max_rounds, self.log_path
            );

            if let Some(domain) = self.poll_round().await {
                info!("🌐 Tunnel hostname: {} (round {})", domain, attempt);
                self.resolve(domain.clone());
                return Ok(domain);
            }

            if attempt >= self.timings.max_rounds {
                self.state.phase = DiscoveryPhase::Failed;
                self.state.terminal = true;
                error!(
                    "❌ Tunnel hostname not found after {} round(s), giving up",
                    attempt
                );
                return Err(DiscoveryError::Exhausted { attempts: attempt });
            }

            self.state.phase = DiscoveryPhase::Retrying;
            let delay = self.timings.backoff(attempt);
            warn!(
                "Tunnel hostname not found yet, restarting tunnel client in {:?}",
                delay
            );
            self.respawn(supervisor, delay).await;
        }
    }

    fn resolve(&mut self, domain: String) {
        self.state.phase = DiscoveryPhase::Resolved;
        self.state.discovered_domain = Some(domain);
        self.state.terminal = true;
    }

    /// Poll the log until a match or the round deadline
    async fn poll_round(&mut self) -> Option<String> {
        let deadline = Instant::now() + self.timings.round_timeout;

        loop {
            self.state.phase = DiscoveryPhase::AwaitingLog;
            let last_pass = Instant::now() >= deadline;

            if let Some(domain) = self.scan_log(last_pass).await {
                return Some(domain);
            }

            if last_pass {
                return None;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.timings.poll_interval.min(remaining)).await;
        }
    }

    /// Scan log lines past the last offset
    ///
    /// A trailing line without newline may still be growing, so it is only
    /// consumed on the last pass of a round.
    async fn scan_log(&mut self, include_partial: bool) -> Option<String> {
        let content = match tokio::fs::read(&self.log_path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Tunnel log {:?} not readable yet: {}", self.log_path, e);
                return None;
            }
        };

        self.state.phase = DiscoveryPhase::ParsingLog;

        let len = content.len() as u64;
        if len < self.state.last_log_offset {
            debug!("Tunnel log shrank, rescanning from the start");
            self.state.last_log_offset = 0;
        }

        let start = usize::try_from(self.state.last_log_offset).unwrap_or(content.len());
        let unread = content.get(start..).unwrap_or_default();
        let complete = if include_partial {
            unread.len()
        } else {
            unread
                .iter()
                .rposition(|b| *b == b'\n')
                .map(|idx| idx + 1)
                .unwrap_or(0)
        };

        let text = String::from_utf8_lossy(&unread[..complete]);
        if let Some(domain) = text
            .lines()
            .find_map(|line| self.matcher.find_hostname(line))
        {
            return Some(domain);
        }

        self.state.last_log_offset += complete as u64;
        None
    }

    /// Drop the stale log and restart the client
    async fn respawn<S>(&mut self, supervisor: &mut S, delay: Duration)
    where
        S: TunnelSupervisor + ?Sized,
    {
        // A fresh client must not be matched against the old client's output.
        match tokio::fs::remove_file(&self.log_path).await {
            Ok(()) => debug!("Removed stale tunnel log {:?}", self.log_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove tunnel log {:?}: {}", self.log_path, e),
        }
        self.state.last_log_offset = 0;

        if let Err(e) = supervisor.stop().await {
            warn!("{}", e);
        }

        tokio::time::sleep(delay).await;

        if let Err(e) = supervisor.start().await {
            warn!("Tunnel client restart failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopSupervisor;

    #[async_trait]
    impl TunnelSupervisor for NoopSupervisor {
        async fn stop(&mut self) -> Result<(), ProcessError> {
            Ok(())
        }

        async fn start(&mut self) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    fn fast_timings(max_rounds: u32) -> DiscoveryTimings {
        DiscoveryTimings {
            poll_interval: Duration::from_millis(5),
            round_timeout: Duration::from_millis(20),
            respawn_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_rounds,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let timings = DiscoveryTimings::default();
        assert_eq!(timings.backoff(1), Duration::from_secs(3));
        assert_eq!(timings.backoff(2), Duration::from_secs(6));
        assert_eq!(timings.backoff(3), Duration::from_secs(12));
        assert_eq!(timings.backoff(5), Duration::from_secs(30));
        assert_eq!(timings.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_partial_line_is_not_consumed_early() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("boot.log");
        tokio::fs::write(&log, "INF starting\nINF |  https://slow.trycloudflare.co")
            .await
            .unwrap();

        let mut extractor = TunnelDomainExtractor::new(&log).with_timings(fast_timings(1));
        assert!(extractor.scan_log(false).await.is_none());
        assert_eq!(extractor.state().last_log_offset, "INF starting\n".len() as u64);

        tokio::fs::write(
            &log,
            "INF starting\nINF |  https://slow.trycloudflare.com   |\n",
        )
        .await
        .unwrap();
        assert_eq!(
            extractor.scan_log(false).await.as_deref(),
            Some("slow.trycloudflare.com")
        );
    }

    #[tokio::test]
    async fn test_truncated_log_rescans_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("boot.log");
        tokio::fs::write(&log, "a long line without any hostname in it\n")
            .await
            .unwrap();

        let mut extractor = TunnelDomainExtractor::new(&log);
        assert!(extractor.scan_log(false).await.is_none());

        tokio::fs::write(&log, "https://x.trycloudflare.com\n")
            .await
            .unwrap();
        assert_eq!(
            extractor.scan_log(false).await.as_deref(),
            Some("x.trycloudflare.com")
        );
    }

    #[tokio::test]
    async fn test_terminal_outcome_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = TunnelDomainExtractor::new(dir.path().join("boot.log"))
            .with_timings(fast_timings(1));

        let first = extractor.discover(&mut NoopSupervisor).await;
        assert!(matches!(first, Err(DiscoveryError::Exhausted { attempts: 1 })));

        // Log appears afterwards but the run already ended
        tokio::fs::write(extractor.log_path(), "https://late.trycloudflare.com\n")
            .await
            .unwrap();
        let second = extractor.discover(&mut NoopSupervisor).await;
        assert!(matches!(second, Err(DiscoveryError::Exhausted { attempts: 1 })));
        assert_eq!(extractor.state().phase, DiscoveryPhase::Failed);
    }
}

//! Tunnel client supervision and public hostname discovery
//!
//! The tunnel client is an opaque external process. In quick-tunnel mode
//! the hostname it is assigned only shows up in its log file, so this crate
//! polls that log, and restarts the client when nothing turns up.

pub mod discovery;
pub mod matcher;
pub mod mode;
pub mod process;
pub mod supervisor;

pub use discovery::{
    DiscoveryError, DiscoveryPhase, DiscoveryTimings, TunnelDiscoveryState,
    TunnelDomainExtractor, TunnelSupervisor,
};
pub use matcher::{HostnameMatcher, QuickTunnelMatcher};
pub use mode::{TunnelError, TunnelFiles, TunnelMode};
pub use process::{ProcessError, ProcessHandle, ProcessLauncher};
pub use supervisor::TunnelProcess;

//! Node bootstrap
//!
//! Turns [`Settings`] into a running proxy node: binaries on disk, proxy
//! engine and tunnel client started, tunnel hostname known, and share links
//! published to the [`argonode_api::SubscriptionCache`].

pub mod arch;
pub mod artifacts;
pub mod geo;
pub mod notify;
pub mod pipeline;
pub mod settings;
pub mod telemetry;
pub mod workdir;

pub use arch::ArchitectureTag;
pub use artifacts::{
    ArtifactDownloader, ArtifactError, ArtifactPlan, ArtifactRole, ArtifactSpec, FetchReport,
};
pub use geo::{GeoProvider, IspResolver, UNKNOWN_ISP};
pub use notify::{NotifyError, NotifyOutcome, UploadNotifier};
pub use pipeline::{publish_links, Bootstrap, BootstrapReport};
pub use settings::Settings;
pub use telemetry::{TelemetryConfig, TelemetryError};
pub use workdir::{WorkDir, WorkDirError};

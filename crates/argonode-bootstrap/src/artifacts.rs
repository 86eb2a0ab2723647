//! Binary acquisition
//!
//! An [`ArtifactPlan`] lists which binaries this host needs and where they
//! go; [`ArtifactDownloader`] streams them to disk and marks them
//! executable.

use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::arch::ArchitectureTag;

/// Mode applied to every downloaded binary
pub const EXECUTABLE_MODE: u32 = 0o775;

const NAME_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Download of {role} from {url} failed: {source}")]
    Request {
        role: ArtifactRole,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {role} from {url} returned HTTP {status}")]
    Status {
        role: ArtifactRole,
        url: String,
        status: u16,
    },

    #[error("Failed to write {role} to {path:?}: {source}")]
    Io {
        role: ArtifactRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub fn role(&self) -> ArtifactRole {
        match self {
            ArtifactError::Request { role, .. }
            | ArtifactError::Status { role, .. }
            | ArtifactError::Io { role, .. } => *role,
        }
    }
}

/// What a downloaded binary is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    ProxyEngine,
    TunnelClient,
    /// Monitoring agent driven by a YAML config file
    TelemetryAgentV0,
    /// Monitoring agent driven by flags, used when a port is configured
    TelemetryAgentV1,
}

impl ArtifactRole {
    /// Last path segment of the download URL
    pub fn path_segment(&self) -> &'static str {
        match self {
            ArtifactRole::ProxyEngine => "web",
            ArtifactRole::TunnelClient => "bot",
            ArtifactRole::TelemetryAgentV0 => "v1",
            ArtifactRole::TelemetryAgentV1 => "agent",
        }
    }

    /// Bootstrap cannot continue without required artifacts
    pub fn is_required(&self) -> bool {
        matches!(self, ArtifactRole::ProxyEngine | ArtifactRole::TunnelClient)
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactRole::ProxyEngine => "proxy engine",
            ArtifactRole::TunnelClient => "tunnel client",
            ArtifactRole::TelemetryAgentV0 => "monitoring agent (v0)",
            ArtifactRole::TelemetryAgentV1 => "monitoring agent (v1)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub role: ArtifactRole,
    pub source_url: String,
    pub local_path: PathBuf,
}

/// Binaries to fetch, at most one per role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlan {
    specs: Vec<ArtifactSpec>,
}

/// Download host for an architecture
pub fn default_base_url(arch: ArchitectureTag) -> String {
    format!("https://{}.ssss.nyc.mn", arch.download_label())
}

/// Six random lowercase letters
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    (0..NAME_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect()
}

impl ArtifactPlan {
    /// Plan downloads from the default host with random local names
    pub fn plan(
        arch: ArchitectureTag,
        telemetry_configured: bool,
        telemetry_has_port: bool,
        dir: &Path,
    ) -> Self {
        Self::plan_from(
            &default_base_url(arch),
            telemetry_configured,
            telemetry_has_port,
            dir,
            |_| random_name(),
        )
    }

    /// Plan downloads from `base_url`, naming files with `name_for`
    ///
    /// Names that collide with an earlier role are drawn again.
    pub fn plan_from(
        base_url: &str,
        telemetry_configured: bool,
        telemetry_has_port: bool,
        dir: &Path,
        mut name_for: impl FnMut(ArtifactRole) -> String,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');

        let mut roles = vec![ArtifactRole::ProxyEngine, ArtifactRole::TunnelClient];
        if telemetry_configured {
            roles.push(if telemetry_has_port {
                ArtifactRole::TelemetryAgentV1
            } else {
                ArtifactRole::TelemetryAgentV0
            });
        }

        let mut used = HashSet::new();
        let specs = roles
            .into_iter()
            .map(|role| {
                let mut name = name_for(role);
                while !used.insert(name.clone()) {
                    name = random_name();
                }
                ArtifactSpec {
                    role,
                    source_url: format!("{}/{}", base_url, role.path_segment()),
                    local_path: dir.join(name),
                }
            })
            .collect();

        Self { specs }
    }

    pub fn specs(&self) -> &[ArtifactSpec] {
        &self.specs
    }

    pub fn get(&self, role: ArtifactRole) -> Option<&ArtifactSpec> {
        self.specs.iter().find(|spec| spec.role == role)
    }

    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.specs.iter().map(|s| s.local_path.clone()).collect()
    }
}

/// Roles that made it to disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: Vec<ArtifactRole>,
    pub skipped: Vec<ArtifactRole>,
}

impl FetchReport {
    pub fn is_fetched(&self, role: ArtifactRole) -> bool {
        self.fetched.contains(&role)
    }
}

/// Streams artifacts over HTTP
#[derive(Debug, Clone)]
pub struct ArtifactDownloader {
    client: reqwest::Client,
}

impl ArtifactDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch every planned artifact
    ///
    /// Stops at the first required artifact that fails; optional ones are
    /// logged and skipped.
    pub async fn fetch_plan(&self, plan: &ArtifactPlan) -> Result<FetchReport, ArtifactError> {
        let mut report = FetchReport::default();

        for spec in plan.specs() {
            match self.fetch(spec).await {
                Ok(()) => report.fetched.push(spec.role),
                Err(e) if spec.role.is_required() => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", spec.role, e);
                    report.skipped.push(spec.role);
                }
            }
        }

        Ok(report)
    }

    /// Download one artifact and mark it executable
    pub async fn fetch(&self, spec: &ArtifactSpec) -> Result<(), ArtifactError> {
        debug!("Downloading {} from {}", spec.role, spec.source_url);

        let result = self.stream_to_disk(spec).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&spec.local_path).await;
            return result;
        }

        set_executable(spec).await?;
        info!("✅ Downloaded {} to {:?}", spec.role, spec.local_path);
        Ok(())
    }

    async fn stream_to_disk(&self, spec: &ArtifactSpec) -> Result<(), ArtifactError> {
        let request_error = |source| ArtifactError::Request {
            role: spec.role,
            url: spec.source_url.clone(),
            source,
        };
        let io_error = |source| ArtifactError::Io {
            role: spec.role,
            path: spec.local_path.clone(),
            source,
        };

        let mut response = self
            .client
            .get(&spec.source_url)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(ArtifactError::Status {
                role: spec.role,
                url: spec.source_url.clone(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(&spec.local_path)
            .await
            .map_err(io_error)?;

        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;

        Ok(())
    }
}

#[cfg(unix)]
async fn set_executable(spec: &ArtifactSpec) -> Result<(), ArtifactError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(
        &spec.local_path,
        std::fs::Permissions::from_mode(EXECUTABLE_MODE),
    )
    .await
    .map_err(|source| ArtifactError::Io {
        role: spec.role,
        path: spec.local_path.clone(),
        source,
    })
}

#[cfg(not(unix))]
async fn set_executable(_spec: &ArtifactSpec) -> Result<(), ArtifactError> {
    Ok(())
}

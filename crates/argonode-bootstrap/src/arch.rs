//! Host architecture detection

use std::fmt;

/// Binary flavour to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchitectureTag {
    Arm,
    Amd,
}

impl ArchitectureTag {
    /// Map an architecture identifier to a tag
    ///
    /// `arm`, `arm64` and `aarch64` are ARM; anything else is treated as
    /// x86-64.
    pub fn resolve(host_arch: &str) -> Self {
        match host_arch.trim().to_ascii_lowercase().as_str() {
            "arm" | "arm64" | "aarch64" => ArchitectureTag::Arm,
            _ => ArchitectureTag::Amd,
        }
    }

    /// Tag for the machine this process runs on
    pub fn host() -> Self {
        Self::resolve(std::env::consts::ARCH)
    }

    /// Name used in download hostnames
    pub fn download_label(&self) -> &'static str {
        match self {
            ArchitectureTag::Arm => "arm64",
            ArchitectureTag::Amd => "amd64",
        }
    }
}

impl fmt::Display for ArchitectureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchitectureTag::Arm => write!(f, "arm"),
            ArchitectureTag::Amd => write!(f, "amd"),
        }
    }
}

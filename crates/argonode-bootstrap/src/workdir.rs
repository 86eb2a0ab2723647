//! Working directory layout and housekeeping

use argonode_tunnel::TunnelFiles;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Grace period before generated files are removed after a successful start
pub const CLEANUP_DELAY: Duration = Duration::from_secs(90);

const LIST_FILE: &str = "list.txt";

#[derive(Debug, Error)]
pub enum WorkDirError {
    #[error("Failed to create working directory {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Files the bootstrap reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Proxy engine configuration
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Last published subscription payload
    pub fn sub_file(&self) -> PathBuf {
        self.root.join("sub.txt")
    }

    /// Plain share links, one per line
    pub fn list_file(&self) -> PathBuf {
        self.root.join(LIST_FILE)
    }

    /// Config for the YAML-driven monitoring agent
    pub fn telemetry_config(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn tunnel_files(&self) -> TunnelFiles {
        TunnelFiles::in_dir(&self.root)
    }

    /// Create the directory and its parents
    pub async fn prepare(&self) -> Result<(), WorkDirError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkDirError::Create {
                path: self.root.clone(),
                source,
            })?;
        debug!("Working directory ready: {:?}", self.root);
        Ok(())
    }

    /// Remove files left by a previous run, keeping `list.txt`
    ///
    /// Subdirectories and files that cannot be removed are left alone.
    /// Returns the number of files removed.
    pub async fn clean_stale_files(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {:?}: {}", self.root, e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name() == LIST_FILE {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => debug!("Could not remove {:?}: {}", entry.path(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale file(s) from {:?}", removed, self.root);
        }
        removed
    }

    /// Write `contents` to `path` inside the directory
    pub async fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<(), WorkDirError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| WorkDirError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Files removed once the node is up: running processes no longer
    /// need them
    pub fn post_start_files(&self, binaries: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = vec![
            self.tunnel_files().log_file,
            self.config_file(),
            self.telemetry_config(),
        ];
        files.extend(binaries.iter().cloned());
        files
    }

    /// Delete `files` after `delay` in the background
    pub fn schedule_cleanup(&self, files: Vec<PathBuf>, delay: Duration) -> JoinHandle<usize> {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let removed = remove_all(&files).await;
            info!("🧹 Cleaned up {} runtime file(s)", removed);
            removed
        })
    }
}

async fn remove_all(files: &[PathBuf]) -> usize {
    let mut removed = 0;
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("Could not remove {:?}: {}", file, e),
        }
    }
    removed
}

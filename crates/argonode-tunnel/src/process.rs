//! Detached process launching
//!
//! Processes are started with null stdio and are not tied to the handle's
//! lifetime: dropping a [`ProcessHandle`] leaves the process running.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Process launch errors
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop {name}: {source}")]
    Kill {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts external programs without waiting on them
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run spawned processes from this directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Start `program` with `args`
    ///
    /// Returns as soon as the OS has created the process. `name` is only
    /// used for logs and errors.
    pub fn spawn(
        &self,
        name: &str,
        program: &Path,
        args: &[String],
    ) -> Result<ProcessHandle, ProcessError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!("Spawning {}: {:?} {:?}", name, program, args);

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            name: name.to_string(),
            source,
        })?;

        info!("{} is running (pid {:?})", name, child.id());

        Ok(ProcessHandle {
            name: name.to_string(),
            child,
        })
    }
}

/// A running (or finished) child process
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Child,
}

impl ProcessHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, `None` once the process has been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process is still alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the process and reap it
    ///
    /// Succeeds without doing anything if it already exited.
    pub async fn kill(&mut self) -> Result<(), ProcessError> {
        if !self.is_running() {
            return Ok(());
        }

        self.child.kill().await.map_err(|source| ProcessError::Kill {
            name: self.name.clone(),
            source,
        })?;

        debug!("{} stopped", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_program_fails_immediately() {
        let launcher = ProcessLauncher::new();
        let result = launcher.spawn(
            "ghost",
            Path::new("/nonexistent/definitely-not-here"),
            &[],
        );

        match result {
            Err(ProcessError::Spawn { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected spawn error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_running_process() {
        let launcher = ProcessLauncher::new();
        let mut handle = launcher
            .spawn(
                "sleeper",
                Path::new("sh"),
                &["-c".to_string(), "sleep 30".to_string()],
            )
            .unwrap();

        assert!(handle.is_running());
        handle.kill().await.unwrap();
        assert!(!handle.is_running());

        // Second kill is a no-op
        handle.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProcessLauncher::new().with_working_dir(dir.path());
        let mut handle = launcher
            .spawn(
                "touch",
                Path::new("sh"),
                &["-c".to_string(), "touch marker".to_string()],
            )
            .unwrap();

        for _ in 0..100 {
            if !handle.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(dir.path().join("marker").exists());
    }
}

//! The tunnel client as a restartable process

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::discovery::TunnelSupervisor;
use crate::process::{ProcessError, ProcessHandle, ProcessLauncher};

/// Tunnel client binary plus the arguments it is (re)started with
pub struct TunnelProcess {
    launcher: ProcessLauncher,
    program: PathBuf,
    args: Vec<String>,
    current: Option<ProcessHandle>,
}

impl TunnelProcess {
    pub fn new(launcher: ProcessLauncher, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            launcher,
            program: program.into(),
            args,
            current: None,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Handle of the running client, if started
    pub fn handle(&mut self) -> Option<&mut ProcessHandle> {
        self.current.as_mut()
    }
}

#[async_trait]
impl TunnelSupervisor for TunnelProcess {
    async fn stop(&mut self) -> Result<(), ProcessError> {
        if let Some(mut handle) = self.current.take() {
            handle.kill().await?;
            info!("Tunnel client stopped");
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ProcessError> {
        let handle = self
            .launcher
            .spawn("tunnel client", &self.program, &self.args)?;
        self.current = Some(handle);
        Ok(())
    }
}

//! Sandbox composition: one container plus its attached session and
//! file transfer channel.

use std::time::Duration;

use bollard::Docker;

use isobox_core::{Error, Result, SandboxConfig};

use crate::container::{ContainerController, ContainerHandle, VolumeBindings};
use crate::session::Terminal;
use crate::transfer::FileTransfer;

/// One isolated, resource-bounded container with an interactive session
/// and archive-based file I/O. Ephemeral and single-owner: destroyed by
/// [`Sandbox::cleanup`], never shared between instances.
pub struct Sandbox {
    controller: ContainerController,
    config: SandboxConfig,
    handle: Option<ContainerHandle>,
    terminal: Option<Terminal>,
    transfer: Option<FileTransfer>,
}

impl Sandbox {
    /// Create and start the container, then attach the interactive
    /// session.
    ///
    /// Any failure along the way cleans up whatever partial state exists
    /// before surfacing a creation error, so a half-started container is
    /// never leaked.
    pub async fn create(
        docker: Docker,
        config: SandboxConfig,
        volume_bindings: VolumeBindings,
    ) -> Result<Self> {
        let mut sandbox = Self {
            controller: ContainerController::new(docker),
            config,
            handle: None,
            terminal: None,
            transfer: None,
        };
        if let Err(e) = sandbox.init(volume_bindings).await {
            sandbox.cleanup().await;
            return Err(Error::creation(format!("Failed to create sandbox: {}", e)));
        }
        Ok(sandbox)
    }

    async fn init(&mut self, volume_bindings: VolumeBindings) -> Result<()> {
        let handle = self.controller.create(&self.config, &volume_bindings).await?;
        let docker = self.controller.docker().clone();
        let container_id = handle.id.clone();
        self.handle = Some(handle);

        let terminal = Terminal::attach(
            docker.clone(),
            container_id.clone(),
            self.config.work_dir.clone(),
            // Unbuffered interpreter output keeps the session stream live.
            vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
            self.config.timeout(),
        )
        .await?;
        self.terminal = Some(terminal);
        self.transfer = Some(FileTransfer::new(
            docker,
            container_id,
            self.config.work_dir.clone(),
        ));
        Ok(())
    }

    /// Run a shell command through the interactive session.
    pub async fn run_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let terminal = self.terminal.as_mut().ok_or(Error::NotInitialized)?;
        terminal.run_command(command, timeout).await
    }

    /// Re-attach the interactive session after a timeout poisoned it.
    pub async fn restart_session(&mut self) -> Result<()> {
        let terminal = self.terminal.as_mut().ok_or(Error::NotInitialized)?;
        terminal.restart().await
    }

    /// Read a file from the container.
    pub async fn read_file(&mut self, path: &str) -> Result<String> {
        let transfer = self.transfer()?;
        transfer.read_file(path).await
    }

    /// Write content to a file in the container.
    pub async fn write_file(&mut self, path: &str, content: &str) -> Result<()> {
        let transfer = self.transfer()?;
        transfer.write_file(path, content).await
    }

    /// Copy a host file or directory into the container.
    pub async fn copy_to(&mut self, src_path: &str, dst_path: &str) -> Result<()> {
        let transfer = self.transfer()?;
        transfer.copy_to(src_path, dst_path).await
    }

    /// Copy a container file or directory to the host.
    pub async fn copy_from(&mut self, src_path: &str, dst_path: &str) -> Result<()> {
        let transfer = self.transfer()?;
        transfer.copy_from(src_path, dst_path).await
    }

    /// Working directory inside the container.
    pub fn work_dir(&self) -> &str {
        &self.config.work_dir
    }

    fn transfer(&self) -> Result<&FileTransfer> {
        self.transfer.as_ref().ok_or(Error::NotInitialized)
    }

    /// Release the session, the container, and the host bind directory.
    ///
    /// Each teardown step runs independently; failures are collected and
    /// logged, never returned. Safe to call repeatedly and on partially
    /// created state.
    pub async fn cleanup(&mut self) {
        let mut errors: Vec<String> = Vec::new();

        if let Some(mut terminal) = self.terminal.take() {
            terminal.close().await;
        }
        self.transfer = None;

        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.controller.stop(&handle).await {
                errors.push(format!("Container stop error: {}", e));
            }
            if let Err(e) = self.controller.remove(&handle).await {
                errors.push(format!("Container remove error: {}", e));
            }
            if let Err(e) = self.controller.remove_host_dir(&handle) {
                errors.push(format!("Host directory cleanup error: {}", e));
            }
        }

        if !errors.is_empty() {
            tracing::warn!("Errors during cleanup: {}", errors.join(", "));
        }
    }
}

//! Single-sandbox client facade.
//!
//! Tool layers consume this interface rather than the sandbox types
//! directly. The facade holds at most one sandbox; every operation
//! checks initialization first, and `cleanup` clears the slot so the
//! client can be reused for a subsequent `create`.

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;

use isobox_core::{Error, Result, SandboxConfig};

use crate::container::{ContainerController, VolumeBindings};
use crate::sandbox::Sandbox;

/// Stable sandbox operations exposed to collaborators.
#[async_trait]
pub trait SandboxClient: Send {
    /// Create the sandbox. Replaces nothing: call `cleanup` first to
    /// recycle a client.
    async fn create(
        &mut self,
        config: SandboxConfig,
        volume_bindings: VolumeBindings,
    ) -> Result<()>;

    /// Execute a command and return its output.
    async fn run_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String>;

    /// Copy a file or directory from the container to the host.
    async fn copy_from(&mut self, container_path: &str, local_path: &str) -> Result<()>;

    /// Copy a file or directory from the host to the container.
    async fn copy_to(&mut self, local_path: &str, container_path: &str) -> Result<()>;

    /// Read file content from the container.
    async fn read_file(&mut self, path: &str) -> Result<String>;

    /// Write content to a file in the container.
    async fn write_file(&mut self, path: &str, content: &str) -> Result<()>;

    /// Tear everything down. Never errors; diagnostics are logged.
    async fn cleanup(&mut self);
}

/// Client owning at most one local Docker sandbox.
#[derive(Default)]
pub struct LocalSandboxClient {
    docker: Option<Docker>,
    sandbox: Option<Sandbox>,
}

impl LocalSandboxClient {
    /// Create a client that connects to the local Docker daemon on
    /// first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client around an injected Docker handle.
    pub fn with_docker(docker: Docker) -> Self {
        Self {
            docker: Some(docker),
            sandbox: None,
        }
    }

    fn sandbox_mut(&mut self) -> Result<&mut Sandbox> {
        self.sandbox.as_mut().ok_or(Error::NotInitialized)
    }
}

#[async_trait]
impl SandboxClient for LocalSandboxClient {
    async fn create(
        &mut self,
        config: SandboxConfig,
        volume_bindings: VolumeBindings,
    ) -> Result<()> {
        let docker = match &self.docker {
            Some(docker) => docker.clone(),
            None => {
                let docker = ContainerController::connect_local()?.docker().clone();
                self.docker = Some(docker.clone());
                docker
            }
        };
        let sandbox = Sandbox::create(docker, config, volume_bindings).await?;
        self.sandbox = Some(sandbox);
        Ok(())
    }

    async fn run_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        self.sandbox_mut()?.run_command(command, timeout).await
    }

    async fn copy_from(&mut self, container_path: &str, local_path: &str) -> Result<()> {
        self.sandbox_mut()?.copy_from(container_path, local_path).await
    }

    async fn copy_to(&mut self, local_path: &str, container_path: &str) -> Result<()> {
        self.sandbox_mut()?.copy_to(local_path, container_path).await
    }

    async fn read_file(&mut self, path: &str) -> Result<String> {
        self.sandbox_mut()?.read_file(path).await
    }

    async fn write_file(&mut self, path: &str, content: &str) -> Result<()> {
        self.sandbox_mut()?.write_file(path, content).await
    }

    async fn cleanup(&mut self) {
        if let Some(mut sandbox) = self.sandbox.take() {
            sandbox.cleanup().await;
        }
    }
}

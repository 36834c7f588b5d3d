//! Container lifecycle management.
//!
//! Translates a [`SandboxConfig`] into a running, resource-constrained
//! Docker container via `bollard`. The Docker client handle is injected
//! so tests and embedders can supply their own connection.

use std::collections::HashMap;
use std::path::PathBuf;

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use isobox_core::{Error, Result, SandboxConfig};

/// Docker CPU scheduler period; the quota is derived from it so that
/// `cpu_limit` expresses fractional cores.
const CPU_PERIOD: i64 = 100_000;

/// Caller-supplied bind mounts, host path to container path.
pub type VolumeBindings = HashMap<String, String>;

/// One running container, exclusively owned by the sandbox instance
/// that created it.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Engine-assigned container id.
    pub id: String,
    /// Randomized, namespaced container name.
    pub name: String,
    /// Auto-created host directory backing the working-directory bind.
    pub host_work_dir: PathBuf,
}

/// Creates, stops, and removes sandbox containers.
#[derive(Clone)]
pub struct ContainerController {
    docker: Docker,
}

impl ContainerController {
    /// Create a controller around an injected Docker client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local Docker daemon.
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            Error::creation(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self::new(docker))
    }

    /// The underlying Docker client handle.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Create and start a container from the given configuration.
    ///
    /// The container runs a long-lived no-op foreground process so it
    /// stays alive without an attached shell. A created-but-unstarted
    /// container is removed before the error is surfaced.
    pub async fn create(
        &self,
        config: &SandboxConfig,
        extra_bindings: &VolumeBindings,
    ) -> Result<ContainerHandle> {
        let host_work_dir = ensure_host_dir(&config.work_dir)?;

        let mut binds = vec![format!("{}:{}:rw", host_work_dir.display(), config.work_dir)];
        for (host_path, container_path) in extra_bindings {
            binds.push(format!("{}:{}:rw", host_path, container_path));
        }

        let name = format!("sandbox_{}", short_id());

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: Some(vec![
                "tail".to_string(),
                "-f".to_string(),
                "/dev/null".to_string(),
            ]),
            hostname: Some("sandbox".to_string()),
            working_dir: Some(config.work_dir.clone()),
            tty: Some(true),
            host_config: Some(build_host_config(config, binds)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| {
                let _ = std::fs::remove_dir_all(&host_work_dir);
                Error::creation(format!("Failed to create sandbox container: {}", e))
            })?;

        if let Err(e) = self.docker.start_container::<String>(&created.id, None).await {
            // Never leak a half-started container.
            let _ = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            let _ = std::fs::remove_dir_all(&host_work_dir);
            return Err(Error::creation(format!(
                "Failed to start sandbox container: {}",
                e
            )));
        }

        tracing::info!(container = %name, image = %config.image, "Sandbox container created and started");

        Ok(ContainerHandle {
            id: created.id,
            name,
            host_work_dir,
        })
    }

    /// Stop the container with a short grace period. Already-stopped and
    /// already-removed containers count as success.
    pub async fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        match self
            .docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: 5 }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(Error::io(format!(
                "Failed to stop sandbox container: {}",
                e
            ))),
        }
    }

    /// Force-remove the container. Idempotent.
    pub async fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        match self
            .docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                tracing::info!(container = %handle.name, "Sandbox container removed");
                Ok(())
            }
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(Error::io(format!(
                "Failed to remove sandbox container: {}",
                e
            ))),
        }
    }

    /// Delete the auto-created host bind directory so cleanup leaves no
    /// orphan behind.
    pub fn remove_host_dir(&self, handle: &ContainerHandle) -> Result<()> {
        if handle.host_work_dir.exists() {
            std::fs::remove_dir_all(&handle.host_work_dir)?;
        }
        Ok(())
    }
}

/// One-shot exec capturing output and the exit code.
///
/// Used for out-of-band setup and verification commands that must not
/// share the interactive session's stream.
pub(crate) async fn exec_capture(
    docker: &Docker,
    container_id: &str,
    command: &str,
) -> Result<(i64, String)> {
    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    command.to_string(),
                ]),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| Error::io(format!("Failed to create exec: {}", e)))?;

    let mut output = String::new();
    if let StartExecResults::Attached {
        output: mut stream, ..
    } = docker
        .start_exec(&exec.id, None)
        .await
        .map_err(|e| Error::io(format!("Failed to start exec: {}", e)))?
    {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(Error::io(format!("Exec stream error: {}", e))),
            }
        }
    }

    let inspect = docker
        .inspect_exec(&exec.id)
        .await
        .map_err(|e| Error::io(format!("Failed to inspect exec result: {}", e)))?;

    Ok((inspect.exit_code.unwrap_or(-1), output))
}

/// Host-level resource constraints derived from the sandbox config.
fn build_host_config(config: &SandboxConfig, binds: Vec<String>) -> HostConfig {
    HostConfig {
        memory: Some(config.memory_limit),
        cpu_period: Some(CPU_PERIOD),
        cpu_quota: Some((CPU_PERIOD as f64 * config.cpu_limit) as i64),
        network_mode: Some(if config.network_enabled {
            "bridge".to_string()
        } else {
            "none".to_string()
        }),
        binds: Some(binds),
        ..Default::default()
    }
}

/// "Already stopped" (304) and "no such container" (404) responses.
fn is_gone(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304 | 404,
            ..
        }
    )
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Create a uniquely-suffixed host directory backing the working-directory
/// bind mount. The random suffix avoids collisions between sandboxes
/// created concurrently on the same host.
fn ensure_host_dir(work_dir: &str) -> Result<PathBuf> {
    let base = std::path::Path::new(work_dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    let host_path = std::env::temp_dir().join(format!("sandbox_{}_{}", base, short_id()));
    std::fs::create_dir_all(&host_path)?;
    Ok(host_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_config_resource_limits() {
        let config = SandboxConfig {
            cpu_limit: 0.5,
            memory_limit: 256 * 1024 * 1024,
            ..Default::default()
        };
        let host_config = build_host_config(&config, vec![]);
        assert_eq!(host_config.memory, Some(256 * 1024 * 1024));
        assert_eq!(host_config.cpu_period, Some(100_000));
        assert_eq!(host_config.cpu_quota, Some(50_000));
        assert_eq!(host_config.network_mode.as_deref(), Some("none"));
    }

    #[test]
    fn test_host_config_bridged_network() {
        let config = SandboxConfig {
            network_enabled: true,
            ..Default::default()
        };
        let host_config = build_host_config(&config, vec![]);
        assert_eq!(host_config.network_mode.as_deref(), Some("bridge"));
    }

    #[test]
    fn test_ensure_host_dir_is_unique() {
        let first = ensure_host_dir("/workspace").unwrap();
        let second = ensure_host_dir("/workspace").unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        let _ = std::fs::remove_dir_all(&first);
        let _ = std::fs::remove_dir_all(&second);
    }

    #[test]
    fn test_is_gone_matches_missing_and_stopped() {
        let missing = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "no such container".to_string(),
        };
        let stopped = bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            message: "container already stopped".to_string(),
        };
        let server = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "daemon on fire".to_string(),
        };
        assert!(is_gone(&missing));
        assert!(is_gone(&stopped));
        assert!(!is_gone(&server));
    }

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

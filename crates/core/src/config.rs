//! Sandbox configuration.
//!
//! The sandbox consumes a fully-resolved [`SandboxConfig`]; loading and
//! layering (file, then environment) happens here so the sandbox crate
//! never touches configuration sources itself.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Declarative container configuration for one sandbox instance.
///
/// Immutable once created; a new sandbox gets a fresh copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container image reference.
    pub image: String,
    /// Working directory inside the container.
    pub work_dir: String,
    /// Memory ceiling in bytes.
    pub memory_limit: i64,
    /// Fractional CPU cores granted to the container.
    pub cpu_limit: f64,
    /// Whether the container gets bridged network access. Disabled by
    /// default: the sandbox runs untrusted code.
    pub network_enabled: bool,
    /// Default command execution timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            work_dir: "/workspace".to_string(),
            memory_limit: 512 * 1024 * 1024, // 512MB
            cpu_limit: 1.0,
            network_enabled: false,
            timeout_secs: 300,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from `config/sandbox.toml` (optional) layered
    /// under `ISOBOX_*` environment variables.
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name("config/sandbox").required(false))
            .add_source(Environment::with_prefix("ISOBOX"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Default command timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "python:3.12-slim");
        assert_eq!(config.work_dir, "/workspace");
        assert_eq!(config.memory_limit, 512 * 1024 * 1024);
        assert!(!config.network_enabled);
        assert_eq!(config.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"image": "alpine:3.20", "cpu_limit": 0.5}"#).unwrap();
        assert_eq!(config.image, "alpine:3.20");
        assert_eq!(config.cpu_limit, 0.5);
        // Unspecified fields fall back to the defaults.
        assert_eq!(config.work_dir, "/workspace");
        assert_eq!(config.timeout_secs, 300);
    }
}

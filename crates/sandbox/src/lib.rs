#![deny(unused)]
//! Containerized execution sandbox for Isobox.
//!
//! Creates isolated, resource-bounded Docker containers and exposes
//! command execution and file transfer to untrusted, agent-generated
//! code. Commands run over one long-lived interactive session framed
//! with a sentinel protocol; file I/O goes through the engine's tar
//! archive API with path-traversal protection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  SandboxClient facade (one sandbox, guarded) │
//! ├──────────────────────────────────────────────┤
//! │  Sandbox                                     │
//! │    ContainerController  (create/stop/remove) │
//! │    Terminal / DockerSession  (exec stream)   │
//! │    FileTransfer  (tar upload/download)       │
//! ├──────────────────────────────────────────────┤
//! │  Docker Engine API via bollard               │
//! │    container: no network, mem/cpu limits     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use isobox_sandbox::{LocalSandboxClient, SandboxClient, SandboxConfig};
//!
//! let mut client = LocalSandboxClient::new();
//! client.create(SandboxConfig::default(), Default::default()).await?;
//! let output = client.run_command("echo test", None).await?;
//! client.cleanup().await;
//! ```

pub mod client;
pub mod container;
pub mod sandbox;
pub mod session;
pub mod transfer;

pub use client::{LocalSandboxClient, SandboxClient};
pub use container::{ContainerController, ContainerHandle, VolumeBindings};
pub use isobox_core::{Error, Result, SandboxConfig};
pub use sandbox::Sandbox;
pub use session::{DockerSession, Terminal};
pub use transfer::FileTransfer;

#![deny(unused)]
//! Core types, configuration, and error definitions for Isobox.
//!
//! This crate provides the foundational building blocks shared by the
//! sandbox crate and its consumers: the typed error surface, the
//! resolved sandbox configuration, and the container path policy.

pub mod config;
pub mod error;
pub mod path_policy;

pub use config::SandboxConfig;
pub use error::{Error, Result};

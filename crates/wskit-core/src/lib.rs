//! wskit-core: shared types, errors, and capability detection for wskit
//!
//! This crate provides the foundational types used by all wskit sub-crates:
//! - Error types, the `Result` alias and the errno each error maps to
//! - Interceptor configuration and relocation strategy
//! - Runtime capability detection (seccomp user notification, namespaces)

pub mod capabilities;
pub mod config;
pub mod error;

pub use config::{InterceptorConfig, RelocationStrategy};
pub use error::{Result, WskitError};

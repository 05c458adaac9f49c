//! Beacon Core
//!
//! Core types, errors, and constants for the Beacon service registry.
//!
//! # Overview
//!
//! Beacon lets service processes advertise their network location to a shared
//! coordination ensemble (ZooKeeper-style: quorum-based, hierarchical,
//! ephemeral-node capable) and lets clients discover live instances by name.
//!
//! This crate holds what every other Beacon crate shares:
//! - Error types
//! - Explicit limits and defaults (`constants`)
//! - Environment-driven configuration
//! - Time abstraction (for deterministic tests)
//! - Telemetry initialization
//!
//! # TigerStyle
//!
//! - Explicit limits with big-endian naming (e.g., `SERVICE_NAME_LENGTH_BYTES_MAX`)
//! - Units in names (`_MS`, `_BYTES`)
//! - Errors are returned, never panics

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod telemetry;

pub use config::{ProducerConfig, ServerConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{TimeProvider, WallClockTime};
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig, TelemetryGuard};

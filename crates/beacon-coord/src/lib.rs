//! Beacon Coordination
//!
//! Client sessions against a ZooKeeper-style coordination ensemble.
//!
//! # Overview
//!
//! The coordination layer provides:
//! - Retry policies (bounded exponential backoff, retry forever)
//! - The `Ensemble` / `Session` backend seam
//! - An in-process ensemble (`mem://<name>`) with fault injection
//! - A ZooKeeper backend (feature `zookeeper`)
//! - `CoordinationClient`, which owns one session and releases it exactly once

pub mod client;
pub mod connector;
pub mod error;
pub mod memory;
pub mod path;
pub mod retry;
pub mod session;
#[cfg(feature = "zookeeper")]
pub mod zookeeper;

pub use client::{ClientOptions, CoordinationClient};
pub use connector::resolve;
pub use error::{CoordError, CoordResult};
pub use memory::{MemoryEnsemble, MEMORY_SCHEME};
pub use retry::RetryPolicy;
pub use session::{CreateMode, Ensemble, Session, SessionId};
#[cfg(feature = "zookeeper")]
pub use zookeeper::ZooKeeperEnsemble;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Ensemble address resolution
//!
//! `mem://<name>` addresses resolve to live in-process ensembles. Anything
//! else is treated as a ZooKeeper connect string (`host:port[,host:port]`)
//! and needs the `zookeeper` feature.

use crate::error::{CoordError, CoordResult};
use crate::memory::{MemoryEnsemble, MEMORY_SCHEME};
use crate::session::Ensemble;
use std::sync::Arc;

/// Resolve an ensemble address to a backend
pub fn resolve(address: &str) -> CoordResult<Arc<dyn Ensemble>> {
    let address = address.trim();
    if address.is_empty() {
        return Err(resolve_failed(address, "empty ensemble address"));
    }

    if address.starts_with(MEMORY_SCHEME) {
        return MemoryEnsemble::lookup(address)
            .map(|e| Arc::new(e) as Arc<dyn Ensemble>)
            .ok_or_else(|| resolve_failed(address, "no such in-process ensemble"));
    }

    resolve_remote(address)
}

#[cfg(feature = "zookeeper")]
fn resolve_remote(address: &str) -> CoordResult<Arc<dyn Ensemble>> {
    Ok(Arc::new(crate::zookeeper::ZooKeeperEnsemble::new(address)))
}

#[cfg(not(feature = "zookeeper"))]
fn resolve_remote(address: &str) -> CoordResult<Arc<dyn Ensemble>> {
    tracing::warn!(
        ensemble = %address,
        "ZooKeeper backend not enabled; only mem:// ensembles are reachable"
    );
    Err(resolve_failed(
        address,
        "ZooKeeper backend not enabled (build with feature `zookeeper`)",
    ))
}

fn resolve_failed(address: &str, reason: &str) -> CoordError {
    CoordError::ConnectionFailed {
        address: address.to_string(),
        attempts: 0,
        reason: reason.to_string(),
    }
}

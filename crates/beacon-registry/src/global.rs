//! Process-wide registrar
//!
//! Producer processes register once at startup and unregister on shutdown
//! without threading a manager through their code. Every call goes to one
//! lazily created [`RegistrationManager`] with production defaults.

use crate::descriptor::ServiceDescriptor;
use crate::registration::{RegisterStatus, RegistrationManager};
use std::sync::OnceLock;

static MANAGER: OnceLock<RegistrationManager> = OnceLock::new();

/// Install a configured manager before first use
///
/// Returns the manager back if one is already in place.
pub fn install(manager: RegistrationManager) -> Result<(), RegistrationManager> {
    MANAGER.set(manager)
}

/// The process-wide manager
pub fn manager() -> &'static RegistrationManager {
    MANAGER.get_or_init(RegistrationManager::new)
}

/// Register on the process-wide manager
pub async fn register(address: &str, descriptor: &ServiceDescriptor) -> RegisterStatus {
    manager().register(address, descriptor).await
}

/// Tear down the most recent process-wide registration
///
/// No-op when nothing is registered.
pub fn unregister() -> bool {
    manager().unregister()
}

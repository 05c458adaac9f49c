//! Beacon Registry
//!
//! Service registration and discovery on a coordination ensemble.
//!
//! # Overview
//!
//! The registry provides:
//! - Registration of ephemeral, uniquely identified instance records
//! - Discovery of service names and live instances (fresh read per call)
//! - Canonical instance representation with text-table and JSON rendering
//! - A connectivity probe (`IMOK` / `NO CONNECTION`)
//!
//! All records live under one namespace path (`/zk-srv-discovery` by
//! default), one child per service name, one grandchild per instance.

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod format;
pub mod global;
pub mod health;
pub mod host;
pub mod instance;
pub mod registration;

pub use descriptor::ServiceDescriptor;
pub use discovery::{DiscoveryEngine, DiscoveryView, QueryFailure};
pub use error::{RegistryError, RegistryResult};
pub use format::MediaType;
pub use health::{HealthProbe, Status};
pub use host::{HostIdentity, HostResolver, StaticHostResolver, SystemHostResolver};
pub use instance::{InstanceRecord, ServiceInstance};
pub use registration::{RegisterStatus, Registration, RegistrationHandle, RegistrationManager};

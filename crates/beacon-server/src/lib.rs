//! Beacon Server
//!
//! REST front end over the discovery engine: connection status, the
//! instances of one service and the table or JSON view of every service.

pub mod api;
pub mod state;

pub use api::{mount_path, router, RESOURCE_PATH};
pub use state::{AppState, QUERY_TIMEOUT_MS_DEFAULT};

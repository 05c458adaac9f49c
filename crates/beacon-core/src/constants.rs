//! TigerStyle constants for Beacon
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Namespace
// =============================================================================

/// Root path under which every service record lives
pub const NAMESPACE_PATH_DEFAULT: &str = "/zk-srv-discovery";

/// Maximum length of a service name in bytes
pub const SERVICE_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum size of a single instance record in bytes (ZooKeeper's jute.maxbuffer is 1 MB)
pub const INSTANCE_RECORD_SIZE_BYTES_MAX: usize = 1024 * 1024;

/// Lowest valid service port
pub const SERVICE_PORT_MIN: u16 = 1;

// =============================================================================
// Registration (bounded retry, fail fast)
// =============================================================================

/// Initial backoff for registration sessions in milliseconds
pub const REGISTRATION_RETRY_BASE_SLEEP_MS: u64 = 1000;

/// Maximum retries for registration sessions
pub const REGISTRATION_RETRY_COUNT_MAX: u32 = 3;

/// Upper bound on a single backoff sleep in milliseconds
pub const RETRY_SLEEP_MS_MAX: u64 = 30 * 1000;

/// Attempts at generating a fresh instance id before giving up
pub const INSTANCE_ID_ATTEMPTS_COUNT_MAX: u32 = 5;

/// Pause between attempts to re-publish an instance after session expiry
pub const REREGISTRATION_RETRY_INTERVAL_MS: u64 = 1000;

// =============================================================================
// Discovery (retry forever, short-lived sessions)
// =============================================================================

/// Fixed interval between discovery reconnect attempts in milliseconds
pub const DISCOVERY_RETRY_INTERVAL_MS: u64 = 5;

/// How long a status probe blocks waiting for the session handshake
pub const STATUS_BLOCK_TIMEOUT_MS_DEFAULT: u64 = 3 * 1000;

// =============================================================================
// Sessions
// =============================================================================

/// Session timeout negotiated with the ensemble in milliseconds
pub const SESSION_TIMEOUT_MS_DEFAULT: u64 = 60 * 1000;

/// Connection (handshake) timeout per attempt in milliseconds
pub const CONNECTION_TIMEOUT_MS_DEFAULT: u64 = 15 * 1000;

// =============================================================================
// Status strings (surfaced verbatim by the REST layer)
// =============================================================================

/// Status when the coordination session is established
pub const STATUS_CONNECTED: &str = "IMOK";

/// Status when the ensemble is unreachable within the blocking timeout
pub const STATUS_NOT_CONNECTED: &str = "NO CONNECTION";

// =============================================================================
// Server defaults
// =============================================================================

/// Name the discovery server registers itself under
pub const SERVER_SERVICE_NAME: &str = "zk-discovery-service";

/// Version the discovery server registers itself with
pub const SERVER_SERVICE_VERSION: &str = "1.0.1";

/// Default HTTP bind address
pub const SERVER_BIND_ADDRESS_DEFAULT: &str = "0.0.0.0:8080";

/// Default REST base path
pub const SERVER_BASE_PATH_DEFAULT: &str = "/v1";

/// Compile-time sanity checks
const _: () = {
    assert!(REGISTRATION_RETRY_COUNT_MAX >= 1);
    assert!(REGISTRATION_RETRY_BASE_SLEEP_MS <= RETRY_SLEEP_MS_MAX);
    assert!(DISCOVERY_RETRY_INTERVAL_MS > 0);
    assert!(REREGISTRATION_RETRY_INTERVAL_MS > 0);
    assert!(STATUS_BLOCK_TIMEOUT_MS_DEFAULT < SESSION_TIMEOUT_MS_DEFAULT);
};

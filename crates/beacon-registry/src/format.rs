//! Text and JSON rendering of discovery results
//!
//! TigerStyle: Column widths are explicit constants; tooling parses the
//! plain-text table by absolute offset.
//!
//! Row layout (pipes at offsets 0, 24, 59, 112 and 195):
//!
//! ```text
//! | <date:21> | <service:32> | <address port:50> | <payload [id]:80> |
//! ```

use crate::discovery::DiscoveryView;
use crate::instance::ServiceInstance;
use std::fmt::Write;

/// Width of the date column
pub const COLUMN_DATE_WIDTH: usize = 21;
/// Width of the service name column
pub const COLUMN_SERVICE_WIDTH: usize = 32;
/// Width of the host column
pub const COLUMN_HOST_WIDTH: usize = 50;
/// Width of the version column
pub const COLUMN_VERSION_WIDTH: usize = 80;

/// Separator row boundaries (absolute offsets of each `|` after the first)
const SEPARATOR_OFFSETS: [usize; 4] = [24, 35, 53, 83];

/// Product name used in the table preamble
const PREAMBLE_PRODUCT: &str = "zk-srv-discovery";

// =============================================================================
// Media Type
// =============================================================================

/// Output format requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    /// Fixed-width text table
    #[default]
    TextPlain,
    /// JSON document
    ApplicationJson,
}

impl MediaType {
    /// Parse a media type string; anything unrecognized is plain text
    pub fn parse(raw: &str) -> Self {
        let essence = raw.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("application/json") || essence.eq_ignore_ascii_case("json")
        {
            Self::ApplicationJson
        } else {
            Self::TextPlain
        }
    }

    /// Content-Type header value
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::TextPlain => "text/plain; charset=utf-8",
            Self::ApplicationJson => "application/json",
        }
    }
}

// =============================================================================
// Text Table
// =============================================================================

/// One table row for an instance
pub fn instance_row(instance: &ServiceInstance) -> String {
    let host = format!("{} {}", instance.address, instance.port);
    let version = format!("{} [{}]", instance.payload, instance.id);
    format!(
        "| {:<dw$} | {:<sw$} | {:<hw$} | {:<vw$} |",
        instance.date,
        instance.name,
        host,
        version,
        dw = COLUMN_DATE_WIDTH,
        sw = COLUMN_SERVICE_WIDTH,
        hw = COLUMN_HOST_WIDTH,
        vw = COLUMN_VERSION_WIDTH,
    )
}

/// Rows for a sequence of instances, one per line
pub fn instance_table(instances: &[ServiceInstance]) -> String {
    let mut out = String::new();
    for instance in instances {
        out.push_str(&instance_row(instance));
        out.push('\n');
    }
    out
}

/// Column header row
pub fn header_row() -> String {
    format!(
        "| {:<dw$}| {:<sw$}| {:<hw$}| {:<vw$}|",
        "Date",
        "ServiceName",
        "Host: Name,IP,Port",
        "Version,MetaData,ZK-ID",
        dw = COLUMN_DATE_WIDTH + 1,
        sw = COLUMN_SERVICE_WIDTH + 1,
        hw = COLUMN_HOST_WIDTH + 1,
        vw = COLUMN_VERSION_WIDTH + 1,
    )
}

/// Underscore row under the header
pub fn separator_row() -> String {
    let mut out = String::from("|");
    for offset in SEPARATOR_OFFSETS {
        out.push_str(&"_".repeat(offset - 1));
        out.push('|');
    }
    out
}

/// Full table for every service in a view
///
/// Starts with the ensemble address and server version, then the header,
/// the separator and one row per instance.
pub fn service_table(view: &DiscoveryView, ensemble: &str, srv_version: Option<&str>) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write!(
        out,
        "Connected to ZK={}\nversion={}:{}\n\n",
        ensemble,
        PREAMBLE_PRODUCT,
        srv_version.unwrap_or("null")
    );
    out.push_str(&header_row());
    out.push('\n');
    out.push_str(&separator_row());
    out.push('\n');
    for instances in view.services.values() {
        out.push_str(&instance_table(instances));
    }
    out
}

// =============================================================================
// JSON
// =============================================================================

/// JSON rendering of a view
pub fn view_json(view: &DiscoveryView) -> serde_json::Result<String> {
    serde_json::to_string_pretty(view)
}

/// JSON rendering of one service's instances
pub fn instances_json(instances: &[ServiceInstance]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(instances)
}

/// Render a view in the requested format
pub fn render_view(
    view: &DiscoveryView,
    media_type: MediaType,
    ensemble: &str,
    srv_version: Option<&str>,
) -> serde_json::Result<String> {
    match media_type {
        MediaType::TextPlain => Ok(service_table(view, ensemble, srv_version)),
        MediaType::ApplicationJson => view_json(view),
    }
}

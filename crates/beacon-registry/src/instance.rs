//! Instance records
//!
//! TigerStyle: One stored shape, one canonical shape, explicit conversion.
//!
//! `InstanceRecord` is the JSON document stored in each ephemeral node. Its
//! field names follow the Curator service-discovery layout so that records
//! written by either side can be read by the other:
//!
//! ```text
//! {"name":"Worker_1","id":"<uuid>","address":"host 10.0.0.5","port":18005,
//!  "sslPort":null,"payload":"[1.0.0] [Check]","registrationTimeUTC":1700000000000,
//!  "serviceType":"DYNAMIC","uriSpec":{"parts":[...]}}
//! ```
//!
//! `ServiceInstance` is what discovery hands to callers.

use chrono::{Local, LocalResult, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Registration timestamp format (`dd/MM/yyyy HH:mm:ss`)
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// URI template advertised with every record
pub const URI_SPEC_DEFAULT: &str = "{scheme}://{address}:{port}";

// =============================================================================
// Stored Record
// =============================================================================

/// Kind of registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    /// Tied to a session
    #[default]
    Dynamic,
    /// Persistent registration
    Static,
    /// Permanent registration
    Permanent,
    /// Dynamic with sequential node name
    DynamicSequential,
}

/// One literal or variable piece of a URI template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriPart {
    pub value: String,
    pub variable: bool,
}

/// Parsed URI template
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UriSpec {
    #[serde(default)]
    pub parts: Vec<UriPart>,
}

impl UriSpec {
    /// Parse a `{variable}`-style template
    pub fn parse(template: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = template;

        while !rest.is_empty() {
            match (rest.find('{'), rest.find('}')) {
                (Some(open), Some(close)) if open < close => {
                    if open > 0 {
                        parts.push(UriPart {
                            value: rest[..open].to_string(),
                            variable: false,
                        });
                    }
                    parts.push(UriPart {
                        value: rest[open + 1..close].to_string(),
                        variable: true,
                    });
                    rest = &rest[close + 1..];
                }
                _ => {
                    parts.push(UriPart {
                        value: rest.to_string(),
                        variable: false,
                    });
                    rest = "";
                }
            }
        }

        Self { parts }
    }

    /// Render back to template form
    pub fn template(&self) -> String {
        self.parts
            .iter()
            .map(|p| {
                if p.variable {
                    format!("{{{}}}", p.value)
                } else {
                    p.value.clone()
                }
            })
            .collect()
    }
}

/// JSON document stored at `<namespace>/<serviceName>/<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub name: String,
    pub id: String,
    pub address: String,
    pub port: Option<u16>,
    #[serde(default)]
    pub ssl_port: Option<u16>,
    /// Usually a string; other JSON values are accepted on read
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "registrationTimeUTC")]
    pub registration_time_utc: u64,
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub uri_spec: Option<UriSpec>,
}

impl InstanceRecord {
    /// Payload as text
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode from storage, ignoring unknown fields
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// =============================================================================
// Canonical Instance
// =============================================================================

/// Canonical instance handed to discovery callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub payload: String,
    pub date: String,
    pub id: String,
}

impl ServiceInstance {
    /// Convert a stored record, formatting its timestamp in the local zone
    pub fn from_record(record: &InstanceRecord) -> Self {
        Self::from_record_in(record, &Local)
    }

    /// Convert a stored record, formatting its timestamp in `tz`
    pub fn from_record_in<Tz>(record: &InstanceRecord, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            name: record.name.clone(),
            address: record.address.clone(),
            port: record.port.unwrap_or(0),
            payload: record.payload_text(),
            date: format_registration_time(record.registration_time_utc, tz),
            id: record.id.clone(),
        }
    }
}

/// Format epoch milliseconds as `dd/MM/yyyy HH:mm:ss` in `tz`
pub fn format_registration_time<Tz>(epoch_ms: u64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let millis = i64::try_from(epoch_ms).unwrap_or(i64::MAX);
    match tz.timestamp_millis_opt(millis) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
            t.format(DATE_FORMAT).to_string()
        }
        LocalResult::None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> InstanceRecord {
        InstanceRecord {
            name: "Worker_1".into(),
            id: "abc".into(),
            address: "host 10.0.0.5".into(),
            port: Some(18005),
            ssl_port: None,
            payload: serde_json::Value::String("[1.0.0] [Check]".into()),
            registration_time_utc: 1_700_000_000_000,
            service_type: ServiceType::Dynamic,
            uri_spec: Some(UriSpec::parse(URI_SPEC_DEFAULT)),
        }
    }

    #[test]
    fn test_record_field_names() {
        let json: serde_json::Value = serde_json::from_slice(&record().to_bytes().unwrap()).unwrap();
        assert_eq!(json["registrationTimeUTC"], 1_700_000_000_000u64);
        assert_eq!(json["serviceType"], "DYNAMIC");
        assert!(json["sslPort"].is_null());
        assert!(json["uriSpec"]["parts"].is_array());
    }

    #[test]
    fn test_record_ignores_unknown_fields() {
        let raw = br#"{"name":"w","id":"1","address":"h 1.2.3.4","port":80,
            "payload":"[v] []","registrationTimeUTC":0,"enabled":true,"extra":{"a":1}}"#;
        let rec = InstanceRecord::from_bytes(raw).unwrap();
        assert_eq!(rec.name, "w");
        assert_eq!(rec.service_type, ServiceType::Dynamic);
        assert_eq!(rec.uri_spec, None);
    }

    #[test]
    fn test_payload_text_non_string() {
        let mut rec = record();
        rec.payload = serde_json::json!({"version": "1"});
        assert_eq!(rec.payload_text(), r#"{"version":"1"}"#);
        rec.payload = serde_json::Value::Null;
        assert_eq!(rec.payload_text(), "");
    }

    #[test]
    fn test_uri_spec_parse() {
        let spec = UriSpec::parse(URI_SPEC_DEFAULT);
        let variables: Vec<&str> = spec
            .parts
            .iter()
            .filter(|p| p.variable)
            .map(|p| p.value.as_str())
            .collect();
        assert_eq!(variables, vec!["scheme", "address", "port"]);
        assert_eq!(spec.template(), URI_SPEC_DEFAULT);
        assert_eq!(UriSpec::parse("plain").template(), "plain");
    }

    #[test]
    fn test_format_registration_time() {
        // 2023-11-14T22:13:20Z
        assert_eq!(
            format_registration_time(1_700_000_000_000, &Utc),
            "14/11/2023 22:13:20"
        );
        assert_eq!(format_registration_time(0, &Utc), "01/01/1970 00:00:00");
    }

    #[test]
    fn test_from_record() {
        let instance = ServiceInstance::from_record_in(&record(), &Utc);
        assert_eq!(instance.name, "Worker_1");
        assert_eq!(instance.port, 18005);
        assert_eq!(instance.payload, "[1.0.0] [Check]");
        assert_eq!(instance.date, "14/11/2023 22:13:20");
        assert_eq!(instance.id, "abc");

        let json = serde_json::to_value(&instance).unwrap();
        let mut keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["address", "date", "id", "name", "payload", "port"]);
    }
}

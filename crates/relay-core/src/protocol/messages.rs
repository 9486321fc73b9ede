//! Typed wire message structs.
//!
//! # JSON discriminant
//!
//! Every frame is a JSON object with a `"type"` field selecting the variant;
//! all other fields are flattened into the same object. Serde's
//! `#[serde(tag = "type")]` attribute handles this automatically:
//!
//! ```json
//! {"type":"telemetry","deviceId":"bus-1","lat":29.65,"lng":-82.35,"ts":1000}
//! ```
//!
//! Optional fields are *omitted* when absent (not serialized as `null`), so
//! a payload round-trips byte-for-byte through the snapshot store.
//!
//! # Why are [`Hello`] and [`Telemetry`] not serde types?
//!
//! Inbound frames come from untrusted clients and must fail with a specific
//! human-readable reason (e.g. `deviceId must be a non-empty string`), not a
//! serde path error. The validators in [`crate::protocol::validate`] walk the
//! raw JSON and build these structs by hand; serde is only used for the
//! server-authored [`ServerMsg`] frames.

use serde::{Deserialize, Serialize};

// ── Roles ─────────────────────────────────────────────────────────────────────

/// The role a connection declares in its `hello` handshake.
///
/// A **driver** is the single telemetry producer for a device id; a
/// **viewer** subscribes to that device id and only receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Viewer,
}

impl Role {
    /// Parses the wire spelling of a role.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "driver" => Some(Role::Driver),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Driver => write!(f, "driver"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

// ── Validated inbound messages ────────────────────────────────────────────────

/// A validated `hello` handshake.
///
/// `display_name`, `route_id`, and `direction` are passed through untyped;
/// constraining `direction` to `outbound`/`inbound` is a client-side concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub role: Role,
    pub device_id: String,
    pub display_name: Option<String>,
    pub route_id: Option<String>,
    pub direction: Option<String>,
}

/// A validated `telemetry` message from a driver.
///
/// `lat`, `lng`, and `ts` are guaranteed finite by the validator. The
/// optional metadata fields let a driver refresh its display name or route
/// mid-session without a new handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub device_id: String,
    pub lat: f64,
    pub lng: f64,
    pub ts: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub display_name: Option<String>,
    pub route_id: Option<String>,
    pub direction: Option<String>,
}

// ── Server → Client messages ──────────────────────────────────────────────────

/// All frames the relay sends to a client.
///
/// # Serde representation
///
/// ```json
/// {"type":"hello-ack","role":"driver","deviceId":"bus-1","routeId":"5"}
/// {"type":"error","error":"Only drivers may send telemetry"}
/// {"type":"info","message":"Another driver connected"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    /// Acknowledges a `hello`, echoing the resolved identity.
    ///
    /// Optional fields fall back to remembered device-memory values when the
    /// hello omitted them, so a returning driver sees its prior display name.
    #[serde(rename = "hello-ack", rename_all = "camelCase")]
    HelloAck {
        role: Role,
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        route_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },

    /// A telemetry broadcast (or viewer catch-up replay of the snapshot).
    #[serde(rename = "telemetry", rename_all = "camelCase")]
    Telemetry {
        device_id: String,
        lat: f64,
        lng: f64,
        ts: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        heading: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        route_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },

    /// A protocol/validation failure description. The connection stays open
    /// except after a failed handshake.
    #[serde(rename = "error")]
    Error { error: String },

    /// An advisory notice, e.g. sent to a driver displaced by a newer one.
    #[serde(rename = "info")]
    Info { message: String },
}

impl ServerMsg {
    /// Shorthand for an `error` frame.
    pub fn error(reason: impl Into<String>) -> ServerMsg {
        ServerMsg::Error {
            error: reason.into(),
        }
    }

    /// Shorthand for an `info` frame.
    pub fn info(message: impl Into<String>) -> ServerMsg {
        ServerMsg::Info {
            message: message.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parses_wire_spellings() {
        assert_eq!(Role::parse("driver"), Some(Role::Driver));
        assert_eq!(Role::parse("viewer"), Some(Role::Viewer));
        assert_eq!(Role::parse("Driver"), None, "roles are case-sensitive");
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_hello_ack_serializes_with_type_discriminant() {
        let msg = ServerMsg::HelloAck {
            role: Role::Driver,
            device_id: "bus-1".to_string(),
            display_name: Some("Route 5 Bus".to_string()),
            route_id: None,
            direction: None,
        };

        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains(r#""type":"hello-ack""#));
        assert!(json.contains(r#""role":"driver""#));
        assert!(json.contains(r#""deviceId":"bus-1""#));
        assert!(json.contains(r#""displayName":"Route 5 Bus""#));
    }

    #[test]
    fn test_hello_ack_omits_absent_optional_fields() {
        let msg = ServerMsg::HelloAck {
            role: Role::Viewer,
            device_id: "bus-1".to_string(),
            display_name: None,
            route_id: None,
            direction: None,
        };

        let json = serde_json::to_string(&msg).unwrap();

        // Absent fields must be omitted entirely, not serialized as null.
        assert!(!json.contains("displayName"));
        assert!(!json.contains("routeId"));
        assert!(!json.contains("direction"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_telemetry_uses_camel_case_field_names() {
        let msg = ServerMsg::Telemetry {
            device_id: "bus-1".to_string(),
            lat: 29.65,
            lng: -82.35,
            ts: 1000.0,
            speed: Some(12.5),
            heading: None,
            display_name: None,
            route_id: Some("5".to_string()),
            direction: Some("outbound".to_string()),
        };

        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains(r#""type":"telemetry""#));
        assert!(json.contains(r#""deviceId":"bus-1""#));
        assert!(json.contains(r#""routeId":"5""#));
        assert!(json.contains(r#""direction":"outbound""#));
        assert!(!json.contains("device_id"), "wire names are camelCase");
    }

    #[test]
    fn test_error_frame_shape() {
        let json = serde_json::to_string(&ServerMsg::error("bad input")).unwrap();
        assert_eq!(json, r#"{"type":"error","error":"bad input"}"#);
    }

    #[test]
    fn test_info_frame_shape() {
        let json = serde_json::to_string(&ServerMsg::info("Another driver connected")).unwrap();
        assert_eq!(
            json,
            r#"{"type":"info","message":"Another driver connected"}"#
        );
    }

    #[test]
    fn test_telemetry_round_trips_unchanged() {
        // The snapshot store relies on serialization being stable: what was
        // broadcast is what a late viewer receives.
        let original = ServerMsg::Telemetry {
            device_id: "bus-1".to_string(),
            lat: 29.651,
            lng: -82.352,
            ts: 1_700_000_000.0,
            speed: None,
            heading: Some(270.0),
            display_name: Some("Later Gator".to_string()),
            route_id: None,
            direction: None,
        };
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ServerMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }
}

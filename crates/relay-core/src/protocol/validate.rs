//! Handshake and telemetry validation.
//!
//! Pure functions over a parsed [`serde_json::Value`]: they never panic,
//! never mutate, and on failure return a [`ValidateError`] whose `Display`
//! string is the exact human-readable reason sent back to the client in an
//! `error` frame.
//!
//! Validation is done by hand rather than with `serde(Deserialize)` so a bad
//! field yields `lat must be a finite number` instead of a serde path error,
//! and so unknown extra fields are tolerated rather than rejected.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{Hello, Role, Telemetry};

// ── Error type ────────────────────────────────────────────────────────────────

/// A validation failure, with a client-facing reason string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    /// The first message on a connection was not a `hello`.
    #[error("expected a hello handshake")]
    ExpectedHello,

    /// The `type` field named a message this validator does not handle.
    #[error("unsupported message type")]
    UnsupportedType,

    /// The `role` field was missing or not one of the two known roles.
    #[error("role must be \"driver\" or \"viewer\"")]
    InvalidRole,

    /// The `deviceId` field was missing, not a string, or empty after
    /// trimming whitespace.
    #[error("deviceId must be a non-empty string")]
    InvalidDeviceId,

    /// A required or present numeric field was missing, non-numeric, or NaN.
    #[error("{0} must be a finite number")]
    NonFiniteNumber(&'static str),
}

// ── Validators ────────────────────────────────────────────────────────────────

/// Validates a `hello` handshake message.
///
/// Requires `type == "hello"`, `role ∈ {"driver","viewer"}`, and a non-empty
/// trimmed `deviceId`. The optional `displayName`, `routeId`, and `direction`
/// fields are passed through as opaque strings.
///
/// # Errors
///
/// Returns the specific [`ValidateError`] describing the first failed check.
pub fn validate_hello(msg: &Value) -> Result<Hello, ValidateError> {
    if msg.get("type").and_then(Value::as_str) != Some("hello") {
        return Err(ValidateError::ExpectedHello);
    }

    let role = msg
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .ok_or(ValidateError::InvalidRole)?;

    let device_id = required_device_id(msg)?;

    Ok(Hello {
        role,
        device_id,
        display_name: optional_string(msg, "displayName"),
        route_id: optional_string(msg, "routeId"),
        direction: optional_string(msg, "direction"),
    })
}

/// Validates a `telemetry` message.
///
/// Requires `type == "telemetry"`, a non-empty `deviceId`, and finite
/// numeric `lat`, `lng`, `ts`. `speed` and `heading` must be finite numbers
/// when present. Whether the sender is *allowed* to publish telemetry is the
/// session layer's concern, not this function's.
///
/// # Errors
///
/// Returns the specific [`ValidateError`] describing the first failed check.
pub fn validate_telemetry(msg: &Value) -> Result<Telemetry, ValidateError> {
    if msg.get("type").and_then(Value::as_str) != Some("telemetry") {
        return Err(ValidateError::UnsupportedType);
    }

    let device_id = required_device_id(msg)?;
    let lat = required_number(msg, "lat")?;
    let lng = required_number(msg, "lng")?;
    let ts = required_number(msg, "ts")?;
    let speed = optional_number(msg, "speed")?;
    let heading = optional_number(msg, "heading")?;

    Ok(Telemetry {
        device_id,
        lat,
        lng,
        ts,
        speed,
        heading,
        display_name: optional_string(msg, "displayName"),
        route_id: optional_string(msg, "routeId"),
        direction: optional_string(msg, "direction"),
    })
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn required_device_id(msg: &Value) -> Result<String, ValidateError> {
    let raw = msg
        .get("deviceId")
        .and_then(Value::as_str)
        .ok_or(ValidateError::InvalidDeviceId)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidateError::InvalidDeviceId);
    }
    Ok(trimmed.to_string())
}

fn required_number(msg: &Value, field: &'static str) -> Result<f64, ValidateError> {
    msg.get(field)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .ok_or(ValidateError::NonFiniteNumber(field))
}

fn optional_number(msg: &Value, field: &'static str) -> Result<Option<f64>, ValidateError> {
    match msg.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or(ValidateError::NonFiniteNumber(field)),
    }
}

fn optional_string(msg: &Value, field: &str) -> Option<String> {
    msg.get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── validate_hello ───────────────────────────────────────────────────────

    #[test]
    fn test_hello_minimal_driver_is_accepted() {
        let msg = json!({"type": "hello", "role": "driver", "deviceId": "bus-1"});
        let hello = validate_hello(&msg).unwrap();
        assert_eq!(hello.role, Role::Driver);
        assert_eq!(hello.device_id, "bus-1");
        assert_eq!(hello.display_name, None);
    }

    #[test]
    fn test_hello_passes_through_optional_fields() {
        let msg = json!({
            "type": "hello",
            "role": "viewer",
            "deviceId": "bus-1",
            "displayName": "Campus Loop",
            "routeId": "20",
            "direction": "inbound"
        });
        let hello = validate_hello(&msg).unwrap();
        assert_eq!(hello.display_name.as_deref(), Some("Campus Loop"));
        assert_eq!(hello.route_id.as_deref(), Some("20"));
        assert_eq!(hello.direction.as_deref(), Some("inbound"));
    }

    #[test]
    fn test_hello_direction_is_not_semantically_constrained() {
        // "sideways" is not a real direction, but that is a client-side
        // concern; the relay forwards it opaquely.
        let msg = json!({
            "type": "hello", "role": "driver", "deviceId": "bus-1",
            "direction": "sideways"
        });
        let hello = validate_hello(&msg).unwrap();
        assert_eq!(hello.direction.as_deref(), Some("sideways"));
    }

    #[test]
    fn test_hello_trims_device_id() {
        let msg = json!({"type": "hello", "role": "driver", "deviceId": "  bus-1  "});
        let hello = validate_hello(&msg).unwrap();
        assert_eq!(hello.device_id, "bus-1");
    }

    #[test]
    fn test_hello_rejects_wrong_type() {
        let msg = json!({"type": "telemetry", "role": "driver", "deviceId": "bus-1"});
        assert_eq!(validate_hello(&msg), Err(ValidateError::ExpectedHello));
    }

    #[test]
    fn test_hello_rejects_missing_role() {
        let msg = json!({"type": "hello", "deviceId": "bus-1"});
        assert_eq!(validate_hello(&msg), Err(ValidateError::InvalidRole));
    }

    #[test]
    fn test_hello_rejects_unknown_role() {
        let msg = json!({"type": "hello", "role": "admin", "deviceId": "bus-1"});
        assert_eq!(validate_hello(&msg), Err(ValidateError::InvalidRole));
    }

    #[test]
    fn test_hello_rejects_blank_device_id() {
        let msg = json!({"type": "hello", "role": "driver", "deviceId": "   "});
        assert_eq!(validate_hello(&msg), Err(ValidateError::InvalidDeviceId));
    }

    #[test]
    fn test_hello_rejects_non_string_device_id() {
        let msg = json!({"type": "hello", "role": "driver", "deviceId": 42});
        assert_eq!(validate_hello(&msg), Err(ValidateError::InvalidDeviceId));
    }

    #[test]
    fn test_hello_error_strings_are_client_facing() {
        assert_eq!(
            ValidateError::InvalidRole.to_string(),
            "role must be \"driver\" or \"viewer\""
        );
        assert_eq!(
            ValidateError::InvalidDeviceId.to_string(),
            "deviceId must be a non-empty string"
        );
    }

    // ── validate_telemetry ───────────────────────────────────────────────────

    fn base_telemetry() -> Value {
        json!({
            "type": "telemetry",
            "deviceId": "bus-1",
            "lat": 29.65,
            "lng": -82.35,
            "ts": 1000
        })
    }

    #[test]
    fn test_telemetry_minimal_is_accepted() {
        let t = validate_telemetry(&base_telemetry()).unwrap();
        assert_eq!(t.device_id, "bus-1");
        assert_eq!(t.lat, 29.65);
        assert_eq!(t.lng, -82.35);
        assert_eq!(t.ts, 1000.0);
        assert_eq!(t.speed, None);
        assert_eq!(t.heading, None);
    }

    #[test]
    fn test_telemetry_accepts_optional_numbers() {
        let mut msg = base_telemetry();
        msg["speed"] = json!(13.4);
        msg["heading"] = json!(90);
        let t = validate_telemetry(&msg).unwrap();
        assert_eq!(t.speed, Some(13.4));
        assert_eq!(t.heading, Some(90.0));
    }

    #[test]
    fn test_telemetry_rejects_missing_lat() {
        let mut msg = base_telemetry();
        msg.as_object_mut().unwrap().remove("lat");
        assert_eq!(
            validate_telemetry(&msg),
            Err(ValidateError::NonFiniteNumber("lat"))
        );
    }

    #[test]
    fn test_telemetry_rejects_string_coordinates() {
        let mut msg = base_telemetry();
        msg["lng"] = json!("-82.35");
        assert_eq!(
            validate_telemetry(&msg),
            Err(ValidateError::NonFiniteNumber("lng"))
        );
    }

    #[test]
    fn test_telemetry_rejects_non_numeric_speed() {
        let mut msg = base_telemetry();
        msg["speed"] = json!("fast");
        assert_eq!(
            validate_telemetry(&msg),
            Err(ValidateError::NonFiniteNumber("speed"))
        );
    }

    #[test]
    fn test_telemetry_null_optional_is_treated_as_absent() {
        let mut msg = base_telemetry();
        msg["heading"] = Value::Null;
        let t = validate_telemetry(&msg).unwrap();
        assert_eq!(t.heading, None);
    }

    #[test]
    fn test_telemetry_rejects_missing_device_id() {
        let msg = json!({"type": "telemetry", "lat": 1.0, "lng": 2.0, "ts": 3});
        assert_eq!(validate_telemetry(&msg), Err(ValidateError::InvalidDeviceId));
    }

    #[test]
    fn test_telemetry_rejects_wrong_type() {
        let msg = json!({"type": "hello", "deviceId": "bus-1"});
        assert_eq!(validate_telemetry(&msg), Err(ValidateError::UnsupportedType));
    }

    #[test]
    fn test_telemetry_tolerates_unknown_extra_fields() {
        let mut msg = base_telemetry();
        msg["accuracy"] = json!(5.0);
        assert!(validate_telemetry(&msg).is_ok());
    }
}

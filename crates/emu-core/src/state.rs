//! Snapshot save/restore protocol.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// A component whose complete state can be captured and restored.
///
/// Snapshots are JSON objects so the console can aggregate one key per
/// subsystem and a restore can skip keys that are absent — a partial
/// snapshot restores only the subsystems it carries; the rest keep their
/// current state. Restore must therefore tolerate missing fields rather
/// than fail on them.
pub trait Stateful {
    /// Capture the component's state.
    fn get_state(&self) -> Value;

    /// Restore a previously captured state. Unknown or missing fields
    /// leave the corresponding state untouched.
    fn restore_state(&mut self, state: &Value);
}

/// Encode a byte buffer for a snapshot (base64 keeps RAM images compact).
#[must_use]
pub fn state_bytes(bytes: &[u8]) -> Value {
    Value::String(STANDARD.encode(bytes))
}

/// Decode a byte buffer from a snapshot field.
///
/// Returns `None` if the field is absent or not valid base64 — callers
/// skip the restore of that buffer in that case.
#[must_use]
pub fn state_get_bytes(state: &Value, key: &str) -> Option<Vec<u8>> {
    state
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| STANDARD.decode(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let data = vec![0x00, 0x7F, 0xFF, 0x42];
        let state = serde_json::json!({ "ram": state_bytes(&data) });
        assert_eq!(state_get_bytes(&state, "ram"), Some(data));
    }

    #[test]
    fn missing_key_returns_none() {
        let state = serde_json::json!({ "ram": state_bytes(&[1, 2, 3]) });
        assert_eq!(state_get_bytes(&state, "rom"), None);
    }

    #[test]
    fn invalid_encoding_returns_none() {
        let state = serde_json::json!({ "ram": "not base64 !!!" });
        assert_eq!(state_get_bytes(&state, "ram"), None);
    }
}

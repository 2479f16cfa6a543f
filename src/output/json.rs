//! JSON output formatting.

use serde::Serialize;

use crate::error::FocusError;

/// Serialize any value as pretty-printed JSON.
///
/// # Errors
///
/// Returns `FocusError::Parse` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, FocusError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::focus::SessionState;
    use serde_json::json;

    #[test]
    fn test_to_json() {
        let out = to_json(&json!({ "state": SessionState::Paused, "ms": 5 })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["state"], "paused");
        assert_eq!(value["ms"], 5);
        assert!(out.contains('\n'));
    }
}

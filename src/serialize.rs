// SPDX-License-Identifier: GPL-3.0-or-later
use serde_json::Value;

/// Render a state value into its on-wire bytes.
///
/// Bare strings go out unquoted and null becomes an empty payload; everything
/// else is plain JSON. Hubs read these topics as opaque text, so a quoted
/// `"True"` would not match a binary sensor's `pl_on`.
pub(crate) fn state_payload(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value};

    use super::state_payload;

    #[test]
    fn strings_are_not_quoted() {
        assert_eq!(state_payload(&json!("True")), b"True".to_vec());
    }

    #[test]
    fn null_is_an_empty_payload() {
        assert_eq!(state_payload(&Value::Null), Vec::<u8>::new());
    }

    #[test]
    fn everything_else_is_json() {
        assert_eq!(state_payload(&json!(21.5)), b"21.5".to_vec());
        assert_eq!(
            state_payload(&json!({"count": 2})),
            br#"{"count":2}"#.to_vec()
        );
    }
}

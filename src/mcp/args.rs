/// Argument extraction for tool calls. Every failure names the offending
/// key so the caller's error surfaces as a usable message.

use serde_json::Value;

use crate::mcp::ToolError;

pub fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(ToolError::bad_argument(key, "must not be empty")),
        Some(_) => Err(ToolError::bad_argument(key, "must be a string")),
        None => Err(ToolError::bad_argument(key, "required")),
    }
}

pub fn opt_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolError::bad_argument(key, "must be a string")),
    }
}

pub fn require_u64(args: &Value, key: &str) -> Result<u64, ToolError> {
    match args.get(key) {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| ToolError::bad_argument(key, "must be a non-negative integer")),
        None => Err(ToolError::bad_argument(key, "required")),
    }
}

pub fn opt_u64(args: &Value, key: &str, default: u64) -> Result<u64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| ToolError::bad_argument(key, "must be a non-negative integer")),
    }
}

pub fn opt_bool(args: &Value, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolError::bad_argument(key, "must be a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_str_accepts_nonempty_string() {
        let args = json!({"container": "odoo_v16"});
        assert_eq!(require_str(&args, "container").unwrap(), "odoo_v16");
    }

    #[test]
    fn require_str_rejects_missing_and_wrong_type() {
        let args = json!({"container": 7});
        assert!(matches!(
            require_str(&args, "container"),
            Err(ToolError::BadArgument { .. })
        ));
        assert!(matches!(
            require_str(&args, "absent"),
            Err(ToolError::BadArgument { .. })
        ));
    }

    #[test]
    fn opt_u64_falls_back_to_default() {
        let args = json!({});
        assert_eq!(opt_u64(&args, "tail", 100).unwrap(), 100);
        let args = json!({"tail": 50});
        assert_eq!(opt_u64(&args, "tail", 100).unwrap(), 50);
    }

    #[test]
    fn opt_u64_rejects_negative() {
        let args = json!({"tail": -1});
        assert!(opt_u64(&args, "tail", 100).is_err());
    }

    #[test]
    fn opt_bool_handles_null_as_default() {
        let args = json!({"detach": null});
        assert!(opt_bool(&args, "detach", true).unwrap());
    }
}

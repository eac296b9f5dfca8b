use crate::error::ToolExecutionError;
use crate::types::ToolArguments;

pub fn required_str<'a>(
    arguments: &'a ToolArguments,
    tool: &str,
    key: &str,
) -> Result<&'a str, ToolExecutionError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ToolExecutionError::new(format!("{tool} requires a string '{key}' argument"))
        })
}

pub fn optional_str<'a>(arguments: &'a ToolArguments, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(|v| v.as_str())
}

pub fn optional_bool(arguments: &ToolArguments, key: &str, default: bool) -> bool {
    arguments
        .get(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

/// Accepts integers as well as numeric strings, since models send both.
pub fn optional_usize(arguments: &ToolArguments, key: &str) -> Option<usize> {
    let value = arguments.get(key)?;
    value
        .as_u64()
        .map(|v| v as usize)
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_required_str_names_tool_and_key() {
        let err = required_str(&args(json!({})), "read_file", "path").unwrap_err();
        assert_eq!(err.message, "read_file requires a string 'path' argument");
    }

    #[test]
    fn test_optional_usize_accepts_numeric_strings() {
        let input = args(json!({"limit": "5", "timeout": 2, "bad": "x"}));
        assert_eq!(optional_usize(&input, "limit"), Some(5));
        assert_eq!(optional_usize(&input, "timeout"), Some(2));
        assert_eq!(optional_usize(&input, "bad"), None);
        assert_eq!(optional_usize(&input, "missing"), None);
    }
}

//! Placeholder substitution for response text
//!
//! `{name}` is replaced by the matching request argument; `{{` and `}}` are
//! literal braces. Placeholders without a matching argument are left as-is.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Fill `{name}` placeholders from `arguments`
pub fn fill(template: &str, arguments: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match caps.get(1) {
            Some(name) => match arguments.get(name.as_str()) {
                Some(value) => render(value),
                None => {
                    tracing::debug!(placeholder = name.as_str(), "No argument for placeholder");
                    caps[0].to_string()
                },
            },
            None if &caps[0] == "{{" => "{".to_string(),
            None => "}".to_string(),
        })
        .into_owned()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fill_strings_and_numbers() {
        let arguments = args(json!({"name": "Ada", "count": 3}));
        assert_eq!(
            fill("Hello {name}, you have {count} messages", &arguments),
            "Hello Ada, you have 3 messages"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        let arguments = args(json!({}));
        assert_eq!(fill("Hello {name}", &arguments), "Hello {name}");
    }

    #[test]
    fn test_escaped_braces() {
        let arguments = args(json!({"x": 1}));
        assert_eq!(fill("{{x}} is {x}", &arguments), "{x} is 1");
    }

    #[test]
    fn test_text_without_placeholders() {
        let arguments = args(json!({"x": 1}));
        assert_eq!(fill("plain text", &arguments), "plain text");
        assert_eq!(fill("", &arguments), "");
    }
}

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value as Json};

use crate::model::{Key, Namespace, Value};

/// Everything one render needs besides the template itself.
#[derive(Debug, Default)]
pub struct RenderContext {
    pub globals: Namespace,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawContext {
    globals: Map<String, Json>,
    args: Vec<Json>,
    kwargs: Map<String, Json>,
}

/// Parse a render context file.
///
/// The file is a JSON object with three optional members:
///   • "globals" – object, names visible to the template
///   • "args"    – array, positional arguments for `def with`
///   • "kwargs"  – object, keyword arguments for `def with`
///
/// Any other member is reported as an error.
pub fn load_context(json: &str) -> Result<RenderContext> {
    let root: Json = serde_json::from_str(json).context("context is not valid JSON")?;
    if !root.is_object() {
        return Err(anyhow!("context must be a JSON object, found {}", kind(&root)));
    }
    let raw: RawContext = serde_json::from_value(root).context("malformed render context")?;

    Ok(RenderContext {
        globals: namespace(&raw.globals),
        args: raw.args.iter().map(Value::from).collect(),
        kwargs: raw
            .kwargs
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value)))
            .collect(),
    })
}

/// Parse a bare JSON object into a namespace, e.g. a globals-only file.
pub fn load_namespace(json: &str) -> Result<Namespace> {
    let root: Json = serde_json::from_str(json).context("namespace is not valid JSON")?;
    match &root {
        Json::Object(members) => Ok(namespace(members)),
        other => Err(anyhow!("namespace must be a JSON object, found {}", kind(other))),
    }
}

fn namespace(members: &Map<String, Json>) -> Namespace {
    members
        .iter()
        .map(|(name, value)| (name.clone(), Value::from(value)))
        .collect()
}

fn kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

// ─────────────────────────────────────────────────────
/// JSON maps onto the closest template value; integers that fit stay
/// integers, everything else numeric becomes a float.
impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Value::None,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::str(s),
            Json::Array(items) => Value::list(items.iter().map(Value::from).collect()),
            Json::Object(members) => Value::dict(
                members
                    .iter()
                    .map(|(k, v)| (Key::from(k.as_str()), Value::from(v))),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_values() {
        let test_cases = vec![
            ("null", Value::None),
            ("true", Value::Bool(true)),
            ("3", Value::Int(3)),
            ("2.5", Value::Float(2.5)),
            ("18446744073709551615", Value::Float(18446744073709551615.0)),
            ("\"hi\"", Value::str("hi")),
            ("[1, \"a\"]", Value::list(vec![Value::Int(1), Value::str("a")])),
        ];

        for (src, expected) in test_cases {
            let json: Json = serde_json::from_str(src).unwrap();
            assert_eq!(Value::from(&json), expected, "{src}");
        }
    }

    #[test]
    fn test_objects_keep_member_order() {
        let json: Json = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        assert_eq!(Value::from(&json).to_string(), "{'b': 1, 'a': 2}");
    }

    #[test]
    fn test_rejects_non_objects() {
        let err = load_context("[1]").unwrap_err();
        assert!(err.to_string().contains("an array"), "{err}");
        assert!(load_namespace("3").is_err());
    }
}

//! Deserializers for fields Promtail reads as strings.
//!
//! YAML resolves `port: 9080` to an integer and `enabled: true` to a bool,
//! while Promtail treats both as the strings `"9080"` and `"true"`. These
//! helpers accept any scalar for such fields.

use indexmap::IndexMap;
use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// The string form of a scalar, or `None` for null and collections.
pub fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn expect_scalar<E: Error>(value: &Value) -> Result<String, E> {
    to_string(value).ok_or_else(|| E::custom(format!("expected a scalar, found {}", describe(value))))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
        _ => "a scalar",
    }
}

/// `Option<String>` field; null and absent both read as `None`.
pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => expect_scalar(&value).map(Some),
    }
}

/// Label map whose values may be any scalar.
pub fn string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<IndexMap<String, String>, D::Error> {
    let raw = Option::<IndexMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(key, value)| {
            let value = expect_scalar(&value)
                .map_err(|e: D::Error| D::Error::custom(format!("label '{}': {}", key, e)))?;
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize)]
    struct Labels {
        #[serde(default, deserialize_with = "string_map")]
        labels: IndexMap<String, String>,
        #[serde(default, deserialize_with = "opt_string")]
        value: Option<String>,
    }

    #[test]
    fn test_unquoted_scalars() {
        let parsed: Labels =
            serde_yaml::from_str("labels: {port: 9080, debug: true, ratio: 0.5, job: app}\nvalue: 500\n")
                .unwrap();

        let pairs: Vec<(&str, &str)> = parsed
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("port", "9080"), ("debug", "true"), ("ratio", "0.5"), ("job", "app")]
        );
        assert_eq!(parsed.value.as_deref(), Some("500"));
    }

    #[test]
    fn test_null_and_absent() {
        let parsed: Labels = serde_yaml::from_str("labels:\nvalue: ~\n").unwrap();
        assert!(parsed.labels.is_empty());
        assert!(parsed.value.is_none());

        let parsed: Labels = serde_yaml::from_str("{}").unwrap();
        assert!(parsed.value.is_none());
    }

    #[test]
    fn test_collection_value_rejected() {
        let err = serde_yaml::from_str::<Labels>("labels: {job: [a, b]}\n").unwrap_err();
        assert!(err.to_string().contains("label 'job'"));
        assert!(err.to_string().contains("a sequence"));
    }
}

//! Declarative state values
//!
//! Resource configuration and state are exchanged with the framework as
//! JSON-shaped dynamic values. Nested blocks limited to one item arrive as
//! a list holding a single map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use feedform_common::Result;

/// Dynamic value that can be encoded/decoded from framework state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DynamicValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<DynamicValue>),
    Map(HashMap<String, DynamicValue>),
}

impl DynamicValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, DynamicValue>> {
        match self {
            DynamicValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map()?.get(key)
    }
}

/// Decode a dynamic value from its JSON encoding; empty input is null
pub fn decode_dynamic_value(data: &[u8]) -> Result<DynamicValue> {
    if data.is_empty() {
        return Ok(DynamicValue::Null);
    }
    Ok(serde_json::from_slice(data)?)
}

/// Encode a dynamic value as JSON
pub fn encode_dynamic_value(value: &DynamicValue) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Extract a string attribute, empty when missing
pub fn get_string_attr(value: &DynamicValue, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_string())
        .unwrap_or("")
        .to_string()
}

/// Extract a string attribute, treating empty strings as unset
pub fn get_optional_string_attr(value: &DynamicValue, key: &str) -> Option<String> {
    value.get(key).and_then(|v| match v {
        DynamicValue::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

pub fn get_bool_attr(value: &DynamicValue, key: &str, default: bool) -> bool {
    value
        .get(key)
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

/// First item of a nested block list, if any
pub fn get_block<'a>(value: &'a DynamicValue, key: &str) -> Option<&'a DynamicValue> {
    value
        .get(key)
        .and_then(|v| v.as_list())
        .and_then(|items| items.first())
        .filter(|item| !item.is_null())
}

/// Create a DynamicValue map with the given attributes
pub fn make_state(attrs: Vec<(&str, DynamicValue)>) -> DynamicValue {
    let mut map = HashMap::new();
    for (key, value) in attrs {
        map.insert(key.to_string(), value);
    }
    DynamicValue::Map(map)
}

pub fn string_value(s: impl Into<String>) -> DynamicValue {
    DynamicValue::String(s.into())
}

/// String value, or null for `None`
pub fn optional_string_value(s: Option<impl Into<String>>) -> DynamicValue {
    s.map(string_value).unwrap_or(DynamicValue::Null)
}

pub fn bool_value(b: bool) -> DynamicValue {
    DynamicValue::Bool(b)
}

pub fn list_value(items: Vec<DynamicValue>) -> DynamicValue {
    DynamicValue::List(items)
}

pub fn null_value() -> DynamicValue {
    DynamicValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_config() {
        let raw = br#"{
            "name": "pkgs",
            "project_id": null,
            "features": [{ "permanent_delete": true }]
        }"#;
        let value = decode_dynamic_value(raw).unwrap();

        assert_eq!(get_string_attr(&value, "name"), "pkgs");
        assert_eq!(get_optional_string_attr(&value, "project_id"), None);

        let features = get_block(&value, "features").unwrap();
        assert!(get_bool_attr(features, "permanent_delete", false));
        assert!(!get_bool_attr(features, "restore", false));
    }

    #[test]
    fn test_empty_input_is_null() {
        assert!(decode_dynamic_value(b"").unwrap().is_null());
        assert!(decode_dynamic_value(b"{not json").is_err());
    }

    #[test]
    fn test_missing_or_empty_block() {
        let value = make_state(vec![("features", list_value(vec![]))]);
        assert!(get_block(&value, "features").is_none());
        assert!(get_block(&null_value(), "features").is_none());
    }

    #[test]
    fn test_encode_keeps_nulls() {
        let value = make_state(vec![
            ("id", string_value("")),
            ("project_id", optional_string_value(None::<String>)),
        ]);
        let decoded = decode_dynamic_value(&encode_dynamic_value(&value).unwrap()).unwrap();
        assert_eq!(decoded, value);
        assert!(decoded.get("project_id").unwrap().is_null());
    }
}

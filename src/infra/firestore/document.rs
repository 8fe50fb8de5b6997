// Typed view of Firestore's REST value encoding.
//
// On the wire every field value is an object with exactly one variant key
// (`stringValue`, `integerValue` as a decimal string, `arrayValue`, ...).
// We model that as a struct of Options, the same way different response
// shapes are handled elsewhere, and keep the store code readable through
// small constructors and accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Fields = BTreeMap<String, FsValue>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FsValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_value: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,

    /// 64-bit integers travel as decimal strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_value: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_value: Option<FsArray>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_value: Option<FsMap>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsArray {
    #[serde(default)]
    pub values: Vec<FsValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsMap {
    #[serde(default)]
    pub fields: Fields,
}

impl FsValue {
    pub fn null() -> Self {
        Self {
            null_value: Some(serde_json::Value::Null),
            ..Self::default()
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            boolean_value: Some(value),
            ..Self::default()
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            integer_value: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self {
            timestamp_value: Some(value),
            ..Self::default()
        }
    }

    pub fn array(values: Vec<FsValue>) -> Self {
        Self {
            array_value: Some(FsArray { values }),
            ..Self::default()
        }
    }

    pub fn map(fields: Fields) -> Self {
        Self {
            map_value: Some(FsMap { fields }),
            ..Self::default()
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.string_value.as_deref()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.boolean_value
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Some(raw) = &self.integer_value {
            return raw.parse().ok();
        }
        self.double_value.map(|d| d as i64)
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_value
    }

    /// Array elements, or empty for anything that is not an array.
    pub fn as_array(&self) -> &[FsValue] {
        self.array_value
            .as_ref()
            .map(|array| array.values.as_slice())
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> Option<&Fields> {
        self.map_value.as_ref().map(|map| &map.fields)
    }
}

/// One Firestore document as returned by the REST API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    /// Full resource name: `projects/.../documents/<collection>/<id>`.
    pub name: String,

    pub fields: Fields,

    /// Server-assigned version stamp, used as the write guard for
    /// compare-and-swap updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Last path segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_values() {
        let raw = serde_json::json!({
            "name": "projects/p/databases/(default)/documents/resenas/r1",
            "fields": {
                "usuarioId": {"stringValue": "u1"},
                "numImagenes": {"integerValue": "2"},
                "visibleParaAutor": {"booleanValue": false},
                "imagenes": {"arrayValue": {"values": [{"stringValue": "a"}]}}
            },
            "updateTime": "2024-05-01T10:00:00.000000Z"
        });

        let document: Document = serde_json::from_value(raw).unwrap();
        assert_eq!(document.id(), "r1");
        assert_eq!(
            document.fields.get("usuarioId").and_then(FsValue::as_str),
            Some("u1")
        );
        assert_eq!(
            document.fields.get("numImagenes").and_then(FsValue::as_i64),
            Some(2)
        );
        assert_eq!(
            document
                .fields
                .get("visibleParaAutor")
                .and_then(FsValue::as_bool),
            Some(false)
        );
        assert_eq!(document.fields.get("imagenes").unwrap().as_array().len(), 1);
        assert!(document.update_time.is_some());
    }

    #[test]
    fn integers_serialize_as_strings() {
        let encoded = serde_json::to_value(FsValue::integer(42)).unwrap();
        assert_eq!(encoded, serde_json::json!({"integerValue": "42"}));
    }

    #[test]
    fn only_the_set_variant_is_serialized() {
        let encoded = serde_json::to_value(FsValue::string("hola")).unwrap();
        assert_eq!(encoded, serde_json::json!({"stringValue": "hola"}));
    }

    #[test]
    fn empty_array_still_carries_the_variant_key() {
        let encoded = serde_json::to_value(FsValue::array(vec![])).unwrap();
        assert_eq!(encoded, serde_json::json!({"arrayValue": {"values": []}}));
    }
}

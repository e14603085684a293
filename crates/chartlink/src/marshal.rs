//! Boundary value representation.
//!
//! Containers do not cross the bridge as raw nested JSON blobs: every value
//! is converted explicitly into a [`WireValue`] on the sending side and back
//! into a native value on the receiving side. Arbitrary objects that have no
//! `WireValue` shape travel as an opaque [`ObjectBlob`] instead.

use serde::{Deserialize, Serialize};

/// A value crossing the controller/worker boundary.
///
/// Scalars map one-to-one; sequences and mappings are converted element by
/// element. Mapping keys are stringified on conversion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum WireValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    List(Vec<WireValue>),
    Map(Vec<(String, WireValue)>),
}

impl WireValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// An opaque serialized object payload.
///
/// Produced by the controller's object codec, decoded exactly once on the
/// worker side and then discarded. Base64-encoded inside the JSON frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectBlob(#[serde(with = "base64_bytes")] Vec<u8>);

impl ObjectBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_serialize_tagged() {
        assert_eq!(
            serde_json::to_value(WireValue::Null).unwrap(),
            json!({"t": "null"})
        );
        assert_eq!(
            serde_json::to_value(WireValue::Int(42)).unwrap(),
            json!({"t": "int", "v": 42})
        );
        assert_eq!(
            serde_json::to_value(WireValue::Str("hi".into())).unwrap(),
            json!({"t": "str", "v": "hi"})
        );
    }

    #[test]
    fn bytes_serialize_as_base64() {
        let value = WireValue::Bytes(vec![1, 2, 3]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"t": "bytes", "v": "AQID"})
        );
        let back: WireValue = serde_json::from_value(json!({"t": "bytes", "v": "AQID"})).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn nested_containers_roundtrip() {
        let value = WireValue::Map(vec![
            ("xs".into(), WireValue::List(vec![WireValue::Int(1), WireValue::Float(2.5)])),
            ("label".into(), WireValue::Str("throughput".into())),
            ("raw".into(), WireValue::Bytes(b"\x00\xff".to_vec())),
        ]);
        let encoded = serde_json::to_string(&value).unwrap();
        let back: WireValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn blob_is_transparent_base64() {
        let blob = ObjectBlob::new(b"abc".to_vec());
        assert_eq!(serde_json::to_value(&blob).unwrap(), json!("YWJj"));
        let back: ObjectBlob = serde_json::from_value(json!("YWJj")).unwrap();
        assert_eq!(back.as_bytes(), b"abc");
    }
}

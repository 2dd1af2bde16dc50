//! Pluggable serialization trait

use crate::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Trait for pluggable serialization formats
///
/// Implement this trait to add custom serialization formats.
/// Built-in implementations: JSON, MessagePack. Formats must be
/// self-describing so a payload can always be decoded into a generic
/// `serde_json::Value` for lenient re-coercion.
pub trait Serializer: Send + Sync + Clone + 'static {
    /// Name of the serializer (recorded with every payload)
    fn name(&self) -> &str;

    /// Serialize a value to bytes
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    /// Deserialize bytes to a value
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// JSON serializer (default)
///
/// Human-readable, widely compatible, good for debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

/// MessagePack serializer (optional)
///
/// Faster and more compact than JSON, but not human-readable.
/// Enable with `msgpack` feature.
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

#[cfg(feature = "msgpack")]
impl Serializer for MsgPackSerializer {
    fn name(&self) -> &str {
        "msgpack"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        rmp_serde::to_vec_named(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

/// Decode bytes written by the named format into a generic value
///
/// Used when a payload was written by a different serializer than the one
/// reading it, or when its shape no longer matches the target type.
pub fn decode_value(format: &str, bytes: &[u8]) -> Result<Value, CacheError> {
    match format {
        "json" => JsonSerializer.deserialize(bytes),
        #[cfg(feature = "msgpack")]
        "msgpack" => MsgPackSerializer.deserialize(bytes),
        other => Err(CacheError::Deserialization(format!(
            "unsupported payload format: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_struct() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Channel {
            name: String,
            number: i32,
        }

        let serializer = JsonSerializer;
        let value = Channel {
            name: "CCTV-1".to_string(),
            number: 1,
        };

        let bytes = serializer.serialize(&value).unwrap();
        let decoded: Channel = serializer.deserialize(&bytes).unwrap();

        assert_eq!(value, decoded);
    }

    #[test]
    fn test_json_serializer_name() {
        assert_eq!(JsonSerializer.name(), "json");
    }

    #[test]
    fn test_decode_value_json() {
        let value = decode_value("json", br#"{"vip":true}"#).unwrap();
        assert_eq!(value["vip"], Value::Bool(true));
    }

    #[test]
    fn test_decode_value_unknown_format() {
        let err = decode_value("bincode", b"\x00").unwrap_err();
        assert!(matches!(err, CacheError::Deserialization(_)));
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_decodes_to_generic_value() {
        let bytes = MsgPackSerializer
            .serialize(&serde_json::json!({ "name": "HunanTV" }))
            .unwrap();
        let value = decode_value("msgpack", &bytes).unwrap();
        assert_eq!(value["name"], "HunanTV");
    }
}

//! Tagged, versioned serialized value

use serde::{Deserialize, Serialize};

/// Serialized value together with the type it was written as
///
/// `type_tag` and `version` come from the writer's `CacheValue` impl;
/// `format` names the serializer that produced `bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Value type identifier
    pub type_tag: String,
    /// Schema version of the value type at write time
    #[serde(default = "default_version")]
    pub version: u32,
    /// Serializer name (`json`, `msgpack`)
    #[serde(default = "default_format")]
    pub format: String,
    /// Serialized value
    pub bytes: Vec<u8>,
}

fn default_version() -> u32 {
    1
}

fn default_format() -> String {
    "json".to_string()
}

impl Payload {
    /// Create a new payload
    pub fn new(
        type_tag: impl Into<String>,
        version: u32,
        format: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            version,
            format: format.into(),
            bytes,
        }
    }

    /// Size of the serialized value in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the serialized value is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check if the payload was written by exactly this type and version
    pub fn matches(&self, type_tag: &str, version: u32) -> bool {
        self.type_tag == type_tag && self.version == version
    }
}

//! Typed cache values and tracked fields

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::FieldSnapshot;

/// A type that can be stored in the cache
///
/// Each type declares the tag and schema version written with its
/// payload. Reading a payload with another tag or version goes through
/// `migrate`, which receives the stored value in generic JSON form; the
/// default re-parses it into `Self`, which covers fields added with
/// `#[serde(default)]` and values written under a generic map shape.
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync {
    /// Stable identifier written with every payload of this type
    const TYPE_TAG: &'static str;

    /// Current schema version
    const VERSION: u32 = 1;

    /// Recover a value written under another tag or version
    fn migrate(type_tag: &str, version: u32, value: Value) -> Option<Self> {
        let _ = (type_tag, version);
        serde_json::from_value(value).ok()
    }
}

/// A value whose freshness depends on some of its fields
pub trait TrackedFields {
    /// Project the fields that must never be served stale
    fn snapshot(&self) -> FieldSnapshot;
}

macro_rules! impl_cache_value {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl CacheValue for $ty {
                const TYPE_TAG: &'static str = $tag;
            }
        )*
    };
}

impl_cache_value! {
    String => "string",
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f64 => "f64",
    Value => "json",
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Banner {
        title: String,
        #[serde(default)]
        priority: u8,
    }

    impl CacheValue for Banner {
        const TYPE_TAG: &'static str = "banner";
        const VERSION: u32 = 2;
    }

    #[test]
    fn test_default_migrate_reparses() {
        let legacy = serde_json::json!({ "title": "Maintenance tonight" });
        let banner = Banner::migrate("banner", 1, legacy).unwrap();
        assert_eq!(banner.title, "Maintenance tonight");
        assert_eq!(banner.priority, 0);
    }

    #[test]
    fn test_default_migrate_rejects_wrong_shape() {
        assert!(Banner::migrate("banner", 1, serde_json::json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_primitive_tags() {
        assert_eq!(<String as CacheValue>::TYPE_TAG, "string");
        assert_eq!(<u64 as CacheValue>::VERSION, 1);
    }
}

//! Core traits for cache operations

mod backend;
mod key;
mod metrics;
mod serializer;
#[cfg(feature = "tracing")]
mod tracing;
mod value;

pub use backend::{CacheBackend, ScopedBackend};
pub use key::CacheKey;
pub use metrics::{CacheMetrics, CacheOperation, NoopMetrics, PurgeReason};
pub use serializer::{decode_value, JsonSerializer, Serializer};
pub use value::{CacheValue, TrackedFields};

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;

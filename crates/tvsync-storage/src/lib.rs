//! tvsync-storage: Storage backends for tvsync

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryConfig};

#[cfg(feature = "file")]
pub use file::{FileBackend, FileConfig};

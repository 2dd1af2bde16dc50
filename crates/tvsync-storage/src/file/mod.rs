//! Durable file-backed cache backend

mod backend;

pub use backend::{FileBackend, FileConfig};

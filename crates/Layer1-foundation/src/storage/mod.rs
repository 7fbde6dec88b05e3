//! Storage
//!
//! - `json`: small JSON documents on disk (job snapshot)

mod json;

pub use json::JsonStore;

//! # desk-foundation
//!
//! Foundation layer for desk:
//! - Error: one error taxonomy shared by every crate
//! - Config: environment driven runtime settings (DeskConfig)
//! - Permission: path confinement guard for client-supplied paths
//! - Storage: JsonStore for small on-disk documents (job snapshot)

pub mod config;
pub mod error;
pub mod permission;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Rejection, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::DeskConfig;

// ============================================================================
// Permission
// ============================================================================
pub use permission::PathGuard;

// ============================================================================
// Storage
// ============================================================================
pub use storage::JsonStore;

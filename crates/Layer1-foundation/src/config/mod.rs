//! Config
//!
//! - `desk.rs` - DeskConfig, environment driven

mod desk;

pub use desk::*;

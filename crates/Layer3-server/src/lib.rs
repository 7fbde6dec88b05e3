//! desk-server: HTTP surface of the desk backend
//!
//! - Job API (submit, poll, stop, list)
//! - File manager confined to the root directory
//! - Icons, status, system stats and client error reports
//! - Ollama pass-through with saved chat history
//! - Static files for the front end

pub mod error;
pub mod extract;
pub mod history;
pub mod monitor;
pub mod ollama;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;

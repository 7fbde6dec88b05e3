//! Path confinement for everything that touches the filesystem on behalf of
//! a client
//!
//! ```rust,ignore
//! use desk_foundation::permission::PathGuard;
//!
//! let guard = PathGuard::new("/srv/desk")?;
//! let target = guard.resolve("docs\\notes")?;   // /srv/desk/docs/notes
//! guard.resolve("../etc/passwd").unwrap_err(); // Error::PathEscape
//! ```

pub mod path_guard;

pub use path_guard::{relative_display, resolve, resolve_name, PathGuard};

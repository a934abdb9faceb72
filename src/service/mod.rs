//! Primitive-valued request dispatch.
//!
//! Transport adapters (HTTP, IPC, a CLI) deserialize a [`Request`], pass it
//! to [`ServiceState::handle`] and send back the [`Response`] or
//! [`ErrorResponse`]. Nothing here knows about any particular transport.
//!
//! ## Operations
//!
//! - `read` - Subtree at a path
//! - `edit` - One edit, committed on its own
//! - `batch` - Several edits in one transaction
//! - `undo` - Restore the previous version
//! - `traverse` - Timewalk with a closure-free pipeline
//! - `resolve` - Endpoint, id and span lookups
//! - `digest` - Content address of the current version

pub mod messages;
pub mod state;

pub use messages::{ErrorResponse, Operation, Request, ResolveQuery, Response, VisitDto};
pub use state::ServiceState;

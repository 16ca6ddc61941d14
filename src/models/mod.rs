//! Data models for the NoteTaker application.
//!
//! The same types travel over the wire in both directions: the server serializes them and the
//! client decodes them into its query cache.

mod note;
mod session;
mod topic;

pub use note::*;
pub use session::*;
pub use topic::*;

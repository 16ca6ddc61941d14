//! Client-side query cache and optimistic mutation coordinator.
//!
//! A view layer renders from [`QueryCache`] entries and dispatches intents through
//! [`NoteBoard`]; writes are applied to the cache immediately and reconciled with the
//! server once the remote call settles.

mod board;
mod cache;
mod http;
mod mutation;
mod selection;
mod store;

#[cfg(test)]
mod testing;

pub use board::*;
pub use cache::*;
pub use http::*;
pub use mutation::*;
pub use selection::*;
pub use store::*;

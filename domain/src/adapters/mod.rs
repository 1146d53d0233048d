//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory store backs unit tests and `memory://` connections. The
//! file-backed store lives in the `sqlite-adapter` crate.

pub mod memory_store;

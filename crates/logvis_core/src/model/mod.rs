//! Domain model for channels and their entries.
//!
//! # Responsibility
//! - Define the typed entities handed out by the repository layer.
//! - Describe the fixed collection schema every channel is created with.
//!
//! # Invariants
//! - A channel id equals the name of its backing store collection.
//! - Entries are immutable once written; only create and delete exist.

pub mod channel;
pub mod entry;

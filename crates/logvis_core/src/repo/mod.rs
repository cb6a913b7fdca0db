//! Repository layer: channel and entry data access over the store.
//!
//! # Responsibility
//! - Issue store operations and translate their outcomes into `ErrorKind`s.
//! - Decode raw store documents into typed entries.
//!
//! # Invariants
//! - Every public operation returns `CoreResult`; nothing panics.
//! - Channel existence is checked before entry-scoped reads and deletes.

pub mod channel_repo;
pub mod decode;
pub mod entry_repo;
pub mod error;

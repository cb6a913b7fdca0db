//! Core use-case services.
//!
//! # Responsibility
//! - Offer one entry point per logical action to transport collaborators.
//! - Keep transports decoupled from store and repository details.

pub mod logvis_service;

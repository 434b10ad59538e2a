//! Common types for the LPS exam session supervisor
//!
//! This crate provides the shared data structures exchanged between the
//! supervisor, its monitor workers, and the report/notification sinks.

pub mod error;
pub mod events;
pub mod security;

pub use error::*;
pub use events::*;
pub use security::*;

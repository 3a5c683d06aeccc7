//! Shared domain types for the Sequent workspace: the common error enum,
//! the configuration model, and structured trace events.

pub mod config;
pub mod error;
pub mod trace;

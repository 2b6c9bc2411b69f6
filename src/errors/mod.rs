//! # Error Handling
//!
//! Domain error types for the school management backend, built on `thiserror`.
//! HTTP mapping lives in [`crate::api::error`].

pub mod types;

pub use types::{AuthErrorType, Result, SchoolError, SetupTokenError};

/// Short alias used throughout the crate.
pub type Error = SchoolError;

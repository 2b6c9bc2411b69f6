//! # schoolhub
//!
//! Backend for a multi-tenant school management system. Every school is a
//! tenant; a platform super admin creates schools and invites their
//! administrators, who in turn manage teachers, students and parents.
//!
//! ## Architecture
//!
//! ```text
//! REST API (axum) → auth middleware → services → repositories → SQLite (sqlx)
//!                        ↓                ↓
//!                 token verifier       mailer (SMTP)
//! ```
//!
//! Accounts are created without a password and receive a one-time setup
//! link by email. Access tokens are HMAC-signed JWTs carrying the caller's
//! role and school; every school-scoped query is filtered by a
//! [`auth::TenantScope`] derived from the verified token.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod mail;
pub mod observability;
pub mod storage;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

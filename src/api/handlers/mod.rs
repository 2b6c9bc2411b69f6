//! HTTP handlers grouped by audience.

pub mod admin;
pub mod auth;
pub mod health;
pub mod super_admin;

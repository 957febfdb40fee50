//! REST API endpoint modules.

pub mod auth;
pub mod status;

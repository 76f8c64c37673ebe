//! HTTP API surface.

pub mod handlers;
pub mod server;
pub mod types;
pub mod validators;

//! Core allocation protocol: configuration, errors, derivation and the
//! allocator itself.

pub mod allocator;
pub mod config;
pub mod derivation;
pub mod errors;

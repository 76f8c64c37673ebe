// src/lib.rs

pub mod api;
pub mod auth;
pub mod core;
pub mod storage;

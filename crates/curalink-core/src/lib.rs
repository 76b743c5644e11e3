//! CuraLink Core Library
//!
//! Shared functionality for CuraLink components:
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing/logging initialization

pub mod db;
pub mod tracing_init;

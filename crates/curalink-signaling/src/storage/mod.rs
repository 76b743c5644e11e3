//! SQLite storage for the CuraLink signaling coordinator.
//!
//! Provides persistence for users, refresh tokens, rooms, join tickets, and
//! call records. The coordinator is the sole mutator of room status.

mod db;
mod models;
mod queries;
mod queries_rooms;


pub use curalink_core::db::DatabaseError;
pub use db::SignalingDatabase;
pub use models::*;

//! CuraLink Signaling Coordinator Library
//!
//! Core functionality for the coordinator:
//! - SQLite storage for users, tokens, rooms, join tickets, and call records
//! - JWT authentication and argon2 password hashing
//! - In-memory connection registry for live signaling sessions
//! - gRPC services (Auth, Room, Signaling, Health)
//! - Reaper for abandoned and expired rooms

pub mod auth;
pub mod reaper;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod storage;

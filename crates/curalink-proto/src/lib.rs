//! CuraLink Protocol Buffers
//!
//! Generated protobuf code for the CuraLink gRPC API.
//!
//! This crate contains:
//! - `AuthService` for registration, login, and token refresh
//! - `RoomService` for room lifecycle operations
//! - `SignalingService` for the bidirectional signaling stream
//! - `Health` for liveness probes

#![allow(clippy::derive_partial_eq_without_eq)]

/// CuraLink v1 API definitions.
///
/// All generated types and services are included here.
pub mod v1 {
    tonic::include_proto!("curalink.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;

// Re-export prost_types for downstream crates that need Timestamp conversion
pub use prost_types;

//! In-memory registry of live signaling connections and room occupancy.

mod connection;

pub use connection::{ClaimOutcome, PeerHandle, RoomEntry, SignalingRegistry};

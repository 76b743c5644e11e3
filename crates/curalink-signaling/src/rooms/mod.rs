//! Room lifecycle: state machine, codes, and the joinable-room listing.

mod code;
mod service;

pub use code::generate_room_code;
pub use service::{ROOM_TTL_SECS, RoomError, RoomManager};

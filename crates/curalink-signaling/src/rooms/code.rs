//! Room code generation.

use rand::RngExt;

/// Generate a short room code patients can type: 8 uppercase hex characters
/// (e.g. `A3F09B12`).
pub fn generate_room_code() -> String {
    format!("{:08X}", rand::rng().random::<u32>())
}

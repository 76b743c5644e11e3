//! Room lifecycle state machine.
//!
//! Rooms move `waiting -> active -> ended` (or straight to `ended`); `ended`
//! is terminal. This manager is the sole mutator of room status. State is
//! always re-derived from the store, so every operation is safe to retry
//! after a crash mid-request.

use curalink_core::db::{DatabaseError, unix_timestamp};
use tracing::{info, warn};

use super::code::generate_room_code;
use crate::auth::password;
use crate::storage::{ActiveRoomRow, Room, SignalingDatabase};

/// Rooms expire two hours after creation.
pub const ROOM_TTL_SECS: i64 = 2 * 60 * 60;

const DEFAULT_MAX_PARTICIPANTS: u32 = 2;

/// Distinguishable room lifecycle failures, so callers can react differently
/// to, say, an expired room vs a wrong password.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    Validation(String),

    #[error("Room not found")]
    NotFound,

    #[error("Room has ended")]
    AlreadyEnded,

    #[error("Room has expired")]
    Expired,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for RoomError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(_) => Self::NotFound,
            other => Self::Storage(other.to_string()),
        }
    }
}

/// The room state machine over the room store.
#[derive(Clone)]
pub struct RoomManager {
    db: SignalingDatabase,
}

impl RoomManager {
    pub const fn new(db: SignalingDatabase) -> Self {
        Self { db }
    }

    /// Create a room for a doctor.
    ///
    /// A doctor has at most one non-ended, unexpired room at a time: any
    /// prior live room is ended before the new one is inserted.
    pub async fn create_room(
        &self,
        doctor_id: &str,
        room_password: &str,
        max_participants: u32,
    ) -> Result<Room, RoomError> {
        if room_password.is_empty() {
            return Err(RoomError::Validation("Room password required".into()));
        }
        let capacity = if max_participants == 0 {
            DEFAULT_MAX_PARTICIPANTS
        } else {
            max_participants
        };
        if capacity != DEFAULT_MAX_PARTICIPANTS {
            return Err(RoomError::Validation(
                "Rooms are limited to two participants".into(),
            ));
        }

        let now = unix_timestamp();
        if let Some(prior) = self.db.get_doctor_live_room(doctor_id, now).await? {
            self.end_room(&prior.id).await?;
            info!(room_code = %prior.room_code, doctor_id, "Superseded prior live room");
        }

        let hash = password::hash_password(room_password)
            .map_err(|e| RoomError::Internal(e.to_string()))?;
        let id = uuid::Uuid::new_v4().to_string();
        let code = generate_room_code();
        let room = self
            .db
            .create_room(
                &id,
                &code,
                doctor_id,
                &hash,
                i64::from(capacity),
                now,
                now + ROOM_TTL_SECS,
            )
            .await?;

        info!(room_code = %room.room_code, doctor_id, "Room created");
        Ok(room)
    }

    /// Fetch a room and apply the lazy liveness checks (not ended, not
    /// expired).
    pub async fn load_joinable(&self, room_code: &str) -> Result<Room, RoomError> {
        let room = self
            .db
            .get_room_by_code(room_code)
            .await?
            .ok_or(RoomError::NotFound)?;
        if room.is_ended() {
            return Err(RoomError::AlreadyEnded);
        }
        if room.is_expired(unix_timestamp()) {
            return Err(RoomError::Expired);
        }
        Ok(room)
    }

    /// Validate a join attempt against the room's password.
    pub async fn verify_join(&self, room_code: &str, room_password: &str) -> Result<Room, RoomError> {
        let room = self.load_joinable(room_code).await?;
        let ok = password::verify_password(room_password, &room.password_hash)
            .map_err(|e| RoomError::Internal(e.to_string()))?;
        if !ok {
            return Err(RoomError::InvalidPassword);
        }
        Ok(room)
    }

    /// `waiting -> active` on first patient join; a no-op when already
    /// active. Opens the call record on the first activation.
    pub async fn activate(&self, room: &Room, patient_id: &str) -> Result<(), RoomError> {
        let first = self.db.activate_room(&room.id).await?;
        if first {
            info!(room_code = %room.room_code, patient_id, "Room activated");
            if let Err(e) = self
                .db
                .record_call_started(&room.id, &room.doctor_id, patient_id, unix_timestamp())
                .await
            {
                warn!(room_id = %room.id, error = %e, "Failed to open call record");
            }
        }
        Ok(())
    }

    /// Transition a room to `ended`. Unconditional and idempotent; closes
    /// the call record if one is open.
    pub async fn end_room(&self, room_id: &str) -> Result<(), RoomError> {
        let ended = self.db.end_room(room_id).await?;
        if ended {
            info!(room_id, "Room ended");
            if let Err(e) = self.db.record_call_ended(room_id, unix_timestamp()).await {
                warn!(room_id, error = %e, "Failed to close call record");
            }
        }
        Ok(())
    }

    /// End a room by code. A missing room is tolerated -- it may already have
    /// been swept, and ending is idempotent.
    pub async fn end_room_by_code(&self, room_code: &str) -> Result<(), RoomError> {
        match self.db.get_room_by_code(room_code).await? {
            Some(room) => self.end_room(&room.id).await,
            None => Ok(()),
        }
    }

    /// Joinable rooms with the owning doctor's profile.
    pub async fn active_rooms(&self) -> Result<Vec<ActiveRoomRow>, RoomError> {
        Ok(self.db.list_active_rooms(unix_timestamp()).await?)
    }

    /// The listing row for one room (create-room acks).
    pub async fn room_info(&self, room: &Room) -> Result<ActiveRoomRow, RoomError> {
        let doctor = self.db.get_user(&room.doctor_id).await?;
        Ok(ActiveRoomRow {
            id: room.id.clone(),
            room_code: room.room_code.clone(),
            status: room.status.clone(),
            doctor_id: room.doctor_id.clone(),
            doctor_name: doctor.full_name,
            doctor_email: doctor.email,
            license_number: doctor.license_number,
            created_at: room.created_at,
            expires_at: room.expires_at,
        })
    }
}

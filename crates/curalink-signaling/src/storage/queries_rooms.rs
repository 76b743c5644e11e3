//! Room, join-ticket, and call-record queries.
//!
//! Room status only ever moves `waiting -> active -> ended`; the guards live
//! in the SQL (`activate_room` refuses anything but `waiting`, so an ended
//! room can never be resurrected by a late activation).

use curalink_core::db::{DatabaseError, unix_timestamp};

use super::db::SignalingDatabase;
use super::models::{ActiveRoomRow, JoinTicket, Room};

/// Ended rooms are kept briefly so clients can still read the final state.
const ENDED_RETENTION_SECS: i64 = 2 * 60;

/// Rooms nobody ever joined are reclaimed after this long.
const WAITING_RETENTION_SECS: i64 = 30 * 60;

impl SignalingDatabase {
    // =========================================================================
    // Room queries
    // =========================================================================

    /// Insert a new room in `waiting` state.
    ///
    /// `created_at` and `expires_at` are stamped by the caller so the pair
    /// stays consistent (expiry is always creation + TTL).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_room(
        &self,
        id: &str,
        room_code: &str,
        doctor_id: &str,
        password_hash: &str,
        max_participants: i64,
        created_at: i64,
        expires_at: i64,
    ) -> Result<Room, DatabaseError> {
        sqlx::query(
            "INSERT INTO rooms (id, room_code, doctor_id, password_hash, max_participants, status, created_at, expires_at) VALUES (?, ?, ?, ?, ?, 'waiting', ?, ?)",
        )
        .bind(id)
        .bind(room_code)
        .bind(doctor_id)
        .bind(password_hash)
        .bind(max_participants)
        .bind(created_at)
        .bind(expires_at)
        .execute(self.pool())
        .await?;

        self.get_room(id).await
    }

    /// Get a room by ID.
    pub async fn get_room(&self, id: &str) -> Result<Room, DatabaseError> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Room {id}")))
    }

    /// Get a room by its human-typed code.
    pub async fn get_room_by_code(&self, room_code: &str) -> Result<Option<Room>, DatabaseError> {
        let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE room_code = ?")
            .bind(room_code)
            .fetch_optional(self.pool())
            .await?;

        Ok(room)
    }

    /// The doctor's current non-ended, unexpired room, if any.
    pub async fn get_doctor_live_room(
        &self,
        doctor_id: &str,
        now: i64,
    ) -> Result<Option<Room>, DatabaseError> {
        let room = sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE doctor_id = ? AND status IN ('waiting', 'active') AND expires_at > ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(doctor_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        Ok(room)
    }

    /// `waiting -> active`. Returns `true` on the first activation; `false`
    /// when the room was already active (or ended -- ended is terminal).
    pub async fn activate_room(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE rooms SET status = 'active' WHERE id = ? AND status = 'waiting'")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a room ended. Unconditional and idempotent.
    pub async fn end_room(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE rooms SET status = 'ended' WHERE id = ? AND status != 'ended'")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Joinable rooms (waiting or active, unexpired) with the owning
    /// doctor's profile, newest first.
    pub async fn list_active_rooms(&self, now: i64) -> Result<Vec<ActiveRoomRow>, DatabaseError> {
        let rooms = sqlx::query_as::<_, ActiveRoomRow>(
            "SELECT r.id, r.room_code, r.status, r.doctor_id, u.full_name AS doctor_name, u.email AS doctor_email, u.license_number, r.created_at, r.expires_at \
             FROM rooms r JOIN users u ON r.doctor_id = u.id \
             WHERE r.status IN ('waiting', 'active') AND r.expires_at > ? \
             ORDER BY r.created_at DESC",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(rooms)
    }

    /// Bulk sweep: delete expired rooms, ended rooms past the read-back
    /// window, and waiting rooms abandoned before anyone joined.
    pub async fn delete_expired_rooms(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM rooms WHERE expires_at < ? \
             OR (status = 'ended' AND created_at < ?) \
             OR (status = 'waiting' AND created_at < ?)",
        )
        .bind(now)
        .bind(now - ENDED_RETENTION_SECS)
        .bind(now - WAITING_RETENTION_SECS)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Join-ticket queries
    // =========================================================================

    /// Persist a freshly issued join ticket.
    pub async fn create_join_ticket(
        &self,
        jti: &str,
        user_id: &str,
        room_code: &str,
        expires_at: i64,
    ) -> Result<JoinTicket, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO join_tickets (jti, user_id, room_code, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(room_code)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_join_ticket(jti).await
    }

    /// Get a join ticket by jti.
    pub async fn get_join_ticket(&self, jti: &str) -> Result<JoinTicket, DatabaseError> {
        sqlx::query_as::<_, JoinTicket>("SELECT * FROM join_tickets WHERE jti = ?")
            .bind(jti)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Join ticket {jti}")))
    }

    /// Consume a join ticket. Exactly one caller ever gets `true`: the flip
    /// is a single conditional UPDATE, durable across restarts.
    pub async fn consume_join_ticket(&self, jti: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE join_tickets SET consumed = 1 WHERE jti = ? AND consumed = 0 AND expires_at > ?",
        )
        .bind(jti)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Call-record queries
    // =========================================================================

    /// Open a call record when a room activates.
    pub async fn record_call_started(
        &self,
        room_id: &str,
        doctor_id: &str,
        patient_id: &str,
        started_at: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO call_records (room_id, doctor_id, patient_id, started_at) VALUES (?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(doctor_id)
        .bind(patient_id)
        .bind(started_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Close the open call record for a room, if there is one.
    pub async fn record_call_ended(&self, room_id: &str, ended_at: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE call_records SET ended_at = ?1, duration = ?1 - started_at WHERE room_id = ?2 AND ended_at IS NULL",
        )
        .bind(ended_at)
        .bind(room_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

//! Data models for coordinator storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub license_number: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub revoked: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Room {
    pub id: String,
    pub room_code: String,
    pub doctor_id: String,
    pub password_hash: String,
    pub max_participants: i64,
    pub status: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Room {
    pub fn is_ended(&self) -> bool {
        self.status == "ended"
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Row of the joinable-room listing: a live room joined with the owning
/// doctor's profile.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveRoomRow {
    pub id: String,
    pub room_code: String,
    pub status: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub doctor_email: String,
    pub license_number: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinTicket {
    pub jti: String,
    pub user_id: String,
    pub room_code: String,
    pub expires_at: i64,
    pub consumed: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallRecord {
    pub id: i64,
    pub room_id: String,
    pub doctor_id: String,
    pub patient_id: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub duration: Option<i64>,
}

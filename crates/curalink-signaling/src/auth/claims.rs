//! JWT claims structure for CuraLink auth.

use serde::{Deserialize, Serialize};

/// JWT claims embedded in issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    /// Email address.
    pub email: String,
    /// Role: "doctor", "patient", or "admin".
    pub role: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
    /// Token type: "access", "refresh", or "join".
    pub token_type: String,
    /// Room the token is scoped to; join tickets only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
}

impl Claims {
    pub fn is_access(&self) -> bool {
        self.token_type == "access"
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == "refresh"
    }

    pub fn is_join(&self) -> bool {
        self.token_type == "join"
    }

    pub fn is_doctor(&self) -> bool {
        self.role == "doctor"
    }
}

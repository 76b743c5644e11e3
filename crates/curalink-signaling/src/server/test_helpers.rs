//! Shared test helpers for coordinator service tests.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tonic::Request;

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtManager;
use crate::registry::SignalingRegistry;
use crate::rooms::RoomManager;
use crate::server::signaling_svc::SessionContext;
use crate::storage::SignalingDatabase;

pub fn test_jwt() -> Arc<JwtManager> {
    Arc::new(JwtManager::new(b"test-secret-key-for-testing", 3600, 86400))
}

/// Claims for the seeded doctor "d1".
pub fn doctor_claims() -> Claims {
    Claims {
        jti: "test-jti-d1".into(),
        sub: "d1".into(),
        email: "doc@example.com".into(),
        role: "doctor".into(),
        iat: 0,
        exp: i64::MAX,
        token_type: "access".into(),
        room_code: None,
    }
}

/// Claims for a seeded patient ("p1" or "p2").
pub fn patient_claims(user_id: &str) -> Claims {
    Claims {
        jti: format!("test-jti-{user_id}"),
        sub: user_id.into(),
        email: format!("{user_id}@example.com"),
        role: "patient".into(),
        iat: 0,
        exp: i64::MAX,
        token_type: "access".into(),
        room_code: None,
    }
}

/// An in-memory database seeded with doctor "d1" and patients "p1"/"p2".
pub async fn seeded_db() -> SignalingDatabase {
    let db = SignalingDatabase::open_in_memory().await.unwrap();
    db.create_user("d1", "doc@example.com", "Dr. Alice", "doctor", Some("LIC-1"), "hash")
        .await
        .unwrap();
    db.create_user("p1", "p1@example.com", "Pat One", "patient", None, "hash")
        .await
        .unwrap();
    db.create_user("p2", "p2@example.com", "Pat Two", "patient", None, "hash")
        .await
        .unwrap();
    db
}

/// A session context over a fresh registry and the given database.
pub fn test_context(db: &SignalingDatabase) -> SessionContext {
    SessionContext {
        registry: Arc::new(SignalingRegistry::new()),
        rooms: RoomManager::new(db.clone()),
        db: db.clone(),
        jwt: test_jwt(),
        grace: Duration::from_secs(120),
    }
}

/// Attach pre-validated claims to a request, as the interceptor would.
pub fn with_claims<T>(inner: T, claims: Claims) -> Request<T> {
    let mut req = Request::new(inner);
    req.extensions_mut().insert(claims);
    req
}

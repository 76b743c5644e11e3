//! Tests for `RoomService`: lifecycle RPCs, ownership, and join tickets.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use tonic::Code;

use curalink_proto::v1::room_service_server::RoomService;
use curalink_proto::v1::{
    CreateRoomRequest, EndRoomRequest, GetIceServersRequest, ListActiveRoomsRequest,
    VerifyRoomPasswordRequest,
};

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtManager;
use crate::rooms::RoomManager;
use crate::server::room_svc::{IceConfig, RoomServiceImpl};
use crate::server::test_helpers::{doctor_claims, patient_claims, seeded_db, test_jwt, with_claims};
use crate::storage::SignalingDatabase;

async fn setup() -> (SignalingDatabase, Arc<JwtManager>, RoomServiceImpl) {
    let db = seeded_db().await;
    let jwt = test_jwt();
    let svc = RoomServiceImpl::new(
        db.clone(),
        RoomManager::new(db.clone()),
        Arc::clone(&jwt),
        IceConfig {
            stun_url: Some("stun:stun.example.org:3478".into()),
            turn_url: Some("turn.example.org:3478".into()),
            turn_username: Some("turnuser".into()),
            turn_credential: Some("turnpass".into()),
        },
    );
    (db, jwt, svc)
}

fn create_request() -> CreateRoomRequest {
    CreateRoomRequest {
        password: "secret123".into(),
        max_participants: 2,
    }
}

async fn create_room(svc: &RoomServiceImpl, claims: Claims) -> curalink_proto::v1::RoomInfo {
    svc.create_room(with_claims(create_request(), claims))
        .await
        .unwrap()
        .into_inner()
        .room
        .unwrap()
}

#[tokio::test]
async fn create_room_requires_doctor() {
    let (_db, _jwt, svc) = setup().await;

    let err = svc
        .create_room(with_claims(create_request(), patient_claims("p1")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);
}

#[tokio::test]
async fn create_room_returns_waiting_room() {
    let (_db, _jwt, svc) = setup().await;

    let room = create_room(&svc, doctor_claims()).await;
    assert_eq!(room.status, "waiting");
    assert_eq!(room.room_code.len(), 8);
    assert_eq!(room.doctor_name, "Dr. Alice");
    assert_eq!(room.expires_at - room.created_at, 7200);
}

#[tokio::test]
async fn create_room_supersedes_prior_room() {
    let (db, _jwt, svc) = setup().await;

    let first = create_room(&svc, doctor_claims()).await;
    let second = create_room(&svc, doctor_claims()).await;

    assert_eq!(db.get_room(&first.id).await.unwrap().status, "ended");
    assert_eq!(db.get_room(&second.id).await.unwrap().status, "waiting");

    let listed = svc
        .list_active_rooms(with_claims(ListActiveRoomsRequest {}, patient_claims("p1")))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.rooms.len(), 1);
    assert_eq!(listed.rooms[0].id, second.id);
}

#[tokio::test]
async fn create_room_validates_password() {
    let (_db, _jwt, svc) = setup().await;

    let err = svc
        .create_room(with_claims(
            CreateRoomRequest {
                password: String::new(),
                max_participants: 2,
            },
            doctor_claims(),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn verify_room_password_issues_single_use_ticket() {
    let (db, jwt, svc) = setup().await;
    let room = create_room(&svc, doctor_claims()).await;

    let verified = svc
        .verify_room_password(with_claims(
            VerifyRoomPasswordRequest {
                room_code: room.room_code.clone(),
                password: "secret123".into(),
            },
            patient_claims("p1"),
        ))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(verified.room_id, room.id);

    let ticket = jwt.validate(&verified.join_ticket).unwrap();
    assert!(ticket.is_join());
    assert_eq!(ticket.sub, "p1");
    assert_eq!(ticket.room_code.as_deref(), Some(room.room_code.as_str()));

    // The persisted jti flips exactly once.
    let now = curalink_core::db::unix_timestamp();
    assert!(db.consume_join_ticket(&ticket.jti, now).await.unwrap());
    assert!(!db.consume_join_ticket(&ticket.jti, now).await.unwrap());
}

#[tokio::test]
async fn verify_room_password_distinguishes_failures() {
    let (db, _jwt, svc) = setup().await;
    let room = create_room(&svc, doctor_claims()).await;

    let err = svc
        .verify_room_password(with_claims(
            VerifyRoomPasswordRequest {
                room_code: "ZZZZ0000".into(),
                password: "secret123".into(),
            },
            patient_claims("p1"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    let err = svc
        .verify_room_password(with_claims(
            VerifyRoomPasswordRequest {
                room_code: room.room_code.clone(),
                password: "wrong".into(),
            },
            patient_claims("p1"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    db.end_room(&room.id).await.unwrap();
    let err = svc
        .verify_room_password(with_claims(
            VerifyRoomPasswordRequest {
                room_code: room.room_code,
                password: "secret123".into(),
            },
            patient_claims("p1"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::FailedPrecondition);
}

#[tokio::test]
async fn end_room_checks_ownership() {
    let (db, _jwt, svc) = setup().await;
    db.create_user("d2", "doc2@example.com", "Dr. Bob", "doctor", Some("LIC-2"), "hash")
        .await
        .unwrap();
    let room = create_room(&svc, doctor_claims()).await;

    let mut other_doctor = doctor_claims();
    other_doctor.sub = "d2".into();
    other_doctor.email = "doc2@example.com".into();

    let err = svc
        .end_room(with_claims(
            EndRoomRequest {
                room_code: room.room_code.clone(),
            },
            other_doctor,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);

    svc.end_room(with_claims(
        EndRoomRequest {
            room_code: room.room_code.clone(),
        },
        doctor_claims(),
    ))
    .await
    .unwrap();
    assert_eq!(db.get_room(&room.id).await.unwrap().status, "ended");

    // Ending again is harmless.
    svc.end_room(with_claims(
        EndRoomRequest {
            room_code: room.room_code,
        },
        doctor_claims(),
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn ice_servers_reflect_configuration() {
    let (_db, _jwt, svc) = setup().await;

    let resp = svc
        .get_ice_servers(with_claims(GetIceServersRequest {}, patient_claims("p1")))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(resp.ice_servers.len(), 2);
    assert_eq!(resp.ice_servers[0].urls, vec!["stun:stun.example.org:3478"]);
    assert_eq!(
        resp.ice_servers[1].urls,
        vec![
            "turn:turn.example.org:3478",
            "turn:turn.example.org:3478?transport=tcp"
        ]
    );
    assert_eq!(resp.ice_servers[1].username, "turnuser");
}

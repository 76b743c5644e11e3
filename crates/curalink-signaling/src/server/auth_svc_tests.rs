//! Tests for `AuthService`: registration, login, and refresh rotation.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use tonic::{Code, Request};

use curalink_proto::v1::auth_service_server::AuthService;
use curalink_proto::v1::{LoginRequest, RefreshTokenRequest, RegisterRequest};

use crate::server::auth_svc::AuthServiceImpl;
use crate::server::test_helpers::test_jwt;
use crate::storage::SignalingDatabase;

async fn setup() -> AuthServiceImpl {
    let db = SignalingDatabase::open_in_memory().await.unwrap();
    AuthServiceImpl::new(db, test_jwt())
}

fn doctor_registration() -> RegisterRequest {
    RegisterRequest {
        email: "doc@example.com".into(),
        password: "secret-pass-1".into(),
        full_name: "Dr. Alice".into(),
        role: "doctor".into(),
        license_number: "LIC-1".into(),
    }
}

#[tokio::test]
async fn register_then_login() {
    let svc = setup().await;

    let resp = svc
        .register(Request::new(doctor_registration()))
        .await
        .unwrap()
        .into_inner();
    assert!(!resp.user_id.is_empty());
    assert!(!resp.access_token.is_empty());

    let login = svc
        .login(Request::new(LoginRequest {
            email: "doc@example.com".into(),
            password: "secret-pass-1".into(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(login.user_id, resp.user_id);
    assert_eq!(login.role, "doctor");
}

#[tokio::test]
async fn login_with_wrong_password_fails() {
    let svc = setup().await;
    svc.register(Request::new(doctor_registration()))
        .await
        .unwrap();

    let err = svc
        .login(Request::new(LoginRequest {
            email: "doc@example.com".into(),
            password: "not-the-password".into(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    // Unknown email gets the same answer as a wrong password.
    let err = svc
        .login(Request::new(LoginRequest {
            email: "nobody@example.com".into(),
            password: "secret-pass-1".into(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn register_validates_input() {
    let svc = setup().await;

    let mut bad_email = doctor_registration();
    bad_email.email = "not-an-email".into();
    assert_eq!(
        svc.register(Request::new(bad_email)).await.unwrap_err().code(),
        Code::InvalidArgument
    );

    let mut short_password = doctor_registration();
    short_password.password = "short".into();
    assert_eq!(
        svc.register(Request::new(short_password))
            .await
            .unwrap_err()
            .code(),
        Code::InvalidArgument
    );

    let mut bad_role = doctor_registration();
    bad_role.role = "admin".into();
    assert_eq!(
        svc.register(Request::new(bad_role)).await.unwrap_err().code(),
        Code::InvalidArgument
    );

    let mut unlicensed = doctor_registration();
    unlicensed.license_number = String::new();
    assert_eq!(
        svc.register(Request::new(unlicensed))
            .await
            .unwrap_err()
            .code(),
        Code::InvalidArgument
    );
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let svc = setup().await;
    svc.register(Request::new(doctor_registration()))
        .await
        .unwrap();

    let err = svc
        .register(Request::new(doctor_registration()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let svc = setup().await;
    let registered = svc
        .register(Request::new(doctor_registration()))
        .await
        .unwrap()
        .into_inner();

    let refreshed = svc
        .refresh_token(Request::new(RefreshTokenRequest {
            refresh_token: registered.refresh_token.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!refreshed.access_token.is_empty());

    // The old refresh token was revoked by the rotation.
    let err = svc
        .refresh_token(Request::new(RefreshTokenRequest {
            refresh_token: registered.refresh_token,
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    // The new one still works.
    svc.refresh_token(Request::new(RefreshTokenRequest {
        refresh_token: refreshed.refresh_token,
    }))
    .await
    .unwrap();
}

#[tokio::test]
async fn access_token_rejected_as_refresh() {
    let svc = setup().await;
    let registered = svc
        .register(Request::new(doctor_registration()))
        .await
        .unwrap()
        .into_inner();

    let err = svc
        .refresh_token(Request::new(RefreshTokenRequest {
            refresh_token: registered.access_token,
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

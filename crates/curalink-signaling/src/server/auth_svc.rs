//! AuthService gRPC implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use curalink_proto::v1::auth_service_server::AuthService;
use curalink_proto::v1::{
    LoginRequest, LoginResponse, RefreshTokenRequest, RefreshTokenResponse, RegisterRequest,
    RegisterResponse,
};

use crate::auth::jwt::JwtManager;
use crate::auth::password;
use crate::storage::SignalingDatabase;

pub struct AuthServiceImpl {
    db: SignalingDatabase,
    jwt: Arc<JwtManager>,
}

impl AuthServiceImpl {
    pub fn new(db: SignalingDatabase, jwt: Arc<JwtManager>) -> Self {
        Self { db, jwt }
    }

    /// Issue an access/refresh pair and persist the refresh digest.
    async fn issue_token_pair(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
    ) -> Result<(String, String, i64), Status> {
        let (access_token, expires_in) = self
            .jwt
            .issue_access_token(user_id, email, role)
            .map_err(|e| Status::internal(format!("Token creation failed: {}", e)))?;

        let (refresh_token, refresh_exp) = self
            .jwt
            .issue_refresh_token(user_id, email, role)
            .map_err(|e| Status::internal(format!("Token creation failed: {}", e)))?;

        let token_id = uuid::Uuid::new_v4().to_string();
        let token_hash = JwtManager::hash_token(&refresh_token);
        self.db
            .create_token(&token_id, user_id, &token_hash, refresh_exp)
            .await
            .map_err(|e| Status::internal(format!("Token storage failed: {}", e)))?;

        Ok((access_token, refresh_token, expires_in))
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    #[instrument(skip(self, request), fields(rpc = "Login"))]
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let user = self
            .db
            .get_user_by_email(&req.email)
            .await
            .map_err(|_| Status::unauthenticated("Invalid credentials"))?;

        let valid = password::verify_password(&req.password, &user.password_hash)
            .map_err(|_| Status::internal("Password verification failed"))?;

        if !valid {
            warn!(email = %req.email, "Failed login attempt");
            return Err(Status::unauthenticated("Invalid credentials"));
        }

        let (access_token, refresh_token, expires_in) = self
            .issue_token_pair(&user.id, &user.email, &user.role)
            .await?;

        info!(user_id = %user.id, role = %user.role, "User logged in");

        Ok(Response::new(LoginResponse {
            access_token,
            refresh_token,
            expires_in_secs: expires_in,
            user_id: user.id,
            role: user.role,
        }))
    }

    #[instrument(skip(self, request), fields(rpc = "Register"))]
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();

        if !req.email.contains('@') {
            return Err(Status::invalid_argument("A valid email is required"));
        }
        if req.password.len() < 8 {
            return Err(Status::invalid_argument(
                "Password must be at least 8 characters",
            ));
        }
        if req.full_name.is_empty() {
            return Err(Status::invalid_argument("Full name is required"));
        }
        match req.role.as_str() {
            "doctor" => {
                if req.license_number.is_empty() {
                    return Err(Status::invalid_argument(
                        "Doctors must provide a license number",
                    ));
                }
            }
            "patient" => {}
            _ => return Err(Status::invalid_argument("Role must be doctor or patient")),
        }

        if self.db.get_user_by_email(&req.email).await.is_ok() {
            return Err(Status::already_exists("Email already registered"));
        }

        let hash = password::hash_password(&req.password)
            .map_err(|e| Status::internal(format!("Password hashing failed: {}", e)))?;

        let license = (!req.license_number.is_empty()).then_some(req.license_number.as_str());
        let user_id = uuid::Uuid::new_v4().to_string();
        self.db
            .create_user(&user_id, &req.email, &req.full_name, &req.role, license, &hash)
            .await
            .map_err(|e| Status::internal(format!("User creation failed: {}", e)))?;

        let (access_token, refresh_token, expires_in) = self
            .issue_token_pair(&user_id, &req.email, &req.role)
            .await?;

        info!(user_id = %user_id, role = %req.role, "User registered");

        Ok(Response::new(RegisterResponse {
            user_id,
            access_token,
            refresh_token,
            expires_in_secs: expires_in,
        }))
    }

    #[instrument(skip(self, request), fields(rpc = "RefreshToken"))]
    async fn refresh_token(
        &self,
        request: Request<RefreshTokenRequest>,
    ) -> Result<Response<RefreshTokenResponse>, Status> {
        let req = request.into_inner();

        let claims = self
            .jwt
            .validate(&req.refresh_token)
            .map_err(|_| Status::unauthenticated("Invalid refresh token"))?;

        if !claims.is_refresh() {
            return Err(Status::invalid_argument("Not a refresh token"));
        }

        let token_hash = JwtManager::hash_token(&req.refresh_token);
        let stored = self
            .db
            .get_token_by_hash(&token_hash)
            .await
            .map_err(|e| Status::internal(format!("Token lookup failed: {}", e)))?
            .ok_or_else(|| Status::unauthenticated("Refresh token revoked or expired"))?;

        // Revoke old refresh token (rotation)
        self.db
            .revoke_token(&stored.id)
            .await
            .map_err(|e| Status::internal(format!("Token revocation failed: {}", e)))?;

        let (access_token, refresh_token, expires_in) = self
            .issue_token_pair(&claims.sub, &claims.email, &claims.role)
            .await?;

        info!(user_id = %claims.sub, "Refresh token rotated");

        Ok(Response::new(RefreshTokenResponse {
            access_token,
            refresh_token,
            expires_in_secs: expires_in,
        }))
    }
}

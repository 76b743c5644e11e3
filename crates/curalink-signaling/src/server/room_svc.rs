//! RoomService gRPC implementation.
//!
//! The unary face of the room state machine. Every RPC re-derives state from
//! the room store, so a retry after a crash mid-request is harmless.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use curalink_proto::v1::room_service_server::RoomService;
use curalink_proto::v1::{
    CreateRoomRequest, CreateRoomResponse, EndRoomRequest, EndRoomResponse, GetIceServersRequest,
    GetIceServersResponse, IceServer, ListActiveRoomsRequest, ListActiveRoomsResponse, RoomInfo,
    VerifyRoomPasswordRequest, VerifyRoomPasswordResponse,
};

use crate::auth::jwt::{JOIN_TICKET_TTL_SECS, JwtManager};
use crate::rooms::{RoomError, RoomManager};
use crate::server::interceptor::{extract_claims, require_doctor};
use crate::storage::{ActiveRoomRow, SignalingDatabase};

/// STUN/TURN endpoints handed to clients for media path setup.
#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub stun_url: Option<String>,
    pub turn_url: Option<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl IceConfig {
    /// The ICE server list in the shape clients feed to their RTC stack.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut servers = Vec::new();
        if let Some(stun) = &self.stun_url {
            servers.push(IceServer {
                urls: vec![stun.clone()],
                username: String::new(),
                credential: String::new(),
            });
        }
        if let (Some(url), Some(username), Some(credential)) = (
            &self.turn_url,
            &self.turn_username,
            &self.turn_credential,
        ) {
            servers.push(IceServer {
                urls: vec![format!("turn:{url}"), format!("turn:{url}?transport=tcp")],
                username: username.clone(),
                credential: credential.clone(),
            });
        }
        servers
    }
}

/// Map a listing row to its wire shape.
pub(crate) fn to_room_info(row: ActiveRoomRow) -> RoomInfo {
    RoomInfo {
        id: row.id,
        room_code: row.room_code,
        status: row.status,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        doctor_email: row.doctor_email,
        license_number: row.license_number.unwrap_or_default(),
        created_at: row.created_at,
        expires_at: row.expires_at,
    }
}

/// Map a room lifecycle failure to a gRPC status, keeping the reasons
/// distinguishable for legitimate UX.
pub(crate) fn room_error_to_status(e: RoomError) -> Status {
    match e {
        RoomError::Validation(msg) => Status::invalid_argument(msg),
        RoomError::NotFound => Status::not_found("Room not found"),
        RoomError::AlreadyEnded => Status::failed_precondition("Room has ended"),
        RoomError::Expired => Status::failed_precondition("Room has expired"),
        RoomError::InvalidPassword => Status::unauthenticated("Invalid password"),
        RoomError::Internal(msg) | RoomError::Storage(msg) => {
            warn!(error = %msg, "Room operation failed internally");
            Status::internal("Internal error")
        }
    }
}

pub struct RoomServiceImpl {
    db: SignalingDatabase,
    rooms: RoomManager,
    jwt: Arc<JwtManager>,
    ice: IceConfig,
}

impl RoomServiceImpl {
    pub fn new(
        db: SignalingDatabase,
        rooms: RoomManager,
        jwt: Arc<JwtManager>,
        ice: IceConfig,
    ) -> Self {
        Self {
            db,
            rooms,
            jwt,
            ice,
        }
    }
}

#[tonic::async_trait]
impl RoomService for RoomServiceImpl {
    #[instrument(skip(self, request), fields(rpc = "CreateRoom"))]
    async fn create_room(
        &self,
        request: Request<CreateRoomRequest>,
    ) -> Result<Response<CreateRoomResponse>, Status> {
        let claims = extract_claims(&request)?.clone();
        require_doctor(&claims)?;
        let req = request.into_inner();

        let room = self
            .rooms
            .create_room(&claims.sub, &req.password, req.max_participants)
            .await
            .map_err(room_error_to_status)?;

        let row = self
            .rooms
            .room_info(&room)
            .await
            .map_err(room_error_to_status)?;

        Ok(Response::new(CreateRoomResponse {
            room: Some(to_room_info(row)),
        }))
    }

    #[instrument(skip(self, request), fields(rpc = "ListActiveRooms"))]
    async fn list_active_rooms(
        &self,
        request: Request<ListActiveRoomsRequest>,
    ) -> Result<Response<ListActiveRoomsResponse>, Status> {
        extract_claims(&request)?;

        let rows = self
            .rooms
            .active_rooms()
            .await
            .map_err(room_error_to_status)?;

        Ok(Response::new(ListActiveRoomsResponse {
            rooms: rows.into_iter().map(to_room_info).collect(),
        }))
    }

    #[instrument(skip(self, request), fields(rpc = "VerifyRoomPassword"))]
    async fn verify_room_password(
        &self,
        request: Request<VerifyRoomPasswordRequest>,
    ) -> Result<Response<VerifyRoomPasswordResponse>, Status> {
        let claims = extract_claims(&request)?.clone();
        let req = request.into_inner();

        if req.room_code.is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("Room code and password required"));
        }

        let room = self
            .rooms
            .verify_join(&req.room_code, &req.password)
            .await
            .map_err(room_error_to_status)?;

        // Proof of verification for the signaling channel: a signed,
        // expiring, single-use ticket. The jti is persisted so redemption is
        // exactly-once even across a restart.
        let (ticket, jti, expires_at) = self
            .jwt
            .issue_join_ticket(&claims.sub, &claims.email, &claims.role, &room.room_code)
            .map_err(|e| Status::internal(format!("Ticket creation failed: {}", e)))?;
        self.db
            .create_join_ticket(&jti, &claims.sub, &room.room_code, expires_at)
            .await
            .map_err(|e| Status::internal(format!("Ticket storage failed: {}", e)))?;

        info!(room_code = %room.room_code, user_id = %claims.sub, "Join ticket issued");

        Ok(Response::new(VerifyRoomPasswordResponse {
            room_id: room.id,
            join_ticket: ticket,
            expires_in_secs: JOIN_TICKET_TTL_SECS,
        }))
    }

    #[instrument(skip(self, request), fields(rpc = "EndRoom"))]
    async fn end_room(
        &self,
        request: Request<EndRoomRequest>,
    ) -> Result<Response<EndRoomResponse>, Status> {
        let claims = extract_claims(&request)?.clone();
        require_doctor(&claims)?;
        let req = request.into_inner();

        if req.room_code.is_empty() {
            return Err(Status::invalid_argument("Room code required"));
        }

        let room = self
            .db
            .get_room_by_code(&req.room_code)
            .await
            .map_err(|e| Status::internal(format!("Room lookup failed: {}", e)))?
            .ok_or_else(|| Status::not_found("Room not found"))?;

        if room.doctor_id != claims.sub {
            return Err(Status::permission_denied("Not your room"));
        }

        self.rooms
            .end_room(&room.id)
            .await
            .map_err(room_error_to_status)?;

        Ok(Response::new(EndRoomResponse { ended: true }))
    }

    #[instrument(skip(self, request), fields(rpc = "GetIceServers"))]
    async fn get_ice_servers(
        &self,
        request: Request<GetIceServersRequest>,
    ) -> Result<Response<GetIceServersResponse>, Status> {
        extract_claims(&request)?;

        Ok(Response::new(GetIceServersResponse {
            ice_servers: self.ice.ice_servers(),
        }))
    }
}

//! SignalingService gRPC implementation: the per-connection relay loop.
//!
//! One task drives each accepted stream. The connection's identity comes
//! from the admission interceptor and is immutable for its lifetime; the
//! room it relays for comes from its own create/join, never from payload
//! fields. Signaling payloads are forwarded verbatim to the room's other
//! occupant only -- a frame with no live counterpart is dropped silently,
//! because offers may legitimately arrive before the peer joins.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument, warn};

use curalink_proto::v1::signal_frame::Event;
use curalink_proto::v1::signaling_service_server::SignalingService;
use curalink_proto::v1::{
    CallEnded, CreateRoom, CreateRoomAck, JoinRoom, JoinRoomAck, ParticipantJoined,
    ParticipantLeft, RoomList, SessionReady, SignalFrame, join_room::Credential,
};

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtManager;
use crate::reaper;
use crate::registry::{ClaimOutcome, SignalingRegistry};
use crate::rooms::{RoomError, RoomManager};
use crate::server::interceptor::extract_claims;
use crate::server::room_svc::to_room_info;
use crate::storage::{Room, SignalingDatabase};

type SignalStream = Pin<Box<dyn Stream<Item = Result<SignalFrame, Status>> + Send>>;

/// Everything a session needs besides its own identity.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<SignalingRegistry>,
    pub rooms: RoomManager,
    pub db: SignalingDatabase,
    pub jwt: Arc<JwtManager>,
    /// Grace window armed when a bound connection drops.
    pub grace: Duration,
}

pub struct SignalingServiceImpl {
    ctx: SessionContext,
}

impl SignalingServiceImpl {
    pub const fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }
}

#[tonic::async_trait]
impl SignalingService for SignalingServiceImpl {
    type ConnectStream = SignalStream;

    #[instrument(skip(self, request), fields(rpc = "Connect"))]
    async fn connect(
        &self,
        request: Request<Streaming<SignalFrame>>,
    ) -> Result<Response<Self::ConnectStream>, Status> {
        let claims = extract_claims(&request)?.clone();
        let in_stream = request.into_inner();

        let (out_tx, out_rx) = mpsc::channel::<Result<SignalFrame, Status>>(128);
        tokio::spawn(run_session(in_stream, out_tx, claims, self.ctx.clone()));

        Ok(Response::new(Box::pin(ReceiverStream::new(out_rx))))
    }
}

/// Drive one authenticated signaling session until its inbound stream ends.
pub(crate) async fn run_session<S>(
    mut in_stream: S,
    out_tx: mpsc::Sender<Result<SignalFrame, Status>>,
    claims: Claims,
    ctx: SessionContext,
) where
    S: Stream<Item = Result<SignalFrame, Status>> + Unpin + Send + 'static,
{
    let peer_id = uuid::Uuid::new_v4().to_string();

    // Channel peers use to push frames to this connection; a forwarder task
    // moves them onto the gRPC stream.
    let (frame_tx, frame_rx) = mpsc::channel::<SignalFrame>(128);
    ctx.registry
        .register_peer(
            peer_id.clone(),
            claims.sub.clone(),
            claims.role.clone(),
            frame_tx,
        )
        .await;

    let out_tx_fwd = out_tx.clone();
    let forward_task = tokio::spawn(async move {
        let mut frame_rx = frame_rx;
        while let Some(frame) = frame_rx.recv().await {
            if out_tx_fwd.send(Ok(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        peer_id: peer_id.clone(),
        claims,
        ctx,
        out_tx,
        bound_room: None,
    };

    session
        .send(
            String::new(),
            Event::SessionReady(SessionReady {
                peer_id: peer_id.clone(),
            }),
        )
        .await;
    info!(peer_id = %peer_id, user_id = %session.claims.sub, role = %session.claims.role, "Signaling session opened");

    while let Some(result) = in_stream.next().await {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                debug!(peer_id = %peer_id, error = %e, "Signaling stream error");
                break;
            }
        };
        let request_id = frame.request_id;
        match frame.event {
            Some(Event::CreateRoom(req)) => session.on_create_room(request_id, req).await,
            Some(Event::ListRooms(_)) => session.on_list_rooms(request_id).await,
            Some(Event::JoinRoom(req)) => session.on_join_room(request_id, req).await,
            Some(
                event @ (Event::Offer(_) | Event::Answer(_) | Event::IceCandidate(_)),
            ) => session.on_relay(event).await,
            Some(Event::EndCall(_)) => session.on_end_call().await,
            Some(other) => {
                debug!(peer_id = %peer_id, event = ?other, "Ignoring unexpected inbound event");
            }
            None => {}
        }
    }

    // Transport-level disconnect.
    session.ctx.registry.unregister_peer(&peer_id).await;
    forward_task.abort();

    if let Some(room_code) = session.bound_room.take() {
        if let Some(peer) = session.ctx.registry.counterpart(&room_code, &peer_id).await {
            let _ = peer
                .send_frame(event_frame(Event::ParticipantLeft(ParticipantLeft {
                    peer_id: peer_id.clone(),
                })))
                .await;
        }
        // Do not end the room here: a transient drop must survive. The
        // inactivity check re-validates after the grace window instead.
        reaper::schedule_idle_check(
            Arc::clone(&session.ctx.registry),
            session.ctx.rooms.clone(),
            room_code,
            session.ctx.grace,
        );
    }
    info!(peer_id = %peer_id, "Signaling session closed");
}

struct Session {
    peer_id: String,
    claims: Claims,
    ctx: SessionContext,
    out_tx: mpsc::Sender<Result<SignalFrame, Status>>,
    /// Room this connection relays for, set by its own create/join.
    bound_room: Option<String>,
}

impl Session {
    /// Push a frame to this connection's own outbound stream.
    async fn send(&self, request_id: String, event: Event) {
        let frame = SignalFrame {
            request_id,
            timestamp: now_ts(),
            event: Some(event),
        };
        if self.out_tx.send(Ok(frame)).await.is_err() {
            debug!(peer_id = %self.peer_id, "Outbound stream gone, dropping frame");
        }
    }

    async fn on_create_room(&mut self, request_id: String, req: CreateRoom) {
        if !self.claims.is_doctor() {
            return self
                .send(
                    request_id,
                    Event::CreateRoomAck(CreateRoomAck {
                        success: false,
                        error: "Only doctors can create rooms".into(),
                        room: None,
                    }),
                )
                .await;
        }

        let created = self
            .ctx
            .rooms
            .create_room(&self.claims.sub, &req.password, req.max_participants)
            .await;
        let room = match created {
            Ok(room) => room,
            Err(e) => {
                return self
                    .send(
                        request_id,
                        Event::CreateRoomAck(CreateRoomAck {
                            success: false,
                            error: e.to_string(),
                            room: None,
                        }),
                    )
                    .await;
            }
        };

        let info = match self.ctx.rooms.room_info(&room).await {
            Ok(row) => to_room_info(row),
            Err(e) => {
                return self
                    .send(
                        request_id,
                        Event::CreateRoomAck(CreateRoomAck {
                            success: false,
                            error: e.to_string(),
                            room: None,
                        }),
                    )
                    .await;
            }
        };

        // Bind only after the room is durably created.
        self.ctx
            .registry
            .open_room(room.room_code.clone(), room.id.clone(), self.peer_id.clone())
            .await;
        self.bound_room = Some(room.room_code.clone());

        self.send(
            request_id,
            Event::CreateRoomAck(CreateRoomAck {
                success: true,
                error: String::new(),
                room: Some(info),
            }),
        )
        .await;
        broadcast_room_list(&self.ctx.registry, &self.ctx.rooms).await;
    }

    async fn on_list_rooms(&self, request_id: String) {
        let ack = match self.ctx.rooms.active_rooms().await {
            Ok(rows) => RoomList {
                success: true,
                error: String::new(),
                rooms: rows.into_iter().map(to_room_info).collect(),
            },
            Err(e) => RoomList {
                success: false,
                error: e.to_string(),
                rooms: Vec::new(),
            },
        };
        self.send(request_id, Event::RoomList(ack)).await;
    }

    async fn on_join_room(&mut self, request_id: String, req: JoinRoom) {
        let verified = match req.credential {
            Some(Credential::Password(password)) => {
                self.ctx.rooms.verify_join(&req.room_code, &password).await
            }
            Some(Credential::JoinTicket(ticket)) => {
                self.redeem_join_ticket(&req.room_code, &ticket).await
            }
            None => Err(RoomError::Validation("Join credential required".into())),
        };
        let room = match verified {
            Ok(room) => room,
            Err(e) => return self.join_ack_err(request_id, &e.to_string()).await,
        };

        match self
            .ctx
            .registry
            .claim_patient_slot(&room.room_code, &self.peer_id)
            .await
        {
            ClaimOutcome::Claimed { doctor_peer } => {
                if let Err(e) = self.ctx.rooms.activate(&room, &self.claims.sub).await {
                    // The registry must not outlive a failed transition.
                    self.ctx
                        .registry
                        .release_patient_slot(&room.room_code, &self.peer_id)
                        .await;
                    warn!(room_code = %room.room_code, error = %e, "Join failed during activation");
                    return self.join_ack_err(request_id, "Internal error").await;
                }
                self.bound_room = Some(room.room_code.clone());

                self.send(
                    request_id,
                    Event::JoinRoomAck(JoinRoomAck {
                        success: true,
                        error: String::new(),
                        room_id: room.id.clone(),
                    }),
                )
                .await;

                if let Some(doctor) = self.ctx.registry.peer(&doctor_peer).await {
                    let _ = doctor
                        .send_frame(event_frame(Event::ParticipantJoined(ParticipantJoined {
                            peer_id: self.peer_id.clone(),
                            user_id: self.claims.sub.clone(),
                        })))
                        .await;
                }
                info!(room_code = %room.room_code, peer_id = %self.peer_id, "Patient joined room");
                broadcast_room_list(&self.ctx.registry, &self.ctx.rooms).await;
            }
            ClaimOutcome::AlreadyHeld => {
                // Duplicate join from the same connection: a no-op.
                self.bound_room = Some(room.room_code.clone());
                self.send(
                    request_id,
                    Event::JoinRoomAck(JoinRoomAck {
                        success: true,
                        error: String::new(),
                        room_id: room.id,
                    }),
                )
                .await;
            }
            ClaimOutcome::Occupied => {
                self.join_ack_err(request_id, "Room is full").await;
            }
            ClaimOutcome::NoSuchRoom => {
                self.join_ack_err(request_id, "Room is not open for signaling")
                    .await;
            }
        }
    }

    /// Redeem a single-use join ticket issued by `VerifyRoomPassword`.
    async fn redeem_join_ticket(&self, room_code: &str, ticket: &str) -> Result<Room, RoomError> {
        let claims = self
            .ctx
            .jwt
            .validate(ticket)
            .map_err(|_| RoomError::Validation("Invalid join ticket".into()))?;
        if !claims.is_join()
            || claims.room_code.as_deref() != Some(room_code)
            || claims.sub != self.claims.sub
        {
            return Err(RoomError::Validation("Invalid join ticket".into()));
        }

        let consumed = self
            .ctx
            .db
            .consume_join_ticket(&claims.jti, curalink_core::db::unix_timestamp())
            .await
            .map_err(|e| RoomError::Storage(e.to_string()))?;
        if !consumed {
            return Err(RoomError::Validation(
                "Join ticket already used or expired".into(),
            ));
        }

        // The ticket proves password verification, not room liveness:
        // re-derive that from the store.
        self.ctx.rooms.load_joinable(room_code).await
    }

    async fn join_ack_err(&self, request_id: String, error: &str) {
        self.send(
            request_id,
            Event::JoinRoomAck(JoinRoomAck {
                success: false,
                error: error.into(),
                room_id: String::new(),
            }),
        )
        .await;
    }

    /// Forward an offer/answer/ice-candidate to the room's other occupant.
    async fn on_relay(&self, event: Event) {
        let Some(room_code) = &self.bound_room else {
            debug!(peer_id = %self.peer_id, "Relay frame from unbound connection, dropping");
            return;
        };

        self.ctx.registry.touch(room_code).await;

        let Some(peer) = self.ctx.registry.counterpart(room_code, &self.peer_id).await else {
            // The peer may simply not have joined yet.
            debug!(room_code = %room_code, "No counterpart bound, dropping signaling frame");
            return;
        };

        let _ = peer
            .send_frame(event_frame(stamp_sender(event, &self.peer_id)))
            .await;
    }

    async fn on_end_call(&mut self) {
        let Some(room_code) = self.bound_room.take() else {
            return;
        };

        if let Err(e) = self.ctx.rooms.end_room_by_code(&room_code).await {
            warn!(room_code = %room_code, error = %e, "Failed to end room on end-call");
        }

        if let Some(peer) = self.ctx.registry.counterpart(&room_code, &self.peer_id).await {
            let _ = peer
                .send_frame(event_frame(Event::CallEnded(CallEnded {})))
                .await;
        }
        self.ctx.registry.remove_room(&room_code).await;
        info!(room_code = %room_code, peer_id = %self.peer_id, "Call ended");
        broadcast_room_list(&self.ctx.registry, &self.ctx.rooms).await;
    }
}

/// The relay stamps the sender on forwarded payloads; clients never pick
/// their own sender id.
fn stamp_sender(event: Event, peer_id: &str) -> Event {
    match event {
        Event::Offer(mut offer) => {
            offer.sender_id = peer_id.to_string();
            Event::Offer(offer)
        }
        Event::Answer(mut answer) => {
            answer.sender_id = peer_id.to_string();
            Event::Answer(answer)
        }
        Event::IceCandidate(mut candidate) => {
            candidate.sender_id = peer_id.to_string();
            Event::IceCandidate(candidate)
        }
        other => other,
    }
}

fn event_frame(event: Event) -> SignalFrame {
    SignalFrame {
        request_id: String::new(),
        timestamp: now_ts(),
        event: Some(event),
    }
}

fn now_ts() -> Option<prost_types::Timestamp> {
    Some(prost_types::Timestamp::from(std::time::SystemTime::now()))
}

/// Recompute the joinable-room list from the store and push it to every
/// connected client.
pub(crate) async fn broadcast_room_list(registry: &SignalingRegistry, rooms: &RoomManager) {
    let list = match rooms.active_rooms().await {
        Ok(rows) => rows.into_iter().map(to_room_info).collect(),
        Err(e) => {
            warn!(error = %e, "Failed to load room list for broadcast");
            return;
        }
    };
    let frame = event_frame(Event::RoomList(RoomList {
        success: true,
        error: String::new(),
        rooms: list,
    }));
    for peer in registry.all_peers().await {
        if peer.send_frame(frame.clone()).await.is_err() {
            debug!(peer_id = %peer.peer_id, "Failed to push rooms-updated");
        }
    }
}

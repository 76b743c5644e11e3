//! In-memory connection registry for live signaling sessions.
//!
//! The registry answers one question for the relay: "which live transport is
//! the other occupant of this room". It is a volatile cache -- losing it on
//! restart cannot corrupt the room store, it only stops relaying until the
//! peers rejoin. Mutations on the same room code are serialized by the rooms
//! write lock; neither lock is ever held across I/O.
//!
//! Lock order: `rooms` may nest a `peers` read (slot liveness checks), never
//! the reverse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tracing::{info, warn};

use curalink_proto::v1::SignalFrame;

/// A live, authenticated signaling connection.
pub struct PeerHandle {
    /// Transport identity assigned at connect; referenced in participant
    /// events.
    pub peer_id: String,
    /// Authenticated user behind the connection.
    pub user_id: String,
    /// Role fixed at admission: "doctor", "patient", or "admin".
    pub role: String,
    /// Sender for pushing frames to this peer's outbound stream.
    pub frame_tx: mpsc::Sender<SignalFrame>,
}

impl PeerHandle {
    /// Send a frame to this peer's outbound stream.
    pub async fn send_frame(
        &self,
        frame: SignalFrame,
    ) -> Result<(), mpsc::error::SendError<SignalFrame>> {
        self.frame_tx.send(frame).await
    }
}

/// Occupancy of one room: which live transports hold its two slots.
#[derive(Debug, Clone)]
pub struct RoomEntry {
    pub room_id: String,
    pub doctor_peer: String,
    pub patient_peer: Option<String>,
    /// Refreshed on every relayed frame; read by the inactivity check.
    pub last_activity: Instant,
}

impl RoomEntry {
    /// Peer ids currently holding a slot (stale ids included -- the caller
    /// resolves them against the peers map).
    pub fn occupant_ids(&self) -> Vec<String> {
        let mut ids = vec![self.doctor_peer.clone()];
        if let Some(patient) = &self.patient_peer {
            ids.push(patient.clone());
        }
        ids
    }
}

/// Outcome of an attempt to take the patient slot of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Slot taken; the doctor's peer id is returned for notification.
    Claimed { doctor_peer: String },
    /// This peer already holds the slot (duplicate join, a no-op).
    AlreadyHeld,
    /// Another live peer holds the slot; never overwritten.
    Occupied,
    /// No occupancy entry for this room code.
    NoSuchRoom,
}

/// Thread-safe registry of live connections and room occupancy.
pub struct SignalingRegistry {
    peers: RwLock<HashMap<String, Arc<PeerHandle>>>,
    rooms: RwLock<HashMap<String, RoomEntry>>,
}

impl SignalingRegistry {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Register an authenticated connection.
    pub async fn register_peer(
        &self,
        peer_id: String,
        user_id: String,
        role: String,
        frame_tx: mpsc::Sender<SignalFrame>,
    ) -> Arc<PeerHandle> {
        let peer = Arc::new(PeerHandle {
            peer_id: peer_id.clone(),
            user_id,
            role,
            frame_tx,
        });
        self.peers
            .write()
            .await
            .insert(peer_id.clone(), Arc::clone(&peer));
        info!(peer_id = %peer_id, "Signaling connection registered");
        peer
    }

    /// Remove a connection. Room slots it held are left in place so the
    /// grace-period check (or a rejoin) can resolve them.
    pub async fn unregister_peer(&self, peer_id: &str) -> Option<Arc<PeerHandle>> {
        let peer = self.peers.write().await.remove(peer_id);
        if peer.is_some() {
            info!(peer_id = %peer_id, "Signaling connection unregistered");
        } else {
            warn!(peer_id = %peer_id, "Tried to unregister unknown connection");
        }
        peer
    }

    /// Get a connection by peer id.
    pub async fn peer(&self, peer_id: &str) -> Option<Arc<PeerHandle>> {
        self.peers.read().await.get(peer_id).cloned()
    }

    /// All live connections (for room-list broadcasts).
    pub async fn all_peers(&self) -> Vec<Arc<PeerHandle>> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Count of live connections.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Bind a doctor connection to a freshly created room.
    pub async fn open_room(&self, room_code: String, room_id: String, doctor_peer: String) {
        let entry = RoomEntry {
            room_id,
            doctor_peer,
            patient_peer: None,
            last_activity: Instant::now(),
        };
        self.rooms.write().await.insert(room_code.clone(), entry);
        info!(room_code = %room_code, "Room opened for signaling");
    }

    /// Try to take the patient slot of a room.
    ///
    /// Atomic under the rooms write lock: of two concurrent claimants exactly
    /// one gets `Claimed`. A slot held by a peer that is no longer connected
    /// may be reclaimed (patient rejoin after a transient drop); a slot held
    /// by a live peer is never overwritten.
    pub async fn claim_patient_slot(&self, room_code: &str, peer_id: &str) -> ClaimOutcome {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room_code) else {
            return ClaimOutcome::NoSuchRoom;
        };

        match entry.patient_peer.as_deref() {
            Some(current) if current == peer_id => {
                entry.last_activity = Instant::now();
                ClaimOutcome::AlreadyHeld
            }
            Some(current) => {
                if self.peers.read().await.contains_key(current) {
                    ClaimOutcome::Occupied
                } else {
                    entry.patient_peer = Some(peer_id.to_string());
                    entry.last_activity = Instant::now();
                    ClaimOutcome::Claimed {
                        doctor_peer: entry.doctor_peer.clone(),
                    }
                }
            }
            None => {
                entry.patient_peer = Some(peer_id.to_string());
                entry.last_activity = Instant::now();
                ClaimOutcome::Claimed {
                    doctor_peer: entry.doctor_peer.clone(),
                }
            }
        }
    }

    /// Undo a claim whose accompanying store transition failed.
    pub async fn release_patient_slot(&self, room_code: &str, peer_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(entry) = rooms.get_mut(room_code)
            && entry.patient_peer.as_deref() == Some(peer_id)
        {
            entry.patient_peer = None;
        }
    }

    /// Refresh a room's activity timestamp. Returns `false` for unknown
    /// rooms.
    pub async fn touch(&self, room_code: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(room_code) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// The live connection of the room's *other* occupant, if any.
    ///
    /// Returns `None` when the caller is not an occupant -- frames are never
    /// delivered to third connections.
    pub async fn counterpart(&self, room_code: &str, peer_id: &str) -> Option<Arc<PeerHandle>> {
        let other_id = {
            let rooms = self.rooms.read().await;
            let entry = rooms.get(room_code)?;
            if entry.doctor_peer == peer_id {
                entry.patient_peer.clone()?
            } else if entry.patient_peer.as_deref() == Some(peer_id) {
                entry.doctor_peer.clone()
            } else {
                return None;
            }
        };
        self.peers.read().await.get(&other_id).cloned()
    }

    /// Drop a room's occupancy entry (explicit end-call).
    pub async fn remove_room(&self, room_code: &str) -> Option<RoomEntry> {
        self.rooms.write().await.remove(room_code)
    }

    /// Drop a room's occupancy entry only if it has been silent for at least
    /// `grace`. Atomic check-and-remove, so an armed inactivity check and a
    /// racing relayed frame cannot both win.
    pub async fn remove_room_if_stale(
        &self,
        room_code: &str,
        grace: Duration,
    ) -> Option<RoomEntry> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get(room_code)?;
        if entry.last_activity.elapsed() >= grace {
            rooms.remove(room_code)
        } else {
            None
        }
    }

    /// Snapshot of a room's occupancy (tests and diagnostics).
    pub async fn room_entry(&self, room_code: &str) -> Option<RoomEntry> {
        self.rooms.read().await.get(room_code).cloned()
    }
}

impl Default for SignalingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Reclamation of abandoned and expired rooms.
//!
//! Two independent, idempotent mechanisms:
//!
//! 1. A per-room inactivity check armed when a bound connection drops. It
//!    fires once after the grace window and re-reads the room's activity at
//!    fire time -- any relayed frame in between refreshes the timestamp and
//!    defeats the check, so transient drops never kill a consultation.
//! 2. A periodic bulk sweep over the room store. The sweep is the source of
//!    truth for reclaiming storage; its deletes are commutative with
//!    per-room operations (deleting an already-ended room is a no-op).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use curalink_core::db::{DatabaseError, unix_timestamp};
use curalink_proto::v1::signal_frame::Event;
use curalink_proto::v1::{RoomTimeout, SignalFrame};

use crate::registry::SignalingRegistry;
use crate::rooms::RoomManager;
use crate::server::signaling_svc::broadcast_room_list;
use crate::storage::SignalingDatabase;

/// Arm the inactivity check for a room whose occupant just disconnected.
///
/// There is no cancel token: a rejoin or any relayed frame refreshes the
/// room's activity, and the check re-validates staleness when it fires. The
/// atomic check-and-remove in the registry guarantees the room is ended at
/// most once even if several checks race.
pub fn schedule_idle_check(
    registry: Arc<SignalingRegistry>,
    rooms: RoomManager,
    room_code: String,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;

        let Some(entry) = registry.remove_room_if_stale(&room_code, grace).await else {
            return;
        };
        info!(room_code = %room_code, "Room silent for the full grace window, ending");

        if let Err(e) = rooms.end_room(&entry.room_id).await {
            warn!(room_code = %room_code, error = %e, "Failed to end idle room");
        }

        // Tell whoever is still connected, then refresh everyone's lobby.
        let frame = SignalFrame {
            event: Some(Event::RoomTimeout(RoomTimeout {})),
            ..Default::default()
        };
        for peer_id in entry.occupant_ids() {
            if let Some(peer) = registry.peer(&peer_id).await {
                let _ = peer.send_frame(frame.clone()).await;
            }
        }
        broadcast_room_list(&registry, &rooms).await;
    })
}

/// One pass of the bulk sweep. Returns the number of rooms reclaimed.
pub async fn sweep_once(db: &SignalingDatabase) -> Result<u64, DatabaseError> {
    let removed = db.delete_expired_rooms(unix_timestamp()).await?;
    if removed > 0 {
        info!(removed, "Swept expired rooms");
    }
    Ok(removed)
}

/// Spawn the periodic sweep task.
pub fn spawn_sweeper(db: SignalingDatabase, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            if let Err(e) = sweep_once(&db).await {
                warn!(error = %e, "Background room sweep failed");
            }
        }
    })
}

//! SQLite database handle for the signaling coordinator.

curalink_core::define_database!(SignalingDatabase, "Signaling database migrations complete");

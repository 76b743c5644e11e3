//! CuraLink Signaling Coordinator
//!
//! gRPC server coordinating two-party video consultations: accounts, room
//! lifecycle, and WebRTC signaling relay.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tonic::transport::Server;
use tracing::info;

use curalink_proto::v1::auth_service_server::AuthServiceServer;
use curalink_proto::v1::health_server::HealthServer;
use curalink_proto::v1::room_service_server::RoomServiceServer;
use curalink_proto::v1::signaling_service_server::SignalingServiceServer;

use curalink_signaling::auth::JwtManager;
use curalink_signaling::reaper;
use curalink_signaling::registry::SignalingRegistry;
use curalink_signaling::rooms::RoomManager;
use curalink_signaling::server::signaling_svc::SessionContext;
use curalink_signaling::server::{
    AuthServiceImpl, IceConfig, RoomServiceImpl, SignalingHealthService, SignalingServiceImpl,
};
use curalink_signaling::storage::SignalingDatabase;

#[derive(Parser, Debug)]
#[command(name = "curalink-signaling")]
#[command(
    version,
    about = "CuraLink signaling coordinator - rooms, auth, and WebRTC signaling relay"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:50051")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JWT secret key.
    #[arg(
        long,
        env = "CURALINK_JWT_SECRET",
        default_value = "dev-secret-change-me"
    )]
    jwt_secret: String,

    /// Access token TTL in seconds.
    #[arg(long, default_value_t = 3600)]
    access_ttl: i64,

    /// Refresh token TTL in seconds.
    #[arg(long, default_value_t = 604_800)]
    refresh_ttl: i64,

    /// Grace window in seconds before a silent room is ended after a
    /// disconnect.
    #[arg(long, default_value_t = 120)]
    disconnect_grace: u64,

    /// Interval in seconds between bulk sweeps of expired rooms.
    #[arg(long, default_value_t = 600)]
    sweep_interval: u64,

    /// STUN server URL handed to clients.
    #[arg(long, env = "CURALINK_STUN_URL")]
    stun_url: Option<String>,

    /// TURN server host:port handed to clients.
    #[arg(long, env = "CURALINK_TURN_URL")]
    turn_url: Option<String>,

    /// TURN username.
    #[arg(long, env = "CURALINK_TURN_USERNAME")]
    turn_username: Option<String>,

    /// TURN credential.
    #[arg(long, env = "CURALINK_TURN_CREDENTIAL")]
    turn_credential: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    curalink_core::tracing_init::init_tracing("curalink_signaling=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting curalink-signaling"
    );

    let db = match &args.db_path {
        Some(path) => {
            info!(path = %path.display(), "Opening signaling database");
            SignalingDatabase::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "Opening signaling database (default path)");
            SignalingDatabase::open(&default_path).await?
        }
    };

    let jwt = Arc::new(JwtManager::new(
        args.jwt_secret.as_bytes(),
        args.access_ttl,
        args.refresh_ttl,
    ));

    let registry = Arc::new(SignalingRegistry::new());
    let rooms = RoomManager::new(db.clone());

    let ice = IceConfig {
        stun_url: args.stun_url,
        turn_url: args.turn_url,
        turn_username: args.turn_username,
        turn_credential: args.turn_credential,
    };

    // Build services
    let auth = AuthServiceImpl::new(db.clone(), Arc::clone(&jwt));
    let room = RoomServiceImpl::new(db.clone(), rooms.clone(), Arc::clone(&jwt), ice);
    let signaling = SignalingServiceImpl::new(SessionContext {
        registry: Arc::clone(&registry),
        rooms: rooms.clone(),
        db: db.clone(),
        jwt: Arc::clone(&jwt),
        grace: Duration::from_secs(args.disconnect_grace),
    });

    let jwt_check = curalink_signaling::server::jwt_interceptor(Arc::clone(&jwt));

    // Background sweep: the durable side of room reclamation.
    reaper::spawn_sweeper(db.clone(), Duration::from_secs(args.sweep_interval));

    let mut builder = Server::builder()
        .http2_keepalive_interval(Some(Duration::from_secs(30)))
        .http2_keepalive_timeout(Some(Duration::from_secs(10)));

    let grpc_router = builder
        .add_service(AuthServiceServer::new(auth))
        .add_service(RoomServiceServer::with_interceptor(
            room,
            jwt_check.clone(),
        ))
        .add_service(SignalingServiceServer::with_interceptor(
            signaling,
            jwt_check,
        ))
        .add_service(HealthServer::new(SignalingHealthService::new()));

    info!(addr = %args.addr, "Signaling coordinator listening");

    tokio::select! {
        result = grpc_router.serve(args.addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Coordinator stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".curalink").join("signaling.db"))
}

//! `curalink.v1.Health` service for the coordinator.
//!
//! A simple liveness check clients use to verify TCP connectivity after
//! resuming from background, and load balancers use as a probe.

use std::pin::Pin;

use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use curalink_proto::v1::{
    HealthCheckRequest, HealthCheckResponse, ServingStatus, health_server::Health,
};

/// Coordinator-side implementation of `curalink.v1.Health`.
#[derive(Clone, Default)]
pub struct SignalingHealthService;

impl SignalingHealthService {
    pub const fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl Health for SignalingHealthService {
    type WatchStream =
        Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send + 'static>>;

    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        // If this handler runs, the coordinator is alive and accepting gRPC.
        Ok(Response::new(HealthCheckResponse {
            status: ServingStatus::Serving.into(),
        }))
    }

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Err(Status::unimplemented(
            "Health.Watch is not supported on the coordinator",
        ))
    }
}

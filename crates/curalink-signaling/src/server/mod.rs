//! gRPC server implementations for the CuraLink signaling coordinator.

pub mod auth_svc;
pub mod health;
pub mod interceptor;
pub mod room_svc;
pub mod signaling_svc;

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
mod auth_svc_tests;
#[cfg(test)]
mod room_svc_tests;

pub use auth_svc::AuthServiceImpl;
pub use health::SignalingHealthService;
pub use interceptor::jwt_interceptor;
pub use room_svc::{IceConfig, RoomServiceImpl};
pub use signaling_svc::SignalingServiceImpl;

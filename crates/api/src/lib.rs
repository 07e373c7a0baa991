//! HTTP adapter for the coverclip pipeline.
//!
//! Inbound events arrive as REST calls; rendered videos and status notices
//! leave through the webhook transport. The binary entrypoint and the
//! integration tests share [`router::build_app_router`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod transport;

//! Runtime half of coverclip: external collaborators, the bounded job
//! executor and the orchestrator that drives sessions from inbound events
//! to delivered videos.

pub mod acquisition;
pub mod config;
pub mod delivery;
pub mod executor;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod render;
pub mod sources;

pub use config::{ConfigError, PipelineConfig};
pub use delivery::{Artifact, DeliveryMethod, Transport, TransportError};
pub use orchestrator::{Dispatch, EventError, InboundEvent, Outcome, Pipeline, RoundHandle};

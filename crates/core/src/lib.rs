//! Pure domain logic for the coverclip pipeline.
//!
//! Everything here is free of network access and process spawning: the
//! session state machine, workspace allocation, asset and link validation,
//! the title cleanup rule table, encoder argument builders, and the notice
//! texts sent back to the requester. The `coverclip-pipeline` crate drives
//! these pieces against real collaborators.

pub mod acquisition;
pub mod asset;
pub mod error;
pub mod link;
pub mod notice;
pub mod render;
pub mod session;
pub mod types;
pub mod workspace;

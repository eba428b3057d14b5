//! Upgrade hub: the coordinator-side orchestrator.
//!
//! The hub holds the in-memory cluster model, derives the tablespace layout
//! from the source catalog, and fans per-segment work out to the per-host
//! agents, aggregating partial failures into a single inspectable error.

pub mod agent_client;
pub mod cluster;
pub mod fanout;
pub mod steps;
pub mod tablespace;

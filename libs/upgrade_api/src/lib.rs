//! Types shared between the upgrade hub and the per-host agents: the JSON
//! request/reply formats of the agent HTTP API and the tablespace layout
//! model both sides agree on.

pub mod requests;
pub mod responses;
pub mod tablespace;

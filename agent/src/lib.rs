//! Per-host upgrade agent.
//!
//! One agent runs on every worker host of the cluster. The hub drives the
//! multi-step upgrade plan and calls into the agent's HTTP API for the
//! host-local work: data-directory surgery, tablespace restoration, and
//! invocation of `pg_upgrade` for each primary segment on this host.

pub mod filesystem;
pub mod http;
pub mod pg_upgrade;
pub mod server;
pub mod upgrade;

//! Shared helpers for the upgrade hub and agent.

pub mod error_list;
pub mod fs_ext;
pub mod logging;

//! Reply bodies of the agent HTTP API. Every operation replies either with
//! an empty body on success or with [`ErrorResponse`]; partial success
//! within one call is expressed through the error constituents.

use serde::{Deserialize, Serialize};

/// Error reply shared by all agent routes. One message per constituent of
/// the agent-side error accumulation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}

/// Reply of the /status health check.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

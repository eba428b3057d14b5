use std::sync::Arc;

use axum::{extract::State, response::Response, Json};
use http::StatusCode;
use upgrade_api::requests::ArchiveLogDirectoryRequest;

use crate::http::JsonResponse;
use crate::server::AgentServer;

pub(in crate::http) async fn archive_log_directory(
    State(server): State<Arc<AgentServer>>,
    Json(request): Json<ArchiveLogDirectoryRequest>,
) -> Response {
    match server.archive_log_directory(&request) {
        Ok(()) => JsonResponse::success(StatusCode::OK, ()),
        Err(err) => JsonResponse::operation_error(err),
    }
}

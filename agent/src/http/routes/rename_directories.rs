use std::sync::Arc;

use axum::{extract::State, response::Response, Json};
use http::StatusCode;
use upgrade_api::requests::RenameDirectoriesRequest;

use crate::http::JsonResponse;
use crate::server::AgentServer;

pub(in crate::http) async fn rename_directories(
    State(server): State<Arc<AgentServer>>,
    Json(request): Json<RenameDirectoriesRequest>,
) -> Response {
    match server.rename_directories(&request) {
        Ok(()) => JsonResponse::success(StatusCode::OK, ()),
        Err(err) => JsonResponse::operation_error(err),
    }
}

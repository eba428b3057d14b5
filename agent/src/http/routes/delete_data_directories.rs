use std::sync::Arc;

use axum::{extract::State, response::Response, Json};
use http::StatusCode;
use tokio::task;
use upgrade_api::requests::DeleteDataDirectoriesRequest;

use crate::http::JsonResponse;
use crate::server::AgentServer;

pub(in crate::http) async fn delete_data_directories(
    State(server): State<Arc<AgentServer>>,
    Json(request): Json<DeleteDataDirectoriesRequest>,
) -> Response {
    // Removal of a large data directory can take a while.
    let result = task::spawn_blocking(move || server.delete_data_directories(&request)).await;

    match result {
        Ok(Ok(())) => JsonResponse::success(StatusCode::OK, ()),
        Ok(Err(err)) => JsonResponse::operation_error(err),
        Err(join_err) => JsonResponse::operation_error(anyhow::Error::new(join_err)),
    }
}

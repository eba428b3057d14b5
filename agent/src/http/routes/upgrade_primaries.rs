use std::sync::Arc;

use axum::{extract::State, response::Response, Json};
use http::StatusCode;
use upgrade_api::requests::UpgradePrimariesRequest;

use crate::http::JsonResponse;
use crate::server::AgentServer;

pub(in crate::http) async fn upgrade_primaries(
    State(server): State<Arc<AgentServer>>,
    Json(request): Json<UpgradePrimariesRequest>,
) -> Response {
    match server.upgrade_primaries(&request).await {
        Ok(()) => JsonResponse::success(StatusCode::OK, ()),
        Err(err) => JsonResponse::operation_error(err),
    }
}

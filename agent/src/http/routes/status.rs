use axum::response::Response;
use http::StatusCode;
use upgrade_api::responses::StatusResponse;

use crate::http::JsonResponse;

pub(in crate::http) async fn status() -> Response {
    JsonResponse::success(
        StatusCode::OK,
        StatusResponse {
            status: "ok".to_string(),
        },
    )
}

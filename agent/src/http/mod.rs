use axum::{body::Body, response::Response};
use http::{header::CONTENT_TYPE, StatusCode};
use serde::Serialize;
use tracing::error;
use upgrade_api::responses::ErrorResponse;
use utils::error_list::ErrorList;

pub use server::serve;

mod routes;
mod server;

/// Convenience response builder for JSON responses
struct JsonResponse;

impl JsonResponse {
    fn create_response(code: StatusCode, body: impl Serialize) -> Response {
        Response::builder()
            .status(code)
            .header(CONTENT_TYPE.as_str(), "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    pub(self) fn success(code: StatusCode, body: impl Serialize) -> Response {
        assert!({
            let code = code.as_u16();

            (200..300).contains(&code)
        });

        Self::create_response(code, body)
    }

    /// Turn an operation failure into the uniform error reply: one message
    /// per constituent when the error is an accumulation, a single message
    /// otherwise.
    pub(self) fn operation_error(err: anyhow::Error) -> Response {
        let errors = match err.downcast_ref::<ErrorList>() {
            Some(list) => list.errors().iter().map(|e| format!("{e:#}")).collect(),
            None => vec![format!("{err:#}")],
        };
        for message in &errors {
            error!("{message}");
        }

        Self::create_response(StatusCode::INTERNAL_SERVER_ERROR, &ErrorResponse { errors })
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::cluster::ClusterError;

/// Error taxonomy for the control plane (spec §7): a small closed set of
/// semantic kinds rather than a single string-typed catch-all, following the
/// shape of the engine's own `errors::Tag` classification without the scale.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed payload, or a referenced id that doesn't exist at create time.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Id unknown at read/cancel/delete time.
    #[error("not found")]
    NotFound,

    /// Cluster API or callback I/O failure. Reconciler/watcher propagate this
    /// out of their worker loop so the supervisor restarts them.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl From<ClusterError> for Error {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound => Error::Upstream("unexpected 404 from cluster api".to_string()),
            ClusterError::Other(msg) => Error::Upstream(msg),
        }
    }
}

/// Maps expected errors to their wire status; see DESIGN.md for the
/// 400-vs-404 decision on `BadRequest`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Error::NotFound => (StatusCode::NOT_FOUND, json!({})),
            Error::Upstream(msg) => {
                tracing::error!(error = %msg, "unexpected upstream failure");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "internal error" }))
            }
        };
        (status, axum::Json(body)).into_response()
    }
}

use axum::Json;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::api::v1::dto::token_response::TokenResponse;
use crate::services::auth::{TokenEndpointRequest, dpop::expected_htu};
use crate::state::AppState;

pub async fn token(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let htu = expected_htu(state.public_base_url.as_deref(), &headers, &uri);

    let outcome = state
        .token
        .process(TokenEndpointRequest {
            method: &method,
            headers: &headers,
            htu: &htu,
            body: &body,
        })
        .await;

    match outcome {
        Ok(tokens) => (
            StatusCode::OK,
            [
                (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
                (header::PRAGMA, HeaderValue::from_static("no-cache")),
            ],
            Json(TokenResponse::from(tokens)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

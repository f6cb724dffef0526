//! OAuth 2.0 token endpoint error responses (RFC 6749 §5.2).

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

pub const INVALID_REQUEST: &str = "invalid_request";
pub const INVALID_CLIENT: &str = "invalid_client";
pub const INVALID_GRANT: &str = "invalid_grant";
pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
pub const INVALID_SCOPE: &str = "invalid_scope";
pub const SERVER_ERROR: &str = "server_error";

/// Body of a failed token request.
///
/// `custom` members are written next to `error` / `error_description`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl TokenErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
            custom: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Adds an extra response member. `error` and `error_description` cannot be overridden.
    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if name != "error" && name != "error_description" {
            self.custom.insert(name, value.into());
        }
        self
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST).with_description(description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(INVALID_CLIENT).with_description(description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(INVALID_GRANT).with_description(description)
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(INVALID_SCOPE).with_description(description)
    }

    pub fn server_error() -> Self {
        Self::new(SERVER_ERROR).with_description("the token could not be issued")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            SERVER_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for TokenErrorResponse {
    fn into_response(self) -> Response {
        (
            self.status(),
            [
                (header::CACHE_CONTROL, "no-store"),
                (header::PRAGMA, "no-cache"),
            ],
            Json(self),
        )
            .into_response()
    }
}

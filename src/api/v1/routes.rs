/*
 * Responsibility
 * - URL layout of v1
 * - /token accepts every method; non-POST is answered with an OAuth error body
 */
use axum::{Router, routing::any};

use crate::api::v1::handlers::token::token;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/token", any(token))
}

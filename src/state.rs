/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 *   - token: TokenEndpoint (client auth, grant validation, DPoP, issuance)
 *   - public_base_url: external origin used to rebuild the DPoP htu
 * - Cloned per request (internals are Arc)
 */
use std::sync::Arc;

use crate::services::auth::TokenEndpoint;

#[derive(Clone)]
pub struct AppState {
    pub token: Arc<TokenEndpoint>,
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(token: Arc<TokenEndpoint>, public_base_url: Option<String>) -> Self {
        Self {
            token,
            public_base_url,
        }
    }
}

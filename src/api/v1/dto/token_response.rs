use serde::Serialize;

use crate::services::auth::token_issuer::IssuedTokens;

/// RFC 6749 §5.1 success body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// "Bearer", or "DPoP" when the token is key-bound.
    pub token_type: String,
    /// Seconds until expiry.
    pub expires_in: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            token_type: tokens.token_type.to_string(),
            expires_in: tokens.expires_in,
            scope: tokens.scope,
            id_token: tokens.id_token,
        }
    }
}

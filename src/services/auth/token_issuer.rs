use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::{
    jwt::JwtIssuer,
    request::{OPENID_SCOPE, ValidatedTokenRequest},
};

pub const TOKEN_TYPE_BEARER: &str = "Bearer";
pub const TOKEN_TYPE_DPOP: &str = "DPoP";

/// Tokens produced for one successful request.
///
/// Handlers map this into the HTTP DTO (`TokenResponse`).
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

#[async_trait]
pub trait TokenResponseGenerator: Send + Sync {
    async fn generate(&self, request: &ValidatedTokenRequest) -> Result<IssuedTokens, AppError>;
}

#[derive(Debug, Serialize)]
struct AccessTokenClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    iat: i64,
    exp: i64,
    jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnf: Option<CnfClaim<'a>>,
}

/// RFC 9449 §6.1 confirmation claim.
#[derive(Debug, Serialize)]
struct CnfClaim<'a> {
    jkt: &'a str,
}

#[derive(Debug, Serialize)]
struct IdTokenClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Issues EdDSA-signed JWT access tokens and, for `openid` requests with a
/// resource owner, an ID token.
#[derive(Debug, Clone)]
pub struct JwtTokenResponseGenerator {
    jwt: JwtIssuer,
    audience: String,
    access_token_ttl_seconds: u64,
    id_token_ttl_seconds: u64,
}

impl JwtTokenResponseGenerator {
    pub fn new(
        jwt: JwtIssuer,
        audience: String,
        access_token_ttl_seconds: u64,
        id_token_ttl_seconds: u64,
    ) -> Self {
        Self {
            jwt,
            audience,
            access_token_ttl_seconds,
            id_token_ttl_seconds,
        }
    }

    pub fn access_token_ttl_seconds(&self) -> u64 {
        self.access_token_ttl_seconds
    }

    fn issue_access_token(&self, request: &ValidatedTokenRequest, now: i64) -> Result<String, AppError> {
        let client_id = request.client.client_id.as_str();
        let claims = AccessTokenClaims {
            iss: self.jwt.issuer(),
            aud: &self.audience,
            sub: request.subject.as_deref().unwrap_or(client_id),
            client_id,
            scope: request.scope(),
            iat: now,
            exp: expires_at(now, self.access_token_ttl_seconds),
            jti: Uuid::new_v4().to_string(),
            cnf: request
                .dpop_thumbprint
                .as_deref()
                .map(|jkt| CnfClaim { jkt }),
        };

        self.jwt.sign_with_type("at+jwt", &claims)
    }

    fn issue_id_token(&self, request: &ValidatedTokenRequest, now: i64) -> Result<Option<String>, AppError> {
        let Some(sub) = request.subject.as_deref() else {
            return Ok(None);
        };
        if !request.has_scope(OPENID_SCOPE) {
            return Ok(None);
        }

        let claims = IdTokenClaims {
            iss: self.jwt.issuer(),
            aud: &request.client.client_id,
            sub,
            iat: now,
            exp: expires_at(now, self.id_token_ttl_seconds),
            jti: Uuid::new_v4().to_string(),
        };

        self.jwt.sign(&claims).map(Some)
    }
}

fn expires_at(now: i64, ttl_seconds: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
}

#[async_trait]
impl TokenResponseGenerator for JwtTokenResponseGenerator {
    async fn generate(&self, request: &ValidatedTokenRequest) -> Result<IssuedTokens, AppError> {
        let now = chrono::Utc::now().timestamp();

        let access_token = self.issue_access_token(request, now)?;
        let id_token = self.issue_id_token(request, now)?;

        Ok(IssuedTokens {
            access_token,
            token_type: if request.dpop_thumbprint.is_some() {
                TOKEN_TYPE_DPOP
            } else {
                TOKEN_TYPE_BEARER
            },
            expires_in: self.access_token_ttl_seconds,
            scope: request.scope(),
            id_token,
        })
    }
}

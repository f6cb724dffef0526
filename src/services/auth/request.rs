//! Grant validation for token requests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::services::auth::{
    client::{Client, ClientAuthResult},
    token_error::{self, TokenErrorResponse},
};

pub const OPENID_SCOPE: &str = "openid";

/// `application/x-www-form-urlencoded` request body.
///
/// Parameters without a value are treated as omitted (RFC 6749 §3.1). The
/// first occurrence of a name wins; repeated names are remembered so a
/// validator can reject them.
#[derive(Debug, Clone, Default)]
pub struct FormParams {
    values: HashMap<String, String>,
    duplicates: Vec<String>,
}

impl FormParams {
    pub fn parse(body: &[u8]) -> Self {
        let mut params = Self::default();
        for (name, value) in url::form_urlencoded::parse(body) {
            if value.is_empty() {
                continue;
            }
            if params.values.contains_key(&*name) {
                if !params.duplicates.iter().any(|d| *d == *name) {
                    params.duplicates.push(name.into_owned());
                }
                continue;
            }
            params.values.insert(name.into_owned(), value.into_owned());
        }
        params
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    ClientCredentials,
    Password,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            _ => None,
        }
    }
}

/// A grant that passed validation and may be turned into tokens.
#[derive(Debug, Clone)]
pub struct ValidatedTokenRequest {
    pub client: Client,
    pub grant_type: GrantType,
    /// Resource owner; `None` for `client_credentials`.
    pub subject: Option<String>,
    pub scopes: Vec<String>,
    /// Set by the endpoint after a DPoP proof was accepted.
    pub dpop_thumbprint: Option<String>,
}

impl ValidatedTokenRequest {
    pub fn scope(&self) -> Option<String> {
        (!self.scopes.is_empty()).then(|| self.scopes.join(" "))
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

pub type TokenRequestValidationResult = Result<ValidatedTokenRequest, TokenErrorResponse>;

#[async_trait]
pub trait TokenRequestValidator: Send + Sync {
    async fn validate(
        &self,
        form: &FormParams,
        client: &ClientAuthResult,
    ) -> TokenRequestValidationResult;
}

/// Resource owner accepted by the `password` grant.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRegistration {
    pub username: String,
    pub password: String,
    pub sub: String,
}

#[derive(Debug, Clone)]
struct UserRecord {
    password_digest: [u8; 32],
    sub: String,
}

/// Validates `client_credentials` and `password` grants against the
/// authenticated client's registration.
#[derive(Debug, Clone, Default)]
pub struct DefaultTokenRequestValidator {
    users: HashMap<String, UserRecord>,
}

impl DefaultTokenRequestValidator {
    pub fn new(users: impl IntoIterator<Item = UserRegistration>) -> Self {
        let users = users
            .into_iter()
            .map(|u| {
                (
                    u.username,
                    UserRecord {
                        password_digest: Sha256::digest(u.password.as_bytes()).into(),
                        sub: u.sub,
                    },
                )
            })
            .collect();
        Self { users }
    }

    fn granted_scopes(
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Vec<String>, TokenErrorResponse> {
        let Some(requested) = requested else {
            return Ok(client.allowed_scopes.clone());
        };

        let mut seen = HashSet::new();
        let mut scopes = Vec::new();
        for scope in requested.split(' ').filter(|s| !s.is_empty()) {
            if !client.allowed_scopes.iter().any(|a| a == scope) {
                return Err(TokenErrorResponse::invalid_scope(format!(
                    "scope \"{scope}\" is not allowed for this client"
                )));
            }
            if seen.insert(scope) {
                scopes.push(scope.to_string());
            }
        }
        Ok(scopes)
    }

    fn authenticate_user(&self, form: &FormParams) -> Result<String, TokenErrorResponse> {
        let username = form
            .get("username")
            .ok_or_else(|| TokenErrorResponse::invalid_request("username is required"))?;
        let password = form
            .get("password")
            .ok_or_else(|| TokenErrorResponse::invalid_request("password is required"))?;

        let digest: [u8; 32] = Sha256::digest(password.as_bytes()).into();
        match self.users.get(username) {
            Some(user) if user.password_digest == digest => Ok(user.sub.clone()),
            _ => {
                debug!("resource owner credentials rejected");
                Err(TokenErrorResponse::invalid_grant(
                    "invalid resource owner credentials",
                ))
            }
        }
    }
}

#[async_trait]
impl TokenRequestValidator for DefaultTokenRequestValidator {
    async fn validate(
        &self,
        form: &FormParams,
        client_auth: &ClientAuthResult,
    ) -> TokenRequestValidationResult {
        let client = client_auth
            .client
            .as_ref()
            .ok_or_else(|| TokenErrorResponse::invalid_client("client authentication failed"))?;

        if let Some(name) = form.duplicates().first() {
            return Err(TokenErrorResponse::invalid_request(format!(
                "parameter \"{name}\" is included more than once"
            )));
        }

        let grant = form
            .get("grant_type")
            .ok_or_else(|| TokenErrorResponse::invalid_request("grant_type is required"))?;
        let grant_type = GrantType::parse(grant).ok_or_else(|| {
            TokenErrorResponse::new(token_error::UNSUPPORTED_GRANT_TYPE)
                .with_description(format!("grant_type \"{grant}\" is not supported"))
        })?;
        if !client.allows_grant(grant_type.as_str()) {
            return Err(TokenErrorResponse::new(token_error::UNAUTHORIZED_CLIENT)
                .with_description(format!(
                    "client is not allowed to use grant_type \"{grant}\""
                )));
        }

        let mut scopes = Self::granted_scopes(client, form.get("scope"))?;

        let subject = match grant_type {
            GrantType::ClientCredentials => {
                if scopes.iter().any(|s| s == OPENID_SCOPE) {
                    if form.get("scope").is_some() {
                        return Err(TokenErrorResponse::invalid_scope(
                            "openid requires a resource owner",
                        ));
                    }
                    // Only granted by default when a resource owner is present.
                    scopes.retain(|s| s != OPENID_SCOPE);
                }
                None
            }
            GrantType::Password => Some(self.authenticate_user(form)?),
        };

        Ok(ValidatedTokenRequest {
            client: client.clone(),
            grant_type,
            subject,
            scopes,
            dpop_thumbprint: None,
        })
    }
}

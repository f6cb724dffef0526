//! Client authentication (`client_secret_basic` / `client_secret_post`).

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::services::auth::request::FormParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

/// A registered client as seen by the rest of the pipeline (no secret).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    pub allowed_grant_types: Vec<String>,
    pub allowed_scopes: Vec<String>,
}

impl Client {
    pub fn allows_grant(&self, grant_type: &str) -> bool {
        self.allowed_grant_types.iter().any(|g| g == grant_type)
    }
}

/// Outcome of client authentication.
///
/// `client` is only set when authentication succeeded. `client_id` is the
/// identifier the caller presented, kept for audit events either way.
#[derive(Debug, Clone, Default)]
pub struct ClientAuthResult {
    pub client: Option<Client>,
    pub method: Option<ClientAuthMethod>,
    pub client_id: Option<String>,
}

impl ClientAuthResult {
    pub fn authenticated(client: Client, method: ClientAuthMethod) -> Self {
        Self {
            client_id: Some(client.client_id.clone()),
            client: Some(client),
            method: Some(method),
        }
    }

    pub fn failed(client_id: Option<String>) -> Self {
        Self {
            client: None,
            method: None,
            client_id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
pub trait ClientAuthenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap, form: &FormParams) -> ClientAuthResult;
}

/// Client entry as configured (`TOKEN_CLIENTS`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_grant_types")]
    pub allowed_grant_types: Vec<String>,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
}

fn default_grant_types() -> Vec<String> {
    vec!["client_credentials".to_string()]
}

#[derive(Debug, Clone)]
struct StoredClient {
    client: Client,
    secret_digest: [u8; 32],
}

/// Confidential clients authenticated with a shared secret.
///
/// Only SHA-256 digests of the secrets are kept in memory.
#[derive(Debug, Clone, Default)]
pub struct SecretClientAuthenticator {
    clients: HashMap<String, StoredClient>,
}

impl SecretClientAuthenticator {
    pub fn new(registrations: impl IntoIterator<Item = ClientRegistration>) -> Self {
        let clients = registrations
            .into_iter()
            .map(|r| {
                let stored = StoredClient {
                    secret_digest: Sha256::digest(r.client_secret.as_bytes()).into(),
                    client: Client {
                        client_id: r.client_id.clone(),
                        allowed_grant_types: r.allowed_grant_types,
                        allowed_scopes: r.allowed_scopes,
                    },
                };
                (r.client_id, stored)
            })
            .collect();
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn verify(&self, client_id: &str, secret: &str) -> Option<Client> {
        let stored = self.clients.get(client_id)?;
        let digest: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        (stored.secret_digest == digest).then(|| stored.client.clone())
    }
}

#[async_trait]
impl ClientAuthenticator for SecretClientAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap, form: &FormParams) -> ClientAuthResult {
        let basic = match basic_credentials(headers) {
            Ok(basic) => basic,
            Err(reason) => {
                debug!(reason, "malformed Authorization header");
                return ClientAuthResult::failed(None);
            }
        };
        let post = form.get("client_secret");

        let (client_id, secret, method) = match (basic, post) {
            (Some(_), Some(_)) => {
                // RFC 6749 §2.3: one authentication method per request.
                debug!("client used more than one authentication method");
                return ClientAuthResult::failed(form.get("client_id").map(str::to_string));
            }
            (Some((id, secret)), None) => {
                // A body client_id, if any, must name the same client.
                if form.get("client_id").is_some_and(|body_id| body_id != id) {
                    debug!("client_id in body does not match Authorization header");
                    return ClientAuthResult::failed(Some(id));
                }
                (id, secret, ClientAuthMethod::ClientSecretBasic)
            }
            (None, Some(secret)) => match form.get("client_id") {
                Some(id) => (
                    id.to_string(),
                    secret.to_string(),
                    ClientAuthMethod::ClientSecretPost,
                ),
                None => return ClientAuthResult::failed(None),
            },
            (None, None) => {
                return ClientAuthResult::failed(form.get("client_id").map(str::to_string));
            }
        };

        match self.verify(&client_id, &secret) {
            Some(client) => ClientAuthResult::authenticated(client, method),
            None => {
                debug!(client_id = %client_id, method = method.as_str(), "client authentication failed");
                ClientAuthResult::failed(Some(client_id))
            }
        }
    }
}

/// `Authorization: Basic base64(urlencode(id) ":" urlencode(secret))` (RFC 6749 §2.3.1).
fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, &'static str> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| "not visible ASCII")?;

    let Some((scheme, encoded)) = value.split_once(' ') else {
        return Err("missing credentials");
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        // Other schemes are not client authentication.
        return Ok(None);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| "credentials are not base64")?;
    let decoded = String::from_utf8(decoded).map_err(|_| "credentials are not UTF-8")?;
    let (id, secret) = decoded.split_once(':').ok_or("missing ':' separator")?;

    Ok(Some((form_decode(id), form_decode(secret))))
}

fn form_decode(value: &str) -> String {
    url::form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authenticator() -> SecretClientAuthenticator {
        SecretClientAuthenticator::new([ClientRegistration {
            client_id: "svc".into(),
            client_secret: "s3cr3t:with colon".into(),
            allowed_grant_types: default_grant_types(),
            allowed_scopes: vec!["read".into()],
        }])
    }

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode(format!("{id}:{secret}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_client_secret_post() {
        let form = FormParams::parse(b"client_id=svc&client_secret=s3cr3t%3Awith+colon");
        let result = authenticator().authenticate(&HeaderMap::new(), &form).await;

        assert!(result.is_authenticated());
        assert_eq!(result.method, Some(ClientAuthMethod::ClientSecretPost));
        assert_eq!(result.client.unwrap().allowed_scopes, ["read"]);
    }

    #[tokio::test]
    async fn test_client_secret_basic_is_form_decoded() {
        let headers = basic("svc", "s3cr3t%3Awith+colon");
        let result = authenticator()
            .authenticate(&headers, &FormParams::default())
            .await;

        assert!(result.is_authenticated());
        assert_eq!(result.method, Some(ClientAuthMethod::ClientSecretBasic));
        assert_eq!(result.client_id.as_deref(), Some("svc"));
    }

    #[tokio::test]
    async fn test_wrong_secret_or_unknown_client() {
        let auth = authenticator();

        let result = auth
            .authenticate(&basic("svc", "wrong"), &FormParams::default())
            .await;
        assert!(!result.is_authenticated());
        assert_eq!(result.client_id.as_deref(), Some("svc"));

        let form = FormParams::parse(b"client_id=other&client_secret=s3cr3t");
        assert!(!auth.authenticate(&HeaderMap::new(), &form).await.is_authenticated());
    }

    #[tokio::test]
    async fn test_two_methods_are_rejected() {
        let form = FormParams::parse(b"client_id=svc&client_secret=s3cr3t%3Awith+colon");
        let result = authenticator()
            .authenticate(&basic("svc", "s3cr3t%3Awith+colon"), &form)
            .await;

        assert!(!result.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let auth = authenticator();

        let result = auth
            .authenticate(&HeaderMap::new(), &FormParams::parse(b"client_id=svc"))
            .await;
        assert!(!result.is_authenticated());
        assert_eq!(result.client_id.as_deref(), Some("svc"));

        let result = auth
            .authenticate(&HeaderMap::new(), &FormParams::default())
            .await;
        assert!(!result.is_authenticated());
        assert_eq!(result.client_id, None);
    }

    #[tokio::test]
    async fn test_malformed_basic_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic %%%"));

        let result = authenticator()
            .authenticate(&headers, &FormParams::default())
            .await;
        assert!(!result.is_authenticated());
    }

    #[tokio::test]
    async fn test_mismatched_body_client_id() {
        let form = FormParams::parse(b"client_id=other");
        let result = authenticator()
            .authenticate(&basic("svc", "s3cr3t%3Awith+colon"), &form)
            .await;

        assert!(!result.is_authenticated());
    }

    #[test]
    fn test_registration_defaults() {
        let registration: ClientRegistration =
            serde_json::from_str(r#"{"client_id":"a","client_secret":"b"}"#).unwrap();

        assert_eq!(registration.allowed_grant_types, ["client_credentials"]);
        assert!(registration.allowed_scopes.is_empty());
    }
}

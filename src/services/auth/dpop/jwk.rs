//! Public JWK model and RFC 7638 thumbprints.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Members that only appear in private or symmetric keys.
const PRIVATE_MEMBERS: [&str; 7] = ["d", "p", "q", "dp", "dq", "qi", "k"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwkError {
    #[error("jwk must be a JSON object")]
    NotAnObject,
    #[error("jwk must not contain private key member \"{0}\"")]
    PrivateMember(&'static str),
    #[error("unsupported or incomplete jwk: {0}")]
    Unsupported(String),
}

/// Public key carried in a DPoP proof header.
///
/// Only the members that identify the key are kept; anything else
/// (`alg`, `use`, `kid`, ...) is ignored for thumbprint purposes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kty")]
pub enum PublicJwk {
    #[serde(rename = "EC")]
    Ec { crv: String, x: String, y: String },
    #[serde(rename = "RSA")]
    Rsa { n: String, e: String },
    #[serde(rename = "OKP")]
    Okp { crv: String, x: String },
}

impl PublicJwk {
    pub fn from_value(value: &Value) -> Result<Self, JwkError> {
        let object = value.as_object().ok_or(JwkError::NotAnObject)?;

        if let Some(member) = PRIVATE_MEMBERS.iter().find(|m| object.contains_key(**m)) {
            return Err(JwkError::PrivateMember(*member));
        }

        serde_json::from_value(value.clone()).map_err(|e| JwkError::Unsupported(e.to_string()))
    }

    pub fn kty(&self) -> &'static str {
        match self {
            Self::Ec { .. } => "EC",
            Self::Rsa { .. } => "RSA",
            Self::Okp { .. } => "OKP",
        }
    }

    /// RFC 7638 §3.2: required members only, lexicographic order, no whitespace.
    pub fn canonical_json(&self) -> String {
        let mut members: BTreeMap<&str, &str> = BTreeMap::new();
        members.insert("kty", self.kty());
        match self {
            Self::Ec { crv, x, y } => {
                members.insert("crv", crv.as_str());
                members.insert("x", x.as_str());
                members.insert("y", y.as_str());
            }
            Self::Rsa { n, e } => {
                members.insert("n", n.as_str());
                members.insert("e", e.as_str());
            }
            Self::Okp { crv, x } => {
                members.insert("crv", crv.as_str());
                members.insert("x", x.as_str());
            }
        }

        // Serializing a map of strings cannot fail.
        serde_json::to_string(&members).unwrap_or_default()
    }

    /// SHA-256 JWK thumbprint (RFC 7638).
    pub fn thumbprint(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_json().as_bytes()).into()
    }

    pub fn thumbprint_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.thumbprint())
    }
}

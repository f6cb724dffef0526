//! Client-side DPoP key and proof signer.
//!
//! Used by the `dpop-gen` tool and by tests; the server never signs proofs.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use josekit::{
    JoseError,
    jwk::Jwk,
    jws::{ES256, ES384, ES512, JwsSigner, PS256, PS384, PS512, RS256, RS384, RS512},
};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::services::auth::dpop::{
    compact::JsonObject,
    jwk::{JwkError, PublicJwk},
    validator::DPOP_TYP,
};

/// Private JWK members that never leave the client.
const PRIVATE_MEMBERS: [&str; 8] = ["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

const RSA_BITS: u32 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum DpopKeyError {
    #[error("unsupported DPoP signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error(transparent)]
    Jose(#[from] JoseError),
    #[error(transparent)]
    Jwk(#[from] JwkError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Key pair that signs DPoP proofs.
pub struct DpopKey {
    alg: String,
    signer: Box<dyn JwsSigner>,
    public_jwk: JsonObject,
    thumbprint: String,
}

impl std::fmt::Debug for DpopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DpopKey")
            .field("alg", &self.alg)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl DpopKey {
    /// Fresh key for `alg`. RSA keys are 2048 bits.
    pub fn generate(alg: &str) -> Result<Self, DpopKeyError> {
        let private = match alg {
            "ES256" => ES256.generate_key_pair()?.to_jwk_key_pair(),
            "ES384" => ES384.generate_key_pair()?.to_jwk_key_pair(),
            "ES512" => ES512.generate_key_pair()?.to_jwk_key_pair(),
            "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => {
                RS256.generate_key_pair(RSA_BITS)?.to_jwk_key_pair()
            }
            other => return Err(DpopKeyError::UnsupportedAlgorithm(other.to_string())),
        };
        Self::from_private_jwk(alg, &private)
    }

    pub fn generate_es256() -> Result<Self, DpopKeyError> {
        Self::generate("ES256")
    }

    /// P-256 private key in PKCS#8 (or SEC1) PEM.
    pub fn from_es256_pem(pem: &[u8]) -> Result<Self, DpopKeyError> {
        let private = ES256.key_pair_from_pem(pem)?.to_jwk_key_pair();
        Self::from_private_jwk("ES256", &private)
    }

    pub fn from_private_jwk(alg: &str, private: &Jwk) -> Result<Self, DpopKeyError> {
        // A key generated for one algorithm may be tagged with it; the
        // signer below decides which algorithm is used.
        let mut members: JsonObject = private.as_ref().clone();
        members.remove("alg");
        let private = Jwk::from_map(members.clone())?;

        let signer: Box<dyn JwsSigner> = match alg {
            "ES256" => Box::new(ES256.signer_from_jwk(&private)?),
            "ES384" => Box::new(ES384.signer_from_jwk(&private)?),
            "ES512" => Box::new(ES512.signer_from_jwk(&private)?),
            "RS256" => Box::new(RS256.signer_from_jwk(&private)?),
            "RS384" => Box::new(RS384.signer_from_jwk(&private)?),
            "RS512" => Box::new(RS512.signer_from_jwk(&private)?),
            "PS256" => Box::new(PS256.signer_from_jwk(&private)?),
            "PS384" => Box::new(PS384.signer_from_jwk(&private)?),
            "PS512" => Box::new(PS512.signer_from_jwk(&private)?),
            other => return Err(DpopKeyError::UnsupportedAlgorithm(other.to_string())),
        };

        for member in PRIVATE_MEMBERS {
            members.remove(member);
        }
        let thumbprint = PublicJwk::from_value(&Value::Object(members.clone()))?.thumbprint_base64url();

        Ok(Self {
            alg: alg.to_string(),
            signer,
            public_jwk: members,
            thumbprint,
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.alg
    }

    /// Public half, as embedded in the proof header.
    pub fn public_jwk(&self) -> &JsonObject {
        &self.public_jwk
    }

    /// RFC 7638 thumbprint (base64url), i.e. the `cnf.jkt` a server binds to.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Proof for `htm`/`htu` with a random `jti` and the current time.
    pub fn proof(&self, htm: &str, htu: &str) -> Result<String, DpopKeyError> {
        let jti = uuid::Uuid::new_v4().to_string();
        let claims = proof_claims(htm, htu, chrono::Utc::now().timestamp(), &jti);
        self.sign_claims(&claims)
    }

    /// Signs `claims` under the standard DPoP header (`typ`, `alg`, `jwk`).
    pub fn sign_claims(&self, claims: &JsonObject) -> Result<String, DpopKeyError> {
        let mut header = JsonObject::new();
        header.insert("typ".into(), Value::from(DPOP_TYP));
        header.insert("alg".into(), Value::from(self.alg.as_str()));
        header.insert("jwk".into(), Value::Object(self.public_jwk.clone()));
        self.sign_raw(&header, claims)
    }

    /// Signs arbitrary header and claims with this key.
    pub fn sign_raw(&self, header: &JsonObject, claims: &JsonObject) -> Result<String, DpopKeyError> {
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
        );
        let signature = self.signer.sign(signing_input.as_bytes())?;

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

/// The four claims every DPoP proof carries.
pub fn proof_claims(htm: &str, htu: &str, iat: i64, jti: &str) -> JsonObject {
    let mut claims = JsonObject::new();
    claims.insert("jti".into(), Value::from(jti));
    claims.insert("htm".into(), Value::from(htm));
    claims.insert("htu".into(), Value::from(htu));
    claims.insert("iat".into(), Value::from(iat));
    claims
}

/// `ath` claim value: base64url(SHA-256(access token)).
pub fn access_token_hash(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

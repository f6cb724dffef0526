//! DPoP proof validation (RFC 9449) for the token endpoint.
//!
//! Rules run in a fixed order and stop at the first failure. The embedded
//! `jwk` is used to check the proof's own signature; it is trusted for the
//! thumbprint only once that check passed.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use josekit::{
    jwk::Jwk,
    jws::{ES256, ES384, ES512, JwsVerifier, PS256, PS384, PS512, RS256, RS384, RS512},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::services::auth::{
    dpop::{
        error::DpopError, htu::normalize_htu, proof::DpopProof, result::DpopValidationResult,
    },
    replay::{ReplayReservation, ReplayStore},
};

pub const DPOP_HEADER: &str = "dpop";
pub const DPOP_TYP: &str = "dpop+jwt";

pub const SUPPORTED_ALGORITHMS: [&str; 9] = [
    "RS256", "RS384", "RS512", "ES256", "ES384", "ES512", "PS256", "PS384", "PS512",
];

/// Upper bound for the raw `DPoP` header value.
pub const MAX_PROOF_BYTES: usize = 8 * 1024;

const MAX_JTI_BYTES: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct DpopPolicy {
    // Allowed iat drift (clock skew), seconds.
    pub iat_leeway_seconds: i64,
    // Maximum acceptable age of the proof (now - iat), seconds.
    pub max_age_seconds: i64,
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            iat_leeway_seconds: 5,
            max_age_seconds: 60,
        }
    }
}

impl DpopPolicy {
    /// A `jti` must be remembered for as long as its proof could still be accepted.
    pub fn replay_ttl_seconds(&self) -> u64 {
        let window = self
            .max_age_seconds
            .saturating_add(self.iat_leeway_seconds.saturating_mul(2));
        u64::try_from(window).unwrap_or(1).max(1)
    }
}

/// Claims every proof must carry.
#[derive(Debug)]
struct ProofClaims<'a> {
    jti: &'a str,
    htm: &'a str,
    htu: &'a str,
    iat: i64,
}

impl<'a> ProofClaims<'a> {
    fn from_proof(proof: &'a DpopProof) -> Result<Self, DpopError> {
        let string = |name: &'static str| match proof.claim(name) {
            None => Err(DpopError::MissingClaim(name)),
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(DpopError::InvalidClaim(name)),
        };

        let jti = string("jti")?;
        let htm = string("htm")?;
        let htu = string("htu")?;
        let iat = match proof.claim("iat") {
            None => return Err(DpopError::MissingClaim("iat")),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .ok_or(DpopError::InvalidClaim("iat"))?,
            Some(_) => return Err(DpopError::InvalidClaim("iat")),
        };

        if jti.is_empty() || jti.len() > MAX_JTI_BYTES {
            return Err(DpopError::InvalidClaim("jti"));
        }

        Ok(Self { jti, htm, htu, iat })
    }
}

#[derive(Clone)]
pub struct DpopValidator {
    policy: DpopPolicy,
    replay: Arc<dyn ReplayStore>,
}

impl DpopValidator {
    pub fn new(policy: DpopPolicy, replay: Arc<dyn ReplayStore>) -> Self {
        Self { policy, replay }
    }

    pub fn policy(&self) -> DpopPolicy {
        self.policy
    }

    /// Validates the request's `DPoP` header against `method` and the
    /// absolute request URI `htu`.
    pub async fn validate(
        &self,
        headers: &HeaderMap,
        method: &Method,
        htu: &str,
    ) -> DpopValidationResult {
        self.validate_at(headers, method, htu, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn validate_at(
        &self,
        headers: &HeaderMap,
        method: &Method,
        htu: &str,
        now: i64,
    ) -> DpopValidationResult {
        let raw = match proof_header(headers) {
            Ok(Some(raw)) => raw,
            Ok(None) => return DpopValidationResult::absent(),
            Err(e) => {
                debug!(error = %e, "DPoP header rejected");
                return DpopValidationResult::invalid(e, None);
            }
        };

        let proof = match DpopProof::parse(raw) {
            Ok(proof) => proof,
            Err(e) => {
                debug!(error = %e, "DPoP proof could not be parsed");
                return DpopValidationResult::invalid(e, None);
            }
        };

        match self.check(&proof, method, htu, now).await {
            Ok(reservation) => DpopValidationResult::valid(proof, reservation),
            Err(e) => {
                debug!(error = %e, jkt = proof.thumbprint_base64url(), "DPoP proof rejected");
                DpopValidationResult::invalid(e, Some(proof))
            }
        }
    }

    async fn check(
        &self,
        proof: &DpopProof,
        method: &Method,
        htu: &str,
        now: i64,
    ) -> Result<ReplayReservation, DpopError> {
        check_typ(proof)?;
        let alg = check_alg(proof)?;
        verify_signature(proof, alg)?;

        let claims = ProofClaims::from_proof(proof)?;

        if claims.htm != method.as_str() {
            return Err(DpopError::MethodMismatch);
        }

        let resource = normalize_htu(htu).ok_or(DpopError::UriMismatch)?;
        if normalize_htu(claims.htu).as_deref() != Some(resource.as_str()) {
            return Err(DpopError::UriMismatch);
        }

        let leeway = self.policy.iat_leeway_seconds;
        // iat must not be too far in the future
        if claims.iat > now.saturating_add(leeway) {
            return Err(DpopError::InvalidIat);
        }
        // iat must not be too old
        if now.saturating_sub(claims.iat) > self.policy.max_age_seconds.saturating_add(leeway) {
            return Err(DpopError::InvalidIat);
        }

        match self
            .replay
            .check_and_record(claims.jti, &resource, self.policy.replay_ttl_seconds())
            .await
        {
            Ok(true) => Ok(ReplayReservation::new(
                Arc::clone(&self.replay),
                claims.jti,
                &resource,
            )),
            Ok(false) => Err(DpopError::Replay),
            Err(e) => {
                warn!(error = %e, "DPoP replay store unavailable");
                Err(DpopError::ReplayUnavailable)
            }
        }
    }
}

/// Zero or one `DPoP` header, bounded in size.
fn proof_header(headers: &HeaderMap) -> Result<Option<&str>, DpopError> {
    let mut values = headers.get_all(DPOP_HEADER).iter();
    let Some(value) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(DpopError::MultipleProofs);
    }
    if value.len() > MAX_PROOF_BYTES {
        return Err(DpopError::ProofTooLarge(MAX_PROOF_BYTES));
    }

    value
        .to_str()
        .map(|v| Some(v.trim()))
        .map_err(|_| DpopError::InvalidHeaderValue)
}

fn check_typ(proof: &DpopProof) -> Result<(), DpopError> {
    match proof.header().get("typ") {
        None => Err(DpopError::MissingTyp),
        Some(Value::String(typ)) if typ == DPOP_TYP => Ok(()),
        Some(_) => Err(DpopError::InvalidTyp),
    }
}

fn check_alg(proof: &DpopProof) -> Result<&str, DpopError> {
    let alg = match proof.header().get("alg") {
        None => return Err(DpopError::MissingAlg),
        Some(Value::String(alg)) => alg.as_str(),
        Some(other) => return Err(DpopError::UnsupportedAlg(other.to_string())),
    };

    // Checked before the allow-list so the rejection is explicit.
    if alg.eq_ignore_ascii_case("none") {
        return Err(DpopError::AlgNone);
    }
    if !SUPPORTED_ALGORITHMS.contains(&alg) {
        return Err(DpopError::UnsupportedAlg(alg.to_string()));
    }

    Ok(alg)
}

fn verify_signature(proof: &DpopProof, alg: &str) -> Result<(), DpopError> {
    let jwk = Jwk::from_map(proof.jwk().clone()).map_err(|e| {
        warn!(error = ?e, "invalid DPoP jwk");
        DpopError::InvalidSignature
    })?;
    let verifier = verifier_for(alg, &jwk)?;
    let signature = proof.signature()?;

    verifier
        .verify(proof.signing_input().as_bytes(), &signature)
        .map_err(|e| {
            debug!(error = ?e, alg, "invalid DPoP proof signature");
            DpopError::InvalidSignature
        })
}

fn verifier_for(alg: &str, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, DpopError> {
    let verifier: Result<Box<dyn JwsVerifier>, _> = match alg {
        "RS256" => RS256.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "RS384" => RS384.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "RS512" => RS512.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "ES256" => ES256.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "ES384" => ES384.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "ES512" => ES512.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "PS256" => PS256.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "PS384" => PS384.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        "PS512" => PS512.verifier_from_jwk(jwk).map(|v| Box::new(v) as Box<dyn JwsVerifier>),
        other => return Err(DpopError::UnsupportedAlg(other.to_string())),
    };

    // The key does not fit the declared algorithm (wrong kty or curve).
    verifier.map_err(|e| {
        debug!(error = ?e, alg, "DPoP jwk cannot verify the declared alg");
        DpopError::InvalidSignature
    })
}

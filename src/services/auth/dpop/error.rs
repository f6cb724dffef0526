use crate::services::auth::dpop::{compact::MalformedTokenError, jwk::JwkError};

/// Every way a DPoP proof can be rejected.
///
/// The `Display` text is returned to the client as `error_description`.
#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    #[error("multiple DPoP headers")]
    MultipleProofs,
    #[error("DPoP header exceeds {0} bytes")]
    ProofTooLarge(usize),
    #[error("DPoP header is not visible ASCII")]
    InvalidHeaderValue,
    #[error("malformed DPoP proof: {0}")]
    MalformedToken(#[from] MalformedTokenError),
    #[error("jwk element missing in DPoP proof")]
    MissingJwk,
    #[error("invalid jwk in DPoP proof: {0}")]
    InvalidJwk(#[from] JwkError),
    #[error("DPoP proof does not contain \"typ\" header")]
    MissingTyp,
    #[error("DPoP proof is not of type dpop+jwt")]
    InvalidTyp,
    #[error("DPoP proof does not contain \"alg\" header")]
    MissingAlg,
    #[error("DPoP proof cannot use \"none\" algorithm")]
    AlgNone,
    #[error("unsupported DPoP algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("DPoP proof signature is invalid")]
    InvalidSignature,
    #[error("DPoP proof is missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("DPoP proof has invalid claim: {0}")]
    InvalidClaim(&'static str),
    #[error("DPoP htm does not match request method")]
    MethodMismatch,
    #[error("DPoP htu does not match request URI")]
    UriMismatch,
    #[error("DPoP proof iat is outside the acceptable window")]
    InvalidIat,
    #[error("DPoP proof has already been used")]
    Replay,
    #[error("DPoP replay check unavailable")]
    ReplayUnavailable,
}

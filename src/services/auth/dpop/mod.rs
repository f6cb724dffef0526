pub mod compact;
pub mod error;
pub mod htu;
pub mod jwk;
pub mod key;
pub mod proof;
pub mod result;
pub mod validator;

pub use compact::{CompactJwt, JsonObject, MalformedTokenError};
pub use error::DpopError;
pub use htu::{expected_htu, normalize_htu};
pub use jwk::{JwkError, PublicJwk};
pub use key::{DpopKey, DpopKeyError, access_token_hash, proof_claims};
pub use proof::DpopProof;
pub use result::{DpopValidationResult, INVALID_DPOP_PROOF};
pub use validator::{DPOP_HEADER, DpopPolicy, DpopValidator, MAX_PROOF_BYTES, SUPPORTED_ALGORITHMS};

use crate::services::auth::{
    dpop::{error::DpopError, proof::DpopProof},
    replay::ReplayReservation,
};

/// Protocol error code for every rejected proof.
pub const INVALID_DPOP_PROOF: &str = "invalid_dpop_proof";

/// Outcome of [`DpopValidator::validate`](super::validator::DpopValidator::validate).
///
/// One of three shapes: no proof was sent, the proof was accepted (carries
/// its thumbprint and the pending replay record), or it was rejected.
#[derive(Debug)]
pub struct DpopValidationResult {
    proof: Option<DpopProof>,
    error: Option<DpopError>,
    reservation: Option<ReplayReservation>,
}

impl DpopValidationResult {
    pub fn absent() -> Self {
        Self {
            proof: None,
            error: None,
            reservation: None,
        }
    }

    pub fn valid(proof: DpopProof, reservation: ReplayReservation) -> Self {
        Self {
            proof: Some(proof),
            error: None,
            reservation: Some(reservation),
        }
    }

    /// `proof` is kept for diagnostics when the failure came after parsing.
    pub fn invalid(error: DpopError, proof: Option<DpopProof>) -> Self {
        Self {
            proof,
            error: Some(error),
            reservation: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_absent(&self) -> bool {
        self.proof.is_none() && self.error.is_none()
    }

    pub fn error(&self) -> Option<&'static str> {
        self.error.as_ref().map(|_| INVALID_DPOP_PROOF)
    }

    pub fn error_description(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn dpop_error(&self) -> Option<&DpopError> {
        self.error.as_ref()
    }

    pub fn proof(&self) -> Option<&DpopProof> {
        self.proof.as_ref()
    }

    /// Base64url JWK thumbprint of an accepted proof.
    pub fn thumbprint(&self) -> Option<&str> {
        if self.is_error() {
            return None;
        }
        self.proof.as_ref().map(DpopProof::thumbprint_base64url)
    }

    /// Hands the replay record to the caller, who decides to commit or release it.
    pub fn take_reservation(&mut self) -> Option<ReplayReservation> {
        self.reservation.take()
    }
}

//! Audit notifications for token issuance.

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Issued {
        client_id: String,
        grant_type: &'static str,
        subject: Option<String>,
        scopes: Vec<String>,
        dpop_bound: bool,
    },
    IssueFailed {
        client_id: Option<String>,
        grant_type: Option<String>,
        error: String,
        error_description: Option<String>,
    },
}

impl TokenEvent {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Issued { .. })
    }
}

/// Fire-and-forget sink. Implementations must not block the request.
pub trait EventSink: Send + Sync {
    fn raise(&self, event: TokenEvent);
}

/// Writes events as structured `tracing` records under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn raise(&self, event: TokenEvent) {
        match event {
            TokenEvent::Issued {
                client_id,
                grant_type,
                subject,
                scopes,
                dpop_bound,
            } => info!(
                target: "audit",
                client_id = %client_id,
                grant_type,
                subject = subject.as_deref(),
                scope = %scopes.join(" "),
                dpop_bound,
                "token issued"
            ),
            TokenEvent::IssueFailed {
                client_id,
                grant_type,
                error,
                error_description,
            } => warn!(
                target: "audit",
                client_id = client_id.as_deref(),
                grant_type = grant_type.as_deref(),
                error = %error,
                error_description = error_description.as_deref(),
                "token issuance failed"
            ),
        }
    }
}

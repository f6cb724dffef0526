//! Token endpoint orchestration.
//!
//! Order (each step ends the request on failure):
//! 1. POST + `application/x-www-form-urlencoded`
//! 2. client authentication
//! 3. grant validation
//! 4. DPoP proof, if a `DPoP` header was sent
//! 5. token generation
//!
//! Exactly one [`TokenEvent`] is raised per request.

use std::sync::Arc;

use axum::http::{HeaderMap, Method, header};
use tracing::{debug, error, trace};

use crate::services::{
    auth::{
        client::{ClientAuthResult, ClientAuthenticator},
        dpop::{DpopValidator, INVALID_DPOP_PROOF},
        events::{EventSink, TokenEvent},
        request::{FormParams, TokenRequestValidator, ValidatedTokenRequest},
        token_error::TokenErrorResponse,
        token_issuer::{IssuedTokens, TokenResponseGenerator},
    },
    timing::TimedOperation,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Transport-independent view of an inbound token request.
#[derive(Debug, Clone, Copy)]
pub struct TokenEndpointRequest<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    /// Absolute URI the client addressed (compared against the proof's `htu`).
    pub htu: &'a str,
    pub body: &'a [u8],
}

#[derive(Clone)]
pub struct TokenEndpoint {
    clients: Arc<dyn ClientAuthenticator>,
    validator: Arc<dyn TokenRequestValidator>,
    generator: Arc<dyn TokenResponseGenerator>,
    dpop: DpopValidator,
    events: Arc<dyn EventSink>,
}

impl TokenEndpoint {
    pub fn new(
        clients: Arc<dyn ClientAuthenticator>,
        validator: Arc<dyn TokenRequestValidator>,
        generator: Arc<dyn TokenResponseGenerator>,
        dpop: DpopValidator,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            clients,
            validator,
            generator,
            dpop,
            events,
        }
    }

    pub async fn process(
        &self,
        request: TokenEndpointRequest<'_>,
    ) -> Result<IssuedTokens, TokenErrorResponse> {
        if *request.method != Method::POST {
            return Err(self.fail(
                None,
                None,
                TokenErrorResponse::invalid_request("the token endpoint only accepts POST"),
            ));
        }
        if !is_form_encoded(request.headers) {
            return Err(self.fail(
                None,
                None,
                TokenErrorResponse::invalid_request(format!(
                    "content type must be {FORM_CONTENT_TYPE}"
                )),
            ));
        }

        let form = FormParams::parse(request.body);
        let grant_type = form.get("grant_type").map(str::to_string);

        let client_auth = self.clients.authenticate(request.headers, &form).await;
        if !client_auth.is_authenticated() {
            return Err(self.fail(
                client_auth.client_id.clone(),
                grant_type,
                TokenErrorResponse::invalid_client("client authentication failed"),
            ));
        }

        let mut validated = {
            let _timer = TimedOperation::start("token.validate_request");
            self.validator.validate(&form, &client_auth).await
        }
        .map_err(|e| self.fail(client_id(&client_auth), grant_type.clone(), e))?;

        let mut dpop = {
            let _timer = TimedOperation::start("token.validate_dpop");
            self.dpop
                .validate(request.headers, request.method, request.htu)
                .await
        };
        if dpop.is_error() {
            let mut err = TokenErrorResponse::new(INVALID_DPOP_PROOF);
            err.error_description = dpop.error_description();
            return Err(self.fail(client_id(&client_auth), grant_type, err));
        }
        validated.dpop_thumbprint = dpop.thumbprint().map(str::to_string);
        let reservation = dpop.take_reservation();

        let generated = {
            let _timer = TimedOperation::start("token.generate");
            self.generator.generate(&validated).await
        };

        match generated {
            Ok(tokens) => {
                if let Some(reservation) = reservation {
                    reservation.commit();
                }
                log_tokens(&validated, &tokens);
                self.events.raise(TokenEvent::Issued {
                    client_id: validated.client.client_id.clone(),
                    grant_type: validated.grant_type.as_str(),
                    subject: validated.subject.clone(),
                    scopes: validated.scopes.clone(),
                    dpop_bound: validated.dpop_thumbprint.is_some(),
                });
                Ok(tokens)
            }
            Err(e) => {
                error!(error = %e, client_id = %validated.client.client_id, "token generation failed");
                // The proof may be retried once the failure is gone.
                if let Some(reservation) = reservation {
                    reservation.release().await;
                }
                Err(self.fail(
                    Some(validated.client.client_id.clone()),
                    grant_type,
                    TokenErrorResponse::server_error(),
                ))
            }
        }
    }

    fn fail(
        &self,
        client_id: Option<String>,
        grant_type: Option<String>,
        err: TokenErrorResponse,
    ) -> TokenErrorResponse {
        debug!(error = %err.error, description = err.error_description.as_deref(), "token request rejected");
        self.events.raise(TokenEvent::IssueFailed {
            client_id,
            grant_type,
            error: err.error.clone(),
            error_description: err.error_description.clone(),
        });
        err
    }
}

fn log_tokens(request: &ValidatedTokenRequest, tokens: &IssuedTokens) {
    let client_id = request.client.client_id.as_str();
    let subject = request.subject.as_deref();
    trace!(
        client_id,
        subject,
        token_type = tokens.token_type,
        access_token = %tokens.access_token,
        "access token issued"
    );
    if let Some(id_token) = &tokens.id_token {
        trace!(client_id, subject, id_token = %id_token, "id token issued");
    }
}

fn client_id(client_auth: &ClientAuthResult) -> Option<String> {
    client_auth.client_id.clone()
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

pub mod client;
pub mod dpop;
pub mod endpoint;
pub mod events;
pub mod jwt;
pub mod replay;
pub mod request;
pub mod token_error;
pub mod token_issuer;

pub use endpoint::{TokenEndpoint, TokenEndpointRequest};

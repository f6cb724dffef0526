/*
 * Responsibility
 * - Application-level error (startup and internal failures)
 * - Protocol errors seen by clients live in services::auth::token_error
 */
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::auth::replay::ReplayError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid signing key: {0}")]
    SigningKey(String),

    #[error("replay cache unavailable: {0}")]
    ReplayStore(#[from] ReplayError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal server error")]
    Internal,
}

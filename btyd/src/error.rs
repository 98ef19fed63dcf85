//! Request-level error types

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use shared::types::MacAddress;

/// Errors that end or degrade handling of a single request
#[derive(Debug, Error)]
pub enum BtyError {
    /// No hardware address could be found for the caller
    #[error("no hardware address for {0}")]
    AddressResolution(String),

    /// Host store is missing, unreadable or could not be written
    #[error("host store unavailable: {0:#}")]
    PersistenceUnavailable(anyhow::Error),

    /// A template file could not be read
    #[error("template {name} unavailable: {source}")]
    TemplateMissing {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Host lacks a field required to generate its PXE config
    #[error("host {hwa} cannot have a PXE config: {reason}")]
    InvalidHostState { hwa: MacAddress, reason: &'static str },

    /// PXE config could not be written to the boot loader directory
    #[error("failed to install PXE config: {0:#}")]
    ArtifactWrite(anyhow::Error),

    /// Management request for a host that has never contacted us
    #[error("unknown host {0}")]
    UnknownHost(MacAddress),

    /// Management request carrying a malformed address or unacceptable value
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Registry thread is gone
    #[error("host registry unavailable")]
    RegistryClosed,
}

/// Result type for request handling
pub type Result<T> = std::result::Result<T, BtyError>;

impl BtyError {
    pub fn status(&self) -> StatusCode {
        match self {
            BtyError::AddressResolution(_) | BtyError::UnknownHost(_) => StatusCode::NOT_FOUND,
            BtyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            BtyError::PersistenceUnavailable(_)
            | BtyError::TemplateMissing { .. }
            | BtyError::InvalidHostState { .. }
            | BtyError::ArtifactWrite(_)
            | BtyError::RegistryClosed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BtyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Booting hosts get a bare 404 with nothing to parse
            BtyError::AddressResolution(_) => {
                return (
                    status,
                    [(header::CONTENT_TYPE, "text/plain"), (header::CONTENT_LENGTH, "0")],
                )
                    .into_response();
            }
            BtyError::UnknownHost(_) | BtyError::InvalidRequest(_) => self.to_string(),
            other => {
                tracing::error!("Request failed: {}", other);
                status.canonical_reason().unwrap_or_default().to_string()
            }
        };

        (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
    }
}

//! Google Sheets backend for the voice log.
//!
//! Provides:
//! - Service-account authentication (signed JWT exchanged for an access token)
//! - [`SheetsStore`], an [`IntervalStore`](vl_core::IntervalStore) over the
//!   Sheets v4 values API

use thiserror::Error;

mod auth;
mod client;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use client::SheetsStore;

/// Sheets backend errors.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// The service-account credential could not be read or parsed.
    #[error("invalid credentials: {0}")]
    Credentials(String),
    /// Signing the token request failed.
    #[error("failed to sign token request: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Failed to parse a response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// A required identifier was empty.
    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

/// Parses a Google API error body (`{"error": {"message": ...}}`).
fn parse_api_error(status: u16, body: &str) -> Option<SheetsError> {
    #[derive(serde::Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum ErrorDetails {
        Structured { message: String },
        // The OAuth token endpoint uses `{"error": "invalid_grant", ...}`.
        Code(String),
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| SheetsError::Api {
            status,
            message: match payload.error {
                ErrorDetails::Structured { message } | ErrorDetails::Code(message) => message,
            },
        })
}

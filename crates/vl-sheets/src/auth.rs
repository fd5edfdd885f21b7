//! Service-account authentication.
//!
//! A signed JWT assertion is exchanged at the key's token endpoint for a
//! short-lived bearer token, which is cached until shortly before it expires.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{SheetsError, parse_api_error};

/// OAuth scope for read/write spreadsheet access.
pub(crate) const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime requested for each assertion; Google caps this at one hour.
const ASSERTION_LIFETIME: Duration = Duration::hours(1);
/// Tokens are refreshed this long before they actually expire.
const REFRESH_MARGIN: Duration = Duration::minutes(1);

/// The subset of a service-account JSON key used for token requests.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parses an inline JSON credential blob.
    pub fn from_json(json: &str) -> Result<Self, SheetsError> {
        serde_json::from_str(json).map_err(|e| SheetsError::Credentials(e.to_string()))
    }

    /// Reads a JSON credential file.
    pub fn from_file(path: &Path) -> Result<Self, SheetsError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SheetsError::Credentials(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// Mints and caches access tokens for one service account.
pub struct TokenProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    signer: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("client_email", &self.key.client_email)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Creates a provider. Fails if the private key is not a valid RSA PEM.
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Result<Self, SheetsError> {
        if key.client_email.trim().is_empty() {
            return Err(SheetsError::Empty("client_email"));
        }
        let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            http,
            key,
            signer,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid bearer token, requesting a new one when needed.
    pub async fn access_token(&self) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| t.refresh_at > now) {
            return Ok(token.value.clone());
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(
                parse_api_error(status.as_u16(), &body).unwrap_or_else(|| SheetsError::Api {
                    status: status.as_u16(),
                    message: body,
                }),
            );
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| SheetsError::InvalidResponse(err.to_string()))?;
        tracing::debug!(expires_in = token.expires_in, "obtained access token");
        let refresh_at = refresh_deadline(now, token.expires_in)?;
        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at,
        });
        Ok(value)
    }

    /// Builds the signed assertion for a token request issued at `now`.
    pub(crate) fn assertion(&self, now: DateTime<Utc>) -> Result<String, SheetsError> {
        let claims = Claims {
            iss: self.key.client_email.clone(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: (now + ASSERTION_LIFETIME).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.signer)?)
    }
}

/// When a token issued at `now` and valid for `expires_in` seconds should be
/// replaced.
fn refresh_deadline(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, SheetsError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .and_then(|expiry| expiry.checked_sub_signed(REFRESH_MARGIN))
        .ok_or_else(|| SheetsError::InvalidResponse(format!("expires_in out of range: {expires_in}")))
}

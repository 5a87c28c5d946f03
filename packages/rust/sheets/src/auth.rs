//! Bearer tokens for the Sheets API.
//!
//! A service-account key is turned into an access token with the OAuth 2.0
//! JWT-bearer grant: sign an RS256 assertion, POST it to the key's
//! `token_uri`, cache the returned token until shortly before it expires.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use shardscrape_shared::{Result, ScrapeError};

/// OAuth scope granting read/write access to spreadsheets.
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Grant type for the JWT-bearer flow.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh tokens this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// Where bearer tokens come from.
pub enum TokenSource {
    /// A token obtained out of band (e.g. `gcloud auth print-access-token`).
    Static(String),
    /// Tokens minted from a service-account key.
    ServiceAccount(ServiceAccountAuth),
}

impl TokenSource {
    /// Current bearer token, refreshing it if needed.
    pub async fn bearer(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(auth) => auth.token().await,
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => f.write_str("TokenSource::Static(..)"),
            Self::ServiceAccount(auth) => {
                write!(f, "TokenSource::ServiceAccount({})", auth.key.client_email)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Service account
// ---------------------------------------------------------------------------

/// The fields of a service-account JSON key that the token flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Read a key file downloaded from the cloud console.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| ScrapeError::parse(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches access tokens for one service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Prepare the signer. Fails early if the private key is not valid PEM.
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ScrapeError::Auth(format!("invalid service account private key: {e}")))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScrapeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            key,
            signing_key,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Load a key file and prepare the signer.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(ServiceAccountKey::from_file(path)?)
    }

    /// A valid access token, fetching a new one when the cache is stale.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ScrapeError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Auth(format!(
                "token endpoint returned {status}: {}",
                excerpt(&body)
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Auth(format!("unreadable token response: {e}")))?;

        let lifetime = (parsed.expires_in - REFRESH_MARGIN_SECS).max(0);
        debug!(account = %self.key.client_email, lifetime, "access token refreshed");

        *cached = Some(CachedToken {
            token: parsed.access_token.clone(),
            expires_at: now + TimeDelta::seconds(lifetime),
        });
        Ok(parsed.access_token)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ScrapeError::Auth(format!("failed to sign assertion: {e}")))
    }
}

/// First few hundred characters of an error body, for log lines.
pub(crate) fn excerpt(body: &str) -> String {
    const LIMIT: usize = 300;
    match body.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

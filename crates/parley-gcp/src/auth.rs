//! Google service account authentication shared by the Pub/Sub and Dialogflow clients.
//!
//! Auth flow:
//!   1. Reads a GCP service account JSON key file from disk.
//!   2. Signs a JWT with RS256 (using `ring`) and exchanges it for an access token.
//!   3. Caches the access token (~1 hour) and refreshes it shortly before expiry.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::signature::{self, RsaKeyPair};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// OAuth scope covering both Pub/Sub and Dialogflow.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: i64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("cannot read service account key {path}: {reason}")]
    KeyFile { path: String, reason: String },

    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("RSA signing failed: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token exchange failed ({status}): {message}")]
    TokenExchange { status: u16, message: String },
}

/// Anything that can hand out a bearer token for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Fixed token, for the Pub/Sub emulator and tests.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// Cached OAuth2 access token.
struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Token source backed by a service account key file.
pub struct ServiceAccountAuth {
    client: reqwest::Client,
    client_email: String,
    token_uri: String,
    project_id: Option<String>,
    key_pair: Arc<RsaKeyPair>,
    cached: RwLock<Option<CachedToken>>,
}

/// Raw JSON structure of a GCP service account key file.
#[derive(Deserialize)]
struct ServiceAccountJson {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    project_id: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountAuth {
    /// Create from a service account JSON key file.
    pub fn from_file(path: &str) -> Result<Self, AuthError> {
        let data = std::fs::read_to_string(path).map_err(|e| AuthError::KeyFile {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&data)
    }

    /// Create from the contents of a service account key file.
    ///
    /// The private key is parsed eagerly so a broken key fails at startup
    /// rather than on the first message.
    pub fn from_json(data: &str) -> Result<Self, AuthError> {
        let sa: ServiceAccountJson = serde_json::from_str(data)
            .map_err(|e| AuthError::InvalidKey(format!("invalid service account JSON: {e}")))?;

        let der = pem_to_der(&sa.private_key)?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| AuthError::InvalidKey(format!("invalid RSA private key: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            client_email: sa.client_email,
            token_uri: sa.token_uri,
            project_id: sa.project_id,
            key_pair: Arc::new(key_pair),
            cached: RwLock::new(None),
        })
    }

    /// Project id embedded in the key file, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Create a signed JWT and exchange it for an access token.
    async fn exchange_jwt(&self) -> Result<CachedToken, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let jwt = self.signed_jwt(now)?;

        let resp = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange {
                status,
                message: text,
            });
        }

        let token_resp: TokenResponse = resp.json().await?;

        debug!(
            expires_in = token_resp.expires_in,
            account = %self.client_email,
            "GCP access token obtained"
        );

        Ok(CachedToken {
            token: token_resp.access_token,
            expires_at: now + token_resp.expires_in as i64,
        })
    }

    fn signed_jwt(&self, now: i64) -> Result<String, AuthError> {
        let header = serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        });
        let claims = serde_json::json!({
            "iss": self.client_email,
            "scope": CLOUD_PLATFORM_SCOPE,
            "aud": self.token_uri,
            "iat": now,
            "exp": now + 3600
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{header_b64}.{claims_b64}");

        let mut sig = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(
                &signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                message.as_bytes(),
                &mut sig,
            )
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        let sig_b64 = URL_SAFE_NO_PAD.encode(&sig);
        Ok(format!("{message}.{sig_b64}"))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    /// Return a valid access token, refreshing it if it is about to expire.
    async fn access_token(&self) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();

        // Fast path
        {
            let cached = self.cached.read().await;
            if let Some(ref c) = *cached {
                if now + EXPIRY_MARGIN_SECS < c.expires_at {
                    return Ok(c.token.clone());
                }
            }
        }

        // Slow path: another task may have refreshed while we waited for the lock.
        let mut cached = self.cached.write().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(ref c) = *cached {
            if now + EXPIRY_MARGIN_SECS < c.expires_at {
                return Ok(c.token.clone());
            }
        }

        info!(account = %self.client_email, "exchanging service account JWT for access token");
        let new_token = self.exchange_jwt().await?;
        let result = new_token.token.clone();
        *cached = Some(new_token);
        Ok(result)
    }
}

// ── PEM → DER helper ─────────────────────────────────────────────────────────

/// Decode a PEM-encoded PKCS#8 private key to DER bytes.
fn pem_to_der(pem: &str) -> Result<Vec<u8>, AuthError> {
    use base64::engine::general_purpose::STANDARD;

    let b64: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("");

    STANDARD
        .decode(&b64)
        .map_err(|e| AuthError::InvalidKey(format!("invalid PEM base64: {e}")))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires")]
    expires_in: u64,
}

fn default_expires() -> u64 {
    3600
}

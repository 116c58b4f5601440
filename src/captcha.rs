//! Challenge verification (Cloudflare Turnstile)
//!
//! Write endpoints hand the client's challenge token to a [`ChallengeVerifier`]
//! before mutating anything. Verification fails closed: network errors and
//! timeouts reject the request.
//!
//! Verification is skipped entirely when no secret key is configured, or when
//! the runtime setting `turnstile_enabled` is switched off.

use crate::config::Config;
use actix_web::http::StatusCode;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::app_config::TurnstileConfig;

/// Response from the siteverify API
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
    #[serde(default)]
    action: Option<String>,
}

/// Challenge verification error
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeError {
    /// Verification was required but no secret is configured
    NotConfigured,
    /// Network error or timeout talking to the verifier
    NetworkError(String),
    /// Verification failed
    VerificationFailed(Vec<String>),
    /// Missing or empty token
    InvalidToken,
}

impl ChallengeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChallengeError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ChallengeError::NetworkError(_) => StatusCode::BAD_GATEWAY,
            ChallengeError::VerificationFailed(_) | ChallengeError::InvalidToken => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

impl std::fmt::Display for ChallengeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeError::NotConfigured => write!(f, "Human verification is not configured"),
            ChallengeError::NetworkError(_) => {
                write!(f, "Human verification service is unavailable")
            }
            ChallengeError::VerificationFailed(_) => write!(f, "Human verification failed"),
            ChallengeError::InvalidToken => write!(f, "Human verification token is missing"),
        }
    }
}

impl std::error::Error for ChallengeError {}

/// Boundary to the third-party challenge provider.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// Whether a provider secret is present at all.
    fn is_configured(&self) -> bool;

    /// Verify `token` for `action`, e.g. `post` or `comment`.
    async fn verify(
        &self,
        token: &str,
        action: &str,
        remote_ip: Option<&str>,
    ) -> Result<(), ChallengeError>;
}

/// Turnstile siteverify client.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret_key: String,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(config: &TurnstileConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;

        if !config.secret_key.is_empty() {
            log::info!("Turnstile verification enabled");
        }

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            verify_url: config.verify_url.clone(),
        })
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }

    async fn verify(
        &self,
        token: &str,
        action: &str,
        remote_ip: Option<&str>,
    ) -> Result<(), ChallengeError> {
        if !self.is_configured() {
            return Err(ChallengeError::NotConfigured);
        }

        if token.trim().is_empty() {
            return Err(ChallengeError::InvalidToken);
        }

        let mut params = vec![
            ("secret", self.secret_key.as_str()),
            ("response", token),
        ];

        if let Some(ip) = remote_ip {
            params.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ChallengeError::NetworkError(e.to_string()))?;

        let verify_response: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ChallengeError::NetworkError(e.to_string()))?;

        if !verify_response.success {
            log::warn!(
                "Turnstile verification failed: {:?}",
                verify_response.error_codes
            );
            return Err(ChallengeError::VerificationFailed(
                verify_response.error_codes,
            ));
        }

        match verify_response.action.as_deref() {
            Some(got) if got != action => {
                log::warn!("Turnstile action mismatch: expected {}, got {}", action, got);
                Err(ChallengeError::VerificationFailed(vec![
                    "action-mismatch".to_string()
                ]))
            }
            _ => Ok(()),
        }
    }
}

/// Run the challenge unless verification is switched off.
pub async fn verify_challenge(
    verifier: &dyn ChallengeVerifier,
    settings: &Config,
    token: Option<&str>,
    action: &str,
    remote_ip: &str,
) -> Result<(), ChallengeError> {
    if !verifier.is_configured() || !settings.turnstile_enabled() {
        return Ok(());
    }

    let token = token.unwrap_or_default();
    verifier.verify(token, action, Some(remote_ip)).await
}

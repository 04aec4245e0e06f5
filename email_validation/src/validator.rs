//! Clients for the external email validation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::config::ValidatorConfig;

/// Verdict returned by a validator for one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    pub valid: bool,
}

impl Verdict {
    pub const VALID: Verdict = Verdict { valid: true };
    pub const INVALID: Verdict = Verdict { valid: false };
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("validation service timed out")]
    Timeout,

    #[error("validation service request failed: {0}")]
    Transport(reqwest::Error),

    #[error("validation service returned {0}")]
    Status(StatusCode),

    #[error("validation service returned an unreadable body: {0}")]
    Body(reqwest::Error),

    #[error("failed to build validation client: {0}")]
    Client(reqwest::Error),
}

impl From<reqwest::Error> for ValidatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ValidatorError::Timeout
        } else {
            ValidatorError::Transport(e)
        }
    }
}

#[async_trait]
pub trait EmailValidator: Send + Sync {
    async fn validate(&self, email: &str) -> Result<Verdict, ValidatorError>;
}

/// Stand-in service: an address is valid when it contains `@`.
#[derive(Debug, Clone)]
pub struct MockValidator {
    delay: Duration,
}

impl MockValidator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for MockValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MOCK_DELAY)
    }
}

#[async_trait]
impl EmailValidator for MockValidator {
    async fn validate(&self, email: &str) -> Result<Verdict, ValidatorError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Verdict {
            valid: email.contains('@'),
        })
    }
}

/// Calls a remote validation endpoint.
///
/// Sends `{"email": "..."}` as a JSON POST and expects `{"valid": bool}`.
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpValidator {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ValidatorError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(ValidatorError::Client)?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl EmailValidator for HttpValidator {
    async fn validate(&self, email: &str) -> Result<Verdict, ValidatorError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "email": email }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ValidatorError::Status(status));
        }

        response.json::<Verdict>().await.map_err(|e| {
            if e.is_timeout() {
                ValidatorError::Timeout
            } else {
                ValidatorError::Body(e)
            }
        })
    }
}

/// Builds the validator selected by `config`.
pub fn from_config(config: &ValidatorConfig) -> Result<Box<dyn EmailValidator>, ValidatorError> {
    Ok(match config {
        ValidatorConfig::Mock { delay } => Box::new(MockValidator::new(*delay)),
        ValidatorConfig::Http { endpoint, timeout } => {
            Box::new(HttpValidator::new(endpoint.clone(), *timeout)?)
        }
    })
}

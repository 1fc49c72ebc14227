use crate::source::event::EventRecord;
use crate::upload::payload::UploadPayload;
use crate::upload::retry::IsRetryable;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Why one delivery attempt did not succeed.
#[derive(Debug, Clone, Error)]
pub enum DeliveryFailure {
    /// The endpoint answered with something other than 200.
    #[error("Response failed with {status}: {message}")]
    Rejected {
        status: u16,
        message: String,
        body: String,
    },

    /// No usable response: connect failure, timeout, reset.
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("failed to encode payload: {message}")]
    Encode { message: String },
}

impl DeliveryFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryFailure::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            DeliveryFailure::Rejected { body, .. } => body,
            _ => "",
        }
    }
}

impl IsRetryable for DeliveryFailure {
    /// An unencodable batch fails the same way on every attempt.
    fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryFailure::Encode { .. })
    }
}

/// Performs exactly one delivery attempt for a batch of events.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, events: &[EventRecord]) -> Result<(), DeliveryFailure>;
}

/// Sends batches to the Amplitude HTTP batch API.
#[derive(Debug)]
pub struct AmplitudeClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl AmplitudeClient {
    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> Result<Self, ClientError> {
        reqwest::Url::parse(endpoint).map_err(|_| ClientError::InvalidEndpoint(endpoint.to_string()))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchSender for AmplitudeClient {
    async fn send(&self, events: &[EventRecord]) -> Result<(), DeliveryFailure> {
        let body = UploadPayload::new(&self.api_key, events)
            .to_json()
            .map_err(|e| DeliveryFailure::Encode {
                message: e.to_string(),
            })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryFailure::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        Err(DeliveryFailure::Rejected {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

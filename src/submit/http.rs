//! HTTP submission endpoint client.

use async_trait::async_trait;
use tracing::debug;

use super::Submitter;
use crate::error::SubmitError;
use crate::queue::SubmissionPayload;

/// Longest response body kept in a rejection message.
const MAX_ERROR_BODY: usize = 512;

/// POSTs each payload as JSON to a fixed endpoint.
pub struct HttpSubmitter {
    /// Endpoint URL.
    endpoint: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl HttpSubmitter {
    /// Creates a submitter for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(question_id = %payload.question_id, status = status.as_u16(), "Submission accepted");
            return Ok(());
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| message.is_char_boundary(*i))
                .unwrap_or(0);
            message.truncate(cut);
        }

        Err(SubmitError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

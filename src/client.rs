use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shown in the transcript when a failure carries no usable detail.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process your request at the moment.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

/// FastAPI-style error body. The `detail` field is optional so that any
/// well-formed JSON body parses; non-JSON bodies are ignored entirely.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("service returned {status}")]
    Service {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ReplyError {
    /// Text for the synthetic responder turn when a submission fails.
    ///
    /// Service errors surface their `detail` verbatim; everything else
    /// (unparsable bodies, transport failures) gets the generic apology.
    pub fn user_message(&self) -> String {
        match self {
            ReplyError::Service {
                detail: Some(detail),
                ..
            } => detail.clone(),
            _ => FALLBACK_REPLY.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ReplyClient {
    client: Client,
    endpoint: String,
}

impl ReplyClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one chat message and return the reply text.
    pub async fn send(&self, message: &str) -> Result<String, ReplyError> {
        tracing::debug!(endpoint = %self.endpoint, "sending chat message");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail);
            tracing::warn!(%status, ?detail, "chat request rejected");
            return Err(ReplyError::Service { status, detail });
        }

        let body: ChatResponse = response.json().await?;
        Ok(body.response)
    }
}

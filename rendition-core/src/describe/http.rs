use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::DescribeSection;

use super::{DescriptionRequest, DescriptionService, DescriptionUnavailable};

#[derive(Debug, Serialize)]
struct DescribeBody<'a> {
    model: &'a str,
    prompt: &'a str,
    media_type: &'a str,
    file_name: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct DescribeReply {
    #[serde(default, alias = "text")]
    description: Option<String>,
}

/// JSON-over-HTTP description service authenticated with a bearer token.
pub struct HttpDescriptionService {
    client: Client,
    endpoint: String,
    model: String,
    prompt: String,
    credential: String,
}

impl HttpDescriptionService {
    pub fn new(
        settings: &DescribeSection,
        credential: impl Into<String>,
    ) -> Result<Self, DescriptionUnavailable> {
        let client = Client::builder()
            .user_agent("rendition/0.1")
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1)))
            .build()
            .map_err(|err| DescriptionUnavailable::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            credential: credential.into(),
        })
    }
}

#[async_trait]
impl DescriptionService for HttpDescriptionService {
    async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescriptionUnavailable> {
        let body = DescribeBody {
            model: &self.model,
            prompt: &self.prompt,
            media_type: &request.media_type,
            file_name: &request.file_name,
            data: STANDARD.encode(&request.data),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|err| DescriptionUnavailable::Transport(err.to_string()))?;
        if let Some(reason) = classify_status(response.status()) {
            return Err(reason);
        }
        let reply = response
            .json::<DescribeReply>()
            .await
            .map_err(|err| DescriptionUnavailable::InvalidResponse(err.to_string()))?;
        match reply.description {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(DescriptionUnavailable::EmptyResponse),
        }
    }
}

fn classify_status(status: StatusCode) -> Option<DescriptionUnavailable> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DescriptionUnavailable::Unauthorized(status.as_u16())
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
            DescriptionUnavailable::QuotaExceeded
        }
        other => DescriptionUnavailable::Status(other.as_u16()),
    })
}

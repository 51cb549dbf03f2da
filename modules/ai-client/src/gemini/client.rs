use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AiError;

use super::types::*;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Inner connection retries before a network error is surfaced to the
/// caller's own retry loop.
const CONNECTION_RETRIES: u32 = 3;

pub(crate) struct GeminiClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_key: api_key.to_string(),
            http,
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, AiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        debug!(model, "Gemini generateContent request");

        let mut last_err = None;
        for attempt in 0..CONNECTION_RETRIES {
            let sent = self.http.post(&url).json(request).send().await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(AiError::Api {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return Ok(response.json().await?);
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt + 1 < CONNECTION_RETRIES => {
                    let delay = Duration::from_secs(2u64 << attempt);
                    warn!(attempt = attempt + 1, error = %e, "Gemini connection error, retrying");
                    tokio::time::sleep(delay).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err
            .map(Into::into)
            .unwrap_or(AiError::EmptyResponse))
    }

    pub async fn embed(&self, model: &str, text: &str, dims: Option<u32>) -> Result<Vec<f32>, AiError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = EmbedRequest {
            model: format!("models/{model}"),
            content: EmbedContent {
                parts: vec![Part::text(text)],
            },
            output_dimensionality: dims,
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let embed_response: EmbedResponse = response.json().await?;
        Ok(embed_response.embedding.values)
    }
}

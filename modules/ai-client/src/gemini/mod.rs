mod client;
pub(crate) mod types;

pub use types::{Blob, FunctionCall, FunctionResponse, Part};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::tool::{DynTool, Tool, ToolWrapper};

use client::GeminiClient;
use types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
const EMBED_DIMENSIONS: u32 = 768;

// =============================================================================
// Gemini Agent
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    pub(crate) model: String,
    pub(crate) tools: Vec<Arc<dyn DynTool>>,
    timeout: Duration,
    base_url: Option<String>,
}

/// Outcome of the bounded tool exchange: the final text plus how many tool
/// calls were dispatched on the way there.
#[derive(Debug, Clone)]
pub struct ToolExchange {
    pub text: String,
    pub tool_calls: usize,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            tools: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            base_url: None,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(ToolWrapper(tool)));
        self
    }

    pub fn dyn_tool(mut self, tool: Arc<dyn DynTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key, self.timeout);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }

    // =========================================================================
    // Convenience methods
    // =========================================================================

    /// Plain completion: system + user text in, text out.
    pub async fn complete(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = GenerateRequest::new(vec![Content::user(vec![Part::text(user)])])
            .system(system)
            .temperature(0.1)
            .max_output_tokens(8192);

        let response = self.client().generate(&self.model, &request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("No text in Gemini response"))
    }

    /// One-shot JSON-mode completion for prompts whose answer is a single
    /// JSON object.
    pub async fn complete_json(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = GenerateRequest::new(vec![Content::user(vec![Part::text(user)])])
            .system(system)
            .temperature(0.0)
            .max_output_tokens(8192)
            .json_response();

        let response = self.client().generate(&self.model, &request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("No text in Gemini response"))
    }

    /// Bounded tool exchange: one call with the registered tool palette,
    /// one round of tool execution, then a final call with the accumulated
    /// tool responses and no tools. Responses without tool calls return
    /// directly. This caps the interaction at two model round trips.
    pub async fn tool_exchange(
        &self,
        system: &str,
        user_parts: Vec<Part>,
        temperature: f32,
    ) -> Result<ToolExchange> {
        let client = self.client();

        let mut declarations = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            let def = tool.definition();
            declarations.push(FunctionDeclarationWire {
                name: def.name,
                description: def.description,
                parameters: def.parameters,
            });
        }

        let mut contents = vec![Content::user(user_parts)];

        let first = GenerateRequest::new(contents.clone())
            .system(system)
            .tools(declarations)
            .temperature(temperature)
            .max_output_tokens(65536);

        let response = client.generate(&self.model, &first).await?;
        let calls = response.function_calls();

        if calls.is_empty() {
            let text = response
                .text()
                .ok_or_else(|| anyhow!("No text in Gemini response"))?;
            return Ok(ToolExchange {
                text,
                tool_calls: 0,
            });
        }

        // Echo the model turn, then answer every call in one user turn.
        contents.push(Content::model(response.parts()));

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let tool = self
                .tools
                .iter()
                .find(|t| t.name() == call.name)
                .ok_or_else(|| anyhow!("Tool not found: {}", call.name))?;

            debug!(tool = %call.name, "Executing tool call");

            let value = match tool.call_json(call.args.clone()).await {
                Ok(v) => v,
                Err(e) => serde_json::json!({ "error": e }),
            };
            results.push(Part::function_response(&call.name, value));
        }
        contents.push(Content::user(results));

        // Final turn: no tools, JSON output only.
        let second = GenerateRequest::new(contents)
            .system(system)
            .temperature(temperature)
            .max_output_tokens(65536);

        let response = client.generate(&self.model, &second).await?;
        let text = response
            .text()
            .ok_or_else(|| anyhow!("No text in Gemini final response"))?;

        Ok(ToolExchange {
            text,
            tool_calls: calls.len(),
        })
    }

    /// Embed text into a 768-dimension vector.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let values = self
            .client()
            .embed(DEFAULT_EMBED_MODEL, text, Some(EMBED_DIMENSIONS))
            .await?;
        Ok(values)
    }
}

#[async_trait::async_trait]
impl crate::EmbedAgent for Gemini {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_new() {
        let ai = Gemini::new("test-key", "gemini-2.0-flash");
        assert_eq!(ai.model(), "gemini-2.0-flash");
        assert!(ai.tools.is_empty());
    }

    #[test]
    fn gemini_with_base_url() {
        let ai = Gemini::new("test-key", "gemini-2.0-flash").with_base_url("http://localhost:9999");
        assert_eq!(ai.base_url.as_deref(), Some("http://localhost:9999"));
    }
}

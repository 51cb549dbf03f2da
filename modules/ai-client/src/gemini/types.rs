use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Content parts
// =============================================================================

/// One part of a Gemini message. The wire shape is an object with exactly
/// one populated field; untagged deserialization tries the specific
/// variants before falling back to plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    Text {
        text: String,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_data(mime_type: impl Into<String>, base64_data: impl Into<String>) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime_type.into(),
                data: base64_data.into(),
            },
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Part::FunctionResponse {
            function_response: FunctionResponse {
                name: name.into(),
                response,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: "model".to_string(),
            parts,
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FunctionDeclarationWire {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ToolWire {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<FunctionDeclarationWire>,
}

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, Serialize, Default)]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GenerateRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolWire>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            system_instruction: None,
            contents,
            tools: None,
            generation_config: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(SystemInstruction {
            parts: vec![Part::text(system)],
        });
        self
    }

    pub fn tools(mut self, declarations: Vec<FunctionDeclarationWire>) -> Self {
        if !declarations.is_empty() {
            self.tools = Some(vec![ToolWire {
                function_declarations: declarations,
            }]);
        }
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .max_output_tokens = Some(max);
        self
    }

    pub fn json_response(mut self) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .response_mime_type = Some("application/json".to_string());
        self
    }
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    #[allow(dead_code)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<ResponseContent>,
    #[serde(rename = "finishReason", default)]
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    #[allow(dead_code)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    #[allow(dead_code)]
    pub candidates_token_count: u32,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::FunctionCall { function_call } => Some(function_call.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parts(&self) -> Vec<Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.clone())
            .unwrap_or_default()
    }
}

// =============================================================================
// Embeddings
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmbedRequest {
    pub model: String,
    pub content: EmbedContent,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    pub output_dimensionality: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmbedContent {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EmbedResponse {
    pub embedding: EmbedValues,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EmbedValues {
    pub values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_deserialization_picks_the_right_variant() {
        let call: Part = serde_json::from_str(
            r#"{"functionCall": {"name": "search_actors", "args": {"actors": []}}}"#,
        )
        .unwrap();
        assert!(matches!(call, Part::FunctionCall { .. }));

        let text: Part = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert!(matches!(text, Part::Text { .. }));
    }

    #[test]
    fn response_text_concatenates_parts() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("ab"));
        assert!(resp.function_calls().is_empty());
    }

    #[test]
    fn request_serializes_camel_case() {
        let req = GenerateRequest::new(vec![Content::user(vec![Part::text("hi")])])
            .system("sys")
            .temperature(0.1)
            .json_response();
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}

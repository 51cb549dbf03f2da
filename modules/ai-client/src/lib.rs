pub mod error;
pub mod gemini;
pub mod tool;
pub mod util;

pub use error::AiError;
pub use gemini::{Gemini, Part, ToolExchange};
pub use tool::{DynTool, Tool, ToolDefinition, ToolWrapper};
pub use util::{encode_base64, extract_json_object, strip_code_blocks, truncate_to_char_boundary};

use async_trait::async_trait;

/// Something that can turn text into a fixed-dimension vector.
#[async_trait]
pub trait EmbedAgent: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

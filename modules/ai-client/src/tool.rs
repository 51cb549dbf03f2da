//! Function-tool seam between the pipeline and the model.
//!
//! A [`Tool`] is a typed handler: it declares its JSON-schema parameters
//! up front, deserializes its own argument struct, and returns a
//! serializable result. [`DynTool`] is the object-safe face the wire
//! layer dispatches through. Tool failures are rendered into the
//! tool-result payload as text so one bad lookup never aborts the whole
//! exchange.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// One function declaration as the model sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    const NAME: &'static str;
    type Args: DeserializeOwned + Send + Sync;
    type Output: Serialize + Send + Sync;

    fn description(&self) -> String;

    /// JSON schema for the argument object. Declarations are static per
    /// tool, so this stays synchronous; only `call` does I/O.
    fn parameters(&self) -> Value;

    async fn call(&self, args: Self::Args) -> Result<Self::Output>;
}

/// Object-safe face of [`Tool`] so an agent can hold a heterogeneous
/// palette.
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> ToolDefinition;
    async fn call_json(&self, args: Value) -> Result<Value, String>;
}

pub struct ToolWrapper<T: Tool>(pub T);

#[async_trait]
impl<T: Tool> DynTool for ToolWrapper<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: T::NAME.to_string(),
            description: self.0.description(),
            parameters: self.0.parameters(),
        }
    }

    async fn call_json(&self, args: Value) -> Result<Value, String> {
        let args: T::Args = serde_json::from_value(args)
            .map_err(|e| format!("bad arguments for {}: {e}", T::NAME))?;

        let output = self
            .0
            .call(args)
            .await
            .map_err(|e| format!("{} failed: {e}", T::NAME))?;

        serde_json::to_value(output)
            .map_err(|e| format!("unserializable result from {}: {e}", T::NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    /// Scaled-down stand-in for the pipeline's actor lookup: resolve
    /// handles against a fixed directory.
    struct DirectoryTool {
        directory: HashMap<&'static str, &'static str>,
    }

    #[derive(Debug, Deserialize)]
    struct DirectoryArgs {
        handles: Vec<String>,
    }

    #[async_trait]
    impl Tool for DirectoryTool {
        const NAME: &'static str = "search_handles";
        type Args = DirectoryArgs;
        type Output = Vec<String>;

        fn description(&self) -> String {
            "Resolve handles to display names.".to_string()
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "handles": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["handles"]
            })
        }

        async fn call(&self, args: Self::Args) -> Result<Self::Output> {
            Ok(args
                .handles
                .iter()
                .map(|h| {
                    self.directory
                        .get(h.as_str())
                        .copied()
                        .unwrap_or("not_found")
                        .to_string()
                })
                .collect())
        }
    }

    fn tool() -> Box<dyn DynTool> {
        Box::new(ToolWrapper(DirectoryTool {
            directory: HashMap::from([("jane", "Jane Doe"), ("azchapter", "AZ Chapter")]),
        }))
    }

    #[tokio::test]
    async fn dispatches_through_the_wrapper() {
        let tool = tool();
        assert_eq!(tool.name(), "search_handles");

        let def = tool.definition();
        assert_eq!(def.name, "search_handles");
        assert!(def.parameters["properties"]["handles"].is_object());

        let result = tool
            .call_json(serde_json::json!({"handles": ["jane", "nobody"]}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(["Jane Doe", "not_found"]));
    }

    #[tokio::test]
    async fn bad_arguments_become_a_tool_error() {
        let err = tool()
            .call_json(serde_json::json!({"handles": 7}))
            .await
            .unwrap_err();
        assert!(err.contains("bad arguments for search_handles"));
    }
}

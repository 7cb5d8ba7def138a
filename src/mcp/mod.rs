/// Tool-calling servers spoken over stdio with JSON-RPC 2.0 framing.
///
/// Each binary wraps one `ToolSet` implementation in an `McpServer`. The
/// tool sets themselves are plain async structs so their vetting and query
/// logic can be tested without a transport.

pub mod args;
pub mod docker_tools;
pub mod postgres_tools;
pub mod quality_tools;
pub mod server;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String, valid: Vec<String> },
    #[error("invalid argument '{key}': {reason}")]
    BadArgument { key: String, reason: String },
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn bad_argument(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadArgument {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Advertised in `tools/list` responses.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[async_trait]
pub trait ToolSet: Send + Sync {
    fn server_name(&self) -> &'static str;
    fn tools(&self) -> Vec<ToolDescriptor>;
    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError>;

    fn unknown_tool(&self, name: &str) -> ToolError {
        ToolError::UnknownTool {
            name: name.to_string(),
            valid: self.tools().iter().map(|t| t.name.to_string()).collect(),
        }
    }
}

/// Newline-delimited JSON-RPC 2.0 loop over stdin/stdout.
///
/// Understands `initialize`, `tools/list` and `tools/call`; everything else
/// gets a method-not-found error. Requests without an id are notifications
/// and produce no response. Diagnostics go to stderr via tracing so stdout
/// stays a clean protocol stream.

use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::mcp::{ToolError, ToolSet};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const REJECTED: i64 = -32000;
const TOOL_FAILED: i64 = -32001;

pub struct McpServer<T: ToolSet> {
    tools: T,
}

impl<T: ToolSet> McpServer<T> {
    pub fn new(tools: T) -> Self {
        Self { tools }
    }

    /// Read requests line by line until stdin closes.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(io::stdin()).lines();
        let mut stdout = io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut payload = serde_json::to_vec(&response)?;
                payload.push(b'\n');
                stdout.write_all(&payload).await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<Value> {
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return Some(error_response(Value::Null, PARSE_ERROR, "parse error"));
            }
        };
        self.handle_request(&request).await
    }

    /// Dispatch one request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: &Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");
        debug!(method, "request");

        // A request without an id is a notification; handle side effects
        // only (there are none worth handling here) and stay silent.
        let id = id?;

        let response = match method {
            "initialize" => ok_response(
                id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {
                        "name": self.tools.server_name(),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": { "tools": {} },
                }),
            ),
            "tools/list" => {
                let tools: Vec<Value> = self
                    .tools
                    .tools()
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "inputSchema": t.input_schema,
                        })
                    })
                    .collect();
                ok_response(id, json!({ "tools": tools }))
            }
            "tools/call" => self.handle_call(id, request).await,
            other => error_response(
                id,
                METHOD_NOT_FOUND,
                &format!("unknown method '{}'", other),
            ),
        };
        Some(response)
    }

    async fn handle_call(&self, id: Value, request: &Value) -> Value {
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        let name = match params.get("name").and_then(Value::as_str) {
            Some(name) => name,
            None => return error_response(id, INVALID_PARAMS, "params.name is required"),
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        match self.tools.call(name, &arguments).await {
            Ok(result) => ok_response(
                id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": serde_json::to_string_pretty(&result)
                            .unwrap_or_else(|_| result.to_string()),
                    }]
                }),
            ),
            Err(e) => {
                let code = match &e {
                    ToolError::UnknownTool { .. } => METHOD_NOT_FOUND,
                    ToolError::BadArgument { .. } => INVALID_PARAMS,
                    ToolError::Rejected(_) => REJECTED,
                    ToolError::Failed(_) => TOOL_FAILED,
                };
                error_response(id, code, &e.to_string())
            }
        }
    }
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::ToolDescriptor;
    use async_trait::async_trait;

    struct EchoTools;

    #[async_trait]
    impl ToolSet for EchoTools {
        fn server_name(&self) -> &'static str {
            "echo"
        }

        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "echo",
                description: "returns its arguments",
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
            match name {
                "echo" => Ok(arguments.clone()),
                "always_rejects" => Err(ToolError::Rejected("no".into())),
                other => Err(self.unknown_tool(other)),
            }
        }
    }

    #[tokio::test]
    async fn initialize_reports_server_name() {
        let server = McpServer::new(EchoTools);
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let response = server.handle_request(&request).await.unwrap();
        assert_eq!(response["result"]["serverInfo"]["name"], "echo");
    }

    #[tokio::test]
    async fn tools_list_advertises_descriptors() {
        let server = McpServer::new(EchoTools);
        let request = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
        let response = server.handle_request(&request).await.unwrap();
        assert_eq!(response["result"]["tools"][0]["name"], "echo");
    }

    #[tokio::test]
    async fn call_wraps_result_in_text_content() {
        let server = McpServer::new(EchoTools);
        let request = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "echo", "arguments": {"k": "v"}},
        });
        let response = server.handle_request(&request).await.unwrap();
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("\"k\""));
    }

    #[tokio::test]
    async fn unknown_tool_maps_to_method_not_found() {
        let server = McpServer::new(EchoTools);
        let request = json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "nope"},
        });
        let response = server.handle_request(&request).await.unwrap();
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn rejected_call_maps_to_server_error_code() {
        let server = McpServer::new(EchoTools);
        let request = json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "always_rejects"},
        });
        let response = server.handle_request(&request).await.unwrap();
        assert_eq!(response["error"]["code"], REJECTED);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = McpServer::new(EchoTools);
        let request = json!({"jsonrpc": "2.0", "method": "initialized"});
        assert!(server.handle_request(&request).await.is_none());
    }

    #[tokio::test]
    async fn garbage_line_yields_parse_error() {
        let server = McpServer::new(EchoTools);
        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
    }
}

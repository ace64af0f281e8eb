//! Tool server
//!
//! Reads JSON-RPC requests line by line and routes them to the backend.

use super::protocol::*;
use super::tools::{execute_tool, get_all_tools};
use super::transport::{Incoming, StdioTransport, Transport};
use crate::backend::ListingBackend;
use crate::error::ServerError;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "listing-server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tool server - handles protocol messages
pub struct McpServer {
    backend: Arc<ListingBackend>,
    initialized: bool,
}

impl McpServer {
    pub fn new(backend: Arc<ListingBackend>) -> Self {
        Self {
            backend,
            initialized: false,
        }
    }

    /// Serve over stdin/stdout until the client disconnects
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.serve(&mut transport).await
    }

    /// Serve over any transport until EOF
    pub async fn serve<R, W>(&mut self, transport: &mut Transport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("Tool server starting");

        while let Some(message) = transport.read_message().await? {
            let response = match message {
                Incoming::Request(request) => self.handle_request(request).await,
                Incoming::Malformed(e) => Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Parse error: {e}")),
                )),
            };
            if let Some(response) = response {
                transport.write_response(&response).await?;
            }
        }

        tracing::info!("Client disconnected");
        Ok(())
    }

    /// Handle a JSON-RPC request; notifications get no response
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            ));
        }

        let notification = request.is_notification();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                JsonRpcResponse::success(request.id, Value::Null)
            }
            "ping" => JsonRpcResponse::success(request.id, Value::Object(Default::default())),
            "tools/list" => to_response(
                request.id,
                &ToolsListResult {
                    tools: get_all_tools(),
                },
            ),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
        };

        (!notification).then_some(response)
    }

    fn handle_initialize(&mut self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            tracing::info!(
                "Client {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        self.initialized = true;

        to_response(
            id,
            &InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: ServerCapabilities {
                    tools: ToolsCapability {
                        list_changed: false,
                    },
                },
                server_info: ServerInfo {
                    name: SERVER_NAME.to_string(),
                    version: SERVER_VERSION.to_string(),
                },
            },
        )
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, ServerError::InvalidParams(e.to_string()).into())
            }
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"))
            }
        };

        let result = match execute_tool(&self.backend, &params.name, params.arguments).await {
            Ok(value) => ToolCallResult::json(&value),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", params.name, e);
                ToolCallResult::error(&e.payload())
            }
        };
        to_response(id, &result)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn to_response<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, ServerError::from(e).into()),
    }
}

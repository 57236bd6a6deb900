use std::sync::Arc;

use canvas_mcp_core::CanvasClient;
use mcp_types::CallToolRequestParams;
use mcp_types::CallToolResult;
use mcp_types::CallToolResultContent;
use mcp_types::ClientRequest;
use mcp_types::Implementation;
use mcp_types::InitializeRequestParams;
use mcp_types::InitializeResult;
use mcp_types::JSONRPCBatchRequest;
use mcp_types::JSONRPCBatchRequestItem;
use mcp_types::JSONRPCBatchResponse;
use mcp_types::JSONRPCBatchResponseItem;
use mcp_types::JSONRPCError;
use mcp_types::JSONRPCErrorError;
use mcp_types::JSONRPCNotification;
use mcp_types::JSONRPCRequest;
use mcp_types::JSONRPCResponse;
use mcp_types::ListToolsResult;
use mcp_types::MCP_SCHEMA_VERSION;
use mcp_types::RequestId;
use mcp_types::ServerCapabilities;
use mcp_types::ServerCapabilitiesTools;
use mcp_types::ServerNotification;
use mcp_types::TextContent;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::outgoing_message::OutgoingMessage;
use crate::outgoing_message::OutgoingMessageSender;
use crate::outgoing_message::OutgoingResponse;
use crate::tool_dispatch;
use crate::tool_schemas::representative_tools;

const SERVER_NAME: &str = "canvas-mcp-server";

pub(crate) struct MessageProcessor {
    outgoing: OutgoingMessageSender,
    initialized: bool,
    canvas: Arc<CanvasClient>,
}

impl MessageProcessor {
    pub(crate) fn new(outgoing_tx: mpsc::Sender<OutgoingMessage>, canvas: Arc<CanvasClient>) -> Self {
        Self {
            outgoing: OutgoingMessageSender::new(outgoing_tx),
            initialized: false,
            canvas,
        }
    }

    pub(crate) async fn process_request(&mut self, request: JSONRPCRequest) {
        let id = request.id.clone();
        match ClientRequest::try_from(request) {
            Ok(ClientRequest::InitializeRequest(params)) => self.handle_initialize(id, params).await,
            Ok(ClientRequest::PingRequest(_)) => self.send_empty_result(id).await,
            Ok(ClientRequest::ListToolsRequest(_)) => self.handle_list_tools(id).await,
            Ok(ClientRequest::CallToolRequest(params)) => self.handle_call_tool(id, params),
            Ok(ClientRequest::ListResourcesRequest(_))
            | Ok(ClientRequest::ListResourceTemplatesRequest(_))
            | Ok(ClientRequest::ListPromptsRequest(_)) => self.send_empty_result(id).await,
            Ok(other) => {
                info!("no handler wired for request variant: {other:?}");
                self.send_empty_result(id).await;
            }
            Err(err) => {
                self.outgoing
                    .send_error(
                        id,
                        JSONRPCErrorError {
                            code: -32601,
                            message: err.to_string(),
                            data: None,
                        },
                    )
                    .await;
            }
        }
    }

    pub(crate) async fn process_response(&mut self, response: JSONRPCResponse) {
        self.outgoing
            .notify_client_response(response.id, response.result)
            .await;
    }

    pub(crate) async fn process_notification(&mut self, notification: JSONRPCNotification) {
        match ServerNotification::try_from(notification) {
            Ok(notification) => info!("received client notification: {notification:?}"),
            Err(err) => warn!("unrecognized notification: {err}"),
        }
    }

    pub(crate) async fn process_error(&mut self, error: JSONRPCError) {
        warn!("received JSON-RPC error from client: {error:?}");
    }

    pub(crate) async fn process_batch_request(&mut self, batch: JSONRPCBatchRequest) {
        for item in batch {
            match item {
                JSONRPCBatchRequestItem::JSONRPCRequest(request) => self.process_request(request).await,
                JSONRPCBatchRequestItem::JSONRPCNotification(notification) => {
                    self.process_notification(notification).await
                }
            }
        }
    }

    pub(crate) async fn process_batch_response(&mut self, batch: JSONRPCBatchResponse) {
        for item in batch {
            match item {
                JSONRPCBatchResponseItem::JSONRPCResponse(response) => self.process_response(response).await,
                JSONRPCBatchResponseItem::JSONRPCError(error) => self.process_error(error).await,
            }
        }
    }

    async fn handle_initialize(&mut self, id: RequestId, _params: InitializeRequestParams) {
        if self.initialized {
            self.outgoing
                .send_error(
                    id,
                    JSONRPCErrorError {
                        code: -32600,
                        message: "initialize called more than once".to_string(),
                        data: None,
                    },
                )
                .await;
            return;
        }
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_SCHEMA_VERSION.to_string(),
            capabilities: ServerCapabilities {
                completions: None,
                experimental: None,
                logging: None,
                prompts: None,
                resources: None,
                tools: Some(ServerCapabilitiesTools { list_changed: Some(true) }),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        };
        self.send_result(id, &result).await;
    }

    async fn handle_list_tools(&self, id: RequestId) {
        let result = ListToolsResult {
            tools: representative_tools(),
            next_cursor: None,
        };
        self.send_result(id, &result).await;
    }

    /// Tool execution can take longer than we want to block the single
    /// dispatch loop on (a bulk grade run, a file upload), so it runs on its
    /// own task and replies through a cloned outgoing sender once done.
    fn handle_call_tool(&self, id: RequestId, params: CallToolRequestParams) {
        let canvas = self.canvas.clone();
        let outgoing_tx = self.outgoing.clone_sender();
        let CallToolRequestParams { name, arguments } = params;

        tokio::spawn(async move {
            let outcome = tool_dispatch::dispatch(&canvas, &name, arguments.unwrap_or(serde_json::Value::Null)).await;
            let result = CallToolResult {
                content: vec![CallToolResultContent::TextContent(TextContent {
                    r#type: "text".to_string(),
                    text: outcome.text,
                    annotations: None,
                })],
                is_error: Some(outcome.is_error),
            };
            let response_value = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);
            let outgoing_message = OutgoingMessage::Response(OutgoingResponse {
                id,
                result: response_value,
            });
            if outgoing_tx.send(outgoing_message).await.is_err() {
                error!("failed to deliver tools/call response: receiver dropped");
            }
        });
    }

    async fn send_result<T: serde::Serialize>(&self, id: RequestId, result: &T) {
        let value = serde_json::to_value(result).unwrap_or(serde_json::Value::Null);
        self.outgoing.send_response(id, value).await;
    }

    async fn send_empty_result(&self, id: RequestId) {
        self.outgoing.send_response(id, serde_json::json!({})).await;
    }
}

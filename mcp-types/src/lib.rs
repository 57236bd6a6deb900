//! Hand-written MCP (Model Context Protocol) wire types.
//!
//! Upstream MCP servers typically generate this module from the official
//! JSON Schema via `ts-rs` or a codegen step against `schema.json`. This
//! crate has no such schema in its build, so the subset of types actually
//! used by the transport and tool-dispatch layers is written out by hand,
//! matching the shapes of MCP's 2025-03-26 schema revision.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_SCHEMA_VERSION: &str = "2025-03-26";

pub type Result = Value;

/// A JSON-RPC request or notification ID. Requests carry one; notifications do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

/// Trait implemented by every MCP request type, binding it to its method name,
/// parameter type, and result type.
pub trait ModelContextProtocolRequest {
    const METHOD: &'static str;
    type Params: Serialize + for<'de> Deserialize<'de> + std::fmt::Debug;
    type Result: Serialize + for<'de> Deserialize<'de> + std::fmt::Debug;
}

/// Trait implemented by every MCP notification type.
pub trait ModelContextProtocolNotification {
    const METHOD: &'static str;
    type Params: Serialize + for<'de> Deserialize<'de> + std::fmt::Debug;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCErrorError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JSONRPCErrorError,
}

pub type JSONRPCBatchRequest = Vec<JSONRPCBatchRequestItem>;
pub type JSONRPCBatchResponse = Vec<JSONRPCBatchResponseItem>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCBatchRequestItem {
    JSONRPCRequest(JSONRPCRequest),
    JSONRPCNotification(JSONRPCNotification),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCBatchResponseItem {
    JSONRPCResponse(JSONRPCResponse),
    JSONRPCError(JSONRPCError),
}

/// Any message that may appear on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
    BatchRequest(JSONRPCBatchRequest),
    BatchResponse(JSONRPCBatchResponse),
}

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilitiesTools {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ServerCapabilitiesTools>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

pub struct InitializeRequest;
impl ModelContextProtocolRequest for InitializeRequest {
    const METHOD: &'static str = "initialize";
    type Params = InitializeRequestParams;
    type Result = InitializeResult;
}

// ---------------------------------------------------------------------------
// ping
// ---------------------------------------------------------------------------

pub struct PingRequest;
impl ModelContextProtocolRequest for PingRequest {
    const METHOD: &'static str = "ping";
    type Params = Option<Value>;
    type Result = Value;
}

// ---------------------------------------------------------------------------
// resources/*
// ---------------------------------------------------------------------------

pub struct ListResourcesRequest;
impl ModelContextProtocolRequest for ListResourcesRequest {
    const METHOD: &'static str = "resources/list";
    type Params = Option<Value>;
    type Result = Value;
}

pub struct ListResourceTemplatesRequest;
impl ModelContextProtocolRequest for ListResourceTemplatesRequest {
    const METHOD: &'static str = "resources/templates/list";
    type Params = Option<Value>;
    type Result = Value;
}

pub struct ReadResourceRequest;
impl ModelContextProtocolRequest for ReadResourceRequest {
    const METHOD: &'static str = "resources/read";
    type Params = Value;
    type Result = Value;
}

pub struct SubscribeRequest;
impl ModelContextProtocolRequest for SubscribeRequest {
    const METHOD: &'static str = "resources/subscribe";
    type Params = Value;
    type Result = Value;
}

pub struct UnsubscribeRequest;
impl ModelContextProtocolRequest for UnsubscribeRequest {
    const METHOD: &'static str = "resources/unsubscribe";
    type Params = Value;
    type Result = Value;
}

// ---------------------------------------------------------------------------
// prompts/*
// ---------------------------------------------------------------------------

pub struct ListPromptsRequest;
impl ModelContextProtocolRequest for ListPromptsRequest {
    const METHOD: &'static str = "prompts/list";
    type Params = Option<Value>;
    type Result = Value;
}

pub struct GetPromptRequest;
impl ModelContextProtocolRequest for GetPromptRequest {
    const METHOD: &'static str = "prompts/get";
    type Params = Value;
    type Result = Value;
}

// ---------------------------------------------------------------------------
// tools/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub input_schema: ToolInputSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

pub struct ListToolsRequest;
impl ModelContextProtocolRequest for ListToolsRequest {
    const METHOD: &'static str = "tools/list";
    type Params = Option<Value>;
    type Result = ListToolsResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub r#type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

/// `TextContent` already carries its own `"type"` discriminator field, so
/// this wraps it untagged rather than layering a second `serde(tag = ...)`
/// on top (which would emit a duplicate `type` key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallToolResultContent {
    TextContent(TextContent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<CallToolResultContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

pub struct CallToolRequest;
impl ModelContextProtocolRequest for CallToolRequest {
    const METHOD: &'static str = "tools/call";
    type Params = CallToolRequestParams;
    type Result = CallToolResult;
}

// ---------------------------------------------------------------------------
// logging / completion
// ---------------------------------------------------------------------------

pub struct SetLevelRequest;
impl ModelContextProtocolRequest for SetLevelRequest {
    const METHOD: &'static str = "logging/setLevel";
    type Params = Value;
    type Result = Value;
}

pub struct CompleteRequest;
impl ModelContextProtocolRequest for CompleteRequest {
    const METHOD: &'static str = "completion/complete";
    type Params = Value;
    type Result = Value;
}

// ---------------------------------------------------------------------------
// ClientRequest: the union of every request variant a client may send.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ClientRequest {
    InitializeRequest(<InitializeRequest as ModelContextProtocolRequest>::Params),
    PingRequest(<PingRequest as ModelContextProtocolRequest>::Params),
    ListResourcesRequest(<ListResourcesRequest as ModelContextProtocolRequest>::Params),
    ListResourceTemplatesRequest(
        <ListResourceTemplatesRequest as ModelContextProtocolRequest>::Params,
    ),
    ReadResourceRequest(<ReadResourceRequest as ModelContextProtocolRequest>::Params),
    SubscribeRequest(<SubscribeRequest as ModelContextProtocolRequest>::Params),
    UnsubscribeRequest(<UnsubscribeRequest as ModelContextProtocolRequest>::Params),
    ListPromptsRequest(<ListPromptsRequest as ModelContextProtocolRequest>::Params),
    GetPromptRequest(<GetPromptRequest as ModelContextProtocolRequest>::Params),
    ListToolsRequest(<ListToolsRequest as ModelContextProtocolRequest>::Params),
    CallToolRequest(<CallToolRequest as ModelContextProtocolRequest>::Params),
    SetLevelRequest(<SetLevelRequest as ModelContextProtocolRequest>::Params),
    CompleteRequest(<CompleteRequest as ModelContextProtocolRequest>::Params),
}

#[derive(Debug)]
pub struct MethodNotFoundError(pub String);

impl std::fmt::Display for MethodNotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown request method: {}", self.0)
    }
}

impl std::error::Error for MethodNotFoundError {}

impl TryFrom<JSONRPCRequest> for ClientRequest {
    type Error = MethodNotFoundError;

    fn try_from(request: JSONRPCRequest) -> std::result::Result<Self, Self::Error> {
        let JSONRPCRequest { method, params, .. } = request;
        let params = params.unwrap_or(Value::Null);

        macro_rules! parse {
            ($variant:ident, $ty:ty) => {
                serde_json::from_value::<$ty>(params)
                    .map(ClientRequest::$variant)
                    .map_err(|_| MethodNotFoundError(method.clone()))
            };
        }

        match method.as_str() {
            "initialize" => parse!(InitializeRequest, InitializeRequestParams),
            "ping" => Ok(ClientRequest::PingRequest(
                serde_json::from_value(params).ok(),
            )),
            "resources/list" => Ok(ClientRequest::ListResourcesRequest(
                serde_json::from_value(params).ok(),
            )),
            "resources/templates/list" => Ok(ClientRequest::ListResourceTemplatesRequest(
                serde_json::from_value(params).ok(),
            )),
            "resources/read" => parse!(ReadResourceRequest, Value),
            "resources/subscribe" => parse!(SubscribeRequest, Value),
            "resources/unsubscribe" => parse!(UnsubscribeRequest, Value),
            "prompts/list" => Ok(ClientRequest::ListPromptsRequest(
                serde_json::from_value(params).ok(),
            )),
            "prompts/get" => parse!(GetPromptRequest, Value),
            "tools/list" => Ok(ClientRequest::ListToolsRequest(
                serde_json::from_value(params).ok(),
            )),
            "tools/call" => parse!(CallToolRequest, CallToolRequestParams),
            "logging/setLevel" => parse!(SetLevelRequest, Value),
            "completion/complete" => parse!(CompleteRequest, Value),
            other => Err(MethodNotFoundError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub struct CancelledNotification;
impl ModelContextProtocolNotification for CancelledNotification {
    const METHOD: &'static str = "notifications/cancelled";
    type Params = Value;
}

pub struct ProgressNotification;
impl ModelContextProtocolNotification for ProgressNotification {
    const METHOD: &'static str = "notifications/progress";
    type Params = Value;
}

pub struct ResourceListChangedNotification;
impl ModelContextProtocolNotification for ResourceListChangedNotification {
    const METHOD: &'static str = "notifications/resources/list_changed";
    type Params = Option<Value>;
}

pub struct ResourceUpdatedNotification;
impl ModelContextProtocolNotification for ResourceUpdatedNotification {
    const METHOD: &'static str = "notifications/resources/updated";
    type Params = Value;
}

pub struct PromptListChangedNotification;
impl ModelContextProtocolNotification for PromptListChangedNotification {
    const METHOD: &'static str = "notifications/prompts/list_changed";
    type Params = Option<Value>;
}

pub struct ToolListChangedNotification;
impl ModelContextProtocolNotification for ToolListChangedNotification {
    const METHOD: &'static str = "notifications/tools/list_changed";
    type Params = Option<Value>;
}

pub struct LoggingMessageNotification;
impl ModelContextProtocolNotification for LoggingMessageNotification {
    const METHOD: &'static str = "notifications/message";
    type Params = Value;
}

#[derive(Debug)]
pub enum ServerNotification {
    CancelledNotification(<CancelledNotification as ModelContextProtocolNotification>::Params),
    ProgressNotification(<ProgressNotification as ModelContextProtocolNotification>::Params),
    ResourceListChangedNotification(
        <ResourceListChangedNotification as ModelContextProtocolNotification>::Params,
    ),
    ResourceUpdatedNotification(
        <ResourceUpdatedNotification as ModelContextProtocolNotification>::Params,
    ),
    PromptListChangedNotification(
        <PromptListChangedNotification as ModelContextProtocolNotification>::Params,
    ),
    ToolListChangedNotification(
        <ToolListChangedNotification as ModelContextProtocolNotification>::Params,
    ),
    LoggingMessageNotification(
        <LoggingMessageNotification as ModelContextProtocolNotification>::Params,
    ),
}

impl TryFrom<JSONRPCNotification> for ServerNotification {
    type Error = MethodNotFoundError;

    fn try_from(notification: JSONRPCNotification) -> std::result::Result<Self, Self::Error> {
        let JSONRPCNotification { method, params, .. } = notification;
        let params = params.unwrap_or(Value::Null);

        match method.as_str() {
            "notifications/cancelled" => serde_json::from_value(params)
                .map(ServerNotification::CancelledNotification)
                .map_err(|_| MethodNotFoundError(method.clone())),
            "notifications/progress" => serde_json::from_value(params)
                .map(ServerNotification::ProgressNotification)
                .map_err(|_| MethodNotFoundError(method.clone())),
            "notifications/resources/list_changed" => Ok(
                ServerNotification::ResourceListChangedNotification(
                    serde_json::from_value(params).ok(),
                ),
            ),
            "notifications/resources/updated" => serde_json::from_value(params)
                .map(ServerNotification::ResourceUpdatedNotification)
                .map_err(|_| MethodNotFoundError(method.clone())),
            "notifications/prompts/list_changed" => Ok(
                ServerNotification::PromptListChangedNotification(
                    serde_json::from_value(params).ok(),
                ),
            ),
            "notifications/tools/list_changed" => Ok(ServerNotification::ToolListChangedNotification(
                serde_json::from_value(params).ok(),
            )),
            "notifications/message" => serde_json::from_value(params)
                .map(ServerNotification::LoggingMessageNotification)
                .map_err(|_| MethodNotFoundError(method.clone())),
            other => Err(MethodNotFoundError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn request_id_round_trips_both_variants() {
        let int_id: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(int_id, RequestId::Integer(7));

        let str_id: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(str_id, RequestId::String("abc".to_string()));
    }

    #[test]
    fn client_request_parses_tools_call() {
        let request = JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(1),
            method: "tools/call".to_string(),
            params: Some(serde_json::json!({"name": "list_courses", "arguments": {}})),
        };
        let parsed = ClientRequest::try_from(request).expect("parses");
        assert!(matches!(parsed, ClientRequest::CallToolRequest(_)));
    }

    #[test]
    fn client_request_rejects_unknown_method() {
        let request = JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(1),
            method: "not/a/real/method".to_string(),
            params: None,
        };
        assert!(ClientRequest::try_from(request).is_err());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! MCP tool surface over the dispatcher.
//!
//! Every tool failure becomes a single textual content item carrying the
//! serialised error payload with `isError = true`; a bad request never
//! takes the process down.

use crate::dispatch::{Dispatcher, ExecParams, ExecuteParams, RevokeParams};
use janee_error::{JaneeError, JaneeErrorDto};
use rmcp::ErrorData as McpError;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::{RequestContext, RoleServer};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// MCP server handle shared across transports.
#[derive(Clone)]
pub struct JaneeMcpServer {
    dispatcher: Arc<Dispatcher>,
}

impl JaneeMcpServer {
    /// Wrap a dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn tools(&self) -> Vec<Tool> {
        let options = self.dispatcher.options();
        let mut tools = vec![
            Tool::new(
                "list_services",
                "List the capabilities this broker exposes: target service, mode, TTL, and policy. Never returns credentials.",
                schema(json!({ "type": "object", "properties": {} })),
            ),
            Tool::new(
                "execute",
                "Perform an authenticated HTTP request through a capability. The broker injects credentials, enforces policy, and pins the request to the service origin.",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "capability": { "type": "string", "description": "Capability name from list_services" },
                        "method": { "type": "string", "description": "HTTP method" },
                        "path": { "type": "string", "description": "Path appended to the service base URL, query string included" },
                        "body": { "type": "string", "description": "Request body" },
                        "headers": {
                            "type": "object",
                            "additionalProperties": { "type": "string" },
                            "description": "Extra request headers"
                        },
                        "reason": { "type": "string", "description": "Why this call is being made" },
                    },
                    "required": ["capability", "method", "path"],
                })),
            ),
            Tool::new(
                "list_sessions",
                "List live sessions issued by this broker.",
                schema(json!({ "type": "object", "properties": {} })),
            ),
            Tool::new(
                "revoke_session",
                "Revoke a live session by id.",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "sessionId": { "type": "string", "description": "Session id from list_sessions" },
                    },
                    "required": ["sessionId"],
                })),
            ),
        ];

        if options.enable_reload {
            tools.push(Tool::new(
                "reload_config",
                "Re-read the configuration file and hot-swap services and capabilities.",
                schema(json!({ "type": "object", "properties": {} })),
            ));
        }
        if options.enable_exec {
            tools.push(Tool::new(
                "janee_exec",
                "Run a whitelisted local command with credentials injected into its environment. Captured output is scrubbed of credentials.",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "capability": { "type": "string", "description": "Exec-mode capability name" },
                        "command": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Full argv; the program's basename must be whitelisted"
                        },
                        "stdin": { "type": "string", "description": "Bytes written to the child's stdin" },
                        "reason": { "type": "string", "description": "Why this command is being run" },
                    },
                    "required": ["capability", "command"],
                })),
            ));
        }
        tools
    }

    async fn dispatch_tool(&self, name: &str, args: Value) -> Result<Value, JaneeError> {
        let options = self.dispatcher.options();
        match name {
            "list_services" => Ok(self.dispatcher.list_services()),
            "execute" => {
                let params: ExecuteParams = parse_args(name, args)?;
                self.dispatcher.execute(params).await
            }
            "reload_config" if options.enable_reload => self.dispatcher.reload_config(),
            "janee_exec" if options.enable_exec => {
                let params: ExecParams = parse_args(name, args)?;
                self.dispatcher.exec(params).await
            }
            "list_sessions" => self.dispatcher.list_sessions(),
            "revoke_session" => {
                let params: RevokeParams = parse_args(name, args)?;
                self.dispatcher.revoke_session(params)
            }
            other => Err(JaneeError::not_found(format!("unknown tool '{other}'"))),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, JaneeError> {
    serde_json::from_value(args)
        .map_err(|err| JaneeError::config(format!("invalid arguments for '{tool}': {err}")))
}

fn schema(value: Value) -> Arc<JsonObject> {
    Arc::new(
        value
            .as_object()
            .cloned()
            .expect("tool schemas are JSON objects"),
    )
}

/// Serialise an error into the single textual content item of a failed
/// tool call.
fn error_content(err: &JaneeError) -> Content {
    let dto = JaneeErrorDto::from(err);
    let payload = json!({ "error": dto });
    Content::text(serde_json::to_string(&payload).unwrap_or_else(|_| err.to_string()))
}

impl ServerHandler for JaneeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            instructions: Some(
                "Janee is a local credential broker. Call list_services to see the \
                 capabilities you may use, then execute (or janee_exec) to make \
                 authenticated calls. Raw credentials are never returned."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.to_string();
        let args = Value::Object(request.arguments.unwrap_or_default());
        debug!(tool = %name, "tool call");

        match self.dispatch_tool(&name, args).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|_| value.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(err) => {
                debug!(tool = %name, error = %err, "tool call failed");
                Ok(CallToolResult::error(vec![error_content(&err)]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_content_carries_code_and_message() {
        let err = JaneeError::security("origin mismatch: 'https://evil.com/' is outside 'https://api.stripe.com'");
        let content = error_content(&err);
        let text = content.as_text().expect("text content").text.clone();
        assert!(text.contains("SECURITY"));
        assert!(text.contains("origin mismatch"));
    }

    #[test]
    fn parse_args_reports_the_tool_name() {
        let err = parse_args::<ExecuteParams>("execute", json!({ "capability": 42 })).unwrap_err();
        assert_eq!(err.code, janee_error::ErrorCode::Config);
        assert!(err.message.contains("execute"));
    }
}

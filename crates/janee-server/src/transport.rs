// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport bindings: stdio for local agent subprocesses, and the MCP
//! Streamable HTTP transport mounted at `/mcp`.

use crate::mcp::JaneeMcpServer;
use anyhow::{Context, Result};
use axum::Router;
use axum::routing::any;
use rmcp::service::ServiceExt;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Serve MCP over stdin/stdout until the peer disconnects.
pub async fn serve_stdio(server: JaneeMcpServer) -> Result<()> {
    info!("janeed listening on stdio");
    let service = server
        .serve(rmcp::transport::io::stdio())
        .await
        .context("start stdio transport")?;
    service.waiting().await.context("stdio transport")?;
    Ok(())
}

/// Serve MCP over Streamable HTTP at `http://host:port/mcp`.
///
/// One endpoint accepts GET and POST (and DELETE for session teardown);
/// per-transport session ids are minted by the local session manager.
pub async fn serve_http(server: JaneeMcpServer, host: &str, port: u16) -> Result<()> {
    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(Duration::from_secs(15)),
        stateful_mode: true,
    };
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        config,
    );

    let app = Router::new().route(
        "/mcp",
        any(move |request| {
            let service = service.clone();
            async move { service.handle(request).await }
        }),
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(addr = %addr, "janeed listening on http (/mcp)");

    axum::serve(listener, app).await.context("serve http")?;
    Ok(())
}

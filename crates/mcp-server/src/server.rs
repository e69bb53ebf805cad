//! MCP server over stdio.
//!
//! `ServerHandler` is implemented by hand so listing and dispatch run
//! through the in-repo tool registry rather than a generated router.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::stdio;
use rmcp::{ServerHandler, ServiceExt};

use crate::config::Config;
use crate::context::ServerContext;
use crate::registry;

#[derive(Clone)]
pub struct MemoryServer {
    ctx: Arc<ServerContext>,
}

impl MemoryServer {
    pub fn new(config: Config) -> Self {
        Self {
            ctx: ServerContext::new(config),
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }
}

impl ServerHandler for MemoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "zettel-memory".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Zettel Memory MCP server - a file-backed note vault with full-text search, \
                 link-graph queries, and housekeeping tools. Notes are addressed by UID."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            next_cursor: None,
            tools: registry::catalog(),
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        registry::execute_tool(&self.ctx, &request.name, arguments).await
    }
}

/// Run the server on stdio until the client disconnects.
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(vault = %config.vault_path.display(), index = %config.index_path.display(), "starting server");

    let server = MemoryServer::new(config);
    let ctx = Arc::clone(server.context());

    let service = server.serve(stdio()).await.inspect_err(|err| {
        tracing::error!("Error starting server: {err}");
    })?;

    tracing::info!("Zettel Memory MCP server started");
    service.waiting().await?;

    ctx.cleanup().await;
    Ok(())
}

/// Verify that the vault and the index are reachable and healthy.
pub async fn healthcheck(config: Config) -> anyhow::Result<()> {
    let ctx = ServerContext::new(config);

    let files = ctx.store.scan_files().await?;
    let index = ctx.index().await?;
    let healthy = index.integrity_check().await?;
    let stats = index.stats().await?;
    ctx.cleanup().await;

    if healthy {
        println!(
            "ok: {} note file(s) on disk, {} indexed, schema v{}",
            files.len(),
            stats.note_count,
            stats.schema_version
        );
        Ok(())
    } else {
        Err(crate::error::ServerError::new(
            crate::error::ErrorCode::IndexCorrupted,
            "index integrity check failed",
        )
        .into())
    }
}

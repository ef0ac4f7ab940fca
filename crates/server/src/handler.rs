//! MCP server handler implementation.
//!
//! Exposes the repository operations as tools. Each tool replies with its output
//! as pretty-printed JSON text, or with an error whose `data` names the errcode.
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult, PaginatedRequestParam,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use serde::Serialize;

use mediarepo_client::MediaRepo;

use crate::error::ServerError;
use crate::tools::admin::{maintenance_impl, reload_impl};
use crate::tools::download::{DownloadParams, download_impl};
use crate::tools::preview::{PreviewParams, preview_impl};

/// The main MCP server handler for media-repo.
#[derive(Clone)]
pub struct MediaRepoServer {
    repo: Arc<MediaRepo>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MediaRepoServer {
    pub fn new(repo: Arc<MediaRepo>) -> Self {
        Self { repo, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch remote media by origin server and media id, through the media and failure caches. Returns content type, filename, size, SHA-256 and thumbnail decision."
    )]
    async fn download(&self, params: Parameters<DownloadParams>) -> Result<CallToolResult, McpError> {
        respond(download_impl(&self.repo, params.0).await.map_err(ServerError::from))
    }

    #[tool(
        description = "Generate a link preview for a URL: OpenGraph title, description, site name, type and image, with page fallbacks. Cached per URL."
    )]
    async fn preview(&self, params: Parameters<PreviewParams>) -> Result<CallToolResult, McpError> {
        respond(preview_impl(&self.repo, params.0).await.map_err(ServerError::from))
    }

    /// Reload configuration from file and environment. On failure the previous
    /// configuration stays in force.
    #[tool(description = "Reload configuration from file and environment. Invalid configuration is rejected.")]
    async fn reload(&self) -> Result<CallToolResult, McpError> {
        respond(reload_impl(&self.repo).await)
    }

    #[tool(description = "Evict cold cache entries and purge expired failure records now. Returns the counts.")]
    async fn maintenance(&self) -> Result<CallToolResult, McpError> {
        respond(Ok(maintenance_impl(&self.repo).await))
    }
}

fn respond<T: Serialize>(result: Result<T, ServerError>) -> Result<CallToolResult, McpError> {
    let output = result?;
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| ServerError::Internal(format!("failed to serialize result: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl ServerHandler for MediaRepoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "media-repo".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

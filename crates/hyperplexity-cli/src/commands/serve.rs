//! `mcp-server-hyperplexity serve`: MCP over stdio (the default command).

use hyperplexity_core::ClientConfig;

pub async fn run(config: &ClientConfig) -> Result<(), String> {
    hyperplexity_mcp::serve_stdio(config).await
}

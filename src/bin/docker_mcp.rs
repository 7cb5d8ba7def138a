use tracing_subscriber::EnvFilter;

use odoo_ops::mcp::docker_tools::DockerTools;
use odoo_ops::mcp::server::McpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    McpServer::new(DockerTools::new()).serve().await
}

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use odoo_ops::core::config::Config;
use odoo_ops::mcp::postgres_tools::PostgresTools;
use odoo_ops::mcp::server::McpServer;

#[derive(Parser)]
#[command(name = "postgres-mcp", about = "PostgreSQL introspection tool server", version)]
struct Args {
    /// Deployment configuration supplying the default connection
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // A missing config just means no default connection; pg_connect still
    // works over the protocol.
    let default_url = match Config::load(&args.config) {
        Ok(config) => Some(config.postgresql.url()),
        Err(e) => {
            warn!(path = %args.config.display(), error = %e, "no default connection");
            None
        }
    };

    McpServer::new(PostgresTools::new(default_url)).serve().await
}

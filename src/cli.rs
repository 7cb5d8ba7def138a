use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "odoo-ops",
    about = "Operations toolkit for multi-version Odoo Docker deployments",
    version
)]
pub struct Cli {
    /// Path to the deployment configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the environment health battery
    HealthCheck {
        /// Include connectivity and port checks and per-check breakdown
        #[arg(short, long)]
        detailed: bool,

        /// Attempt automatic remediation of failed checks
        #[arg(short, long)]
        fix: bool,
    },

    /// Show container states and the current health tier
    Status,

    /// Show project, database and web endpoint details
    Info,

    /// Analyze the source database before migration (coming soon)
    AnalyzeDb,

    /// Produce a module migration plan (coming soon)
    PlanMigration,

    /// Execute a database migration (coming soon)
    Migrate,

    /// Validate a completed migration (coming soon)
    Validate,
}

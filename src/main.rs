use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use odoo_ops::cli::{Cli, Commands};
use odoo_ops::core::checks::CheckStatus;
use odoo_ops::core::config::Config;
use odoo_ops::core::docker::DockerManager;
use odoo_ops::core::health::{HealthRunner, Tier};
use odoo_ops::utils::{mask_sensitive, report_timestamp, truncate_string};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "configuration unusable");
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::HealthCheck { detailed, fix } => {
            handle_health_check(&config, detailed, fix).await
        }
        Commands::Status => handle_status(&config).await,
        Commands::Info => handle_info(&config),
        Commands::AnalyzeDb => coming_soon("analyze-db", "source database analysis"),
        Commands::PlanMigration => coming_soon("plan-migration", "module migration planning"),
        Commands::Migrate => coming_soon("migrate", "database migration execution"),
        Commands::Validate => coming_soon("validate", "post-migration validation"),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn docker_manager(config: &Config) -> Result<DockerManager> {
    DockerManager::new(Duration::from_secs(config.environment.health_check_timeout))
}

async fn handle_health_check(config: &Config, detailed: bool, fix: bool) -> Result<ExitCode> {
    let docker = docker_manager(config)?;
    let runner = HealthRunner::new(config, docker);
    let report = runner.run(detailed, fix).await?;

    println!();
    println!(
        "{} {} ({})",
        "Health Check".bold(),
        config.project.name.cyan(),
        report_timestamp()
    );
    println!("{}", "─".repeat(60));

    for result in &report.results {
        let symbol = match result.status {
            CheckStatus::Pass => result.status.symbol().green(),
            CheckStatus::Fail => result.status.symbol().red(),
            CheckStatus::Partial => result.status.symbol().yellow(),
            CheckStatus::Skipped => result.status.symbol().dimmed(),
        };
        println!(
            "  {} {:<24} {}",
            symbol,
            result.name,
            truncate_string(&result.message, 72)
        );
    }

    println!("{}", "─".repeat(60));
    println!(
        "  Score: {}  Tier: {}  ({} of {} checks passed)",
        format!("{}/100", report.score).bold(),
        tier_colored(report.tier),
        report.passed_count(),
        report.results.len()
    );

    if detailed {
        let failures: Vec<_> = report.failed().collect();
        if !failures.is_empty() {
            println!();
            println!("{}", "Failures".bold());
            for failure in failures {
                println!("  {} {}", failure.name.red(), failure.message);
            }
        }
    }
    println!();

    let acceptable = config.environment.acceptable_score;
    if report.score >= acceptable {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} score {} is below the acceptable threshold {}",
            "warning:".yellow().bold(),
            report.score,
            acceptable
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn handle_status(config: &Config) -> Result<ExitCode> {
    let docker = docker_manager(config)?;

    println!();
    println!("{} {}", "Status".bold(), config.project.name.cyan());
    println!("{}", "─".repeat(60));

    let mut containers = vec![(
        "postgresql".to_string(),
        config.postgresql.container_name.clone(),
    )];
    for (section, odoo) in &config.odoo {
        containers.push((Config::odoo_label(section), odoo.container_name.clone()));
    }

    for (label, container) in &containers {
        let line = match docker.container_status(container).await {
            Ok(Some(status)) if status.state.is_running() => {
                format!("{} ({})", "running".green(), status.status)
            }
            Ok(Some(status)) => format!("{} ({})", "stopped".red(), status.status),
            Ok(None) => "not found".red().to_string(),
            Err(e) => format!("{} ({})", "unknown".yellow(), e),
        };
        println!("  {:<16} {:<24} {}", label, container, line);
    }

    let runner = HealthRunner::new(config, docker_manager(config)?);
    match runner.run(false, false).await {
        Ok(report) => {
            println!("{}", "─".repeat(60));
            println!(
                "  Health: {}/100 ({})",
                report.score,
                tier_colored(report.tier)
            );
        }
        Err(e) => println!("  Health: unavailable ({})", e),
    }
    println!();

    Ok(ExitCode::SUCCESS)
}

fn handle_info(config: &Config) -> Result<ExitCode> {
    println!();
    println!("{} {}", "Project".bold(), config.project.name.cyan());
    println!("{}", "─".repeat(60));
    println!("  Version:        {}", config.project.version);
    println!("  Workspace:      {}", config.project.workspace_root);
    println!("  Network:        {}", config.environment.docker_network);

    println!();
    println!("{}", "PostgreSQL".bold());
    println!(
        "  Host:           {}:{}",
        config.postgresql.host, config.postgresql.port
    );
    println!("  Database:       {}", config.postgresql.database);
    println!("  User:           {}", config.postgresql.user);
    println!(
        "  Password:       {}",
        mask_sensitive(&config.postgresql.password, 2)
    );
    println!("  Container:      {}", config.postgresql.container_name);

    for (section, odoo) in &config.odoo {
        println!();
        println!("{}", Config::odoo_label(section).bold());
        println!("  Container:      {}", odoo.container_name);
        println!("  Web:            {}", odoo.web_url);
        println!("  DB selector:    {}", odoo.database_selector_url);
    }
    println!();

    Ok(ExitCode::SUCCESS)
}

fn coming_soon(command: &str, description: &str) -> Result<ExitCode> {
    println!();
    println!(
        "{} '{}' is not implemented yet",
        "coming soon:".yellow().bold(),
        command
    );
    println!("  Planned: {}", description);
    println!("  Until then, use health-check, status and info.");
    println!();
    Ok(ExitCode::SUCCESS)
}

fn tier_colored(tier: Tier) -> colored::ColoredString {
    match tier {
        Tier::Excellent => tier.label().green().bold(),
        Tier::Good => tier.label().green(),
        Tier::Fair => tier.label().yellow(),
        Tier::Poor => tier.label().red().bold(),
    }
}

pub mod checks;
pub mod config;
pub mod docker;
pub mod health;

pub use checks::{CheckResult, CheckStatus};
pub use config::Config;
pub use docker::DockerManager;
pub use health::{HealthReport, HealthRunner, Tier};

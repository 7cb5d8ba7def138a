/// Health battery: an ordered, data-driven list of checks over the deployed
/// stack, a runner that executes it (optionally applying remediations), and
/// a weighted report with a score and a tier.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::checks::{self, CheckResult, CheckStatus};
use crate::core::config::Config;
use crate::core::docker::{DockerManager, RemedyOutcome};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("no check produced a scoreable result")]
    NothingScored,
}

/// What a single battery entry probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    DockerDaemon,
    ComposeNetwork,
    ContainerRunning { container: String },
    DatabaseReady,
    WebEndpoint { section: String },
    ContainerLink { from: String },
    HostPort { port: u16 },
}

/// The action `--fix` may take when a check fails. Remediations are
/// idempotent: creating a network that exists or starting a container that
/// runs is treated as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remedy {
    CreateNetwork,
    StartContainer { container: String },
}

#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub name: String,
    pub kind: CheckKind,
    pub remedy: Option<Remedy>,
}

/// Build the battery for a configuration, in the fixed execution order:
/// daemon, network, containers, database, web endpoints, links, ports.
/// `detailed` appends the informational host-port entries.
pub fn battery(config: &Config, detailed: bool) -> Vec<CheckSpec> {
    let mut specs = vec![
        CheckSpec {
            name: "docker_daemon".into(),
            kind: CheckKind::DockerDaemon,
            remedy: None,
        },
        CheckSpec {
            name: "docker_network".into(),
            kind: CheckKind::ComposeNetwork,
            remedy: Some(Remedy::CreateNetwork),
        },
    ];

    let pg_container = config.postgresql.container_name.clone();
    specs.push(CheckSpec {
        name: "postgres_container".into(),
        kind: CheckKind::ContainerRunning {
            container: pg_container.clone(),
        },
        remedy: Some(Remedy::StartContainer {
            container: pg_container.clone(),
        }),
    });
    for (section, odoo) in &config.odoo {
        specs.push(CheckSpec {
            name: format!("{}_container", section),
            kind: CheckKind::ContainerRunning {
                container: odoo.container_name.clone(),
            },
            remedy: Some(Remedy::StartContainer {
                container: odoo.container_name.clone(),
            }),
        });
    }

    specs.push(CheckSpec {
        name: "postgres_ready".into(),
        kind: CheckKind::DatabaseReady,
        remedy: None,
    });

    for section in config.odoo.keys() {
        specs.push(CheckSpec {
            name: format!("{}_web", section),
            kind: CheckKind::WebEndpoint {
                section: section.clone(),
            },
            remedy: None,
        });
    }

    for (section, odoo) in &config.odoo {
        specs.push(CheckSpec {
            name: format!("{}_to_postgres", section),
            kind: CheckKind::ContainerLink {
                from: odoo.container_name.clone(),
            },
            remedy: None,
        });
    }

    if detailed {
        for port in &config.environment.required_ports {
            specs.push(CheckSpec {
                name: format!("port_{}", port),
                kind: CheckKind::HostPort { port: *port },
                remedy: None,
            });
        }
    }

    specs
}

/// Aggregated battery outcome.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub results: Vec<CheckResult>,
    pub score: u32,
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Excellent => "EXCELLENT",
            Tier::Good => "GOOD",
            Tier::Fair => "FAIR",
            Tier::Poor => "POOR",
        }
    }
}

/// Score boundaries, inclusive at each floor.
#[derive(Debug, Clone, Copy)]
pub struct TierThresholds {
    pub excellent: u32,
    pub good: u32,
    pub fair: u32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            excellent: 90,
            good: 75,
            fair: 50,
        }
    }
}

impl TierThresholds {
    pub fn classify(&self, score: u32) -> Tier {
        if score >= self.excellent {
            Tier::Excellent
        } else if score >= self.good {
            Tier::Good
        } else if score >= self.fair {
            Tier::Fair
        } else {
            Tier::Poor
        }
    }
}

impl HealthReport {
    /// Score the battery. Skipped and zero-weight results carry no weight;
    /// a battery where nothing carried weight cannot be scored.
    pub fn from_results(
        results: Vec<CheckResult>,
        thresholds: TierThresholds,
    ) -> Result<Self, HealthError> {
        let mut total: u64 = 0;
        let mut earned: u64 = 0;
        for result in &results {
            if result.status == CheckStatus::Skipped {
                continue;
            }
            total += u64::from(result.weight);
            if result.passed() {
                earned += u64::from(result.weight);
            }
        }
        if total == 0 {
            return Err(HealthError::NothingScored);
        }

        // Integer division: the score is 100 exactly when every weighted
        // check passed, and 0 only when none did.
        let score = (100 * earned / total) as u32;
        Ok(Self {
            results,
            score,
            tier: thresholds.classify(score),
        })
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.results
            .iter()
            .filter(|r| r.status == CheckStatus::Fail)
    }
}

/// Seam between the battery loop and the machinery that touches the live
/// stack, so the loop's ordering and replacement rules are testable on
/// their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackProbe: Send + Sync {
    async fn execute(&self, spec: &CheckSpec) -> CheckResult;
    async fn apply_remedy(&self, remedy: &Remedy) -> anyhow::Result<RemedyOutcome>;
}

/// Run the battery to completion, then remediate.
///
/// The first pass always finishes before any remedy runs, so every result
/// records what the first pass observed. Afterwards, each `Fail` whose spec
/// names a remedy gets the remedy applied and that one check re-run; the
/// fresh result replaces the original in place while every other result
/// stays as recorded. A remedy that itself fails is logged and the original
/// failure stands.
pub async fn run_battery<P>(probe: &P, specs: &[CheckSpec], fix: bool) -> Vec<CheckResult>
where
    P: StackProbe + ?Sized,
{
    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        debug!(check = %spec.name, "running check");
        results.push(probe.execute(spec).await);
    }

    if fix {
        for (idx, spec) in specs.iter().enumerate() {
            if results[idx].status != CheckStatus::Fail {
                continue;
            }
            let Some(remedy) = &spec.remedy else {
                continue;
            };
            match probe.apply_remedy(remedy).await {
                Ok(outcome) => {
                    info!(check = %spec.name, ?outcome, "remedy applied, re-checking");
                    results[idx] = probe.execute(spec).await;
                }
                Err(e) => {
                    warn!(check = %spec.name, error = %e, "remedy failed");
                }
            }
        }
    }

    results
}

/// Executes a battery against the live stack.
pub struct HealthRunner<'a> {
    config: &'a Config,
    docker: DockerManager,
    web: reqwest::Client,
    op_timeout: Duration,
}

impl<'a> HealthRunner<'a> {
    pub fn new(config: &'a Config, docker: DockerManager) -> Self {
        let op_timeout = Duration::from_secs(config.environment.health_check_timeout);
        let web = checks::web_client(Duration::from_secs(
            config.environment.web_request_timeout,
        ));
        Self {
            config,
            docker,
            web,
            op_timeout,
        }
    }

    pub async fn run(&self, detailed: bool, fix: bool) -> Result<HealthReport, HealthError> {
        let specs = battery(self.config, detailed);
        let results = run_battery(self, &specs, fix).await;
        HealthReport::from_results(results, TierThresholds::default())
    }
}

#[async_trait]
impl StackProbe for HealthRunner<'_> {
    async fn execute(&self, spec: &CheckSpec) -> CheckResult {
        match &spec.kind {
            CheckKind::DockerDaemon => checks::docker_daemon(&spec.name, &self.docker).await,
            CheckKind::ComposeNetwork => {
                checks::compose_network(
                    &spec.name,
                    &self.docker,
                    &self.config.environment.docker_network,
                )
                .await
            }
            CheckKind::ContainerRunning { container } => {
                checks::container_running(&spec.name, &self.docker, container).await
            }
            CheckKind::DatabaseReady => {
                checks::database_ready(&spec.name, &self.config.postgresql, self.op_timeout).await
            }
            CheckKind::WebEndpoint { section } => match self.config.odoo.get(section) {
                Some(odoo) => checks::web_endpoint(&spec.name, &self.web, odoo).await,
                None => CheckResult::skipped(
                    &spec.name,
                    format!("No configuration for '{}'", section),
                ),
            },
            CheckKind::ContainerLink { from } => {
                checks::container_link(
                    &spec.name,
                    &self.docker,
                    from,
                    &self.config.postgresql.container_name,
                )
                .await
            }
            CheckKind::HostPort { port } => {
                checks::host_port(&spec.name, *port, self.op_timeout).await
            }
        }
    }

    async fn apply_remedy(&self, remedy: &Remedy) -> anyhow::Result<RemedyOutcome> {
        match remedy {
            Remedy::CreateNetwork => {
                self.docker
                    .create_network(&self.config.environment.docker_network)
                    .await
            }
            Remedy::StartContainer { container } => {
                self.docker.start_container(container).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::sample_config;

    fn thresholds() -> TierThresholds {
        TierThresholds::default()
    }

    #[test]
    fn all_passing_scores_one_hundred() {
        let results = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::pass("b", "ok"),
            CheckResult::pass("c", "ok"),
        ];
        let report = HealthReport::from_results(results, thresholds()).unwrap();
        assert_eq!(report.score, 100);
        assert_eq!(report.tier, Tier::Excellent);
    }

    #[test]
    fn any_failure_keeps_score_below_one_hundred() {
        let mut results = vec![CheckResult::fail("a", "down")];
        for i in 0..50 {
            results.push(CheckResult::pass(format!("p{}", i), "ok"));
        }
        let report = HealthReport::from_results(results, thresholds()).unwrap();
        assert!(report.score < 100);
    }

    #[test]
    fn half_passing_lands_on_fair_boundary() {
        let results = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::fail("b", "down"),
        ];
        let report = HealthReport::from_results(results, thresholds()).unwrap();
        assert_eq!(report.score, 50);
        assert_eq!(report.tier, Tier::Fair);
    }

    #[test]
    fn skipped_results_do_not_move_the_score() {
        let results = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::skipped("b", "exec unavailable"),
            CheckResult::skipped("c", "source down"),
        ];
        let report = HealthReport::from_results(results, thresholds()).unwrap();
        assert_eq!(report.score, 100);
    }

    #[test]
    fn informational_results_do_not_move_the_score() {
        let results = vec![
            CheckResult::pass("a", "ok"),
            CheckResult::partial("port_8069", "not bound").informational(),
        ];
        let report = HealthReport::from_results(results, thresholds()).unwrap();
        assert_eq!(report.score, 100);
    }

    #[test]
    fn all_skipped_battery_is_rejected() {
        let results = vec![
            CheckResult::skipped("a", "n/a"),
            CheckResult::skipped("b", "n/a"),
        ];
        let err = HealthReport::from_results(results, thresholds());
        assert!(matches!(err, Err(HealthError::NothingScored)));
    }

    #[test]
    fn tier_floors_are_inclusive() {
        let t = thresholds();
        assert_eq!(t.classify(100), Tier::Excellent);
        assert_eq!(t.classify(90), Tier::Excellent);
        assert_eq!(t.classify(89), Tier::Good);
        assert_eq!(t.classify(75), Tier::Good);
        assert_eq!(t.classify(74), Tier::Fair);
        assert_eq!(t.classify(50), Tier::Fair);
        assert_eq!(t.classify(49), Tier::Poor);
        assert_eq!(t.classify(0), Tier::Poor);
    }

    #[test]
    fn battery_order_is_stable() {
        let config = sample_config();
        let specs = battery(&config, true);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names[0], "docker_daemon");
        assert_eq!(names[1], "docker_network");
        assert_eq!(names[2], "postgres_container");
        // Container checks for every odoo section precede the database probe.
        let db_pos = names.iter().position(|n| *n == "postgres_ready").unwrap();
        let web_pos = names.iter().position(|n| n.ends_with("_web")).unwrap();
        assert!(db_pos < web_pos);
        assert!(names.iter().any(|n| n.starts_with("port_")));
    }

    #[test]
    fn basic_battery_omits_port_probes_but_keeps_links() {
        let config = sample_config();
        let specs = battery(&config, false);
        assert!(specs.iter().all(|s| !s.name.starts_with("port_")));
        assert!(specs.iter().any(|s| s.name.ends_with("_to_postgres")));
    }

    fn network_spec() -> CheckSpec {
        CheckSpec {
            name: "docker_network".into(),
            kind: CheckKind::ComposeNetwork,
            remedy: Some(Remedy::CreateNetwork),
        }
    }

    fn db_spec() -> CheckSpec {
        CheckSpec {
            name: "postgres_ready".into(),
            kind: CheckKind::DatabaseReady,
            remedy: None,
        }
    }

    #[tokio::test]
    async fn fix_runs_only_after_the_full_first_pass() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let specs = vec![network_spec(), db_spec()];

        // Both checks would pass once the network exists, so a runner that
        // remediated inline would record two passes; the battery must keep
        // the db check's first-pass failure since it has no remedy.
        let fixed = Arc::new(AtomicBool::new(false));
        let mut probe = MockStackProbe::new();
        {
            let fixed = fixed.clone();
            probe.expect_execute().returning(move |spec| {
                let healthy = fixed.load(Ordering::SeqCst);
                match (spec.name.as_str(), healthy) {
                    ("docker_network", true) => CheckResult::pass("docker_network", "exists"),
                    ("docker_network", false) => CheckResult::fail("docker_network", "missing"),
                    (_, true) => CheckResult::pass("postgres_ready", "accepting connections"),
                    (_, false) => CheckResult::fail("postgres_ready", "connection refused"),
                }
            });
        }
        {
            let fixed = fixed.clone();
            probe.expect_apply_remedy().times(1).returning(move |_| {
                fixed.store(true, Ordering::SeqCst);
                Ok(RemedyOutcome::Applied)
            });
        }

        let results = run_battery(&probe, &specs, true).await;
        assert_eq!(results[0].status, CheckStatus::Pass);
        assert_eq!(results[1].status, CheckStatus::Fail);
        assert_eq!(results[1].message, "connection refused");
    }

    #[tokio::test]
    async fn remedied_check_is_rerun_and_replaced_in_place() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let specs = vec![network_spec(), db_spec()];

        let network_runs = Arc::new(AtomicUsize::new(0));
        let mut probe = MockStackProbe::new();
        {
            let network_runs = network_runs.clone();
            probe.expect_execute().returning(move |spec| {
                if spec.name == "docker_network" {
                    if network_runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        CheckResult::fail("docker_network", "missing")
                    } else {
                        CheckResult::pass("docker_network", "created")
                    }
                } else {
                    CheckResult::pass("postgres_ready", "accepting connections")
                }
            });
        }
        probe
            .expect_apply_remedy()
            .times(1)
            .returning(|_| Ok(RemedyOutcome::Applied));

        let results = run_battery(&probe, &specs, true).await;
        assert_eq!(network_runs.load(Ordering::SeqCst), 2);
        assert_eq!(results[0].status, CheckStatus::Pass);
        assert_eq!(results[0].message, "created");
        assert_eq!(results[1].message, "accepting connections");
    }

    #[tokio::test]
    async fn failed_remedy_leaves_the_original_result() {
        let specs = vec![network_spec()];

        let mut probe = MockStackProbe::new();
        probe
            .expect_execute()
            .times(1)
            .returning(|_| CheckResult::fail("docker_network", "missing"));
        probe
            .expect_apply_remedy()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("daemon refused the request")));

        let results = run_battery(&probe, &specs, true).await;
        assert_eq!(results[0].status, CheckStatus::Fail);
        assert_eq!(results[0].message, "missing");
    }

    #[tokio::test]
    async fn remedies_are_not_applied_without_fix() {
        let specs = vec![network_spec()];

        let mut probe = MockStackProbe::new();
        probe
            .expect_execute()
            .times(1)
            .returning(|_| CheckResult::fail("docker_network", "missing"));
        probe.expect_apply_remedy().times(0);

        let results = run_battery(&probe, &specs, false).await;
        assert_eq!(results[0].status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn passing_checks_are_never_remediated() {
        let specs = vec![network_spec()];

        let mut probe = MockStackProbe::new();
        probe
            .expect_execute()
            .times(1)
            .returning(|_| CheckResult::pass("docker_network", "exists"));
        probe.expect_apply_remedy().times(0);

        let results = run_battery(&probe, &specs, true).await;
        assert_eq!(results[0].status, CheckStatus::Pass);
    }

    #[test]
    fn remediable_checks_carry_a_remedy() {
        let config = sample_config();
        let specs = battery(&config, false);
        let network = specs.iter().find(|s| s.name == "docker_network").unwrap();
        assert_eq!(network.remedy, Some(Remedy::CreateNetwork));
        let daemon = specs.iter().find(|s| s.name == "docker_daemon").unwrap();
        assert!(daemon.remedy.is_none());
    }
}

/// Check primitives for the environment health battery
///
/// Each primitive answers one question about one resource and returns a
/// `CheckResult`. Expected failures (container absent, port closed, refused
/// connection, timeout) are encoded as `CheckStatus::Fail` with a message;
/// nothing here returns `Err` for an unhealthy target, because the
/// aggregator must get through the whole battery no matter what it finds.

use reqwest::redirect::Policy;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core::config::{OdooConfig, PostgresConfig};
use crate::core::docker::{DockerManager, LinkProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Partial,
    Skipped,
}

impl CheckStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "✓",
            CheckStatus::Fail => "✗",
            CheckStatus::Partial => "~",
            CheckStatus::Skipped => "-",
        }
    }
}

/// One record per executed check. Never mutated after creation; the fix path
/// replaces a result wholesale rather than editing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub weight: u32,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Pass, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Fail, message)
    }

    pub fn partial(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Partial, message)
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Skipped, message)
    }

    fn with_status(
        name: impl Into<String>,
        status: CheckStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            weight: 1,
        }
    }

    /// Informational checks never move the score.
    pub fn informational(mut self) -> Self {
        self.weight = 0;
        self
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// Docker daemon reachable.
pub async fn docker_daemon(name: &str, docker: &DockerManager) -> CheckResult {
    match docker.daemon_version().await {
        Ok(version) => CheckResult::pass(name, format!("Docker daemon v{}", version)),
        Err(e) => CheckResult::fail(name, format!("Docker daemon not reachable: {}", e)),
    }
}

/// Compose network exists.
pub async fn compose_network(name: &str, docker: &DockerManager, network: &str) -> CheckResult {
    match docker.network_exists(network).await {
        Ok(true) => CheckResult::pass(name, format!("Network '{}' exists", network)),
        Ok(false) => CheckResult::fail(name, format!("Network '{}' not found", network)),
        Err(e) => CheckResult::fail(name, format!("Network lookup failed: {}", e)),
    }
}

/// Named container exists and is in a running state.
pub async fn container_running(name: &str, docker: &DockerManager, container: &str) -> CheckResult {
    match docker.container_status(container).await {
        Ok(Some(status)) if status.state.is_running() => CheckResult::pass(
            name,
            format!("Container '{}' running ({})", container, status.status),
        ),
        Ok(Some(status)) => CheckResult::fail(
            name,
            format!("Container '{}' not running ({})", container, status.status),
        ),
        Ok(None) => CheckResult::fail(name, format!("Container '{}' not found", container)),
        Err(e) => CheckResult::fail(name, format!("Container lookup failed: {}", e)),
    }
}

/// PostgreSQL accepts a connection with the configured credentials.
pub async fn database_ready(name: &str, pg: &PostgresConfig, op_timeout: Duration) -> CheckResult {
    let url = pg.url();
    let probe = async {
        let mut conn = PgConnection::connect(&url).await?;
        sqlx::query("SELECT 1").fetch_one(&mut conn).await?;
        conn.close().await?;
        Ok::<(), sqlx::Error>(())
    };

    match timeout(op_timeout, probe).await {
        Ok(Ok(())) => CheckResult::pass(
            name,
            format!("PostgreSQL accepting connections at {}:{}", pg.host, pg.port),
        ),
        Ok(Err(e)) => CheckResult::fail(name, format!("PostgreSQL connection failed: {}", e)),
        Err(_) => CheckResult::fail(
            name,
            format!("PostgreSQL connection timed out after {:?}", op_timeout),
        ),
    }
}

/// Odoo web port answers an HTTP GET; 2xx and 3xx both count as reachable.
pub async fn web_endpoint(
    name: &str,
    client: &reqwest::Client,
    odoo: &OdooConfig,
) -> CheckResult {
    let url = &odoo.database_selector_url;
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() || status.is_redirection() {
                CheckResult::pass(name, format!("HTTP {} from {}", status.as_u16(), url))
            } else {
                CheckResult::fail(name, format!("HTTP {} from {}", status.as_u16(), url))
            }
        }
        Err(e) if e.is_timeout() => {
            CheckResult::fail(name, format!("Request to {} timed out", url))
        }
        Err(e) => CheckResult::fail(name, format!("Request to {} failed: {}", url, e)),
    }
}

/// Build the probe client used by `web_endpoint`. Redirects are not followed
/// so a 3xx stays visible as a reachable response.
pub fn web_client(op_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(op_timeout)
        .redirect(Policy::none())
        .build()
        .unwrap_or_default()
}

/// Container-to-container reachability, best effort. Skipped rather than
/// failed when the source container is down or exec is unavailable.
pub async fn container_link(
    name: &str,
    docker: &DockerManager,
    from: &str,
    to: &str,
) -> CheckResult {
    let from_running = matches!(
        docker.container_status(from).await,
        Ok(Some(status)) if status.state.is_running()
    );
    if !from_running {
        return CheckResult::skipped(name, format!("Source container '{}' not running", from));
    }

    match docker.exec_ping(from, to).await {
        LinkProbe::Reachable => {
            CheckResult::pass(name, format!("{} -> {} reachable", from, to))
        }
        LinkProbe::Unreachable => {
            CheckResult::fail(name, format!("{} -> {} unreachable", from, to))
        }
        LinkProbe::Unavailable => {
            CheckResult::skipped(name, "docker exec unavailable on this host".to_string())
        }
    }
}

/// Whether a TCP port on the host accepts connections.
pub async fn probe_port(host: &str, port: u16, op_timeout: Duration) -> bool {
    matches!(
        timeout(op_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Host-port probe, informational only: the stack's ports being bound is the
/// expected state, an unbound port is worth a look but not a failure.
pub async fn host_port(name: &str, port: u16, op_timeout: Duration) -> CheckResult {
    if probe_port("127.0.0.1", port, op_timeout).await {
        CheckResult::pass(name, format!("Port {} bound (expected)", port)).informational()
    } else {
        CheckResult::partial(name, format!("Port {} not bound", port)).informational()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_port_detects_bound_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe_port("127.0.0.1", port, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn probe_port_reports_unbound_port() {
        // Bind and immediately drop to get a port that is very likely free.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!probe_port("127.0.0.1", port, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn host_port_results_are_informational() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bound = host_port("port", port, Duration::from_secs(1)).await;
        assert_eq!(bound.status, CheckStatus::Pass);
        assert_eq!(bound.weight, 0);

        drop(listener);
        let unbound = host_port("port", port, Duration::from_millis(500)).await;
        assert_eq!(unbound.status, CheckStatus::Partial);
        assert_eq!(unbound.weight, 0);
    }

    #[tokio::test]
    async fn web_endpoint_accepts_2xx() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        let odoo = OdooConfig {
            container_name: "odoo_v16".into(),
            web_port: port,
            web_url: format!("http://127.0.0.1:{}", port),
            database_selector_url: format!("http://127.0.0.1:{}/web/database/selector", port),
        };
        let client = web_client(Duration::from_secs(2));

        let result = web_endpoint("odoo_v16_web", &client, &odoo).await;
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.message.contains("HTTP 200"));
    }

    #[tokio::test]
    async fn web_endpoint_fails_on_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let odoo = OdooConfig {
            container_name: "odoo_v15".into(),
            web_port: port,
            web_url: format!("http://127.0.0.1:{}", port),
            database_selector_url: format!("http://127.0.0.1:{}/web/database/selector", port),
        };
        let client = web_client(Duration::from_secs(1));

        let result = web_endpoint("odoo_v15_web", &client, &odoo).await;
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[test]
    fn informational_zeroes_the_weight() {
        let result = CheckResult::pass("ports", "ok").informational();
        assert_eq!(result.weight, 0);
        assert!(result.passed());
    }
}

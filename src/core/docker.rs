/// Docker daemon integration
///
/// Wraps the bollard client for daemon API calls and shells out to the
/// `docker` binary for container exec, mirroring how the stack is driven
/// operationally. Expected failures (missing container, stopped daemon)
/// surface as values, not errors, so the health battery can keep going.

use anyhow::{Context, Result};
use bollard::container::StartContainerOptions;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;

use crate::utils::ContainerState;

/// Outcome of an idempotent remediation action against the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemedyOutcome {
    Applied,
    AlreadySatisfied,
}

/// Outcome of a container-to-container reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProbe {
    Reachable,
    Unreachable,
    /// The probe could not run at all (no `docker` binary, exec unsupported).
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub state: ContainerState,
    pub status: String,
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
    op_timeout: Duration,
}

impl DockerManager {
    pub fn new(op_timeout: Duration) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;

        Ok(Self { docker, op_timeout })
    }

    /// Ping the daemon and report its version.
    pub async fn daemon_version(&self) -> Result<String> {
        timeout(self.op_timeout, self.docker.ping())
            .await
            .context("Docker daemon ping timed out")??;

        let version = timeout(self.op_timeout, self.docker.version())
            .await
            .context("Docker version query timed out")??;

        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    /// Whether a network with exactly the given name exists.
    pub async fn network_exists(&self, name: &str) -> Result<bool> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![name]);

        let networks = timeout(
            self.op_timeout,
            self.docker.list_networks(Some(ListNetworksOptions { filters })),
        )
        .await
        .context("Docker network listing timed out")??;

        // The name filter does substring matching; require an exact hit.
        Ok(networks
            .iter()
            .any(|n| n.name.as_deref() == Some(name)))
    }

    /// Create a network. Creating a network that already exists is success.
    pub async fn create_network(&self, name: &str) -> Result<RemedyOutcome> {
        let options = CreateNetworkOptions {
            name,
            ..Default::default()
        };

        match timeout(self.op_timeout, self.docker.create_network(options))
            .await
            .context("Docker network creation timed out")?
        {
            Ok(_) => Ok(RemedyOutcome::Applied),
            Err(e) if is_benign_daemon_conflict(&e) => Ok(RemedyOutcome::AlreadySatisfied),
            Err(e) => Err(e.into()),
        }
    }

    /// Inspect one container; `None` when no container with that name exists.
    pub async fn container_status(&self, name: &str) -> Result<Option<ContainerStatus>> {
        let inspect = timeout(self.op_timeout, self.docker.inspect_container(name, None))
            .await
            .context("Docker container inspect timed out")?;

        match inspect {
            Ok(details) => {
                let status = details
                    .state
                    .as_ref()
                    .and_then(|s| s.status.as_ref())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Ok(Some(ContainerStatus {
                    state: ContainerState::from(status.as_str()),
                    status,
                }))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Start a container. Starting an already-running container is success.
    pub async fn start_container(&self, name: &str) -> Result<RemedyOutcome> {
        match timeout(
            self.op_timeout,
            self.docker
                .start_container(name, None::<StartContainerOptions<String>>),
        )
        .await
        .context("Docker container start timed out")?
        {
            Ok(()) => Ok(RemedyOutcome::Applied),
            Err(e) if is_benign_daemon_conflict(&e) => Ok(RemedyOutcome::AlreadySatisfied),
            Err(e) => Err(e.into()),
        }
    }

    /// Probe container-to-container reachability with a single ICMP ping
    /// executed inside the source container.
    pub async fn exec_ping(&self, from: &str, to: &str) -> LinkProbe {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.args(["exec", from, "ping", "-c", "1", "-W", "2", to]);
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(_) => return LinkProbe::Unavailable,
        };

        match timeout(self.op_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => LinkProbe::Reachable,
            Ok(_) => LinkProbe::Unreachable,
            Err(_) => LinkProbe::Unreachable,
        }
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}

/// "Already exists" (409) and "not modified" (304) daemon responses mean the
/// resource is already in the desired state; remediation treats both as
/// success so re-running a fix stays idempotent.
fn is_benign_daemon_conflict(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304 | 409,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_statuses_are_benign() {
        let already_exists = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "network with name odoo_net already exists".into(),
        };
        let not_modified = bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            message: "container already started".into(),
        };
        let server_error = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "daemon error".into(),
        };

        assert!(is_benign_daemon_conflict(&already_exists));
        assert!(is_benign_daemon_conflict(&not_modified));
        assert!(!is_benign_daemon_conflict(&server_error));
    }

    #[test]
    fn missing_container_is_not_found() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: odoo_v15".into(),
        };
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn manager_creation() {
        // Requires a reachable Docker socket; skipped silently otherwise.
        if let Ok(manager) = DockerManager::new(Duration::from_secs(2)) {
            let _ = manager.daemon_version().await;
        }
    }
}

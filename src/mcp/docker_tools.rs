/// Docker tool set: shells out to the `docker` CLI with every resource name
/// validated and every exec command vetted against an allow list and a
/// deny list before anything is spawned.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::checks::probe_port;
use crate::mcp::args::{opt_bool, opt_str, opt_u64, require_str, require_u64};
use crate::mcp::{ToolDescriptor, ToolError, ToolSet};

const MAX_LOG_TAIL: u64 = 10_000;
const MAX_SCAN_RANGE: u64 = 100;

/// Binaries a vetted exec may invoke inside a container.
const SAFE_COMMANDS: &[&str] = &[
    "bash", "sh", "ls", "pwd", "whoami", "ps", "top", "cat", "tail", "head", "grep", "find",
    "du", "df", "env", "uname", "id",
];

/// Tokens that disqualify an exec command outright.
const DENY_TOKENS: &[&str] = &[
    "rm", "sudo", "su", "chmod", "chown", "mv", "cp", "dd", "mkfs", "wget", "curl", "nc",
    "ncat", "ssh", "kill", "killall", "reboot", "shutdown", "mount", "umount",
];

/// Substrings that disqualify an exec command (shell control operators).
const DENY_SEQUENCES: &[&str] = &["&&", "||", ";", "|", "`", "$(", ">", "<", "&", "\n"];

const VALID_PRUNE_KINDS: &[&str] = &["system", "container", "image", "volume", "network"];

pub struct DockerTools {
    name_re: Regex,
    path_re: Regex,
}

impl Default for DockerTools {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerTools {
    pub fn new() -> Self {
        // Container and image references: leading alphanumeric, then the
        // Docker reference charset, with an optional tag.
        let name_re = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_./-]*(?::[a-zA-Z0-9._-]+)?$")
            .expect("container name pattern is valid");
        // Build contexts and Dockerfiles: plain paths, no leading dash so
        // they cannot be read as flags.
        let path_re = Regex::new(r"^[A-Za-z0-9_./][A-Za-z0-9_./-]*$")
            .expect("build path pattern is valid");
        Self { name_re, path_re }
    }

    fn vet_name(&self, key: &str, value: &str) -> Result<(), ToolError> {
        if self.name_re.is_match(value) {
            Ok(())
        } else {
            Err(ToolError::bad_argument(
                key,
                format!("'{}' is not a valid Docker resource name", value),
            ))
        }
    }

    /// Build paths stay inside the working tree: valid charset, no leading
    /// dash, no upward traversal.
    fn vet_build_path(&self, key: &str, path: &str) -> Result<(), ToolError> {
        if !self.path_re.is_match(path) {
            return Err(ToolError::bad_argument(
                key,
                format!("'{}' is not a valid build path", path),
            ));
        }
        if path.split('/').any(|component| component == "..") {
            return Err(ToolError::Rejected(
                "build path may not traverse upward".to_string(),
            ));
        }
        Ok(())
    }

    /// Accept only commands whose first token is allow-listed and which
    /// contain no denied token or shell control sequence.
    fn vet_exec(&self, command: &str) -> Result<(), ToolError> {
        for seq in DENY_SEQUENCES {
            if command.contains(seq) {
                return Err(ToolError::Rejected(format!(
                    "command contains forbidden sequence '{}'",
                    seq.escape_default()
                )));
            }
        }

        let mut tokens = command.split_whitespace();
        let first = tokens
            .next()
            .ok_or_else(|| ToolError::bad_argument("command", "must not be empty"))?;
        if !SAFE_COMMANDS.contains(&first) {
            return Err(ToolError::Rejected(format!(
                "'{}' is not an allowed command",
                first
            )));
        }
        for token in std::iter::once(first).chain(tokens) {
            if DENY_TOKENS.contains(&token) {
                return Err(ToolError::Rejected(format!(
                    "command references forbidden program '{}'",
                    token
                )));
            }
        }
        Ok(())
    }

    async fn docker(&self, args: &[&str], limit: Duration) -> Result<Value, ToolError> {
        debug!(?args, "docker invocation");
        let child = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match timeout(limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::Failed(format!("docker not runnable: {}", e))),
            Err(_) => {
                return Err(ToolError::Failed(format!(
                    "docker {} timed out after {:?}",
                    args.first().unwrap_or(&""),
                    limit
                )))
            }
        };

        Ok(json!({
            "success": output.status.success(),
            "exit_code": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout).trim_end(),
            "stderr": String::from_utf8_lossy(&output.stderr).trim_end(),
        }))
    }

    async fn lifecycle(&self, verb: &str, args: &Value) -> Result<Value, ToolError> {
        let container = require_str(args, "container")?;
        self.vet_name("container", container)?;
        self.docker(&[verb, container], Duration::from_secs(60)).await
    }

    async fn port_check(&self, args: &Value) -> Result<Value, ToolError> {
        let port = bounded_port("port", require_u64(args, "port")?)?;
        let open = probe_port("127.0.0.1", port, Duration::from_secs(2)).await;
        Ok(json!({ "port": port, "open": open }))
    }

    async fn port_scan(&self, args: &Value) -> Result<Value, ToolError> {
        let start = bounded_port("start_port", require_u64(args, "start_port")?)?;
        let end = bounded_port("end_port", require_u64(args, "end_port")?)?;
        if end < start {
            return Err(ToolError::bad_argument(
                "end_port",
                "must not be below start_port",
            ));
        }
        if u64::from(end - start) + 1 > MAX_SCAN_RANGE {
            return Err(ToolError::bad_argument(
                "end_port",
                format!("scan range is limited to {} ports", MAX_SCAN_RANGE),
            ));
        }

        let mut open = Vec::new();
        for port in start..=end {
            if probe_port("127.0.0.1", port, Duration::from_millis(500)).await {
                open.push(port);
            }
        }
        Ok(json!({ "start": start, "end": end, "open_ports": open }))
    }

    async fn prune(&self, args: &Value) -> Result<Value, ToolError> {
        let kind = require_str(args, "kind")?;
        if !VALID_PRUNE_KINDS.contains(&kind) {
            return Err(ToolError::bad_argument(
                "kind",
                format!("must be one of {}", VALID_PRUNE_KINDS.join(", ")),
            ));
        }
        let mut cli_args = vec![kind, "prune", "-f"];
        if kind == "system" {
            cli_args = vec!["system", "prune", "-f"];
        }
        self.docker(&cli_args, Duration::from_secs(120)).await
    }

    async fn build(&self, args: &Value) -> Result<Value, ToolError> {
        let context = require_str(args, "context")?;
        self.vet_build_path("context", context)?;

        let mut cli_args = vec!["build"];
        if let Some(tag) = opt_str(args, "tag")? {
            self.vet_name("tag", tag)?;
            cli_args.push("-t");
            cli_args.push(tag);
        }
        if let Some(dockerfile) = opt_str(args, "dockerfile")? {
            self.vet_build_path("dockerfile", dockerfile)?;
            cli_args.push("-f");
            cli_args.push(dockerfile);
        }
        cli_args.push(context);
        self.docker(&cli_args, Duration::from_secs(300)).await
    }

    async fn remove(&self, args: &Value) -> Result<Value, ToolError> {
        let container = require_str(args, "container")?;
        self.vet_name("container", container)?;
        let mut cli_args = vec!["rm"];
        if opt_bool(args, "force", false)? {
            cli_args.push("-f");
        }
        cli_args.push(container);
        self.docker(&cli_args, Duration::from_secs(60)).await
    }

    async fn compose(&self, verb: &[&str], args: &Value) -> Result<Value, ToolError> {
        let mut cli_args = vec!["compose"];
        if let Some(file) = opt_str(args, "compose_file")? {
            self.vet_name("compose_file", file)?;
            cli_args.push("-f");
            cli_args.push(file);
        }
        cli_args.extend_from_slice(verb);
        self.docker(&cli_args, Duration::from_secs(120)).await
    }
}

fn bounded_port(key: &str, raw: u64) -> Result<u16, ToolError> {
    if (1..=65_535).contains(&raw) {
        Ok(raw as u16)
    } else {
        Err(ToolError::bad_argument(key, "must be between 1 and 65535"))
    }
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[async_trait]
impl ToolSet for DockerTools {
    fn server_name(&self) -> &'static str {
        "docker-mcp"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        let container = json!({"container": {"type": "string", "description": "Container name"}});
        vec![
            ToolDescriptor {
                name: "docker_list",
                description: "List containers; set all=true to include stopped ones",
                input_schema: schema(json!({"all": {"type": "boolean"}}), &[]),
            },
            ToolDescriptor {
                name: "docker_start",
                description: "Start a stopped container",
                input_schema: schema(container.clone(), &["container"]),
            },
            ToolDescriptor {
                name: "docker_stop",
                description: "Stop a running container",
                input_schema: schema(container.clone(), &["container"]),
            },
            ToolDescriptor {
                name: "docker_restart",
                description: "Restart a container",
                input_schema: schema(container.clone(), &["container"]),
            },
            ToolDescriptor {
                name: "docker_logs",
                description: "Fetch recent container logs (tail capped at 10000 lines)",
                input_schema: schema(
                    json!({
                        "container": {"type": "string"},
                        "tail": {"type": "integer", "minimum": 0, "maximum": 10000},
                    }),
                    &["container"],
                ),
            },
            ToolDescriptor {
                name: "docker_inspect",
                description: "Inspect a container or image",
                input_schema: schema(container.clone(), &["container"]),
            },
            ToolDescriptor {
                name: "docker_exec",
                description: "Run an allow-listed read-only command inside a container",
                input_schema: schema(
                    json!({
                        "container": {"type": "string"},
                        "command": {"type": "string"},
                    }),
                    &["container", "command"],
                ),
            },
            ToolDescriptor {
                name: "docker_images",
                description: "List local images",
                input_schema: schema(json!({}), &[]),
            },
            ToolDescriptor {
                name: "docker_networks",
                description: "List Docker networks",
                input_schema: schema(json!({}), &[]),
            },
            ToolDescriptor {
                name: "docker_volumes",
                description: "List Docker volumes",
                input_schema: schema(json!({}), &[]),
            },
            ToolDescriptor {
                name: "docker_build",
                description: "Build an image from a local context (no upward path traversal)",
                input_schema: schema(
                    json!({
                        "context": {"type": "string"},
                        "tag": {"type": "string"},
                        "dockerfile": {"type": "string"},
                    }),
                    &["context"],
                ),
            },
            ToolDescriptor {
                name: "docker_pull",
                description: "Pull an image from a registry",
                input_schema: schema(json!({"image": {"type": "string"}}), &["image"]),
            },
            ToolDescriptor {
                name: "docker_stats",
                description: "One-shot resource usage snapshot of running containers",
                input_schema: schema(json!({}), &[]),
            },
            ToolDescriptor {
                name: "docker_remove",
                description: "Remove a container (force=true removes a running one)",
                input_schema: schema(
                    json!({
                        "container": {"type": "string"},
                        "force": {"type": "boolean"},
                    }),
                    &["container"],
                ),
            },
            ToolDescriptor {
                name: "docker_ports",
                description: "Show the port mappings of a container",
                input_schema: schema(container.clone(), &["container"]),
            },
            ToolDescriptor {
                name: "docker_port_check",
                description: "Check whether a single host port accepts connections",
                input_schema: schema(json!({"port": {"type": "integer"}}), &["port"]),
            },
            ToolDescriptor {
                name: "docker_port_scan",
                description: "Scan a host port range (at most 100 ports)",
                input_schema: schema(
                    json!({
                        "start_port": {"type": "integer"},
                        "end_port": {"type": "integer"},
                    }),
                    &["start_port", "end_port"],
                ),
            },
            ToolDescriptor {
                name: "docker_prune",
                description: "Prune unused resources (system, container, image, volume, network)",
                input_schema: schema(json!({"kind": {"type": "string"}}), &["kind"]),
            },
            ToolDescriptor {
                name: "compose_up",
                description: "Bring the compose stack up in detached mode",
                input_schema: schema(json!({"compose_file": {"type": "string"}}), &[]),
            },
            ToolDescriptor {
                name: "compose_down",
                description: "Stop and remove the compose stack",
                input_schema: schema(json!({"compose_file": {"type": "string"}}), &[]),
            },
            ToolDescriptor {
                name: "compose_logs",
                description: "Fetch recent logs from the compose stack",
                input_schema: schema(json!({"compose_file": {"type": "string"}}), &[]),
            },
        ]
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        match name {
            "docker_list" => {
                let mut args = vec!["ps", "--format", "{{json .}}"];
                if opt_bool(arguments, "all", false)? {
                    args.push("-a");
                }
                self.docker(&args, Duration::from_secs(30)).await
            }
            "docker_start" => self.lifecycle("start", arguments).await,
            "docker_stop" => self.lifecycle("stop", arguments).await,
            "docker_restart" => self.lifecycle("restart", arguments).await,
            "docker_logs" => {
                let container = require_str(arguments, "container")?;
                self.vet_name("container", container)?;
                let tail = opt_u64(arguments, "tail", 100)?;
                if tail > MAX_LOG_TAIL {
                    return Err(ToolError::bad_argument(
                        "tail",
                        format!("must be at most {}", MAX_LOG_TAIL),
                    ));
                }
                let tail = tail.to_string();
                self.docker(
                    &["logs", "--tail", &tail, container],
                    Duration::from_secs(30),
                )
                .await
            }
            "docker_inspect" => {
                let container = require_str(arguments, "container")?;
                self.vet_name("container", container)?;
                self.docker(&["inspect", container], Duration::from_secs(30))
                    .await
            }
            "docker_exec" => {
                let container = require_str(arguments, "container")?;
                self.vet_name("container", container)?;
                let command = require_str(arguments, "command")?;
                self.vet_exec(command)?;
                let mut args = vec!["exec", container, "sh", "-c"];
                args.push(command);
                self.docker(&args, Duration::from_secs(60)).await
            }
            "docker_images" => {
                self.docker(
                    &["images", "--format", "{{json .}}"],
                    Duration::from_secs(30),
                )
                .await
            }
            "docker_networks" => {
                self.docker(
                    &["network", "ls", "--format", "{{json .}}"],
                    Duration::from_secs(30),
                )
                .await
            }
            "docker_volumes" => {
                self.docker(
                    &["volume", "ls", "--format", "{{json .}}"],
                    Duration::from_secs(30),
                )
                .await
            }
            "docker_build" => self.build(arguments).await,
            "docker_pull" => {
                let image = require_str(arguments, "image")?;
                self.vet_name("image", image)?;
                self.docker(&["pull", image], Duration::from_secs(300)).await
            }
            "docker_stats" => {
                self.docker(
                    &["stats", "--no-stream", "--format", "{{json .}}"],
                    Duration::from_secs(30),
                )
                .await
            }
            "docker_remove" => self.remove(arguments).await,
            "docker_ports" => {
                let container = require_str(arguments, "container")?;
                self.vet_name("container", container)?;
                self.docker(&["port", container], Duration::from_secs(30))
                    .await
            }
            "docker_port_check" => self.port_check(arguments).await,
            "docker_port_scan" => self.port_scan(arguments).await,
            "docker_prune" => self.prune(arguments).await,
            "compose_up" => self.compose(&["up", "-d"], arguments).await,
            "compose_down" => self.compose(&["down"], arguments).await,
            "compose_logs" => {
                self.compose(&["logs", "--tail", "100"], arguments).await
            }
            other => Err(self.unknown_tool(other)),
        }
    }
}

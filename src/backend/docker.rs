//! Docker backend
//!
//! Answers backend queries by running the docker CLI. Containers are looked up
//! by exact name (see `backend.container_name_template`), so both plain
//! `docker run --name` fleets and compose projects can be verified.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::instrument;

use crate::config::BackendConfig;
use crate::registry::ServiceName;

use super::{Backend, BackendError, InstanceHandle};

/// Subset of `docker inspect` output the verifier reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    state: ContainerState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    status: String,
    exit_code: i64,
    #[serde(rename = "OOMKilled", default)]
    oom_killed: bool,
}

/// Captured output of a finished docker invocation
struct CommandOutput {
    stdout: String,
    stderr: String,
}

/// Backend that shells out to the docker CLI
#[derive(Debug, Clone)]
pub struct DockerBackend {
    config: BackendConfig,
}

impl DockerBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Run docker with the given arguments and collect its output.
    ///
    /// A non-zero exit status becomes `BackendError::Command`.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, BackendError> {
        let output = Command::new(&self.config.docker_binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(BackendError::Command {
                command: format!("{} {}", self.config.docker_binary, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Anchored name filter so `api` does not also match `api-gateway`.
///
/// Docker treats the filter value as a regex, so the name is escaped.
fn name_filter(container: &str) -> String {
    format!("name=^/{}$", regex::escape(container))
}

/// First container ID in `docker ps --format {{.ID}}` output
fn parse_container_id(stdout: &str) -> Option<InstanceHandle> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|id| InstanceHandle(id.to_string()))
}

fn parse_inspect(stdout: &str) -> Result<ContainerState, BackendError> {
    let entries: Vec<InspectEntry> =
        serde_json::from_str(stdout).map_err(|e| BackendError::Parse(e.to_string()))?;
    entries
        .into_iter()
        .next()
        .map(|entry| entry.state)
        .ok_or_else(|| BackendError::Parse("docker inspect returned no entries".into()))
}

/// Join container stdout and stderr into one log text
fn join_streams(stdout: String, stderr: String) -> String {
    if stderr.is_empty() {
        return stdout;
    }
    if stdout.is_empty() {
        return stderr;
    }
    let mut text = stdout;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&stderr);
    text
}

#[async_trait]
impl Backend for DockerBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        match self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(output) => {
                tracing::debug!(server_version = %output.stdout.trim(), "Docker daemon reachable");
                Ok(())
            }
            Err(e) => Err(BackendError::Unavailable(e.to_string())),
        }
    }

    #[instrument(name = "docker.resolve_instance", skip(self), fields(container))]
    async fn resolve_instance(
        &self,
        service: &ServiceName,
    ) -> Result<Option<InstanceHandle>, BackendError> {
        let container = self.config.container_name(service.as_str());
        tracing::Span::current().record("container", container.as_str());

        let filter = name_filter(&container);
        let output = self
            .run(&["ps", "-a", "--no-trunc", "--filter", filter.as_str(), "--format", "{{.ID}}"])
            .await?;

        Ok(parse_container_id(&output.stdout))
    }

    #[instrument(name = "docker.exit_code", skip(self))]
    async fn exit_code(&self, handle: &InstanceHandle) -> Result<i64, BackendError> {
        let output = self.run(&["inspect", handle.0.as_str()]).await?;
        let state = parse_inspect(&output.stdout)?;

        if state.oom_killed {
            tracing::warn!(container = %handle, "Container was OOM killed");
        }
        tracing::debug!(status = %state.status, exit_code = state.exit_code, "Inspected container");

        Ok(state.exit_code)
    }

    #[instrument(name = "docker.logs", skip(self))]
    async fn logs(&self, handle: &InstanceHandle) -> Result<String, BackendError> {
        let output = self.run(&["logs", handle.0.as_str()]).await?;
        Ok(join_streams(output.stdout, output.stderr))
    }
}

//! Orchestration backend interface.
//!
//! The verifier only needs four read-only queries from whatever supervises the
//! service instances: a reachability check, name resolution, the termination
//! code, and the accumulated output. [`DockerBackend`] implements them on top of
//! the docker CLI; tests plug in in-memory fakes.

mod docker;

pub use docker::DockerBackend;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::registry::ServiceName;

/// Backend-specific identifier of a running or terminated instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub String);

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by backend queries
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend as a whole cannot be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("`{command}` exited with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to run backend command: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected backend output: {0}")]
    Parse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Read-only query interface to an orchestration backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Check that the backend itself answers queries
    async fn ping(&self) -> Result<(), BackendError>;

    /// Resolve a service to its instance, `None` when no instance exists
    async fn resolve_instance(
        &self,
        service: &ServiceName,
    ) -> Result<Option<InstanceHandle>, BackendError>;

    /// Termination code of the instance (0 for a still-running instance)
    async fn exit_code(&self, handle: &InstanceHandle) -> Result<i64, BackendError>;

    /// Full accumulated output of the instance
    async fn logs(&self, handle: &InstanceHandle) -> Result<String, BackendError>;
}

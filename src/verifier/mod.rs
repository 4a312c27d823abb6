//! Fleet verification: per-service checks and the aggregate verdict.
//!
//! Each registered service goes through resolve → exit code → logs → signature
//! scan, producing one immutable [`ServiceOutcome`]. Checks run concurrently on
//! a small worker pool (see [`pool`]); outcomes are returned in registry order
//! once every check has finished. [`Verdict::from_outcomes`] folds them into the
//! pass/fail result without touching the backend.

mod pool;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::backend::{Backend, BackendError};
use crate::config::{AppConfig, ConfigError};
use crate::detector::{FailureDetector, SignatureMatch};
use crate::error::AppError;
use crate::registry::{ServiceName, ServiceRegistry};

/// Independent reasons a service counts as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No instance exists, or the backend could not be queried for it
    InstanceNotFound,
    /// The instance terminated with a non-zero code
    AbnormalExit,
    /// The instance's output contains a configured failure signature
    LogSignatureMatch,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InstanceNotFound => write!(f, "InstanceNotFound"),
            FailureKind::AbnormalExit => write!(f, "AbnormalExit"),
            FailureKind::LogSignatureMatch => write!(f, "LogSignatureMatch"),
        }
    }
}

/// Pipeline stage a backend query belongs to, used to label probe errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckStage {
    Resolve,
    ExitCode,
    Logs,
}

impl fmt::Display for CheckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStage::Resolve => write!(f, "instance lookup failed"),
            CheckStage::ExitCode => write!(f, "exit code query failed"),
            CheckStage::Logs => write!(f, "log retrieval failed"),
        }
    }
}

/// Evidence collected for one service during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    pub name: ServiceName,
    /// Whether the backend produced an instance and answered every query for it
    pub found: bool,
    pub exit_code: Option<i64>,
    pub log_text: String,
    /// Distinct matching line spans, in order of first appearance
    pub matched_signatures: Vec<SignatureMatch>,
    /// Backend error or timeout that interrupted the check
    pub probe_error: Option<String>,
}

impl ServiceOutcome {
    fn unprobed(name: ServiceName) -> Self {
        Self {
            name,
            found: false,
            exit_code: None,
            log_text: String::new(),
            matched_signatures: Vec::new(),
            probe_error: None,
        }
    }

    /// Outcome for a service whose check never reported back
    pub(crate) fn aborted(name: ServiceName, reason: impl Into<String>) -> Self {
        Self {
            probe_error: Some(reason.into()),
            ..Self::unprobed(name)
        }
    }

    pub fn has_abnormal_exit(&self) -> bool {
        self.exit_code.is_some_and(|code| code != 0)
    }

    pub fn failed(&self) -> bool {
        !self.found || self.has_abnormal_exit() || !self.matched_signatures.is_empty()
    }

    /// Every failure condition that fired, in a fixed order
    pub fn failure_kinds(&self) -> Vec<FailureKind> {
        let mut kinds = Vec::new();
        if !self.found {
            kinds.push(FailureKind::InstanceNotFound);
        }
        if self.has_abnormal_exit() {
            kinds.push(FailureKind::AbnormalExit);
        }
        if !self.matched_signatures.is_empty() {
            kinds.push(FailureKind::LogSignatureMatch);
        }
        kinds
    }
}

/// Aggregate pass/fail result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub any_failed: bool,
    /// Failed services in outcome order
    pub failed_services: Vec<ServiceName>,
    pub total: usize,
}

impl Verdict {
    /// Fold outcomes into a verdict
    pub fn from_outcomes(outcomes: &[ServiceOutcome]) -> Self {
        let failed_services: Vec<ServiceName> = outcomes
            .iter()
            .filter(|o| o.failed())
            .map(|o| o.name.clone())
            .collect();

        Self {
            any_failed: !failed_services.is_empty(),
            failed_services,
            total: outcomes.len(),
        }
    }

    /// Process exit code: 0 when healthy, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.any_failed {
            1
        } else {
            0
        }
    }
}

/// Shared, read-only inputs of every per-service check
pub(crate) struct CheckContext {
    pub backend: Arc<dyn Backend>,
    pub detector: FailureDetector,
    pub timeout: Duration,
}

/// Resolve, inspect and scan one service.
///
/// Never fails: backend errors and timeouts are folded into the outcome as
/// `found = false` with the reason kept in `probe_error`.
#[instrument(
    name = "verifier.check_service",
    skip(ctx, service),
    fields(service = %service, found, exit_code, matches, duration_ms)
)]
pub(crate) async fn check_service(ctx: &CheckContext, service: &ServiceName) -> ServiceOutcome {
    let start = Instant::now();
    let mut outcome = ServiceOutcome::unprobed(service.clone());

    let result = tokio::time::timeout(ctx.timeout, probe_and_collect(ctx, &mut outcome)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err((stage, e))) => {
            tracing::warn!(error = %e, %stage, "Backend query failed");
            outcome.found = false;
            outcome.probe_error = Some(format!("{}: {}", stage, e));
        }
        Err(_) => {
            let e = BackendError::Timeout(ctx.timeout);
            tracing::warn!(error = %e, "Service check timed out");
            outcome.found = false;
            outcome.probe_error = Some(e.to_string());
        }
    }

    let span = tracing::Span::current();
    span.record("found", outcome.found);
    if let Some(code) = outcome.exit_code {
        span.record("exit_code", code);
    }
    span.record("matches", outcome.matched_signatures.len() as u64);
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    tracing::debug!(failed = outcome.failed(), "Service checked");

    outcome
}

/// Fill `outcome` stage by stage; evidence gathered before an error is kept.
async fn probe_and_collect(
    ctx: &CheckContext,
    outcome: &mut ServiceOutcome,
) -> Result<(), (CheckStage, BackendError)> {
    let handle = ctx
        .backend
        .resolve_instance(&outcome.name)
        .await
        .map_err(|e| (CheckStage::Resolve, e))?;

    let Some(handle) = handle else {
        tracing::info!("No instance found");
        return Ok(());
    };
    outcome.found = true;

    let code = ctx
        .backend
        .exit_code(&handle)
        .await
        .map_err(|e| (CheckStage::ExitCode, e))?;
    outcome.exit_code = Some(code);

    let text = ctx
        .backend
        .logs(&handle)
        .await
        .map_err(|e| (CheckStage::Logs, e))?;
    outcome.matched_signatures = ctx.detector.scan(&text);
    outcome.log_text = text;

    Ok(())
}

/// Runs every registered service check and collects the outcomes
pub struct Verifier {
    ctx: Arc<CheckContext>,
    concurrency: usize,
}

impl Verifier {
    pub fn new(
        backend: Arc<dyn Backend>,
        detector: FailureDetector,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(CheckContext {
                backend,
                detector,
                timeout,
            }),
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            backend,
            FailureDetector::from_config(&config.detector)?,
            Duration::from_secs(config.backend.timeout_seconds),
            config.verifier.concurrency,
        ))
    }

    /// Check every service in the registry.
    ///
    /// Returns one outcome per service in registry order. Only an unreachable
    /// backend aborts the run.
    #[instrument(name = "verifier.run", skip_all, fields(services = registry.len()))]
    pub async fn run(&self, registry: &ServiceRegistry) -> Result<Vec<ServiceOutcome>, AppError> {
        match tokio::time::timeout(self.ctx.timeout, self.ctx.backend.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AppError::BackendUnavailable(e.to_string())),
            Err(_) => {
                return Err(AppError::BackendUnavailable(
                    BackendError::Timeout(self.ctx.timeout).to_string(),
                ))
            }
        }

        let outcomes = pool::run_checks(self.ctx.clone(), registry.names(), self.concurrency).await;
        tracing::info!(
            checked = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.failed()).count(),
            "Verification finished"
        );
        Ok(outcomes)
    }
}

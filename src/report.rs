//! Human-readable verification report.
//!
//! One block per service in registry order, then a single summary line. Each
//! failure condition that fired for a service gets its own diagnostic; the
//! service's log is printed once after them when it is relevant.

use std::io::{self, Write};

use crate::config::ReportConfig;
use crate::verifier::{FailureKind, ServiceOutcome, Verdict};

const MATCH_SEPARATOR: &str = "--------";

#[derive(Debug, Clone, Default)]
pub struct Reporter {
    max_log_lines: Option<usize>,
}

impl Reporter {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            max_log_lines: config.max_log_lines,
        }
    }

    /// Write the full report: per-service blocks followed by the summary line
    pub fn write_report<W: Write>(
        &self,
        out: &mut W,
        outcomes: &[ServiceOutcome],
        verdict: &Verdict,
    ) -> io::Result<()> {
        for outcome in outcomes {
            self.write_outcome(out, outcome)?;
            writeln!(out)?;
        }
        writeln!(out, "{}", summary_line(verdict))
    }

    /// Render the report into a string
    pub fn render(&self, outcomes: &[ServiceOutcome], verdict: &Verdict) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_report(&mut buf, outcomes, verdict);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn write_outcome<W: Write>(&self, out: &mut W, outcome: &ServiceOutcome) -> io::Result<()> {
        writeln!(out, "=== {} ===", outcome.name)?;

        let kinds = outcome.failure_kinds();
        if kinds.is_empty() {
            return writeln!(out, "OK");
        }

        for kind in &kinds {
            match kind {
                FailureKind::InstanceNotFound => {
                    writeln!(out, "[{}] container for {} not found", kind, outcome.name)?;
                    if let Some(reason) = &outcome.probe_error {
                        writeln!(out, "  reason: {}", reason)?;
                    }
                }
                FailureKind::AbnormalExit => {
                    // has_abnormal_exit guarantees a code
                    let code = outcome.exit_code.unwrap_or_default();
                    writeln!(out, "[{}] exit code {}", kind, code)?;
                }
                FailureKind::LogSignatureMatch => {
                    writeln!(
                        out,
                        "[{}] {} matching line(s)",
                        kind,
                        outcome.matched_signatures.len()
                    )?;
                    for m in &outcome.matched_signatures {
                        writeln!(out, "{}", MATCH_SEPARATOR)?;
                        writeln!(out, "{}", m.line)?;
                        writeln!(out, "{}", MATCH_SEPARATOR)?;
                    }
                }
            }
        }

        if outcome.has_abnormal_exit() || !outcome.matched_signatures.is_empty() {
            self.write_log(out, outcome)?;
        }
        Ok(())
    }

    fn write_log<W: Write>(&self, out: &mut W, outcome: &ServiceOutcome) -> io::Result<()> {
        writeln!(out, "----- log for {} (may be truncated) -----", outcome.name)?;

        let lines: Vec<&str> = outcome.log_text.lines().collect();
        let skip = match self.max_log_lines {
            Some(max) if lines.len() > max => lines.len() - max,
            _ => 0,
        };
        if skip > 0 {
            writeln!(out, "... ({} earlier lines omitted)", skip)?;
        }
        for line in &lines[skip..] {
            writeln!(out, "{}", line)?;
        }

        writeln!(out, "----- end of log -----")
    }
}

/// Final one-line summary of a run
pub fn summary_line(verdict: &Verdict) -> String {
    if !verdict.any_failed {
        return format!("All {} services healthy", verdict.total);
    }
    let names: Vec<&str> = verdict.failed_services.iter().map(|s| s.as_str()).collect();
    format!(
        "FAILED: {} of {} services failed: {}",
        names.len(),
        verdict.total,
        names.join(", ")
    )
}

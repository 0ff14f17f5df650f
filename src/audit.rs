// coordinator-agent: Correlated audit trail, one JSON line per event

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Reporting identity attached to every event
const SERVICE_NAME: &str = "coordinator-agent";

/// One audit event: an execution attempt that reached the HTTP call, or a
/// final skip record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub service: &'static str,
    pub correlation_id: String,
    pub jwt: Value,
    /// Body actually sent downstream, or the context snapshot for skips
    pub request: Value,
    /// Downstream response, error object, or skip record
    pub response: Value,
    pub target_service: String,
    /// Endpoint after placeholder substitution
    pub target_url: String,
    pub reason: String,
    pub query: String,
    /// Contract strings verbatim, as carried by the candidate
    pub contract_input: String,
    pub contract_output: String,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlation_id: &str,
        target_service: &str,
        target_url: &str,
        request: Value,
        response: Value,
        reason: &str,
        query: &str,
        contract_input: &str,
        contract_output: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            service: SERVICE_NAME,
            correlation_id: correlation_id.to_string(),
            jwt: Value::Object(Default::default()),
            request,
            response,
            target_service: target_service.to_string(),
            target_url: target_url.to_string(),
            reason: reason.to_string(),
            query: query.to_string(),
            contract_input: contract_input.to_string(),
            contract_output: contract_output.to_string(),
        }
    }
}

/// Append-only JSON-lines writer for the trace log.
///
/// Write failures are reported at warn level and never affect the dispatch
/// outcome.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    path: PathBuf,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single line.
    pub fn log(&self, event: &AuditEvent) {
        if let Err(e) = self.try_log(event) {
            warn!(error = %e, path = %self.path.display(), "Audit log write failed");
        }
    }

    fn try_log(&self, event: &AuditEvent) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

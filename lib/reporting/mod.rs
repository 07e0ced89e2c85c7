//! Error-report sink used for both warnings and hard failures.
//!
//! Every report gets an opaque id that is stored on watch activity rows, so operators can go
//! from a failed check straight to the structured log event carrying the full properties.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{error, warn};

use crate::sync_service::types::SyncErrorKind;

/// Opaque identifier returned by a reporter.
pub type ReportId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One captured report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub id: ReportId,
    pub severity: Severity,
    pub kind: SyncErrorKind,
    pub message: String,
    pub properties: BTreeMap<String, String>,
}

pub trait ErrorReporter: Send + Sync {
    fn report(
        &self,
        severity: Severity,
        kind: SyncErrorKind,
        message: &str,
        properties: &[(&str, String)],
    ) -> ReportId;
}

/// Allocates ids of the form `<run_id>-<sequence>`.
#[derive(Debug)]
struct ReportIdAllocator {
    run_id: String,
    next: AtomicU64,
}

impl ReportIdAllocator {
    fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            next: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> ReportId {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{sequence}", self.run_id)
    }
}

fn build_report(
    id: ReportId,
    severity: Severity,
    kind: SyncErrorKind,
    message: &str,
    properties: &[(&str, String)],
) -> ErrorReport {
    ErrorReport {
        id,
        severity,
        kind,
        message: message.to_string(),
        properties: properties
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect(),
    }
}

/// Reporter that emits one structured `tracing` event per report.
#[derive(Debug)]
pub struct TracingReporter {
    ids: ReportIdAllocator,
}

impl TracingReporter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            ids: ReportIdAllocator::new(run_id),
        }
    }
}

impl ErrorReporter for TracingReporter {
    fn report(
        &self,
        severity: Severity,
        kind: SyncErrorKind,
        message: &str,
        properties: &[(&str, String)],
    ) -> ReportId {
        let report = build_report(self.ids.allocate(), severity, kind, message, properties);
        let properties = serde_json::to_string(&report.properties)
            .unwrap_or_else(|err| format!("<unserializable properties: {err}>"));

        match severity {
            Severity::Warning => warn!(
                event = "sync_error_report",
                report_id = %report.id,
                kind = %kind,
                severity = "warning",
                properties = %properties,
                "{message}"
            ),
            Severity::Error => error!(
                event = "sync_error_report",
                report_id = %report.id,
                kind = %kind,
                severity = "error",
                properties = %properties,
                "{message}"
            ),
        }

        report.id
    }
}

/// Reporter that keeps every report in memory.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug)]
pub struct MemoryReporter {
    ids: ReportIdAllocator,
    reports: std::sync::Mutex<Vec<ErrorReport>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemoryReporter {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            ids: ReportIdAllocator::new(run_id),
            reports: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().expect("reports mutex poisoned").clone()
    }

    pub fn find(&self, id: &str) -> Option<ErrorReport> {
        self.reports()
            .into_iter()
            .find(|report| report.id == id)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ErrorReporter for MemoryReporter {
    fn report(
        &self,
        severity: Severity,
        kind: SyncErrorKind,
        message: &str,
        properties: &[(&str, String)],
    ) -> ReportId {
        let report = build_report(self.ids.allocate(), severity, kind, message, properties);
        let id = report.id.clone();
        self.reports
            .lock()
            .expect("reports mutex poisoned")
            .push(report);
        id
    }
}

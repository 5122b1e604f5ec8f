//! Sync run model.
//!
//! One row per synchronizer invocation, append-only: a run is created in
//! the `running` state, finalized exactly once into a terminal state, and
//! immutable afterwards.

use chrono::{DateTime, Utc};
use labsync_core::{SyncRunId, TenantId};
use serde::{Deserialize, Serialize};

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress.
    Running,
    /// Every record succeeded.
    Success,
    /// At least one record succeeded and at least one failed.
    Partial,
    /// The whole batch was invalidated, or every record failed.
    Failed,
}

impl RunStatus {
    /// Whether this status is terminal; terminal runs are immutable.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Stable string form for database columns.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("Unknown run status: {other}")),
        }
    }
}

/// One synchronizer invocation in the sync log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run identifier.
    pub id: SyncRunId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Synchronizer module, e.g. `partners`.
    pub module: String,
    /// Current status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Records successfully processed.
    pub records_processed: i64,
    /// Records that failed.
    pub records_failed: i64,
    /// Most recent error, if any.
    pub error_message: Option<String>,
}

impl SyncRun {
    /// Create a run in the `running` state.
    #[must_use]
    pub fn start(tenant_id: TenantId, module: impl Into<String>) -> Self {
        Self {
            id: SyncRunId::new(),
            tenant_id,
            module: module.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            records_processed: 0,
            records_failed: 0,
            error_message: None,
        }
    }
}

/// Terminal outcome applied to a run at finalization.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Terminal status; must not be `Running`.
    pub status: RunStatus,
    /// Records successfully processed.
    pub records_processed: i64,
    /// Records that failed.
    pub records_failed: i64,
    /// Most recent error, if any.
    pub error_message: Option<String>,
}

impl RunOutcome {
    /// Successful outcome with the given count.
    #[must_use]
    pub fn success(records_processed: i64) -> Self {
        Self {
            status: RunStatus::Success,
            records_processed,
            records_failed: 0,
            error_message: None,
        }
    }

    /// Failed outcome with an error message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            records_processed: 0,
            records_failed: 0,
            error_message: Some(message.into()),
        }
    }
}

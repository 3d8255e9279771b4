//! # Wipe Job State Machine
//!
//! ```text
//! QUEUED ──▶ RUNNING ──▶ SUCCEEDED
//!   │  │        │  ▲
//!   │  │        │  └── RUNNING (progress update)
//!   │  │        ├──▶ FAILED
//!   │  │        └──▶ CANCELLED
//!   │  ├──▶ FAILED
//!   │  └──▶ CANCELLED
//!   └── QUEUED (no-op)
//! ```
//!
//! SUCCEEDED, FAILED, and CANCELLED are terminal: every update against a
//! terminal job is rejected, including one naming the same state.
//!
//! ## Timestamps
//!
//! `started_at` is set by the first RUNNING update only. `finished_at` is
//! set on entry to a terminal state. `updated_at` moves on every applied
//! update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tw_core::{AgentId, AssetId, JobId, NistCategory, UserId, WipeMethod, WipeScope};
use tw_policy::PolicySnapshot;

// ─── Job Status ──────────────────────────────────────────────────────

/// Lifecycle state of a wipe job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, waiting for its agent to claim it.
    Queued,
    /// Claimed and executing on the agent.
    Running,
    /// Finished successfully (terminal).
    Succeeded,
    /// Finished unsuccessfully (terminal).
    Failed,
    /// Abandoned before completion (terminal).
    Cancelled,
}

wire_enum!(JobStatus, "job status", {
    Queued => "QUEUED",
    Running => "RUNNING",
    Succeeded => "SUCCEEDED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 5] = [
        Self::Queued,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Whether no transition is defined out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether the job still occupies its agent (QUEUED or RUNNING).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self → to` is a defined edge (self-loops included).
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Queued | Running | Failed | Cancelled)
                | (Running, Running | Succeeded | Failed | Cancelled)
        )
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Rejected job mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The job is in a terminal state.
    #[error("job {job_id} is {state} and cannot transition")]
    Terminal {
        /// The job identifier.
        job_id: JobId,
        /// Its terminal state.
        state: JobStatus,
    },

    /// No edge exists between the two states.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: JobStatus,
        /// Attempted target state.
        to: JobStatus,
    },

    /// Progress outside 0-100.
    #[error("progress must be between 0 and 100, got {value}")]
    ProgressOutOfRange {
        /// Rejected value.
        value: u8,
    },
}

// ─── Transition Record ───────────────────────────────────────────────

/// One applied status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTransitionRecord {
    /// The job that moved.
    pub job_id: JobId,
    /// State before the update.
    pub from_state: JobStatus,
    /// State after the update.
    pub to_state: JobStatus,
    /// When the update was applied.
    pub timestamp: DateTime<Utc>,
}

impl JobTransitionRecord {
    /// Whether the state actually changed (not a RUNNING progress tick).
    pub fn is_state_change(&self) -> bool {
        self.from_state != self.to_state
    }
}

// ─── Status Update ───────────────────────────────────────────────────

/// An agent- or admin-submitted status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Target state.
    pub status: JobStatus,
    /// Completion percentage (0-100).
    #[serde(default)]
    pub progress: Option<u8>,
    /// Agent-reported error text, stored as `last_error`.
    #[serde(default)]
    pub error: Option<String>,
    /// SHA-256 of the agent's run log.
    #[serde(default)]
    pub run_log_sha256: Option<String>,
}

impl StatusUpdate {
    /// An update carrying only a target state.
    pub fn to(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            error: None,
            run_log_sha256: None,
        }
    }
}

// ─── Wipe Job ────────────────────────────────────────────────────────

/// Inputs to job creation, after policy resolution.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Device being wiped, if registered.
    pub asset_id: Option<AssetId>,
    /// Drive or folder.
    pub scope: WipeScope,
    /// Device path, drive identifier, or folder path.
    pub target: String,
    /// Requesting user.
    pub requested_by: UserId,
    /// Agent expected to execute the job.
    pub assigned_agent_id: Option<AgentId>,
    /// Frozen policy.
    pub policy_snapshot: PolicySnapshot,
}

/// The central sanitization job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Device being wiped, if registered.
    pub asset_id: Option<AssetId>,
    /// Drive or folder.
    pub scope: WipeScope,
    /// Device path, drive identifier, or folder path.
    pub target: String,
    /// Target assurance level.
    pub nist_category: NistCategory,
    /// Resolved method (copied from the snapshot for querying).
    pub method: WipeMethod,
    /// Requesting user.
    pub requested_by: UserId,
    /// Agent expected to execute the job.
    pub assigned_agent_id: Option<AgentId>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Policy frozen at creation. Never rewritten.
    pub policy_snapshot: PolicySnapshot,
    /// Last reported completion percentage.
    pub progress: Option<u8>,
    /// Last agent-reported error.
    pub last_error: Option<String>,
    /// SHA-256 of the agent's run log.
    pub run_log_sha256: Option<String>,
    /// When an agent poll claimed the job.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// First RUNNING update.
    pub started_at: Option<DateTime<Utc>>,
    /// Entry into a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Last applied update.
    pub updated_at: DateTime<Utc>,
}

impl WipeJob {
    /// Create a job in QUEUED.
    pub fn new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            asset_id: new.asset_id,
            scope: new.scope,
            target: new.target,
            nist_category: new.policy_snapshot.nist_category,
            method: new.policy_snapshot.method,
            requested_by: new.requested_by,
            assigned_agent_id: new.assigned_agent_id,
            status: JobStatus::Queued,
            policy_snapshot: new.policy_snapshot,
            progress: None,
            last_error: None,
            run_log_sha256: None,
            claimed_at: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Whether the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `agent` may report status for this job.
    pub fn is_assigned_to(&self, agent: AgentId) -> bool {
        self.assigned_agent_id == Some(agent)
    }

    /// Apply a status update.
    ///
    /// Returns `None` for the QUEUED → QUEUED no-op, which leaves the job
    /// untouched. Otherwise returns the transition that was applied.
    pub fn apply(
        &mut self,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<JobTransitionRecord>, JobError> {
        if let Some(value) = update.progress {
            if value > 100 {
                return Err(JobError::ProgressOutOfRange { value });
            }
        }
        self.require_transition(update.status)?;

        if self.status == JobStatus::Queued && update.status == JobStatus::Queued {
            return Ok(None);
        }

        if update.status == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if update.status.is_terminal() {
            self.finished_at = Some(now);
        }
        if update.progress.is_some() {
            self.progress = update.progress;
        }
        if update.error.is_some() {
            self.last_error.clone_from(&update.error);
        }
        if update.run_log_sha256.is_some() {
            self.run_log_sha256.clone_from(&update.run_log_sha256);
        }

        Ok(Some(self.do_transition(update.status, now)))
    }

    /// Validate that `to` is reachable from the current state.
    fn require_transition(&self, to: JobStatus) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Terminal {
                job_id: self.id,
                state: self.status,
            });
        }
        if !self.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> JobTransitionRecord {
        let record = JobTransitionRecord {
            job_id: self.id,
            from_state: self.status,
            to_state: to,
            timestamp: now,
        };
        self.status = to;
        self.updated_at = now;
        record
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

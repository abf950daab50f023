//! Domain types backing the persistent store.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmStatus {
    Created,
    Running,
    Complete,
    Failed,
}

impl std::fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SwarmStatus::Created => "created",
            SwarmStatus::Running => "running",
            SwarmStatus::Complete => "complete",
            SwarmStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SwarmStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(SwarmStatus::Created),
            "running" => Ok(SwarmStatus::Running),
            "complete" => Ok(SwarmStatus::Complete),
            "failed" => Ok(SwarmStatus::Failed),
            _ => anyhow::bail!("unknown swarm status '{s}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Registered,
    Running,
    Complete,
    Failed,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Registered => "registered",
            WorkerStatus::Running => "running",
            WorkerStatus::Complete => "complete",
            WorkerStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(WorkerStatus::Registered),
            "running" => Ok(WorkerStatus::Running),
            "complete" => Ok(WorkerStatus::Complete),
            "failed" => Ok(WorkerStatus::Failed),
            _ => anyhow::bail!("unknown worker status '{s}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkerRegistered,
    Progress,
    WorkerComplete,
    WorkerError,
    AllComplete,
    Heartbeat,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::WorkerRegistered => "worker_registered",
            EventKind::Progress => "progress",
            EventKind::WorkerComplete => "worker_complete",
            EventKind::WorkerError => "worker_error",
            EventKind::AllComplete => "all_complete",
            EventKind::Heartbeat => "heartbeat",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker_registered" => Ok(EventKind::WorkerRegistered),
            "progress" => Ok(EventKind::Progress),
            "worker_complete" => Ok(EventKind::WorkerComplete),
            "worker_error" => Ok(EventKind::WorkerError),
            "all_complete" => Ok(EventKind::AllComplete),
            "heartbeat" => Ok(EventKind::Heartbeat),
            _ => anyhow::bail!("unknown event kind '{s}'"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Swarm {
    pub swarm_id: String,
    pub feature: String,
    pub manifest_path: String,
    pub status: SwarmStatus,
    pub auto_merge: bool,
    pub notify_on_complete: bool,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Worker {
    pub worker_id: i64,
    pub swarm_id: String,
    pub packet_id: i64,
    pub packet_name: String,
    pub worktree: String,
    pub status: WorkerStatus,
    pub tasks_total: i64,
    pub tasks_completed: i64,
    pub final_commit: Option<String>,
    pub tests_passed: Option<bool>,
    pub review_passed: Option<bool>,
    pub registered_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: i64,
    pub swarm_id: String,
    pub event_type: EventKind,
    pub packet_id: Option<i64>,
    pub task_id: Option<String>,
    pub task_name: Option<String>,
    pub commit: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub recoverable: Option<bool>,
    pub event_data: Option<serde_json::Value>,
    pub created_at: String,
}

/// Outcome of `register_worker`: either the insert succeeded or the
/// `(swarm_id, packet_id)` pair already exists.
pub enum RegisterOutcome {
    Registered(Worker),
    Conflict,
}

/// Outcome of `mark_complete`: whether this completion also completed the swarm,
/// and a live count of workers still not `complete`.
pub struct CompleteOutcome {
    pub swarm_complete: bool,
    pub remaining_workers: i64,
}

/// Aggregate view served by `GET /swarm/{id}/status`, always computed live
/// from the `workers` table rather than cached or hardcoded.
pub struct SwarmStatusView {
    pub swarm: Swarm,
    pub workers_registered: i64,
    pub workers_complete: i64,
    pub workers_failed: i64,
    pub workers: Vec<Worker>,
}

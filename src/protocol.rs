//! Request/response schemas for the coordination server's HTTP surface.
//!
//! Every inbound body is deserialized first, then run through a `validate()`
//! that collects *every* field violation at once rather than failing on the
//! first bad field — callers get one 422 with a complete list instead of
//! retrying one field at a time.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::FieldError;

static PACKET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());
static COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{7,40}$").unwrap());

pub trait Validate {
    /// Returns every field violation found; an empty vec means the request is well-formed.
    fn validate(&self) -> Vec<FieldError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSwarmRequest {
    pub feature: String,
    pub manifest_path: String,
    #[serde(default)]
    pub auto_merge: bool,
    #[serde(default = "default_true")]
    pub notify_on_complete: bool,
}

fn default_true() -> bool {
    true
}

impl Validate for CreateSwarmRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.feature.trim().is_empty() {
            errors.push(FieldError::new("feature", "must not be empty"));
        }
        if self.manifest_path.trim().is_empty() {
            errors.push(FieldError::new("manifest_path", "must not be empty"));
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub packet_id: i64,
    pub packet_name: String,
    pub tasks_total: i64,
    pub worktree: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.packet_id <= 0 {
            errors.push(FieldError::new("packet_id", "must be greater than 0"));
        }
        if self.packet_name.is_empty() || self.packet_name.len() > 255 {
            errors.push(FieldError::new("packet_name", "must be 1..255 characters"));
        } else if !PACKET_NAME_RE.is_match(&self.packet_name) {
            errors.push(FieldError::new(
                "packet_name",
                "must match ^[a-z0-9-]+$",
            ));
        }
        if !(1..=1000).contains(&self.tasks_total) {
            errors.push(FieldError::new("tasks_total", "must be between 1 and 1000"));
        }
        if self.worktree.trim().is_empty() {
            errors.push(FieldError::new("worktree", "must not be empty"));
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Started,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRequest {
    pub packet_id: i64,
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    #[serde(default)]
    pub commit: Option<String>,
}

impl Validate for ProgressRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.packet_id <= 0 {
            errors.push(FieldError::new("packet_id", "must be greater than 0"));
        }
        if self.task_id.is_empty() || self.task_id.len() > 255 {
            errors.push(FieldError::new("task_id", "must be 1..255 characters"));
        }
        if self.task_name.is_empty() || self.task_name.len() > 500 {
            errors.push(FieldError::new("task_name", "must be 1..500 characters"));
        }
        if self.tasks_completed < 0 {
            errors.push(FieldError::new("tasks_completed", "must be >= 0"));
        }
        if self.tasks_total <= 0 {
            errors.push(FieldError::new("tasks_total", "must be greater than 0"));
        }
        if self.tasks_completed > self.tasks_total {
            errors.push(FieldError::new(
                "tasks_completed",
                "must be <= tasks_total",
            ));
        }
        if let Some(commit) = &self.commit {
            if !COMMIT_RE.is_match(commit) {
                errors.push(FieldError::new("commit", "must match ^[a-f0-9]{7,40}$"));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub packet_id: i64,
    pub final_commit: String,
    pub tests_passed: bool,
    pub review_passed: bool,
}

impl Validate for CompleteRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.packet_id <= 0 {
            errors.push(FieldError::new("packet_id", "must be greater than 0"));
        }
        if !COMMIT_RE.is_match(&self.final_commit) {
            errors.push(FieldError::new(
                "final_commit",
                "must match ^[a-f0-9]{7,40}$",
            ));
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorRequest {
    pub packet_id: i64,
    pub task_id: String,
    pub error_type: String,
    pub message: String,
    pub recoverable: bool,
}

impl Validate for ErrorRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.packet_id <= 0 {
            errors.push(FieldError::new("packet_id", "must be greater than 0"));
        }
        if self.task_id.is_empty() || self.task_id.len() > 255 {
            errors.push(FieldError::new("task_id", "must be 1..255 characters"));
        }
        if self.error_type.is_empty() || self.error_type.len() > 100 {
            errors.push(FieldError::new("error_type", "must be 1..100 characters"));
        }
        if self.message.is_empty() || self.message.len() > 5000 {
            errors.push(FieldError::new("message", "must be 1..5000 characters"));
        }
        errors
    }
}

// ── Response shapes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SwarmCreateResponse {
    pub swarm_id: String,
    pub endpoint: String,
    pub created_at: String,
    pub auto_merge: bool,
    pub notify_on_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub worker_id: i64,
    pub swarm_id: String,
    pub packet_id: i64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub swarm_id: String,
    pub packet_id: i64,
    pub tasks_completed: i64,
    pub tasks_total: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub swarm_id: String,
    pub packet_id: i64,
    pub swarm_complete: bool,
    pub remaining_workers: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub swarm_id: String,
    pub packet_id: i64,
    pub retry_scheduled: bool,
    pub retry_in_seconds: Option<u64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub packet_id: i64,
    pub packet_name: String,
    pub status: String,
    pub tasks_completed: i64,
    pub tasks_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStatusResponse {
    pub swarm_id: String,
    pub status: String,
    pub workers_registered: i64,
    pub workers_complete: i64,
    pub workers_failed: i64,
    pub workers: Vec<WorkerStatus>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub active_swarms: i64,
    pub total_workers: i64,
    pub version: String,
}

//! Worker-side helper for integrating with the coordination server.
//!
//! Every reporting method performs a dual write: the checkpoint file is
//! written first so progress survives a backend outage, then the backend
//! call is made.

pub mod backend;
pub mod checkpoint;
pub mod http_backend;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};

use crate::protocol::{CompleteResponse, ErrorResponse, ProgressResponse, RegisterResponse};

use self::backend::CoordinationBackend;
use self::checkpoint::{Checkpoint, checkpoint_path, write_checkpoint};

pub struct SwarmWorker {
    pub swarm_id: String,
    pub packet_id: i64,
    pub packet_name: String,
    pub worktree: PathBuf,
    pub tasks_total: i64,
    tasks_completed: i64,
    backend: Box<dyn CoordinationBackend>,
}

impl SwarmWorker {
    pub fn new(
        swarm_id: impl Into<String>,
        packet_id: i64,
        packet_name: impl Into<String>,
        worktree: impl Into<PathBuf>,
        tasks_total: i64,
        backend: Box<dyn CoordinationBackend>,
    ) -> Self {
        Self {
            swarm_id: swarm_id.into(),
            packet_id,
            packet_name: packet_name.into(),
            worktree: worktree.into(),
            tasks_total,
            tasks_completed: 0,
            backend,
        }
    }

    fn checkpoint_file(&self) -> PathBuf {
        checkpoint_path(&self.worktree, self.packet_id, &self.packet_name)
    }

    fn write_checkpoint(&self, event: &str, data: serde_json::Value) -> Result<()> {
        let checkpoint = Checkpoint {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            packet_id: self.packet_id,
            packet_name: &self.packet_name,
            tasks_completed: self.tasks_completed,
            tasks_total: self.tasks_total,
            data,
        };
        write_checkpoint(&self.checkpoint_file(), &checkpoint)
    }

    pub async fn register(&self) -> Result<RegisterResponse> {
        self.write_checkpoint("registered", serde_json::json!({}))?;
        self.backend
            .register_worker(
                &self.swarm_id,
                self.packet_id,
                &self.packet_name,
                self.tasks_total,
                &self.worktree.to_string_lossy(),
            )
            .await
    }

    pub async fn report_progress(
        &mut self,
        task_id: &str,
        task_name: &str,
        status: &str,
        commit: Option<&str>,
    ) -> Result<ProgressResponse> {
        if status == "completed" {
            self.tasks_completed += 1;
        }

        let mut data = serde_json::json!({
            "task_id": task_id,
            "task_name": task_name,
            "status": status,
        });
        if let Some(commit) = commit {
            data["commit"] = serde_json::Value::String(commit.to_string());
        }
        self.write_checkpoint("progress", data)?;

        self.backend
            .report_progress(
                &self.swarm_id,
                self.packet_id,
                task_id,
                task_name,
                status,
                self.tasks_completed,
                self.tasks_total,
                commit,
            )
            .await
    }

    pub async fn report_complete(
        &self,
        final_commit: &str,
        tests_passed: bool,
        review_passed: bool,
    ) -> Result<CompleteResponse> {
        self.write_checkpoint(
            "complete",
            serde_json::json!({
                "final_commit": final_commit,
                "tests_passed": tests_passed,
                "review_passed": review_passed,
            }),
        )?;

        self.backend
            .report_complete(&self.swarm_id, self.packet_id, final_commit, tests_passed, review_passed)
            .await
    }

    pub async fn report_error(
        &self,
        task_id: &str,
        error_type: &str,
        message: &str,
        recoverable: bool,
    ) -> Result<ErrorResponse> {
        self.write_checkpoint(
            "error",
            serde_json::json!({
                "task_id": task_id,
                "error_type": error_type,
                "message": message,
                "recoverable": recoverable,
            }),
        )?;

        self.backend
            .report_error(&self.swarm_id, self.packet_id, task_id, error_type, message, recoverable)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeBackend {
        progress_calls: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl CoordinationBackend for FakeBackend {
        async fn register_worker(
            &self,
            swarm_id: &str,
            packet_id: i64,
            packet_name: &str,
            tasks_total: i64,
            _worktree: &str,
        ) -> Result<RegisterResponse> {
            Ok(RegisterResponse {
                worker_id: 1,
                swarm_id: swarm_id.to_string(),
                packet_id,
                status: "registered".to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
            })
        }

        async fn report_progress(
            &self,
            swarm_id: &str,
            packet_id: i64,
            _task_id: &str,
            _task_name: &str,
            _status: &str,
            tasks_completed: i64,
            tasks_total: i64,
            _commit: Option<&str>,
        ) -> Result<ProgressResponse> {
            self.progress_calls.lock().unwrap().push(tasks_completed);
            Ok(ProgressResponse {
                swarm_id: swarm_id.to_string(),
                packet_id,
                tasks_completed,
                tasks_total,
                created_at: "2026-01-01T00:00:00Z".to_string(),
            })
        }

        async fn report_complete(
            &self,
            swarm_id: &str,
            packet_id: i64,
            _final_commit: &str,
            _tests_passed: bool,
            _review_passed: bool,
        ) -> Result<CompleteResponse> {
            Ok(CompleteResponse {
                swarm_id: swarm_id.to_string(),
                packet_id,
                swarm_complete: true,
                remaining_workers: 0,
                created_at: "2026-01-01T00:00:00Z".to_string(),
            })
        }

        async fn report_error(
            &self,
            swarm_id: &str,
            packet_id: i64,
            _task_id: &str,
            _error_type: &str,
            _message: &str,
            recoverable: bool,
        ) -> Result<ErrorResponse> {
            Ok(ErrorResponse {
                swarm_id: swarm_id.to_string(),
                packet_id,
                retry_scheduled: recoverable,
                retry_in_seconds: recoverable.then_some(30),
                created_at: "2026-01-01T00:00:00Z".to_string(),
            })
        }

        async fn get_status(&self, _swarm_id: &str) -> Result<crate::protocol::SwarmStatusResponse> {
            unimplemented!("not exercised by these tests")
        }
    }

    #[tokio::test]
    async fn register_writes_checkpoint_before_calling_backend() {
        let dir = tempdir().unwrap();
        let worker = SwarmWorker::new(
            "swarm-1",
            1,
            "core-api",
            dir.path(),
            3,
            Box::new(FakeBackend::default()),
        );

        worker.register().await.unwrap();

        let checkpoint = std::fs::read_to_string(worker.checkpoint_file()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&checkpoint).unwrap();
        assert_eq!(parsed["event"], "registered");
    }

    #[tokio::test]
    async fn report_progress_increments_counter_only_on_completed_status() {
        let dir = tempdir().unwrap();
        let mut worker = SwarmWorker::new(
            "swarm-1",
            1,
            "core-api",
            dir.path(),
            3,
            Box::new(FakeBackend::default()),
        );

        worker.report_progress("task-1", "t1", "started", None).await.unwrap();
        assert_eq!(worker.tasks_completed, 0);

        let resp = worker
            .report_progress("task-1", "t1", "completed", Some("abcdef1"))
            .await
            .unwrap();
        assert_eq!(resp.tasks_completed, 1);
        assert_eq!(worker.tasks_completed, 1);
    }
}

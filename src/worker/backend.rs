//! The seam between a worker and wherever the coordination server actually lives.
//! `HttpBackend` is the only production implementation; the trait exists so tests
//! can swap in a fake that never makes a network call.

use async_trait::async_trait;

use crate::protocol::{
    CompleteResponse, ErrorResponse, ProgressResponse, RegisterResponse, SwarmStatusResponse,
};

#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    async fn register_worker(
        &self,
        swarm_id: &str,
        packet_id: i64,
        packet_name: &str,
        tasks_total: i64,
        worktree: &str,
    ) -> anyhow::Result<RegisterResponse>;

    #[allow(clippy::too_many_arguments)]
    async fn report_progress(
        &self,
        swarm_id: &str,
        packet_id: i64,
        task_id: &str,
        task_name: &str,
        status: &str,
        tasks_completed: i64,
        tasks_total: i64,
        commit: Option<&str>,
    ) -> anyhow::Result<ProgressResponse>;

    async fn report_complete(
        &self,
        swarm_id: &str,
        packet_id: i64,
        final_commit: &str,
        tests_passed: bool,
        review_passed: bool,
    ) -> anyhow::Result<CompleteResponse>;

    async fn report_error(
        &self,
        swarm_id: &str,
        packet_id: i64,
        task_id: &str,
        error_type: &str,
        message: &str,
        recoverable: bool,
    ) -> anyhow::Result<ErrorResponse>;

    async fn get_status(&self, swarm_id: &str) -> anyhow::Result<SwarmStatusResponse>;
}

//! `reqwest`-based `CoordinationBackend` that talks to a running coordination server.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::protocol::{
    CompleteResponse, ErrorResponse, ProgressResponse, RegisterResponse, SwarmStatusResponse,
};

use super::backend::CoordinationBackend;

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// `timeout` should sit in the 5-15s range documented for this seam: long enough to
    /// survive a loaded server, short enough that a hung connection doesn't stall the worker.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{url} returned {status}: {text}"));
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }
}

#[async_trait]
impl CoordinationBackend for HttpBackend {
    async fn register_worker(
        &self,
        swarm_id: &str,
        packet_id: i64,
        packet_name: &str,
        tasks_total: i64,
        worktree: &str,
    ) -> Result<RegisterResponse> {
        self.post_json(
            &format!("/swarm/{swarm_id}/register"),
            json!({
                "packet_id": packet_id,
                "packet_name": packet_name,
                "tasks_total": tasks_total,
                "worktree": worktree,
            }),
        )
        .await
    }

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
    ) -> Result<ProgressResponse> {
        self.post_json(
            &format!("/swarm/{swarm_id}/progress"),
            json!({
                "packet_id": packet_id,
                "task_id": task_id,
                "task_name": task_name,
                "status": status,
                "tasks_completed": tasks_completed,
                "tasks_total": tasks_total,
                "commit": commit,
            }),
        )
        .await
    }

    async fn report_complete(
        &self,
        swarm_id: &str,
        packet_id: i64,
        final_commit: &str,
        tests_passed: bool,
        review_passed: bool,
    ) -> Result<CompleteResponse> {
        self.post_json(
            &format!("/swarm/{swarm_id}/complete"),
            json!({
                "packet_id": packet_id,
                "final_commit": final_commit,
                "tests_passed": tests_passed,
                "review_passed": review_passed,
            }),
        )
        .await
    }

    async fn report_error(
        &self,
        swarm_id: &str,
        packet_id: i64,
        task_id: &str,
        error_type: &str,
        message: &str,
        recoverable: bool,
    ) -> Result<ErrorResponse> {
        self.post_json(
            &format!("/swarm/{swarm_id}/error"),
            json!({
                "packet_id": packet_id,
                "task_id": task_id,
                "error_type": error_type,
                "message": message,
                "recoverable": recoverable,
            }),
        )
        .await
    }

    async fn get_status(&self, swarm_id: &str) -> Result<SwarmStatusResponse> {
        let url = format!("{}/swarm/{swarm_id}/status", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(anyhow!("{url} returned {status}"));
        }

        resp.json()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_nothing_for_a_well_formed_base_url() {
        let backend = HttpBackend::new("http://127.0.0.1:7432", Duration::from_secs(10));
        assert!(backend.is_ok());
    }
}

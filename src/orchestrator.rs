//! Thin client for the workload orchestrator's HTTP API (Nomad). Only the
//! calls the instance-scaling handlers need: job lookup, group scaling, job
//! re-registration, and allocation stop.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OrchestratorSection;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A job as returned by the orchestrator. Unmodeled fields round-trip
/// through `extra` so re-registration doesn't strip the job spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TaskGroups", default)]
    pub task_groups: Vec<TaskGroup>,
    #[serde(rename = "Meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Count")]
    pub count: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
}

/// The orchestrator capabilities the handlers depend on.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn job_info(&self, name: &str) -> Result<Job, OrchestratorError>;
    async fn scale_group(
        &self,
        job_id: &str,
        group: &str,
        count: i64,
        reason: &str,
    ) -> Result<(), OrchestratorError>;
    async fn register_job(&self, job: &Job) -> Result<(), OrchestratorError>;
    async fn allocation_info(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError>;
    async fn stop_allocation(&self, alloc_id: &str) -> Result<(), OrchestratorError>;
}

pub struct NomadClient {
    http: reqwest::Client,
    base: String,
}

impl NomadClient {
    pub fn new(cfg: &OrchestratorSection) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: cfg.address.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Orchestrator for NomadClient {
    async fn job_info(&self, name: &str) -> Result<Job, OrchestratorError> {
        let job = self
            .http
            .get(format!("{}/v1/job/{name}", self.base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(job)
    }

    async fn scale_group(
        &self,
        job_id: &str,
        group: &str,
        count: i64,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        self.http
            .post(format!("{}/v1/job/{job_id}/scale", self.base))
            .json(&serde_json::json!({
                "Count": count,
                "Target": { "Group": group },
                "Message": reason,
                "Error": false,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn register_job(&self, job: &Job) -> Result<(), OrchestratorError> {
        self.http
            .post(format!("{}/v1/jobs", self.base))
            .json(&serde_json::json!({ "Job": job }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn allocation_info(&self, alloc_id: &str) -> Result<Allocation, OrchestratorError> {
        let alloc = self
            .http
            .get(format!("{}/v1/allocation/{alloc_id}", self.base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(alloc)
    }

    async fn stop_allocation(&self, alloc_id: &str) -> Result<(), OrchestratorError> {
        self.http
            .post(format!("{}/v1/allocation/{alloc_id}/stop", self.base))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_round_trips_unmodeled_fields() {
        let raw = serde_json::json!({
            "ID": "lobby",
            "TaskGroups": [{"Name": "lobby", "Count": 2, "Networks": []}],
            "Datacenters": ["dc1"],
        });
        let job: Job = serde_json::from_value(raw).unwrap();
        assert_eq!(job.task_groups[0].count, Some(2));

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["Datacenters"][0], "dc1");
        assert_eq!(back["TaskGroups"][0]["Networks"], serde_json::json!([]));
    }
}

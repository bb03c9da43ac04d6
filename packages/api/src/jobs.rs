//! Job listing, inspection and cancellation.

use serde::{Deserialize, Serialize};
use studio_core::Job;

use crate::models::ActionResponse;
use crate::training::parse_job_id;
use crate::{ApiError, Studio};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job: Job,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelJobRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

impl Studio {
    /// `GET /jobs`
    pub async fn list_jobs(&self) -> Result<JobList, ApiError> {
        let jobs = self.scheduler().list().await?;
        Ok(JobList { jobs })
    }

    /// `GET /jobs/:id`
    pub async fn job_status(&self, id: &str) -> Result<JobResponse, ApiError> {
        let job = self.scheduler().status(parse_job_id(id)?).await?;
        Ok(JobResponse { job })
    }

    /// `POST /jobs/:id/cancel`
    ///
    /// The job stops at its next epoch or step boundary; poll or subscribe to
    /// observe the cancelled state.
    pub async fn cancel_job(
        &self,
        id: &str,
        request: CancelJobRequest,
    ) -> Result<ActionResponse, ApiError> {
        let job_id = parse_job_id(id)?;
        self.scheduler().cancel(job_id, request.reason).await?;
        Ok(ActionResponse::new(true, "Cancellation requested"))
    }
}

//! Turns a submit-then-poll job API into one awaited call.
//!
//! The loop sleeps for [`PollConfig::interval`] between status checks, stops on
//! the first terminal status, and gives up after [`PollConfig::max_attempts`]
//! checks. A cancelled token ends the loop at the next suspension point.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::profile::PollConfig;
use crate::{ImagegateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Anything the provider reports that is not a known terminal value keeps
    /// the job pending.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeeded" | "success" | "completed" => Self::Succeeded,
            "failed" | "canceled" | "cancelled" | "error" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::from_provider).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct JobFields {
    id: String,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    output: Option<Value>,
}

/// Provider-side job snapshot. Only ever read; the provider owns its state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub output: Option<Value>,
    /// The full status document, kept for failure diagnostics.
    pub raw: Value,
}

impl Job {
    pub fn from_value(raw: Value) -> Result<Self> {
        let fields = serde_json::from_value::<JobFields>(raw.clone())?;
        if fields.id.trim().is_empty() {
            return Err(ImagegateError::InvalidResponse(
                "job response has an empty id".to_string(),
            ));
        }
        Ok(Self {
            id: fields.id,
            status: fields.status,
            output: fields.output,
            raw,
        })
    }

    /// First output element: the output itself when it is a string, otherwise
    /// the first string in an output array.
    pub fn first_output(&self) -> Result<String> {
        let first = match self.output.as_ref() {
            Some(Value::String(url)) => Some(url.as_str()),
            Some(Value::Array(items)) => items.first().and_then(Value::as_str),
            _ => None,
        };
        first
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ImagegateError::InvalidResponse(format!("job {} succeeded without output", self.id))
            })
    }
}

/// The three calls a job API has to offer.
#[async_trait]
pub trait JobClient: Send + Sync {
    type Submission: Send + Sync;

    async fn submit(&self, submission: &Self::Submission) -> Result<Job>;
    async fn status(&self, id: &str) -> Result<Job>;
    async fn download(&self, url: &str) -> Result<Bytes>;
}

/// Submits, waits for a terminal status, then downloads the first output.
pub async fn run_job<C>(
    client: &C,
    submission: &C::Submission,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Bytes>
where
    C: JobClient + ?Sized,
{
    let job = client.submit(submission).await?;
    tracing::info!(job_id = %job.id, status = ?job.status, "job submitted");
    let job = wait_for_terminal(client, job, poll, cancel).await?;
    let url = job.first_output()?;
    tracing::debug!(job_id = %job.id, %url, "downloading job output");
    client.download(&url).await
}

/// Polls until `job` is terminal. Returns the succeeded snapshot.
pub async fn wait_for_terminal<C>(
    client: &C,
    mut job: Job,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Job>
where
    C: JobClient + ?Sized,
{
    let mut attempts: u32 = 0;
    loop {
        if job.status.is_terminal() {
            if job.status == JobStatus::Failed {
                tracing::warn!(job_id = %job.id, attempts, "job failed");
                return Err(ImagegateError::JobFailed {
                    id: job.id,
                    payload: job.raw,
                });
            }
            tracing::info!(job_id = %job.id, attempts, "job succeeded");
            return Ok(job);
        }

        if attempts >= poll.max_attempts {
            tracing::warn!(job_id = %job.id, attempts, "job still pending; giving up");
            return Err(ImagegateError::Timeout {
                id: job.id,
                attempts,
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImagegateError::Cancelled { id: job.id.clone() }),
            _ = tokio::time::sleep(poll.interval()) => {}
        }

        attempts += 1;
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImagegateError::Cancelled { id: job.id.clone() }),
            next = client.status(&job.id) => next?,
        };
        tracing::debug!(job_id = %job.id, attempt = attempts, status = ?next.status, "polled job");
        job = next;
    }
}

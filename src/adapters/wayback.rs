//! Wayback Machine client (Save Page Now 2 + availability API).
//!
//! Endpoints:
//! - GET  {availability_url}?url=...      - closest existing snapshot
//! - POST {base_url}/save                 - submit a capture job
//! - GET  {base_url}/save/status/{job_id} - job progress

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{ArchiveCredentials, WaybackSettings};
use crate::core::poll_until;

use super::{ArchiveService, CaptureState, CaptureStatus, JobHandle, SaveOptions};

/// Wayback Machine client
pub struct WaybackClient {
    base_url: String,
    availability_url: String,
    credentials: ArchiveCredentials,
    status_poll: Duration,
    completion_timeout: Duration,
    client: reqwest::Client,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    available: bool,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    job_id: Option<String>,
    url: Option<String>,
    message: Option<String>,
    status_ext: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
    status_ext: Option<String>,
    timestamp: Option<String>,
    original_url: Option<String>,
}

impl AvailabilityResponse {
    fn is_available(&self) -> bool {
        self.archived_snapshots
            .closest
            .as_ref()
            .is_some_and(|snapshot| snapshot.available)
    }
}

impl StatusResponse {
    /// `None` while the job is still running
    fn terminal(self) -> Option<CaptureStatus> {
        match self.status.as_str() {
            "pending" => None,
            "success" => {
                let message = match (self.timestamp, self.original_url) {
                    (Some(ts), Some(url)) => Some(format!("Captured {} at {}", url, ts)),
                    (Some(ts), None) => Some(format!("Captured at {}", ts)),
                    _ => self.message,
                };
                Some(CaptureStatus::new(CaptureState::Success, message))
            }
            _ => {
                let message = self.message.or(self.status_ext);
                Some(CaptureStatus::new(CaptureState::Error, message))
            }
        }
    }
}

/// Render a duration the way the save endpoint expects (`365d`, `1d 2h 5m`, `30s`)
pub fn format_timedelta(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut parts = Vec::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        let count = secs / size;
        if count > 0 {
            parts.push(format!("{}{}", count, unit));
            secs %= size;
        }
    }
    parts.join(" ")
}

// ============================================================================
// Client
// ============================================================================

impl WaybackClient {
    /// Create a client from settings and credentials
    pub fn new(settings: &WaybackSettings, credentials: ArchiveCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("tzarchiver/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Wayback HTTP client")?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            availability_url: settings.availability_url.clone(),
            credentials,
            status_poll: settings.status_poll_interval(),
            completion_timeout: settings.completion_timeout(),
            client,
        })
    }

    async fn fetch_status(&self, job: &JobHandle) -> Result<StatusResponse> {
        let url = format!("{}/save/status/{}", self.base_url, job.job_id);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("Authorization", self.credentials.authorization())
            .send()
            .await
            .with_context(|| format!("Failed to query job status {}", job.job_id))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Wayback status error ({}): {}", status, text);
        }

        response
            .json()
            .await
            .context("Failed to parse job status response")
    }
}

#[async_trait]
impl ArchiveService for WaybackClient {
    async fn check_indexed(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .get(&self.availability_url)
            .query(&[("url", url)])
            .send()
            .await
            .context("Failed to query availability API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Availability API error ({})", status);
        }

        let body: AvailabilityResponse = response
            .json()
            .await
            .context("Failed to parse availability response")?;

        if let Some(snapshot) = &body.archived_snapshots.closest {
            debug!(url, snapshot = ?snapshot.url, "Closest snapshot");
        }

        Ok(body.is_available())
    }

    async fn submit(&self, url: &str, options: &SaveOptions) -> Result<JobHandle> {
        let endpoint = format!("{}/save", self.base_url);
        let form = [
            ("url", url.to_string()),
            ("js_behavior_timeout", options.js_behavior_timeout.to_string()),
            (
                "delay_wb_availability",
                u8::from(options.delay_availability).to_string(),
            ),
            (
                "if_not_archived_within",
                format_timedelta(options.if_not_archived_within),
            ),
        ];

        let response = self
            .client
            .post(&endpoint)
            .header("Accept", "application/json")
            .header("Authorization", self.credentials.authorization())
            .form(&form)
            .send()
            .await
            .with_context(|| format!("Failed to submit {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Wayback save error ({}): {}", status, text);
        }

        let body: SaveResponse = response
            .json()
            .await
            .context("Failed to parse save response")?;

        match body.job_id {
            Some(job_id) => Ok(JobHandle {
                job_id,
                url: body.url.unwrap_or_else(|| url.to_string()),
            }),
            None => {
                let reason = body
                    .message
                    .or(body.status_ext)
                    .unwrap_or_else(|| "no job id in response".to_string());
                anyhow::bail!("Save rejected: {}", reason)
            }
        }
    }

    async fn await_completion(&self, job: &JobHandle) -> Result<CaptureStatus> {
        let outcome = poll_until(self.status_poll, self.completion_timeout, || async move {
            match self.fetch_status(job).await {
                Ok(status) => status.terminal().map(Ok),
                Err(e) => Some(Err(e)),
            }
        })
        .await;

        match outcome {
            Some(result) => result,
            None => {
                warn!(job_id = %job.job_id, "Capture still pending at completion timeout");
                Ok(CaptureStatus::new(
                    CaptureState::Pending,
                    Some(format!("Job {} still pending", job.job_id)),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_parsing() {
        let body: AvailabilityResponse = serde_json::from_str(
            r#"{"url":"x","archived_snapshots":{"closest":{"status":"200","available":true,
               "url":"http://web.archive.org/web/2024/x","timestamp":"2024"}}}"#,
        )
        .unwrap();
        assert!(body.is_available());

        let body: AvailabilityResponse =
            serde_json::from_str(r#"{"url":"x","archived_snapshots":{}}"#).unwrap();
        assert!(!body.is_available());
    }

    #[test]
    fn test_status_mapping() {
        let pending: StatusResponse =
            serde_json::from_str(r#"{"status":"pending","job_id":"j"}"#).unwrap();
        assert!(pending.terminal().is_none());

        let success: StatusResponse = serde_json::from_str(
            r#"{"status":"success","timestamp":"20240101000000","original_url":"https://gw/Qm"}"#,
        )
        .unwrap();
        let status = success.terminal().unwrap();
        assert_eq!(status.state, CaptureState::Success);
        assert!(status.message.unwrap().contains("20240101000000"));

        let failed: StatusResponse = serde_json::from_str(
            r#"{"status":"error","status_ext":"error:too-many-daily-captures"}"#,
        )
        .unwrap();
        let status = failed.terminal().unwrap();
        assert_eq!(status.state, CaptureState::Error);
        assert_eq!(
            status.message.as_deref(),
            Some("error:too-many-daily-captures")
        );
    }

    #[test]
    fn test_save_response_without_job_id() {
        let body: SaveResponse =
            serde_json::from_str(r#"{"message":"You have already reached the limit"}"#).unwrap();
        assert!(body.job_id.is_none());
        assert_eq!(
            body.message.as_deref(),
            Some("You have already reached the limit")
        );
    }

    #[test]
    fn test_format_timedelta() {
        assert_eq!(format_timedelta(Duration::from_secs(31_536_000)), "365d");
        assert_eq!(format_timedelta(Duration::from_secs(90_061)), "1d 1h 1m 1s");
        assert_eq!(format_timedelta(Duration::from_secs(3_600)), "1h");
        assert_eq!(format_timedelta(Duration::ZERO), "0s");
    }
}

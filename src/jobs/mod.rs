//! Publish job tracking
//!
//! Every publish request gets a job: the synchronous path returns its id
//! immediately and the detached execution task is the job's only writer.
//! Pollers read snapshots through [`JobStore::get`]. Jobs are process
//! local and garbage-collected after an age threshold; a restart forgets
//! in-flight jobs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Platform;
use crate::platforms::PublishOutcome;

// ============================================================================
// Job Model
// ============================================================================

/// Overall status of a publish job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, execution not yet started
    Starting,

    /// Validating media and resolving content
    Preparing,

    /// Platform adapters running
    Publishing,

    /// All platforms attempted, result recorded
    Completed,

    /// The orchestration itself failed before completing
    Failed,
}

impl JobStatus {
    /// Check if the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-platform sub-status within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformState {
    Publishing,
    Completed,
    Failed,
}

/// Aggregate outcome discriminant for a finished job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Every requested platform succeeded
    Success,

    /// At least one platform succeeded, at least one failed
    Partial,

    /// Every requested platform failed
    Error,
}

/// Final aggregate payload of a completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    /// Aggregate discriminant
    pub status: ReportStatus,

    /// Per-platform outcomes, keyed by platform
    pub platforms: HashMap<Platform, PublishOutcome>,

    /// Names of platforms that failed (for targeted retries)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_platforms: Vec<String>,
}

/// A tracked publish job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque job identifier
    pub job_id: String,

    /// Owning user
    pub user_id: String,

    /// Overall status
    pub status: JobStatus,

    /// Advisory progress, 0-100, never decreases
    pub progress: u8,

    /// Latest human-readable status line
    pub message: String,

    /// Per-platform sub-status map (merge-only)
    pub platforms: HashMap<Platform, PlatformState>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Final aggregate result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PublishReport>,

    /// Terminal failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: JobStatus::Starting,
            progress: 0,
            message: "initializing".to_string(),
            platforms: HashMap::new(),
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Age of the job since creation
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

// ============================================================================
// Job Update Patch
// ============================================================================

/// Partial update merged into a job
///
/// Absent fields leave the job untouched; the platform map is merged
/// entry-by-entry, never replaced.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub platforms: HashMap<Platform, PlatformState>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn platform(mut self, platform: Platform, state: PlatformState) -> Self {
        self.platforms.insert(platform, state);
        self
    }
}

// ============================================================================
// Job Store
// ============================================================================

/// Storage seam for publish jobs
///
/// The in-memory implementation is the only one shipped; a persistent
/// backend would implement the same atomic merge-update semantics.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job and return its id
    async fn create(&self, user_id: &str) -> String;

    /// Merge a patch into a job; silent no-op on unknown or terminal jobs
    async fn update(&self, job_id: &str, patch: JobUpdate);

    /// Mark a job completed with its final result
    async fn complete(&self, job_id: &str, result: PublishReport);

    /// Mark a job failed with an error detail
    async fn fail(&self, job_id: &str, error: String);

    /// Get a snapshot of a job
    async fn get(&self, job_id: &str) -> Option<Job>;

    /// Remove jobs older than the given age; returns how many were evicted
    async fn cleanup(&self, max_age: Duration) -> usize;
}

/// In-memory job store behind one table lock
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a background task that periodically evicts old jobs
    pub fn start_cleanup_task(
        self: Arc<Self>,
        interval_secs: u64,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));

            loop {
                interval.tick().await;
                let evicted = self.cleanup(max_age).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted aged-out jobs");
                }
            }
        })
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, user_id: &str) -> String {
        let job = Job::new(user_id);
        let job_id = job.job_id.clone();

        self.jobs.write().await.insert(job_id.clone(), job);
        job_id
    }

    async fn update(&self, job_id: &str, patch: JobUpdate) {
        let mut jobs = self.jobs.write().await;

        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(progress) = patch.progress {
            // Progress is advisory and never moves backwards
            job.progress = job.progress.max(progress.min(100));
        }
        if let Some(message) = patch.message {
            job.message = message;
        }
        for (platform, state) in patch.platforms {
            job.platforms.insert(platform, state);
        }

        job.updated_at = Utc::now();
    }

    async fn complete(&self, job_id: &str, result: PublishReport) {
        let mut jobs = self.jobs.write().await;

        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };

        job.status = JobStatus::Completed;
        job.progress = 100;
        job.message = "publishing completed".to_string();
        job.result = Some(result);
        job.updated_at = Utc::now();
    }

    async fn fail(&self, job_id: &str, error: String) {
        let mut jobs = self.jobs.write().await;

        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };

        job.status = JobStatus::Failed;
        job.message = "publishing failed".to_string();
        job.error = Some(error);
        job.updated_at = Utc::now();
    }

    async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn cleanup(&self, max_age: Duration) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();

        jobs.retain(|_, job| job.age() <= max_age);
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.user_id, "user-1");
        assert_eq!(job.status, JobStatus::Starting);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let store = InMemoryJobStore::new();
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_job_is_noop() {
        let store = InMemoryJobStore::new();
        store
            .update("missing", JobUpdate::new().progress(50))
            .await;
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        store.update(&job_id, JobUpdate::new().progress(60)).await;
        store.update(&job_id, JobUpdate::new().progress(30)).await;

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.progress, 60);
    }

    #[tokio::test]
    async fn test_platform_map_merges() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        store
            .update(
                &job_id,
                JobUpdate::new().platform(Platform::Facebook, PlatformState::Publishing),
            )
            .await;
        store
            .update(
                &job_id,
                JobUpdate::new().platform(Platform::Instagram, PlatformState::Publishing),
            )
            .await;
        store
            .update(
                &job_id,
                JobUpdate::new().platform(Platform::Facebook, PlatformState::Completed),
            )
            .await;

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.platforms.len(), 2);
        assert_eq!(
            job.platforms.get(&Platform::Facebook),
            Some(&PlatformState::Completed)
        );
        assert_eq!(
            job.platforms.get(&Platform::Instagram),
            Some(&PlatformState::Publishing)
        );
    }

    #[tokio::test]
    async fn test_complete_sets_terminal_state() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        let report = PublishReport {
            status: ReportStatus::Success,
            platforms: HashMap::new(),
            failed_platforms: Vec::new(),
        };
        store.complete(&job_id, report).await;

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
    }

    #[tokio::test]
    async fn test_terminal_job_ignores_updates() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        store.fail(&job_id, "credential resolution blew up".to_string()).await;
        let snapshot = store.get(&job_id).await.unwrap();

        store
            .update(&job_id, JobUpdate::new().progress(99).message("late"))
            .await;

        let after = store.get(&job_id).await.unwrap();
        assert_eq!(after.progress, snapshot.progress);
        assert_eq!(after.message, snapshot.message);
        assert_eq!(after.status, JobStatus::Failed);
        assert_eq!(after.error.as_deref(), Some("credential resolution blew up"));
    }

    #[tokio::test]
    async fn test_cleanup_evicts_old_jobs() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        // Backdate the job past the age threshold
        {
            let mut jobs = store.jobs.write().await;
            let job = jobs.get_mut(&job_id).unwrap();
            job.created_at = Utc::now() - Duration::minutes(120);
        }

        let evicted = store.cleanup(Duration::minutes(60)).await;
        assert_eq!(evicted, 1);
        assert!(store.get(&job_id).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_jobs() {
        let store = InMemoryJobStore::new();
        let job_id = store.create("user-1").await;

        let evicted = store.cleanup(Duration::minutes(60)).await;
        assert_eq!(evicted, 0);
        assert!(store.get(&job_id).await.is_some());
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Publishing.is_terminal());
        assert!(!JobStatus::Starting.is_terminal());
    }
}

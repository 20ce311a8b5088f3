//! Publish orchestration
//!
//! The publisher is the state machine behind every publish request. The
//! synchronous half validates the request (platform names, Instagram's
//! media requirement, connected credentials), creates a job, and returns
//! its id in credential-lookup time. The detached half drives each
//! platform adapter in turn, records per-platform outcomes in the job,
//! persists the bound post's final status, and completes the job with an
//! aggregate report.
//!
//! Platforms are independent: one adapter's failure is recorded and the
//! next adapter still runs. Only a failure of the orchestration itself
//! (not of any platform) moves the job to `failed`.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::jobs::{JobStatus, JobStore, JobUpdate, PlatformState, PublishReport, ReportStatus};
use crate::media::MediaValidator;
use crate::models::{build_caption, MediaItem, Platform, PostStatus};
use crate::platforms::{
    FacebookClient, InstagramClient, LinkedInClient, PlatformPublisher, PollPolicy, PostContent,
    PublishError, PublishOutcome,
};
use crate::stores::{CredentialStore, PlatformCredential, PostStore};

// ============================================================================
// Publish Request
// ============================================================================

/// A publish submission, either from the HTTP surface or the scheduler
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Requesting user
    pub user_id: String,

    /// Stored post to bind results to, if any
    pub post_id: Option<String>,

    /// Caption text
    pub caption: Option<String>,

    /// Hashtags appended to the caption
    pub hashtags: Vec<String>,

    /// Legacy single-image field; used when `media` is empty
    pub image: Option<String>,

    /// Media items
    pub media: Vec<MediaItem>,

    /// Raw platform names as submitted
    pub platforms: Vec<String>,
}

impl PublishRequest {
    /// Resolve the effective media list
    ///
    /// The explicit media array wins over the legacy single-image field;
    /// items come back sorted by order index.
    pub fn resolve_media(&self) -> Vec<MediaItem> {
        if !self.media.is_empty() {
            let mut media = self.media.clone();
            media.sort_by_key(|m| m.order);
            return media;
        }

        match &self.image {
            Some(url) if !url.is_empty() => vec![MediaItem::image(url.clone(), 0)],
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Submission Errors
// ============================================================================

/// Synchronous request rejections; no job is created for these
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("unsupported platform: {0}")]
    UnknownPlatform(String),

    #[error("no platforms requested")]
    NoPlatforms,

    #[error("{platform} requires at least one media item")]
    MediaRequired { platform: Platform },

    #[error("{platform} account not connected")]
    CredentialsMissing { platform: Platform },

    #[error("media must be hosted at a public URL: {0}")]
    NonPublicMedia(String),

    #[error("post not found: {0}")]
    UnknownPost(String),

    #[error("failed to construct {platform} client: {detail}")]
    ClientConstruction { platform: Platform, detail: String },
}

// ============================================================================
// Client Factory
// ============================================================================

/// Builds a platform adapter from resolved credentials
///
/// The HTTP factory is the production implementation; tests substitute
/// scripted adapters.
pub trait ClientFactory: Send + Sync {
    fn client(
        &self,
        platform: Platform,
        credential: &PlatformCredential,
    ) -> Result<Arc<dyn PlatformPublisher>, PublishError>;
}

/// Factory producing the real HTTP clients
pub struct HttpClientFactory {
    poll: PollPolicy,
    graph_base_url: Option<String>,
    linkedin_base_url: Option<String>,
}

impl HttpClientFactory {
    pub fn new(poll: PollPolicy) -> Self {
        Self {
            poll,
            graph_base_url: None,
            linkedin_base_url: None,
        }
    }

    /// Override the Graph API base URL (mock servers in tests)
    pub fn with_graph_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.graph_base_url = Some(base_url.into());
        self
    }

    /// Override the LinkedIn base URL (mock servers in tests)
    pub fn with_linkedin_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.linkedin_base_url = Some(base_url.into());
        self
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(PollPolicy::default())
    }
}

impl ClientFactory for HttpClientFactory {
    fn client(
        &self,
        platform: Platform,
        credential: &PlatformCredential,
    ) -> Result<Arc<dyn PlatformPublisher>, PublishError> {
        match (platform, credential) {
            (
                Platform::Facebook,
                PlatformCredential::Facebook {
                    page_id,
                    access_token,
                },
            ) => {
                let mut client =
                    FacebookClient::new(page_id, access_token)?.with_poll_policy(self.poll.clone());
                if let Some(base) = &self.graph_base_url {
                    client = client.with_base_url(base);
                }
                Ok(Arc::new(client))
            }
            (
                Platform::Instagram,
                PlatformCredential::Instagram {
                    ig_user_id,
                    access_token,
                },
            ) => {
                let mut client = InstagramClient::new(ig_user_id, access_token)?
                    .with_poll_policy(self.poll.clone());
                if let Some(base) = &self.graph_base_url {
                    client = client.with_base_url(base);
                }
                Ok(Arc::new(client))
            }
            (
                Platform::LinkedinPersonal | Platform::LinkedinCompany,
                PlatformCredential::LinkedIn {
                    member_id,
                    organization_id,
                    access_token,
                },
            ) => {
                let mut client =
                    LinkedInClient::new(member_id, access_token)?.with_poll_policy(self.poll.clone());
                if platform == Platform::LinkedinCompany {
                    match organization_id {
                        Some(org) => client = client.with_organization(org),
                        None => return Err(PublishError::CredentialsMissing),
                    }
                }
                if let Some(base) = &self.linkedin_base_url {
                    client = client.with_base_url(base);
                }
                Ok(Arc::new(client))
            }
            _ => Err(PublishError::CredentialsMissing),
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// The publish orchestrator
#[derive(Clone)]
pub struct Publisher {
    jobs: Arc<dyn JobStore>,
    credentials: Arc<dyn CredentialStore>,
    posts: Arc<dyn PostStore>,
    factory: Arc<dyn ClientFactory>,
    validator: Arc<MediaValidator>,
}

impl Publisher {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialStore>,
        posts: Arc<dyn PostStore>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            jobs,
            credentials,
            posts,
            factory,
            validator: Arc::new(MediaValidator::default()),
        }
    }

    /// Replace the media validator (custom tolerance)
    pub fn with_validator(mut self, validator: MediaValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Submit a publish request
    ///
    /// Validates synchronously, creates the job, spawns the detached
    /// execution task, and returns the job id. The returned id is ready
    /// for polling immediately.
    pub async fn submit(&self, request: PublishRequest) -> Result<String, SubmitError> {
        let targets = self.validate_request(&request).await?;

        let media = request.resolve_media();
        let caption = build_caption(
            request.caption.as_deref().unwrap_or_default(),
            &request.hashtags,
        );

        let job_id = self.jobs.create(&request.user_id).await;
        info!(%job_id, platforms = ?request.platforms, "publish job created");

        let publisher = self.clone();
        let spawn_job_id = job_id.clone();
        let post_id = request.post_id.clone();
        tokio::spawn(async move {
            publisher
                .run(spawn_job_id, caption, media, targets, post_id)
                .await;
        });

        Ok(job_id)
    }

    /// Submit a stored post through the same publish path
    pub async fn submit_for_post(&self, post: &crate::models::Post) -> Result<String, SubmitError> {
        let request = PublishRequest {
            user_id: post.user_id.clone(),
            post_id: Some(post.id.clone()),
            caption: Some(post.caption.clone()),
            hashtags: post.hashtags.clone(),
            image: None,
            media: post.media.clone(),
            platforms: post.platforms.iter().map(|p| p.id().to_string()).collect(),
        };

        self.submit(request).await
    }

    /// Synchronous request validation; returns the ready platform clients
    async fn validate_request(
        &self,
        request: &PublishRequest,
    ) -> Result<Vec<(Platform, Arc<dyn PlatformPublisher>)>, SubmitError> {
        let mut platforms: Vec<Platform> = Vec::new();
        for name in &request.platforms {
            let platform = Platform::parse(name)
                .ok_or_else(|| SubmitError::UnknownPlatform(name.clone()))?;
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }
        if platforms.is_empty() {
            return Err(SubmitError::NoPlatforms);
        }

        let media = request.resolve_media();
        for item in &media {
            if !item.has_public_url() {
                return Err(SubmitError::NonPublicMedia(item.url.clone()));
            }
        }

        for platform in &platforms {
            if platform.requires_media() && media.is_empty() {
                return Err(SubmitError::MediaRequired {
                    platform: *platform,
                });
            }
        }

        if let Some(post_id) = &request.post_id {
            if self.posts.get(post_id).await.is_none() {
                return Err(SubmitError::UnknownPost(post_id.clone()));
            }
        }

        let mut targets = Vec::with_capacity(platforms.len());
        for platform in platforms {
            let credential = self
                .credentials
                .get(&request.user_id, platform)
                .await
                .filter(|c| c.fits(platform))
                .ok_or(SubmitError::CredentialsMissing { platform })?;

            let client = self.factory.client(platform, &credential).map_err(|e| {
                match e {
                    PublishError::CredentialsMissing => {
                        SubmitError::CredentialsMissing { platform }
                    }
                    other => SubmitError::ClientConstruction {
                        platform,
                        detail: other.to_string(),
                    },
                }
            })?;
            targets.push((platform, client));
        }

        Ok(targets)
    }

    /// Detached execution wrapper; converts orchestration-level failures
    /// (including panics) into a failed job
    async fn run(
        &self,
        job_id: String,
        caption: String,
        media: Vec<MediaItem>,
        targets: Vec<(Platform, Arc<dyn PlatformPublisher>)>,
        post_id: Option<String>,
    ) {
        let execution = AssertUnwindSafe(self.execute(&job_id, caption, media, targets, post_id))
            .catch_unwind()
            .await;

        match execution {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(%job_id, error = %e, "publish orchestration failed");
                self.jobs.fail(&job_id, e.to_string()).await;
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "publish task panicked".to_string());
                error!(%job_id, %detail, "publish orchestration panicked");
                self.jobs.fail(&job_id, detail).await;
            }
        }
    }

    /// The publish state machine proper
    async fn execute(
        &self,
        job_id: &str,
        caption: String,
        media: Vec<MediaItem>,
        targets: Vec<(Platform, Arc<dyn PlatformPublisher>)>,
        post_id: Option<String>,
    ) -> anyhow::Result<()> {
        self.jobs
            .update(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Preparing)
                    .progress(5)
                    .message("validating media"),
            )
            .await;

        // Advisory carousel gate: an invalid set degrades to its first
        // item, it never aborts the publish
        let mut content_media = media;
        let mut degradation: Option<String> = None;

        if content_media.len() >= 2 {
            let report = self.validator.validate(&content_media).await;
            if !report.valid {
                warn!(job_id, message = %report.message, "aspect ratios mismatch, degrading to first item");
                degradation = Some(format!(
                    "aspect ratios mismatch across items; published first item only ({})",
                    report.message
                ));
                content_media.truncate(1);
            } else if let Some(warning) = &report.warning {
                info!(job_id, %warning, "aspect ratio validation incomplete");
            }
        }

        let content = PostContent::with_media(caption, content_media);
        let total = targets.len();

        self.jobs
            .update(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Publishing)
                    .progress(10)
                    .message(format!("publishing to {total} platform(s)")),
            )
            .await;

        let mut outcomes: HashMap<Platform, PublishOutcome> = HashMap::new();

        for (index, (platform, client)) in targets.into_iter().enumerate() {
            self.jobs
                .update(
                    job_id,
                    JobUpdate::new()
                        .message(format!("publishing to {platform}"))
                        .platform(platform, PlatformState::Publishing),
                )
                .await;

            let outcome = client.publish(&content).await;
            let outcome = apply_degradation(outcome, degradation.as_deref());

            let state = if outcome.published() {
                PlatformState::Completed
            } else {
                PlatformState::Failed
            };
            info!(job_id, %platform, status = outcome.status(), "platform attempt finished");

            let progress = 10 + (80 * (index + 1) / total) as u8;
            self.jobs
                .update(
                    job_id,
                    JobUpdate::new()
                        .progress(progress)
                        .message(format!("{platform}: {}", outcome.status()))
                        .platform(platform, state),
                )
                .await;

            outcomes.insert(platform, outcome);
        }

        let report = aggregate_report(outcomes);

        if let Some(post_id) = post_id {
            let any_success = report.status != ReportStatus::Error;
            let post_status = if any_success {
                PostStatus::Published
            } else {
                PostStatus::Failed
            };
            let published_at = any_success.then(chrono::Utc::now);

            let results: HashMap<String, serde_json::Value> = report
                .platforms
                .iter()
                .map(|(platform, outcome)| {
                    (
                        platform.id().to_string(),
                        serde_json::to_value(outcome).unwrap_or_default(),
                    )
                })
                .collect();

            self.posts
                .record_publish(&post_id, post_status, published_at, results)
                .await;
        }

        self.jobs.complete(job_id, report).await;
        Ok(())
    }
}

/// Fold an orchestrator-level degradation note into a platform outcome
fn apply_degradation(outcome: PublishOutcome, degradation: Option<&str>) -> PublishOutcome {
    match (outcome, degradation) {
        (PublishOutcome::Success { post }, Some(note)) => {
            PublishOutcome::partial(post, note.to_string())
        }
        (outcome, _) => outcome,
    }
}

/// Compute the aggregate report from per-platform outcomes
fn aggregate_report(outcomes: HashMap<Platform, PublishOutcome>) -> PublishReport {
    let mut failed_platforms: Vec<String> = outcomes
        .iter()
        .filter(|(_, outcome)| !outcome.published())
        .map(|(platform, _)| platform.id().to_string())
        .collect();
    failed_platforms.sort();

    let succeeded = outcomes.len() - failed_platforms.len();
    let status = if failed_platforms.is_empty() {
        ReportStatus::Success
    } else if succeeded > 0 {
        ReportStatus::Partial
    } else {
        ReportStatus::Error
    };

    PublishReport {
        status,
        platforms: outcomes,
        failed_platforms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobStore;
    use crate::platforms::{PublishKind, PublishedPost};
    use crate::stores::{InMemoryCredentialStore, InMemoryPostStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubPublisher {
        platform: Platform,
        outcome: PublishOutcome,
    }

    #[async_trait]
    impl PlatformPublisher for StubPublisher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn publish(&self, _content: &PostContent) -> PublishOutcome {
            self.outcome.clone()
        }
    }

    struct PanickingPublisher;

    #[async_trait]
    impl PlatformPublisher for PanickingPublisher {
        fn platform(&self) -> Platform {
            Platform::Facebook
        }

        async fn publish(&self, _content: &PostContent) -> PublishOutcome {
            panic!("adapter blew up");
        }
    }

    struct StubFactory {
        clients: HashMap<Platform, Arc<dyn PlatformPublisher>>,
    }

    impl ClientFactory for StubFactory {
        fn client(
            &self,
            platform: Platform,
            _credential: &PlatformCredential,
        ) -> Result<Arc<dyn PlatformPublisher>, PublishError> {
            self.clients
                .get(&platform)
                .cloned()
                .ok_or(PublishError::CredentialsMissing)
        }
    }

    fn success_outcome(kind: PublishKind) -> PublishOutcome {
        PublishOutcome::success(PublishedPost {
            post_id: "remote-1".to_string(),
            kind,
            item_count: 1,
            warning: None,
        })
    }

    async fn connect_all(credentials: &InMemoryCredentialStore, user: &str) {
        credentials
            .connect(
                user,
                Platform::Facebook,
                PlatformCredential::Facebook {
                    page_id: "page".to_string(),
                    access_token: "fb-token".to_string(),
                },
            )
            .await;
        credentials
            .connect(
                user,
                Platform::Instagram,
                PlatformCredential::Instagram {
                    ig_user_id: "ig".to_string(),
                    access_token: "ig-token".to_string(),
                },
            )
            .await;
    }

    struct Harness {
        publisher: Publisher,
        jobs: Arc<InMemoryJobStore>,
        posts: Arc<InMemoryPostStore>,
    }

    async fn harness(clients: HashMap<Platform, Arc<dyn PlatformPublisher>>) -> Harness {
        let jobs = Arc::new(InMemoryJobStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let posts = Arc::new(InMemoryPostStore::new());
        connect_all(&credentials, "u1").await;

        let publisher = Publisher::new(
            jobs.clone(),
            credentials,
            posts.clone(),
            Arc::new(StubFactory { clients }),
        );

        Harness {
            publisher,
            jobs,
            posts,
        }
    }

    async fn wait_terminal(jobs: &InMemoryJobStore, job_id: &str) -> crate::jobs::Job {
        for _ in 0..200 {
            if let Some(job) = jobs.get(job_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} did not reach a terminal state");
    }

    fn basic_request(platforms: &[&str]) -> PublishRequest {
        PublishRequest {
            user_id: "u1".to_string(),
            caption: Some("hello world".to_string()),
            platforms: platforms.iter().map(|s| s.to_string()).collect(),
            media: vec![MediaItem::image("https://cdn.example.com/a.jpg", 0)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_platform_rejected_synchronously() {
        let h = harness(HashMap::new()).await;
        let result = h.publisher.submit(basic_request(&["myspace"])).await;
        assert!(matches!(result, Err(SubmitError::UnknownPlatform(name)) if name == "myspace"));
    }

    #[tokio::test]
    async fn test_empty_platform_list_rejected() {
        let h = harness(HashMap::new()).await;
        let result = h.publisher.submit(basic_request(&[])).await;
        assert!(matches!(result, Err(SubmitError::NoPlatforms)));
    }

    #[tokio::test]
    async fn test_instagram_without_media_rejected_synchronously() {
        let h = harness(HashMap::new()).await;
        let mut request = basic_request(&["instagram"]);
        request.media.clear();

        let result = h.publisher.submit(request).await;
        assert!(matches!(
            result,
            Err(SubmitError::MediaRequired {
                platform: Platform::Instagram
            })
        ));
    }

    #[tokio::test]
    async fn test_facebook_without_media_accepted() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(
            Platform::Facebook,
            Arc::new(StubPublisher {
                platform: Platform::Facebook,
                outcome: success_outcome(PublishKind::Text),
            }),
        );
        let h = harness(clients).await;

        let mut request = basic_request(&["facebook"]);
        request.media.clear();

        let job_id = h.publisher.submit(request).await.unwrap();
        let job = wait_terminal(&h.jobs, &job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_synchronously() {
        let h = harness(HashMap::new()).await;
        // linkedin-personal was never connected for u1
        let result = h.publisher.submit(basic_request(&["linkedin-personal"])).await;
        assert!(matches!(
            result,
            Err(SubmitError::CredentialsMissing {
                platform: Platform::LinkedinPersonal
            })
        ));
    }

    #[tokio::test]
    async fn test_data_uri_media_rejected() {
        let h = harness(HashMap::new()).await;
        let mut request = basic_request(&["facebook"]);
        request.media = vec![MediaItem::image("data:image/png;base64,AAAA", 0)];

        let result = h.publisher.submit(request).await;
        assert!(matches!(result, Err(SubmitError::NonPublicMedia(_))));
    }

    #[tokio::test]
    async fn test_all_platforms_succeed_reports_success() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(
            Platform::Facebook,
            Arc::new(StubPublisher {
                platform: Platform::Facebook,
                outcome: success_outcome(PublishKind::Photo),
            }),
        );
        clients.insert(
            Platform::Instagram,
            Arc::new(StubPublisher {
                platform: Platform::Instagram,
                outcome: success_outcome(PublishKind::Photo),
            }),
        );
        let h = harness(clients).await;

        let job_id = h
            .publisher
            .submit(basic_request(&["facebook", "instagram"]))
            .await
            .unwrap();
        let job = wait_terminal(&h.jobs, &job_id).await;

        let report = job.result.unwrap();
        assert_eq!(report.status, ReportStatus::Success);
        assert!(report.failed_platforms.is_empty());
        assert_eq!(report.platforms.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_reports_partial_and_does_not_block_sibling() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(
            Platform::Facebook,
            Arc::new(StubPublisher {
                platform: Platform::Facebook,
                outcome: PublishOutcome::error("page deleted"),
            }),
        );
        clients.insert(
            Platform::Instagram,
            Arc::new(StubPublisher {
                platform: Platform::Instagram,
                outcome: success_outcome(PublishKind::Photo),
            }),
        );
        let h = harness(clients).await;

        let job_id = h
            .publisher
            .submit(basic_request(&["facebook", "instagram"]))
            .await
            .unwrap();
        let job = wait_terminal(&h.jobs, &job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        let report = job.result.unwrap();
        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.failed_platforms, vec!["facebook".to_string()]);

        // Instagram was still attempted and recorded
        assert_eq!(
            job.platforms.get(&Platform::Instagram),
            Some(&PlatformState::Completed)
        );
        assert_eq!(
            job.platforms.get(&Platform::Facebook),
            Some(&PlatformState::Failed)
        );
    }

    #[tokio::test]
    async fn test_all_failures_report_error_but_job_completes() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(
            Platform::Facebook,
            Arc::new(StubPublisher {
                platform: Platform::Facebook,
                outcome: PublishOutcome::error("down"),
            }),
        );
        let h = harness(clients).await;

        let job_id = h.publisher.submit(basic_request(&["facebook"])).await.unwrap();
        let job = wait_terminal(&h.jobs, &job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().status, ReportStatus::Error);
    }

    #[tokio::test]
    async fn test_orchestration_panic_fails_job_with_error() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(Platform::Facebook, Arc::new(PanickingPublisher));
        let h = harness(clients).await;

        let job_id = h.publisher.submit(basic_request(&["facebook"])).await.unwrap();
        let job = wait_terminal(&h.jobs, &job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("adapter blew up"));
    }

    #[tokio::test]
    async fn test_legacy_image_field_resolves_to_media() {
        let request = PublishRequest {
            image: Some("https://cdn.example.com/legacy.jpg".to_string()),
            ..Default::default()
        };

        let media = request.resolve_media();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].url, "https://cdn.example.com/legacy.jpg");
    }

    #[tokio::test]
    async fn test_explicit_media_wins_over_legacy_image() {
        let request = PublishRequest {
            image: Some("https://cdn.example.com/legacy.jpg".to_string()),
            media: vec![MediaItem::image("https://cdn.example.com/new.jpg", 0)],
            ..Default::default()
        };

        let media = request.resolve_media();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].url, "https://cdn.example.com/new.jpg");
    }

    #[tokio::test]
    async fn test_bound_post_marked_published_on_any_success() {
        let mut clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = HashMap::new();
        clients.insert(
            Platform::Facebook,
            Arc::new(StubPublisher {
                platform: Platform::Facebook,
                outcome: success_outcome(PublishKind::Photo),
            }),
        );
        clients.insert(
            Platform::Instagram,
            Arc::new(StubPublisher {
                platform: Platform::Instagram,
                outcome: PublishOutcome::error("container expired"),
            }),
        );
        let h = harness(clients).await;

        h.posts
            .upsert(crate::models::Post {
                id: "post-1".to_string(),
                user_id: "u1".to_string(),
                caption: "hi".to_string(),
                hashtags: vec![],
                media: vec![MediaItem::image("https://cdn.example.com/a.jpg", 0)],
                platforms: vec![Platform::Facebook, Platform::Instagram],
                status: PostStatus::Draft,
                scheduled_at: None,
                published_at: None,
                platform_results: HashMap::new(),
            })
            .await;

        let mut request = basic_request(&["facebook", "instagram"]);
        request.post_id = Some("post-1".to_string());

        let job_id = h.publisher.submit(request).await.unwrap();
        wait_terminal(&h.jobs, &job_id).await;

        let post = h.posts.get("post-1").await.unwrap();
        assert_eq!(post.status, PostStatus::Published);
        assert!(post.published_at.is_some());
        assert_eq!(post.platform_results.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_bound_post_rejected() {
        let h = harness(HashMap::new()).await;
        let mut request = basic_request(&["facebook"]);
        request.post_id = Some("ghost".to_string());

        // Clients are absent but post lookup fails first
        let result = h.publisher.submit(request).await;
        assert!(matches!(result, Err(SubmitError::UnknownPost(_))));
    }

    #[test]
    fn test_aggregate_report_ordering() {
        let mut outcomes = HashMap::new();
        outcomes.insert(Platform::Instagram, PublishOutcome::error("a"));
        outcomes.insert(Platform::Facebook, PublishOutcome::error("b"));

        let report = aggregate_report(outcomes);
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.failed_platforms, vec!["facebook", "instagram"]);
    }

    #[test]
    fn test_apply_degradation_downgrades_success() {
        let outcome = success_outcome(PublishKind::Photo);
        let degraded = apply_degradation(outcome, Some("ratios mismatched"));
        assert_eq!(degraded.status(), "partial");

        let error = apply_degradation(PublishOutcome::error("x"), Some("note"));
        assert_eq!(error.status(), "error");
    }
}

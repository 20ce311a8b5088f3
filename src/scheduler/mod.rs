//! Scheduled-post polling
//!
//! A thin interval loop over the post store: posts whose scheduled time
//! has elapsed are resubmitted through the regular publish path. The
//! resulting jobs run detached; nobody polls them synchronously.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::PostStatus;
use crate::publisher::Publisher;
use crate::stores::PostStore;

/// Interval poller for due scheduled posts
pub struct PostScheduler {
    posts: Arc<dyn PostStore>,
    publisher: Publisher,
    interval_secs: u64,
}

impl PostScheduler {
    pub fn new(posts: Arc<dyn PostStore>, publisher: Publisher, interval_secs: u64) -> Self {
        Self {
            posts,
            publisher,
            interval_secs,
        }
    }

    /// Scan once for due posts and submit them; returns how many were
    /// handed to the publisher
    ///
    /// A rejected submission (media or credentials gone since scheduling)
    /// marks the post failed with the rejection detail instead of leaving
    /// it to retry forever.
    pub async fn tick(&self) -> usize {
        let now = Utc::now();
        let due = self.posts.due_scheduled(now).await;

        if due.is_empty() {
            return 0;
        }
        info!(count = due.len(), "processing due scheduled posts");

        let mut submitted = 0;
        for post in due {
            match self.publisher.submit_for_post(&post).await {
                Ok(job_id) => {
                    info!(post_id = %post.id, %job_id, "scheduled post submitted");
                    submitted += 1;
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "scheduled post rejected");

                    let mut results = std::collections::HashMap::new();
                    results.insert(
                        "scheduler".to_string(),
                        serde_json::json!({ "status": "error", "detail": e.to_string() }),
                    );
                    self.posts
                        .record_publish(&post.id, PostStatus::Failed, None, results)
                        .await;
                }
            }
        }

        submitted
    }

    /// Start the background polling loop
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));

            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, JobStore};
    use crate::models::{MediaItem, Platform, Post};
    use crate::platforms::{
        PlatformPublisher, PostContent, PublishError, PublishKind, PublishOutcome, PublishedPost,
    };
    use crate::publisher::ClientFactory;
    use crate::stores::{
        CredentialStore, InMemoryCredentialStore, InMemoryPostStore, PlatformCredential,
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;

    struct AlwaysSucceeds(Platform);

    #[async_trait]
    impl PlatformPublisher for AlwaysSucceeds {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn publish(&self, _content: &PostContent) -> PublishOutcome {
            PublishOutcome::success(PublishedPost {
                post_id: "remote-1".to_string(),
                kind: PublishKind::Photo,
                item_count: 1,
                warning: None,
            })
        }
    }

    struct SucceedingFactory;

    impl ClientFactory for SucceedingFactory {
        fn client(
            &self,
            platform: Platform,
            _credential: &PlatformCredential,
        ) -> Result<std::sync::Arc<dyn PlatformPublisher>, PublishError> {
            Ok(std::sync::Arc::new(AlwaysSucceeds(platform)))
        }
    }

    fn due_post(id: &str, platforms: Vec<Platform>, media: Vec<MediaItem>) -> Post {
        Post {
            id: id.to_string(),
            user_id: "u1".to_string(),
            caption: "scheduled".to_string(),
            hashtags: vec![],
            media,
            platforms,
            status: PostStatus::Scheduled,
            scheduled_at: Some(Utc::now() - Duration::minutes(1)),
            published_at: None,
            platform_results: HashMap::new(),
        }
    }

    async fn setup() -> (Arc<InMemoryPostStore>, Arc<InMemoryJobStore>, PostScheduler) {
        let jobs = Arc::new(InMemoryJobStore::new());
        let posts = Arc::new(InMemoryPostStore::new());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials
            .connect(
                "u1",
                Platform::Facebook,
                PlatformCredential::Facebook {
                    page_id: "page".to_string(),
                    access_token: "token".to_string(),
                },
            )
            .await;

        let publisher = Publisher::new(
            jobs.clone() as Arc<dyn JobStore>,
            credentials as Arc<dyn CredentialStore>,
            posts.clone() as Arc<dyn PostStore>,
            Arc::new(SucceedingFactory),
        );
        let scheduler = PostScheduler::new(posts.clone(), publisher, 60);

        (posts, jobs, scheduler)
    }

    #[tokio::test]
    async fn test_tick_submits_due_posts() {
        let (posts, _jobs, scheduler) = setup().await;
        posts
            .upsert(due_post(
                "p1",
                vec![Platform::Facebook],
                vec![MediaItem::image("https://cdn.example.com/a.jpg", 0)],
            ))
            .await;

        let submitted = scheduler.tick().await;
        assert_eq!(submitted, 1);

        // The detached job eventually flips the post to published
        for _ in 0..200 {
            let post = posts.get("p1").await.unwrap();
            if post.status == PostStatus::Published {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("scheduled post never reached published status");
    }

    #[tokio::test]
    async fn test_tick_ignores_future_posts() {
        let (posts, _jobs, scheduler) = setup().await;
        let mut post = due_post(
            "p2",
            vec![Platform::Facebook],
            vec![MediaItem::image("https://cdn.example.com/a.jpg", 0)],
        );
        post.scheduled_at = Some(Utc::now() + Duration::minutes(30));
        posts.upsert(post).await;

        assert_eq!(scheduler.tick().await, 0);
        assert_eq!(
            posts.get("p2").await.unwrap().status,
            PostStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_rejected_submission_marks_post_failed() {
        let (posts, _jobs, scheduler) = setup().await;
        // Instagram without media is rejected at submission time
        posts
            .upsert(due_post("p3", vec![Platform::Instagram], vec![]))
            .await;

        let submitted = scheduler.tick().await;
        assert_eq!(submitted, 0);

        let post = posts.get("p3").await.unwrap();
        assert_eq!(post.status, PostStatus::Failed);
        assert!(post.platform_results.contains_key("scheduler"));
    }
}

//! Instagram publishing client
//!
//! Instagram (via the Graph API) requires at least one media item per
//! post. Single items publish through a direct container → publish flow;
//! reels add a processing poll in between; 2–10 items go through the
//! carousel path: per-item child containers, readiness polls, then one
//! parent container linking the children.

use async_trait::async_trait;
use governor::Quota;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{MediaItem, MediaType, Platform};

use super::{
    graph_error_detail, graph_is_rate_limited, graph_is_transient, DirectLimiter, MediaReadiness,
    PlatformPublisher, PollPolicy, PostContent, PublishError, PublishKind, PublishOutcome,
    PublishedPost,
};

/// Default Graph API endpoint
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// Graph API version used for all requests
const DEFAULT_API_VERSION: &str = "v21.0";

/// Maximum items in one carousel
const MAX_CAROUSEL_ITEMS: usize = 10;

/// Requests per second against the Graph API
const REQUESTS_PER_SECOND: u32 = 5;

/// Instagram Graph API client
pub struct InstagramClient {
    /// HTTP client with bounded timeout
    client: Client,

    /// Outbound request rate limiter
    limiter: DirectLimiter,

    /// Instagram business account id
    ig_user_id: String,

    /// Access token with publishing scope
    token: String,

    /// Base URL, overridable for mock servers
    base_url: String,

    /// Graph API version segment
    api_version: String,

    /// Media processing poll schedule
    poll: PollPolicy,
}

impl InstagramClient {
    /// Create a client with default timeout and poll policy
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Http` if the HTTP client cannot be built
    pub fn new(
        ig_user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::new(1).unwrap()),
        );

        Ok(Self {
            client,
            limiter: DirectLimiter::direct(quota),
            ig_user_id: ig_user_id.into(),
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            poll: PollPolicy::default(),
        })
    }

    /// Override the base URL (mock servers in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the poll policy
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.api_version, path)
    }

    /// POST a form to the Graph API and decode the JSON body
    ///
    /// Rate-limit responses (HTTP 429 or a throttling error code in the
    /// envelope) surface as `PublishError::RateLimited`; other error
    /// envelopes are left in the body for the caller to interpret.
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<Value, PublishError> {
        self.limiter.until_ready().await;

        let response = self.client.post(url).form(form).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || graph_is_rate_limited(&body) {
            return Err(PublishError::RateLimited);
        }

        Ok(body)
    }

    /// GET a container's processing status code
    async fn container_status(&self, container_id: &str) -> Result<String, PublishError> {
        self.limiter.until_ready().await;

        let url = self.endpoint(container_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", "status_code"),
                ("access_token", self.token.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || graph_is_rate_limited(&body) {
            return Err(PublishError::RateLimited);
        }

        match body.get("status_code").and_then(|v| v.as_str()) {
            Some(code) => Ok(code.to_string()),
            None => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| "missing status_code".to_string()),
            )),
        }
    }

    /// Create a media container and return its id
    async fn create_container(&self, form: &[(&str, String)]) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/media", self.ig_user_id));
        let body = self.post_form(&url, form).await?;

        match body.get("id").and_then(|v| v.as_str()) {
            Some(id) => Ok(id.to_string()),
            None => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            )),
        }
    }

    /// Publish a ready container and return the created post id
    async fn publish_container(&self, container_id: &str) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/media_publish", self.ig_user_id));
        let form = [
            ("creation_id", container_id.to_string()),
            ("access_token", self.token.clone()),
        ];
        let body = self.post_form(&url, &form).await?;

        match body.get("id").and_then(|v| v.as_str()) {
            Some(id) => Ok(id.to_string()),
            None => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            )),
        }
    }

    /// Poll a video container until ready, failed, or budget exhausted
    ///
    /// Terminal failure statuses error out immediately. A rate-limit
    /// response costs a penalty wait instead of a status-check attempt.
    /// Exhaustion is not an error; the caller publishes anyway.
    async fn wait_for_video(&self, container_id: &str) -> Result<MediaReadiness, PublishError> {
        let mut attempt = 0;
        let mut rate_limit_hits = 0;

        while attempt < self.poll.max_attempts && rate_limit_hits < self.poll.max_attempts {
            tokio::time::sleep(self.poll.wait_for_attempt(attempt)).await;

            match self.container_status(container_id).await {
                Ok(status) => {
                    debug!(container_id, %status, attempt, "container status");
                    match status.as_str() {
                        "FINISHED" | "PUBLISHED" => return Ok(MediaReadiness::Ready),
                        "ERROR" | "EXPIRED" => {
                            return Err(PublishError::processing(format!(
                                "container {container_id} entered status {status}"
                            )));
                        }
                        _ => attempt += 1,
                    }
                }
                Err(PublishError::RateLimited) => {
                    warn!(container_id, "rate limited while polling, backing off");
                    rate_limit_hits += 1;
                    tokio::time::sleep(self.poll.rate_limit_penalty()).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(container_id, "poll budget exhausted, proceeding to publish");
        Ok(MediaReadiness::TimedOut)
    }

    /// Short fixed wait plus a single status check for image containers
    async fn wait_for_image(&self, container_id: &str) -> Result<MediaReadiness, PublishError> {
        tokio::time::sleep(self.poll.image_wait()).await;

        match self.container_status(container_id).await {
            Ok(status) => match status.as_str() {
                "FINISHED" | "PUBLISHED" => Ok(MediaReadiness::Ready),
                "ERROR" | "EXPIRED" => Err(PublishError::processing(format!(
                    "container {container_id} entered status {status}"
                ))),
                _ => Ok(MediaReadiness::TimedOut),
            },
            // A single advisory check: throttling here is not worth failing over
            Err(PublishError::RateLimited) => Ok(MediaReadiness::TimedOut),
            Err(e) => Err(e),
        }
    }

    /// Publish a single photo
    pub async fn publish_photo(
        &self,
        image_url: &str,
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        let form = [
            ("image_url", image_url.to_string()),
            ("caption", caption.to_string()),
            ("access_token", self.token.clone()),
        ];
        let container_id = self.create_container(&form).await?;
        let post_id = self.publish_container(&container_id).await?;

        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Photo,
            item_count: 1,
            warning: None,
        })
    }

    /// Publish a single video as a reel, polling for processing
    pub async fn publish_video(
        &self,
        video_url: &str,
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        let form = [
            ("media_type", "REELS".to_string()),
            ("video_url", video_url.to_string()),
            ("caption", caption.to_string()),
            ("access_token", self.token.clone()),
        ];
        let container_id = self.create_container(&form).await?;
        let readiness = self.wait_for_video(&container_id).await?;
        let post_id = self.publish_container(&container_id).await?;

        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Video,
            item_count: 1,
            warning: match readiness {
                MediaReadiness::Ready => None,
                MediaReadiness::TimedOut => {
                    Some("published before processing was confirmed".to_string())
                }
            },
        })
    }

    /// Create one carousel child container and wait for it
    async fn create_carousel_child(&self, item: &MediaItem) -> Result<String, PublishError> {
        let container_id = match item.media_type {
            MediaType::Image => {
                let form = [
                    ("image_url", item.url.clone()),
                    ("is_carousel_item", "true".to_string()),
                    ("access_token", self.token.clone()),
                ];
                let id = self.create_container(&form).await?;
                self.wait_for_image(&id).await?;
                id
            }
            MediaType::Video => {
                let form = [
                    ("media_type", "VIDEO".to_string()),
                    ("video_url", item.url.clone()),
                    ("is_carousel_item", "true".to_string()),
                    ("access_token", self.token.clone()),
                ];
                let id = self.create_container(&form).await?;
                self.wait_for_video(&id).await?;
                id
            }
        };

        Ok(container_id)
    }

    /// Create the parent carousel container, retrying once on a
    /// transient error code
    async fn create_carousel_parent(
        &self,
        children: &[String],
        caption: &str,
    ) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/media", self.ig_user_id));
        let form = [
            ("media_type", "CAROUSEL".to_string()),
            ("children", children.join(",")),
            ("caption", caption.to_string()),
            ("access_token", self.token.clone()),
        ];

        let first = self.post_form(&url, &form).await;
        let retry = match &first {
            Ok(body) => {
                if let Some(id) = body.get("id").and_then(|v| v.as_str()) {
                    return Ok(id.to_string());
                }
                graph_is_transient(body)
            }
            Err(e) => e.is_recoverable(),
        };

        if retry {
            warn!("carousel parent creation failed transiently, retrying once");
            tokio::time::sleep(self.poll.parent_retry_delay()).await;

            let body = self.post_form(&url, &form).await?;
            if let Some(id) = body.get("id").and_then(|v| v.as_str()) {
                return Ok(id.to_string());
            }
            return Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            ));
        }

        match first {
            Ok(body) => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            )),
            Err(e) => Err(e),
        }
    }

    /// Publish a multi-item carousel with first-item fallback
    ///
    /// Children are created and confirmed in order. If the parent
    /// container cannot be created even after one retry, the first item
    /// is published alone with an annotated caption instead of failing
    /// the whole request.
    pub async fn publish_carousel(
        &self,
        items: &[MediaItem],
        caption: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let child_id = self.create_carousel_child(item).await?;
            children.push(child_id);
        }

        match self.create_carousel_parent(&children, caption).await {
            Ok(parent_id) => {
                let post_id = self.publish_container(&parent_id).await?;
                Ok(PublishOutcome::success(PublishedPost {
                    post_id,
                    kind: PublishKind::Carousel,
                    item_count: items.len(),
                    warning: None,
                }))
            }
            Err(parent_err) => {
                warn!(error = %parent_err, "carousel creation failed, falling back to first item");

                let first = &items[0];
                let annotated = fallback_caption(caption, items.len());
                let post = match first.media_type {
                    MediaType::Image => self.publish_photo(&first.url, &annotated).await?,
                    MediaType::Video => self.publish_video(&first.url, &annotated).await?,
                };

                Ok(PublishOutcome::partial(
                    post,
                    format!("carousel degraded to first item: {parent_err}"),
                ))
            }
        }
    }
}

/// Annotate a fallback caption with the degradation note
fn fallback_caption(caption: &str, total: usize) -> String {
    if caption.is_empty() {
        format!("(1 of {total})")
    } else {
        format!("{caption}\n\n(1 of {total})")
    }
}

#[async_trait]
impl PlatformPublisher for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, content: &PostContent) -> PublishOutcome {
        if content.media.is_empty() {
            return PublishOutcome::error("Instagram requires at least one media item");
        }

        if content.media.len() == 1 {
            let item = &content.media[0];
            let result = match item.media_type {
                MediaType::Image => self.publish_photo(&item.url, &content.caption).await,
                MediaType::Video => self.publish_video(&item.url, &content.caption).await,
            };
            return match result {
                Ok(post) => PublishOutcome::success(post),
                Err(e) => e.into(),
            };
        }

        let mut items = content.media.as_slice();
        let mut truncation_warning = None;
        if items.len() > MAX_CAROUSEL_ITEMS {
            truncation_warning = Some(format!(
                "carousel truncated to the first {MAX_CAROUSEL_ITEMS} of {} items",
                items.len()
            ));
            items = &items[..MAX_CAROUSEL_ITEMS];
        }

        match self.publish_carousel(items, &content.caption).await {
            Ok(PublishOutcome::Success { mut post }) => {
                if let Some(warning) = truncation_warning {
                    post.warning = Some(warning);
                }
                PublishOutcome::Success { post }
            }
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }
}

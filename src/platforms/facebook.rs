//! Facebook Page publishing client
//!
//! Facebook is the only target that supports true text-only posts. Albums
//! use the unpublished-photo flow: each photo is uploaded with
//! `published=false`, then a single feed post links the collected ids via
//! `attached_media`. Videos go up through `/videos` and are polled for
//! processing afterwards.

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

/// Requests per second against the Graph API
const REQUESTS_PER_SECOND: u32 = 5;

/// Facebook Graph API client for a single Page
pub struct FacebookClient {
    /// HTTP client with bounded timeout
    client: Client,

    /// Outbound request rate limiter
    limiter: DirectLimiter,

    /// Facebook Page id
    page_id: String,

    /// Page access token
    token: String,

    /// Base URL, overridable for mock servers
    base_url: String,

    /// Graph API version segment
    api_version: String,

    /// Video processing poll schedule
    poll: PollPolicy,
}

impl FacebookClient {
    /// Create a client with default timeout and poll policy
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Http` if the HTTP client cannot be built
    pub fn new(
        page_id: impl Into<String>,
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
            page_id: page_id.into(),
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

    /// Extract the created object id or turn the envelope into an error
    fn expect_id(body: Value) -> Result<String, PublishError> {
        match body.get("id").and_then(|v| v.as_str()) {
            Some(id) => Ok(id.to_string()),
            None => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            )),
        }
    }

    /// Publish a text-only post to the Page feed
    pub async fn publish_text(&self, message: &str) -> Result<PublishedPost, PublishError> {
        let url = self.endpoint(&format!("{}/feed", self.page_id));
        let form = [
            ("message", message.to_string()),
            ("access_token", self.token.clone()),
        ];
        let body = self.post_form(&url, &form).await?;
        let post_id = Self::expect_id(body)?;

        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Text,
            item_count: 0,
            warning: None,
        })
    }

    /// Publish a single photo by URL
    pub async fn publish_photo(
        &self,
        image_url: &str,
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        let url = self.endpoint(&format!("{}/photos", self.page_id));
        let form = [
            ("url", image_url.to_string()),
            ("caption", caption.to_string()),
            ("access_token", self.token.clone()),
        ];
        let body = self.post_form(&url, &form).await?;
        let post_id = Self::expect_id(body)?;

        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Photo,
            item_count: 1,
            warning: None,
        })
    }

    /// Upload a photo without publishing, returning its media id
    async fn upload_unpublished_photo(&self, image_url: &str) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/photos", self.page_id));
        let form = [
            ("url", image_url.to_string()),
            ("published", "false".to_string()),
            ("access_token", self.token.clone()),
        ];
        let body = self.post_form(&url, &form).await?;
        Self::expect_id(body)
    }

    /// GET a video's processing status
    async fn video_status(&self, video_id: &str) -> Result<String, PublishError> {
        self.limiter.until_ready().await;

        let url = self.endpoint(video_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "status"), ("access_token", self.token.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || graph_is_rate_limited(&body) {
            return Err(PublishError::RateLimited);
        }

        match body
            .pointer("/status/video_status")
            .and_then(|v| v.as_str())
        {
            Some(code) => Ok(code.to_string()),
            None => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| "missing video status".to_string()),
            )),
        }
    }

    /// Poll an uploaded video until processed, failed, or budget exhausted
    async fn wait_for_video(&self, video_id: &str) -> Result<MediaReadiness, PublishError> {
        let mut attempt = 0;
        let mut rate_limit_hits = 0;

        while attempt < self.poll.max_attempts && rate_limit_hits < self.poll.max_attempts {
            tokio::time::sleep(self.poll.wait_for_attempt(attempt)).await;

            match self.video_status(video_id).await {
                Ok(status) => {
                    debug!(video_id, %status, attempt, "video status");
                    match status.as_str() {
                        "ready" => return Ok(MediaReadiness::Ready),
                        "error" => {
                            return Err(PublishError::processing(format!(
                                "video {video_id} failed remote processing"
                            )));
                        }
                        _ => attempt += 1,
                    }
                }
                Err(PublishError::RateLimited) => {
                    warn!(video_id, "rate limited while polling, backing off");
                    rate_limit_hits += 1;
                    tokio::time::sleep(self.poll.rate_limit_penalty()).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(video_id, "poll budget exhausted, reporting video as accepted");
        Ok(MediaReadiness::TimedOut)
    }

    /// Publish a video by URL and poll its processing status
    pub async fn publish_video(
        &self,
        video_url: &str,
        description: &str,
    ) -> Result<PublishedPost, PublishError> {
        let url = self.endpoint(&format!("{}/videos", self.page_id));
        let form = [
            ("file_url", video_url.to_string()),
            ("description", description.to_string()),
            ("access_token", self.token.clone()),
        ];
        let body = self.post_form(&url, &form).await?;
        let video_id = Self::expect_id(body)?;

        let readiness = self.wait_for_video(&video_id).await?;

        Ok(PublishedPost {
            post_id: video_id,
            kind: PublishKind::Video,
            item_count: 1,
            warning: match readiness {
                MediaReadiness::Ready => None,
                MediaReadiness::TimedOut => {
                    Some("accepted before processing was confirmed".to_string())
                }
            },
        })
    }

    /// Create the feed post linking the uploaded photo ids, retrying once
    /// on a transient error code
    async fn link_album(
        &self,
        media_ids: &[String],
        message: &str,
    ) -> Result<String, PublishError> {
        let url = self.endpoint(&format!("{}/feed", self.page_id));
        let mut form: Vec<(String, String)> = vec![
            ("message".to_string(), message.to_string()),
            ("access_token".to_string(), self.token.clone()),
        ];
        for (idx, media_id) in media_ids.iter().enumerate() {
            form.push((
                format!("attached_media[{idx}]"),
                format!("{{\"media_fbid\":\"{media_id}\"}}"),
            ));
        }

        let send = || async {
            self.limiter.until_ready().await;
            let response = self.client.post(&url).form(&form).send().await?;
            let status = response.status();
            let body: Value = response.json().await?;
            if status == StatusCode::TOO_MANY_REQUESTS || graph_is_rate_limited(&body) {
                return Err(PublishError::RateLimited);
            }
            Ok(body)
        };

        let first = send().await;
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
            warn!("album feed link failed transiently, retrying once");
            tokio::time::sleep(self.poll.parent_retry_delay()).await;
            return Self::expect_id(send().await?);
        }

        match first {
            Ok(body) => Err(PublishError::validation(
                graph_error_detail(&body).unwrap_or_else(|| body.to_string()),
            )),
            Err(e) => Err(e),
        }
    }

    /// Publish a multi-photo album with first-item fallback
    ///
    /// Video items cannot ride along on the feed-link mechanism and are
    /// dropped with a warning. If the linking feed post cannot be created
    /// even after one retry, the first photo is published alone.
    pub async fn publish_album(
        &self,
        items: &[MediaItem],
        caption: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let images: Vec<&MediaItem> = items
            .iter()
            .filter(|m| m.media_type == MediaType::Image)
            .collect();
        let dropped_videos = items.len() - images.len();

        if images.is_empty() {
            return Err(PublishError::validation(
                "album publishing requires at least one image",
            ));
        }

        let mut media_ids = Vec::with_capacity(images.len());
        for item in &images {
            let media_id = self.upload_unpublished_photo(&item.url).await?;
            media_ids.push(media_id);
        }

        let warning = (dropped_videos > 0).then(|| {
            format!("{dropped_videos} video item(s) dropped; Facebook albums are photo-only")
        });

        match self.link_album(&media_ids, caption).await {
            Ok(post_id) => Ok(PublishOutcome::success(PublishedPost {
                post_id,
                kind: PublishKind::Album,
                item_count: media_ids.len(),
                warning,
            })),
            Err(link_err) => {
                warn!(error = %link_err, "album linking failed, falling back to first photo");

                let annotated = if caption.is_empty() {
                    format!("(1 of {})", images.len())
                } else {
                    format!("{caption}\n\n(1 of {})", images.len())
                };
                let post = self.publish_photo(&images[0].url, &annotated).await?;

                Ok(PublishOutcome::partial(
                    post,
                    format!("album degraded to first photo: {link_err}"),
                ))
            }
        }
    }
}

#[async_trait]
impl PlatformPublisher for FacebookClient {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, content: &PostContent) -> PublishOutcome {
        if content.media.is_empty() {
            if content.caption.is_empty() {
                return PublishOutcome::error("nothing to publish: no caption and no media");
            }
            return match self.publish_text(&content.caption).await {
                Ok(post) => PublishOutcome::success(post),
                Err(e) => e.into(),
            };
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

        // Multiple items: album if any image exists, else first video only
        let has_images = content
            .media
            .iter()
            .any(|m| m.media_type == MediaType::Image);

        if has_images {
            match self.publish_album(&content.media, &content.caption).await {
                Ok(outcome) => outcome,
                Err(e) => e.into(),
            }
        } else {
            match self
                .publish_video(&content.media[0].url, &content.caption)
                .await
            {
                Ok(mut post) => {
                    post.warning = Some(format!(
                        "only the first of {} videos was published",
                        content.media.len()
                    ));
                    PublishOutcome::partial(post, "Facebook feed posts carry a single video")
                }
                Err(e) => e.into(),
            }
        }
    }
}

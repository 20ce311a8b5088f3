//! LinkedIn publishing client (Personal profile or Company page)
//!
//! LinkedIn ingests media by value, not by URL: every item is registered
//! (`/assets?action=registerUpload`), its bytes downloaded from the media
//! host and PUT to the returned upload URL, and only then referenced from
//! a `ugcPosts` create. Image and video cannot share a post; when both
//! are present the images win and the videos are dropped with a warning.

use async_trait::async_trait;
use governor::Quota;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{MediaItem, MediaType, Platform};

use super::{
    DirectLimiter, MediaReadiness, PlatformPublisher, PollPolicy, PostContent, PublishError,
    PublishKind, PublishOutcome, PublishedPost,
};

/// Default LinkedIn REST endpoint
const DEFAULT_BASE_URL: &str = "https://api.linkedin.com/v2";

/// LinkedIn-Version header value
const LINKEDIN_VERSION: &str = "202401";

/// Maximum images per LinkedIn post
const MAX_IMAGES: usize = 9;

/// Requests per second against the LinkedIn API
const REQUESTS_PER_SECOND: u32 = 3;

/// Upload recipe for feed images
const IMAGE_RECIPE: &str = "urn:li:digitalmediaRecipe:feedshare-image";

/// Upload recipe for feed videos
const VIDEO_RECIPE: &str = "urn:li:digitalmediaRecipe:feedshare-video";

/// A registered upload slot
struct RegisteredUpload {
    asset: String,
    upload_url: String,
}

/// LinkedIn REST client
///
/// Posts as a member by default; setting an organization id switches the
/// author URN to the organization (Company page posting).
pub struct LinkedInClient {
    /// HTTP client with bounded timeout
    client: Client,

    /// Outbound request rate limiter
    limiter: DirectLimiter,

    /// LinkedIn member id (bare id, no URN prefix)
    member_id: String,

    /// Organization id for Company page posting
    organization_id: Option<String>,

    /// Access token with the social write scope
    token: String,

    /// Base URL, overridable for mock servers
    base_url: String,

    /// Asset processing poll schedule
    poll: PollPolicy,
}

impl LinkedInClient {
    /// Create a client posting as the member
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Http` if the HTTP client cannot be built
    pub fn new(
        member_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .gzip(true)
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::new(1).unwrap()),
        );

        Ok(Self {
            client,
            limiter: DirectLimiter::direct(quota),
            member_id: member_id.into(),
            organization_id: None,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll: PollPolicy::default(),
        })
    }

    /// Post as an organization instead of the member
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
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

    /// Author URN for post payloads
    fn author_urn(&self) -> String {
        match &self.organization_id {
            Some(org) => format!("urn:li:organization:{org}"),
            None => format!("urn:li:person:{}", self.member_id),
        }
    }

    /// Which platform identity this client represents
    fn platform_identity(&self) -> Platform {
        if self.organization_id.is_some() {
            Platform::LinkedinCompany
        } else {
            Platform::LinkedinPersonal
        }
    }

    /// POST a JSON body to the REST API
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PublishError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PublishError::RateLimited);
        }

        let text = response.text().await?;
        let body: Value = if text.is_empty() {
            json!({})
        } else {
            serde_json::from_str(&text)
                .unwrap_or_else(|_| json!({ "raw": text }))
        };

        if !status.is_success() {
            let detail = body
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("HTTP {status}: {body}"));
            return Err(PublishError::validation(detail));
        }

        Ok(body)
    }

    /// Register an upload slot for a media file
    async fn register_upload(
        &self,
        file_size: usize,
        recipe: &str,
    ) -> Result<RegisteredUpload, PublishError> {
        let payload = json!({
            "registerUploadRequest": {
                "owner": self.author_urn(),
                "recipes": [recipe],
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }],
                "supportedUploadMechanism": ["SYNCHRONOUS_UPLOAD"],
                "fileSize": file_size,
            }
        });

        let body = self
            .post_json("/assets?action=registerUpload", &payload)
            .await?;

        let upload_url = body
            .pointer(
                "/value/uploadMechanism/com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest/uploadUrl",
            )
            .and_then(|v| v.as_str());
        let asset = body.pointer("/value/asset").and_then(|v| v.as_str());

        match (asset, upload_url) {
            (Some(asset), Some(upload_url)) => Ok(RegisteredUpload {
                asset: asset.to_string(),
                upload_url: upload_url.to_string(),
            }),
            _ => Err(PublishError::validation(format!(
                "upload registration returned no asset: {body}"
            ))),
        }
    }

    /// Download the source media bytes from its public URL
    async fn download_bytes(&self, url: &str) -> Result<bytes::Bytes, PublishError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PublishError::validation(format!(
                "media download failed with HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?)
    }

    /// PUT the media bytes to the registered upload URL
    async fn upload_binary(&self, upload_url: &str, data: bytes::Bytes) -> Result<(), PublishError> {
        self.limiter.until_ready().await;

        let response = self
            .client
            .put(upload_url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PublishError::processing(format!(
                "binary upload failed with HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Register, download, and upload one media item; returns the asset URN
    async fn ingest_media(&self, url: &str, recipe: &str) -> Result<String, PublishError> {
        let data = self.download_bytes(url).await?;
        let upload = self.register_upload(data.len(), recipe).await?;
        self.upload_binary(&upload.upload_url, data).await?;
        Ok(upload.asset)
    }

    /// GET an asset's processing status
    async fn asset_status(&self, asset_urn: &str) -> Result<String, PublishError> {
        self.limiter.until_ready().await;

        let asset_id = asset_urn.rsplit(':').next().unwrap_or(asset_urn);
        let response = self
            .client
            .get(format!("{}/assets/{asset_id}", self.base_url))
            .bearer_auth(&self.token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PublishError::RateLimited);
        }

        let body: Value = response.json().await?;
        match body
            .pointer("/recipes/0/status")
            .or_else(|| body.get("status"))
            .and_then(|v| v.as_str())
        {
            Some(code) => Ok(code.to_string()),
            None => Err(PublishError::validation(format!(
                "asset status missing from response: {body}"
            ))),
        }
    }

    /// Poll an uploaded video asset until available or budget exhausted
    async fn wait_for_asset(&self, asset_urn: &str) -> Result<MediaReadiness, PublishError> {
        let mut attempt = 0;
        let mut rate_limit_hits = 0;

        while attempt < self.poll.max_attempts && rate_limit_hits < self.poll.max_attempts {
            tokio::time::sleep(self.poll.wait_for_attempt(attempt)).await;

            match self.asset_status(asset_urn).await {
                Ok(status) => {
                    debug!(asset_urn, %status, attempt, "asset status");
                    match status.as_str() {
                        "AVAILABLE" => return Ok(MediaReadiness::Ready),
                        "CLIENT_ERROR" | "SERVER_ERROR" | "ABORTED" => {
                            return Err(PublishError::processing(format!(
                                "asset {asset_urn} entered status {status}"
                            )));
                        }
                        _ => attempt += 1,
                    }
                }
                Err(PublishError::RateLimited) => {
                    warn!(asset_urn, "rate limited while polling, backing off");
                    rate_limit_hits += 1;
                    tokio::time::sleep(self.poll.rate_limit_penalty()).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(asset_urn, "poll budget exhausted, proceeding to publish");
        Ok(MediaReadiness::TimedOut)
    }

    /// Create a ugcPost and return the post id
    async fn create_post(
        &self,
        media_category: &str,
        media: Vec<Value>,
        text: &str,
    ) -> Result<String, PublishError> {
        let mut share_content = json!({
            "shareMediaCategory": media_category,
            "shareCommentary": { "text": text }
        });
        if !media.is_empty() {
            share_content["media"] = Value::Array(media);
        }

        let payload = json!({
            "author": self.author_urn(),
            "lifecycleState": "PUBLISHED",
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            },
            "specificContent": {
                "com.linkedin.ugc.ShareContent": share_content
            }
        });

        let body = self.post_json("/ugcPosts", &payload).await?;
        match body.get("id").and_then(|v| v.as_str()) {
            Some(id) => Ok(id.to_string()),
            None => Err(PublishError::validation(format!(
                "post creation returned no id: {body}"
            ))),
        }
    }

    /// Publish a text-only post
    pub async fn publish_text(&self, text: &str) -> Result<PublishedPost, PublishError> {
        if text.trim().is_empty() {
            return Err(PublishError::validation("text content cannot be empty"));
        }

        let post_id = self.create_post("NONE", Vec::new(), text).await?;
        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Text,
            item_count: 0,
            warning: None,
        })
    }

    /// Publish up to nine images in one post
    ///
    /// Individual ingestion failures are skipped as long as at least one
    /// image uploads; losing some images is reported as a warning.
    pub async fn publish_photos(
        &self,
        image_urls: &[String],
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        if image_urls.is_empty() {
            return Err(PublishError::validation("no images provided"));
        }

        let capped = &image_urls[..image_urls.len().min(MAX_IMAGES)];
        let mut assets = Vec::with_capacity(capped.len());

        for url in capped {
            match self.ingest_media(url, IMAGE_RECIPE).await {
                Ok(asset) => assets.push(asset),
                Err(e) => warn!(%url, error = %e, "image ingestion failed, skipping item"),
            }
        }

        if assets.is_empty() {
            return Err(PublishError::processing("failed to upload all images"));
        }

        let media: Vec<Value> = assets
            .iter()
            .map(|asset| json!({ "status": "READY", "media": asset }))
            .collect();
        let uploaded = media.len();
        let post_id = self.create_post("IMAGE", media, caption).await?;

        let mut warning = None;
        if uploaded < image_urls.len() {
            warning = Some(format!(
                "{} of {} images made it into the post",
                uploaded,
                image_urls.len()
            ));
        }

        Ok(PublishedPost {
            post_id,
            kind: PublishKind::Album,
            item_count: uploaded,
            warning,
        })
    }

    /// Publish a single video, polling asset processing before the post
    pub async fn publish_video(
        &self,
        video_url: &str,
        caption: &str,
    ) -> Result<PublishedPost, PublishError> {
        let asset = self.ingest_media(video_url, VIDEO_RECIPE).await?;
        let readiness = self.wait_for_asset(&asset).await?;

        let media = vec![json!({ "status": "READY", "media": asset })];
        let post_id = self.create_post("VIDEO", media, caption).await?;

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
}

#[async_trait]
impl PlatformPublisher for LinkedInClient {
    fn platform(&self) -> Platform {
        self.platform_identity()
    }

    async fn publish(&self, content: &PostContent) -> PublishOutcome {
        if content.media.is_empty() {
            return match self.publish_text(&content.caption).await {
                Ok(post) => PublishOutcome::success(post),
                Err(e) => e.into(),
            };
        }

        let images: Vec<String> = content
            .media
            .iter()
            .filter(|m| m.media_type == MediaType::Image)
            .map(|m| m.url.clone())
            .collect();
        let videos: Vec<&MediaItem> = content
            .media
            .iter()
            .filter(|m| m.media_type == MediaType::Video)
            .collect();

        // LinkedIn cannot mix media kinds; images win deterministically
        if !images.is_empty() && !videos.is_empty() {
            let detail = format!(
                "LinkedIn does not mix images and videos; {} video(s) dropped",
                videos.len()
            );
            warn!("{detail}");
            return match self.publish_photos(&images, &content.caption).await {
                Ok(mut post) => {
                    post.warning = Some(detail.clone());
                    PublishOutcome::partial(post, detail)
                }
                Err(e) => e.into(),
            };
        }

        if !images.is_empty() {
            return match self.publish_photos(&images, &content.caption).await {
                Ok(post) => PublishOutcome::success(post),
                Err(e) => e.into(),
            };
        }

        match self.publish_video(&videos[0].url, &content.caption).await {
            Ok(mut post) => {
                if videos.len() > 1 {
                    let detail = format!("only the first of {} videos was published", videos.len());
                    post.warning = Some(detail.clone());
                    PublishOutcome::partial(post, detail)
                } else {
                    PublishOutcome::success(post)
                }
            }
            Err(e) => e.into(),
        }
    }
}

//! Platform adapters for social publishing
//!
//! Every platform follows the same asynchronous pattern: create a media
//! container, poll until the platform has processed it, then publish.
//! Text-only posts skip the polling step. The adapters normalize each
//! platform's wire protocol behind the [`PlatformPublisher`] trait.

pub mod facebook;
pub mod instagram;
pub mod linkedin;

pub use facebook::FacebookClient;
pub use instagram::InstagramClient;
pub use linkedin::LinkedInClient;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{MediaItem, Platform};

/// Direct (unkeyed) rate limiter used by all platform clients
pub type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ============================================================================
// Prepared Content
// ============================================================================

/// Content handed to a platform adapter, ready for submission
///
/// The caption already has hashtags folded in and the media list is
/// sorted by order index.
#[derive(Debug, Clone)]
pub struct PostContent {
    /// Fully assembled caption text
    pub caption: String,

    /// Ordered media items
    pub media: Vec<MediaItem>,
}

impl PostContent {
    /// Create content with no media
    pub fn text(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            media: Vec::new(),
        }
    }

    /// Create content with media
    pub fn with_media(caption: impl Into<String>, media: Vec<MediaItem>) -> Self {
        Self {
            caption: caption.into(),
            media,
        }
    }
}

// ============================================================================
// Publish Outcome
// ============================================================================

/// What kind of post a publish produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishKind {
    Text,
    Photo,
    Video,
    Album,
    Carousel,
}

/// Payload of a successful (or degraded) publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPost {
    /// Remote post identifier
    pub post_id: String,

    /// Kind of post created
    pub kind: PublishKind,

    /// Number of media items that made it into the post
    pub item_count: usize,

    /// Advisory warning (e.g., dropped media)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Tagged result of one platform publish attempt
///
/// `partial` marks a degraded-but-nonzero outcome, e.g. a carousel that
/// fell back to its first item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishOutcome {
    Success {
        #[serde(flatten)]
        post: PublishedPost,
    },
    Partial {
        #[serde(flatten)]
        post: PublishedPost,
        detail: String,
    },
    Error {
        detail: String,
    },
}

impl PublishOutcome {
    /// Successful publish
    pub fn success(post: PublishedPost) -> Self {
        Self::Success { post }
    }

    /// Degraded publish that still produced a post
    pub fn partial(post: PublishedPost, detail: impl Into<String>) -> Self {
        Self::Partial {
            post,
            detail: detail.into(),
        }
    }

    /// Failed publish
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }

    /// True if the platform ended up with a post (full or degraded)
    pub fn published(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    /// Wire status discriminant
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Partial { .. } => "partial",
            Self::Error { .. } => "error",
        }
    }
}

impl From<PublishError> for PublishOutcome {
    fn from(err: PublishError) -> Self {
        Self::Error {
            detail: err.to_string(),
        }
    }
}

// ============================================================================
// Publish Errors
// ============================================================================

/// Failure taxonomy for platform adapter calls
#[derive(Error, Debug)]
pub enum PublishError {
    /// Returned before any network call
    #[error("credentials not configured")]
    CredentialsMissing,

    /// Platform rejected the request parameters
    #[error("platform rejected the request: {detail}")]
    RemoteValidation { detail: String },

    /// Platform is throttling us
    #[error("rate limited by the platform")]
    RateLimited,

    /// Remote media processing ended in a failure state
    #[error("media processing failed: {detail}")]
    ProcessingFailed { detail: String },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Transport-level error
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
}

impl PublishError {
    /// Create a remote validation error
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::RemoteValidation {
            detail: detail.into(),
        }
    }

    /// Create a processing failure
    pub fn processing(detail: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            detail: detail.into(),
        }
    }

    /// Check if the error is recoverable via retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Http(_))
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

// ============================================================================
// Poll Policy
// ============================================================================

/// Backoff schedule for remote media processing polls
///
/// The schedule is linear: `initial_wait` before the first status check,
/// growing by `wait_increment` per attempt. A rate-limit response adds
/// `rate_limit_penalty` on top instead of burning through the attempt
/// budget at the normal pace. Exhausting the budget is not an error; the
/// caller proceeds to publish and lets the platform have the final word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Wait before the first status check
    pub initial_wait_secs: u64,

    /// Additional wait per subsequent attempt
    pub wait_increment_secs: u64,

    /// Extra wait after a rate-limit response
    pub rate_limit_penalty_secs: u64,

    /// Maximum number of status checks
    pub max_attempts: u32,

    /// Fixed wait before an image container's single status check
    pub image_wait_secs: u64,

    /// Delay before the one retry of a failed parent-container creation
    pub parent_retry_delay_secs: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_wait_secs: 8,
            wait_increment_secs: 4,
            rate_limit_penalty_secs: 15,
            max_attempts: 10,
            image_wait_secs: 2,
            parent_retry_delay_secs: 5,
        }
    }
}

impl PollPolicy {
    /// Wait before status check `attempt` (0-based)
    pub fn wait_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.initial_wait_secs + self.wait_increment_secs * attempt as u64)
    }

    /// Penalty wait applied on a rate-limit response
    pub fn rate_limit_penalty(&self) -> Duration {
        Duration::from_secs(self.rate_limit_penalty_secs)
    }

    /// Fixed image-container wait
    pub fn image_wait(&self) -> Duration {
        Duration::from_secs(self.image_wait_secs)
    }

    /// Delay before retrying a parent-container creation once
    pub fn parent_retry_delay(&self) -> Duration {
        Duration::from_secs(self.parent_retry_delay_secs)
    }

    /// Millisecond-scale policy for tests
    pub fn immediate() -> Self {
        Self {
            initial_wait_secs: 0,
            wait_increment_secs: 0,
            rate_limit_penalty_secs: 0,
            max_attempts: 3,
            image_wait_secs: 0,
            parent_retry_delay_secs: 0,
        }
    }
}

/// Result of a bounded readiness poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaReadiness {
    /// Platform reported the container ready
    Ready,

    /// Attempt budget exhausted without a ready signal
    TimedOut,
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Uniform capability surface over the per-platform clients
///
/// `publish` owns the routing decision (text, single photo, video,
/// album/carousel) for its platform; callers hand over prepared content
/// and get a tagged outcome back. Adapter-level failures are folded into
/// the outcome, never propagated as errors, so one platform's failure
/// cannot short-circuit its siblings.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Which platform this adapter serves
    fn platform(&self) -> Platform;

    /// Publish prepared content, routing on the media present
    async fn publish(&self, content: &PostContent) -> PublishOutcome;
}

// ============================================================================
// Graph API helpers (shared by Facebook and Instagram)
// ============================================================================

/// Graph API error codes that signal throttling
const GRAPH_RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];

/// Graph API error codes considered transient for a single retry
const GRAPH_TRANSIENT_CODES: &[i64] = &[1, 2];

/// Extract the error message from a Graph API error envelope
pub(crate) fn graph_error_detail(body: &serde_json::Value) -> Option<String> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown Graph API error");
    Some(message.to_string())
}

/// Check whether a Graph error envelope is a rate-limit response
pub(crate) fn graph_is_rate_limited(body: &serde_json::Value) -> bool {
    body.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_i64())
        .map(|code| GRAPH_RATE_LIMIT_CODES.contains(&code))
        .unwrap_or(false)
}

/// Check whether a Graph error envelope is worth one retry
pub(crate) fn graph_is_transient(body: &serde_json::Value) -> bool {
    body.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_i64())
        .map(|code| GRAPH_TRANSIENT_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_policy_linear_schedule() {
        let policy = PollPolicy::default();
        assert_eq!(policy.wait_for_attempt(0), Duration::from_secs(8));
        assert_eq!(policy.wait_for_attempt(1), Duration::from_secs(12));
        assert_eq!(policy.wait_for_attempt(5), Duration::from_secs(28));
    }

    #[test]
    fn test_poll_policy_rate_limit_penalty() {
        let policy = PollPolicy::default();
        assert_eq!(policy.rate_limit_penalty(), Duration::from_secs(15));
    }

    #[test]
    fn test_publish_outcome_status() {
        let post = PublishedPost {
            post_id: "123".to_string(),
            kind: PublishKind::Photo,
            item_count: 1,
            warning: None,
        };

        assert_eq!(PublishOutcome::success(post.clone()).status(), "success");
        assert_eq!(
            PublishOutcome::partial(post, "fell back").status(),
            "partial"
        );
        assert_eq!(PublishOutcome::error("boom").status(), "error");
    }

    #[test]
    fn test_publish_outcome_published() {
        let post = PublishedPost {
            post_id: "123".to_string(),
            kind: PublishKind::Carousel,
            item_count: 3,
            warning: None,
        };

        assert!(PublishOutcome::success(post.clone()).published());
        assert!(PublishOutcome::partial(post, "degraded").published());
        assert!(!PublishOutcome::error("nope").published());
    }

    #[test]
    fn test_publish_outcome_serde_tag() {
        let post = PublishedPost {
            post_id: "42".to_string(),
            kind: PublishKind::Text,
            item_count: 0,
            warning: None,
        };
        let value = serde_json::to_value(PublishOutcome::success(post)).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["post_id"], "42");
        assert_eq!(value["kind"], "text");
    }

    #[test]
    fn test_publish_error_recoverable() {
        assert!(PublishError::RateLimited.is_recoverable());
        assert!(!PublishError::CredentialsMissing.is_recoverable());
        assert!(!PublishError::validation("bad param").is_recoverable());
        assert!(!PublishError::Timeout.is_recoverable());
    }

    #[test]
    fn test_graph_error_helpers() {
        let body = serde_json::json!({
            "error": {"message": "Application request limit reached", "code": 4}
        });
        assert!(graph_is_rate_limited(&body));
        assert!(!graph_is_transient(&body));
        assert_eq!(
            graph_error_detail(&body).unwrap(),
            "Application request limit reached"
        );

        let transient = serde_json::json!({"error": {"message": "Unknown", "code": 1}});
        assert!(graph_is_transient(&transient));
        assert!(!graph_is_rate_limited(&transient));

        let ok = serde_json::json!({"id": "123"});
        assert!(graph_error_detail(&ok).is_none());
    }
}

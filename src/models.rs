// Core data structures for the crosspost publisher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Target social platform enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Facebook,
    Instagram,
    LinkedinPersonal,
    LinkedinCompany,
}

impl Platform {
    /// Create from request identifier (e.g., "facebook", "linkedin-personal")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "facebook" => Some(Self::Facebook),
            "instagram" => Some(Self::Instagram),
            "linkedin" | "linkedin-personal" => Some(Self::LinkedinPersonal),
            "linkedin-company" => Some(Self::LinkedinCompany),
            _ => None,
        }
    }

    /// Get the wire identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::LinkedinPersonal => "linkedin-personal",
            Self::LinkedinCompany => "linkedin-company",
        }
    }

    /// Platforms that hard-require at least one media item
    pub fn requires_media(&self) -> bool {
        matches!(self, Self::Instagram)
    }

    /// Get all supported platforms
    pub fn all() -> Vec<Self> {
        vec![
            Self::Facebook,
            Self::Instagram,
            Self::LinkedinPersonal,
            Self::LinkedinCompany,
        ]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Kind of a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// A single media item within a post
///
/// Platform submission requires a publicly reachable URL; inline data URIs
/// must be pushed through a media host before they get here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// Media kind
    #[serde(rename = "type")]
    pub media_type: MediaType,

    /// Public URL of the hosted media
    pub url: String,

    /// Thumbnail URL (videos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Duration in seconds (videos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,

    /// Position within the post; determines carousel order
    #[serde(default)]
    pub order: u32,
}

impl MediaItem {
    /// Create an image item
    pub fn image(url: impl Into<String>, order: u32) -> Self {
        Self {
            media_type: MediaType::Image,
            url: url.into(),
            thumbnail: None,
            duration_secs: None,
            order,
        }
    }

    /// Create a video item
    pub fn video(url: impl Into<String>, order: u32) -> Self {
        Self {
            media_type: MediaType::Video,
            url: url.into(),
            thumbnail: None,
            duration_secs: None,
            order,
        }
    }

    /// Check the URL is a publicly submittable http(s) URL
    pub fn has_public_url(&self) -> bool {
        url::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }
}

/// Lifecycle status of a stored post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

/// A stored post owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Caption text (without hashtags)
    pub caption: String,

    /// Hashtags, ordered
    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Ordered media items
    #[serde(default)]
    pub media: Vec<MediaItem>,

    /// Requested target platforms
    #[serde(default)]
    pub platforms: Vec<Platform>,

    /// Lifecycle status
    pub status: PostStatus,

    /// When to publish (scheduled posts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// When the post was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Per-platform publish results from the last attempt
    #[serde(default)]
    pub platform_results: HashMap<String, serde_json::Value>,
}

impl Post {
    /// Sort media by explicit order index (stable for equal indices)
    pub fn ordered_media(&self) -> Vec<MediaItem> {
        let mut media = self.media.clone();
        media.sort_by_key(|m| m.order);
        media
    }
}

/// Normalize hashtags: drop empties, ensure a leading '#'
pub fn normalize_hashtags(hashtags: &[String]) -> Vec<String> {
    hashtags
        .iter()
        .filter(|tag| !tag.trim().is_empty())
        .map(|tag| {
            let tag = tag.trim();
            if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{tag}")
            }
        })
        .collect()
}

/// Assemble the final caption: text, blank line, hashtags
///
/// Either side may be empty; the non-empty side wins.
pub fn build_caption(caption: &str, hashtags: &[String]) -> String {
    let hashtag_text = normalize_hashtags(hashtags).join(" ");

    match (caption.is_empty(), hashtag_text.is_empty()) {
        (false, false) => format!("{caption}\n\n{hashtag_text}"),
        (false, true) => caption.to_string(),
        _ => hashtag_text,
    }
}

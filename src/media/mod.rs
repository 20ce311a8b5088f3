//! Media pre-flight validation
//!
//! Carousel posts require matching aspect ratios across items. The
//! validator downloads each image and probes its dimensions from the
//! header bytes; video dimensions are not computed. The result is
//! advisory: the orchestrator degrades an invalid carousel rather than
//! aborting the publish.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{MediaItem, MediaType};

/// Absolute tolerance for two ratios to count as matching
pub const DEFAULT_TOLERANCE: f64 = 0.02;

/// Timeout for a single dimension probe download
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single dimension probe
#[derive(Error, Debug)]
pub enum MediaError {
    /// Download failed
    #[error("media download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("media download failed with HTTP {0}")]
    Status(u16),

    /// Image format not recognized by the header probe
    #[error("unrecognized image format: {0}")]
    Unrecognized(String),
}

/// Dimension probe result for one media item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Index within the submitted media list
    pub index: usize,

    /// Media kind
    #[serde(rename = "type")]
    pub media_type: MediaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Aspect ratio rounded to 3 decimals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,

    /// Why no ratio was computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A detected aspect-ratio mismatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioMismatch {
    /// Index of the offending item
    pub index: usize,

    /// Base ratio (first measurable item), rounded
    pub expected: f64,

    /// The item's own ratio, rounded
    pub actual: f64,

    /// Absolute difference, rounded
    pub delta: f64,
}

/// Validation report for a media set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectRatioReport {
    /// Whether the set is carousel-compatible
    pub valid: bool,

    /// Ratio of the first measurable item, rounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ratio: Option<f64>,

    /// Items outside tolerance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<RatioMismatch>,

    /// Per-item probe detail
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<MediaProbe>,

    /// Human-readable summary
    pub message: String,

    /// Advisory warning when validation could not cover all items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AspectRatioReport {
    fn valid_with_message(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            base_ratio: None,
            mismatches: Vec::new(),
            probes: Vec::new(),
            message: message.into(),
            warning: None,
        }
    }
}

/// Calculate width/height aspect ratio
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        0.0
    } else {
        width as f64 / height as f64
    }
}

/// Check whether two ratios match within an absolute tolerance
pub fn ratios_match(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Downloads media and probes image dimensions for ratio validation
pub struct MediaValidator {
    client: Client,
    tolerance: f64,
}

impl Default for MediaValidator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl MediaValidator {
    /// Create a validator with a custom tolerance
    pub fn new(tolerance: f64) -> Self {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .gzip(true)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, tolerance }
    }

    /// Download an image and probe its dimensions from the header bytes
    async fn probe_dimensions(&self, url: &str) -> Result<(u32, u32), MediaError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        let size = imagesize::blob_size(&bytes)
            .map_err(|e| MediaError::Unrecognized(e.to_string()))?;

        Ok((size.width as u32, size.height as u32))
    }

    /// Validate a media set for carousel compatibility
    ///
    /// Single items short-circuit valid. Videos are never measured; if
    /// fewer than two ratios could be computed, the set passes with an
    /// advisory warning rather than blocking the publish.
    pub async fn validate(&self, items: &[MediaItem]) -> AspectRatioReport {
        if items.len() <= 1 {
            return AspectRatioReport::valid_with_message("single item, no validation needed");
        }

        let mut probes = Vec::with_capacity(items.len());
        let mut measured: Vec<(usize, f64)> = Vec::new();

        for (index, item) in items.iter().enumerate() {
            match item.media_type {
                MediaType::Image => match self.probe_dimensions(&item.url).await {
                    Ok((width, height)) => {
                        let ratio = aspect_ratio(width, height);
                        measured.push((index, ratio));
                        probes.push(MediaProbe {
                            index,
                            media_type: item.media_type,
                            width: Some(width),
                            height: Some(height),
                            ratio: Some(round3(ratio)),
                            note: None,
                        });
                    }
                    Err(e) => {
                        warn!(url = %item.url, error = %e, "could not probe image dimensions");
                        probes.push(MediaProbe {
                            index,
                            media_type: item.media_type,
                            width: None,
                            height: None,
                            ratio: None,
                            note: Some("could not fetch dimensions".to_string()),
                        });
                    }
                },
                MediaType::Video => {
                    probes.push(MediaProbe {
                        index,
                        media_type: item.media_type,
                        width: None,
                        height: None,
                        ratio: None,
                        note: Some("video aspect ratio not validated".to_string()),
                    });
                }
            }
        }

        if measured.len() < 2 {
            return AspectRatioReport {
                valid: true,
                base_ratio: measured.first().map(|(_, r)| round3(*r)),
                mismatches: Vec::new(),
                probes,
                message: "unable to validate all aspect ratios".to_string(),
                warning: Some(
                    "the platform may reject the carousel if aspect ratios differ".to_string(),
                ),
            };
        }

        let (_, base_ratio) = measured[0];
        let mismatches: Vec<RatioMismatch> = measured[1..]
            .iter()
            .filter(|(_, ratio)| !ratios_match(base_ratio, *ratio, self.tolerance))
            .map(|(index, ratio)| RatioMismatch {
                index: *index,
                expected: round3(base_ratio),
                actual: round3(*ratio),
                delta: round3((base_ratio - ratio).abs()),
            })
            .collect();

        if mismatches.is_empty() {
            AspectRatioReport {
                valid: true,
                base_ratio: Some(round3(base_ratio)),
                mismatches,
                probes,
                message: "all aspect ratios match".to_string(),
                warning: None,
            }
        } else {
            AspectRatioReport {
                valid: false,
                base_ratio: Some(round3(base_ratio)),
                mismatches,
                probes,
                message: "aspect ratio mismatch: carousel items must share one aspect ratio"
                    .to_string(),
                warning: None,
            }
        }
    }
}

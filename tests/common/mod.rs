//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crosspost::jobs::InMemoryJobStore;
use crosspost::models::Platform;
use crosspost::platforms::{
    PlatformPublisher, PostContent, PublishError, PublishOutcome,
};
use crosspost::publisher::{ClientFactory, Publisher};
use crosspost::server::AppState;
use crosspost::stores::{InMemoryCredentialStore, InMemoryPostStore, PlatformCredential};

/// Build a minimal PNG blob with the given dimensions
///
/// Only the signature and IHDR header are populated; that is all a
/// dimension probe reads.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(33);
    // PNG signature
    bytes.extend_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    // IHDR chunk: length, type, width, height, bit depth, color type,
    // compression, filter, interlace, crc (unchecked by the probe)
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

/// Adapter stub returning a scripted outcome
pub struct StubPublisher {
    pub platform: Platform,
    pub outcome: PublishOutcome,
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

/// Factory handing out scripted adapters
pub struct StubFactory {
    pub clients: HashMap<Platform, Arc<dyn PlatformPublisher>>,
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

/// Everything an API-level test needs in one place
pub struct TestApp {
    pub state: AppState,
    pub jobs: Arc<InMemoryJobStore>,
    pub posts: Arc<InMemoryPostStore>,
}

/// Build app state around scripted platform outcomes for user "u1"
pub async fn stub_app(outcomes: HashMap<Platform, PublishOutcome>) -> TestApp {
    let jobs = Arc::new(InMemoryJobStore::new());
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let posts = Arc::new(InMemoryPostStore::new());

    credentials
        .connect(
            "u1",
            Platform::Facebook,
            PlatformCredential::Facebook {
                page_id: "page".to_string(),
                access_token: "fb-token".to_string(),
            },
        )
        .await;
    credentials
        .connect(
            "u1",
            Platform::Instagram,
            PlatformCredential::Instagram {
                ig_user_id: "ig".to_string(),
                access_token: "ig-token".to_string(),
            },
        )
        .await;

    let clients: HashMap<Platform, Arc<dyn PlatformPublisher>> = outcomes
        .into_iter()
        .map(|(platform, outcome)| {
            (
                platform,
                Arc::new(StubPublisher { platform, outcome }) as Arc<dyn PlatformPublisher>,
            )
        })
        .collect();

    let publisher = Publisher::new(
        jobs.clone(),
        credentials,
        posts.clone(),
        Arc::new(StubFactory { clients }),
    );

    TestApp {
        state: AppState {
            publisher,
            jobs: jobs.clone(),
            start_time: std::time::Instant::now(),
        },
        jobs,
        posts,
    }
}

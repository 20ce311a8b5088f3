//! Collaborator storage interfaces
//!
//! Credentials and post documents live outside the publish core; these
//! traits are the seams it consumes them through. The in-memory
//! implementations back tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use crate::models::{Platform, Post, PostStatus};

// ============================================================================
// Credentials
// ============================================================================

/// Per-platform connection credentials for one user
#[derive(Clone)]
pub enum PlatformCredential {
    /// Facebook Page credentials
    Facebook {
        page_id: String,
        access_token: String,
    },

    /// Instagram business account credentials
    Instagram {
        ig_user_id: String,
        access_token: String,
    },

    /// LinkedIn member credentials; organization id set for Company pages
    LinkedIn {
        member_id: String,
        organization_id: Option<String>,
        access_token: String,
    },
}

impl PlatformCredential {
    /// The access token, whichever variant holds it
    pub fn access_token(&self) -> &str {
        match self {
            Self::Facebook { access_token, .. }
            | Self::Instagram { access_token, .. }
            | Self::LinkedIn { access_token, .. } => access_token,
        }
    }

    /// Check the credential variant fits the requested platform
    pub fn fits(&self, platform: Platform) -> bool {
        matches!(
            (self, platform),
            (Self::Facebook { .. }, Platform::Facebook)
                | (Self::Instagram { .. }, Platform::Instagram)
                | (
                    Self::LinkedIn {
                        organization_id: None,
                        ..
                    },
                    Platform::LinkedinPersonal
                )
                | (
                    Self::LinkedIn {
                        organization_id: Some(_),
                        ..
                    },
                    Platform::LinkedinCompany
                )
        )
    }
}

/// Mask a token down to its last four characters for display
pub fn mask_token(token: &str) -> String {
    if token.len() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", &token[token.len() - 4..])
    }
}

// Tokens must never reach logs in the clear
impl fmt::Debug for PlatformCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Facebook {
                page_id,
                access_token,
            } => f
                .debug_struct("Facebook")
                .field("page_id", page_id)
                .field("access_token", &mask_token(access_token))
                .finish(),
            Self::Instagram {
                ig_user_id,
                access_token,
            } => f
                .debug_struct("Instagram")
                .field("ig_user_id", ig_user_id)
                .field("access_token", &mask_token(access_token))
                .finish(),
            Self::LinkedIn {
                member_id,
                organization_id,
                access_token,
            } => f
                .debug_struct("LinkedIn")
                .field("member_id", member_id)
                .field("organization_id", organization_id)
                .field("access_token", &mask_token(access_token))
                .finish(),
        }
    }
}

/// Read access to a user's connected platform accounts
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up credentials for one user and platform
    async fn get(&self, user_id: &str, platform: Platform) -> Option<PlatformCredential>;
}

/// In-memory credential store
#[derive(Default)]
pub struct InMemoryCredentialStore {
    accounts: RwLock<HashMap<(String, Platform), PlatformCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect an account for a user
    pub async fn connect(
        &self,
        user_id: impl Into<String>,
        platform: Platform,
        credential: PlatformCredential,
    ) {
        self.accounts
            .write()
            .await
            .insert((user_id.into(), platform), credential);
    }

    /// Disconnect an account
    pub async fn disconnect(&self, user_id: &str, platform: Platform) {
        self.accounts
            .write()
            .await
            .remove(&(user_id.to_string(), platform));
    }

    /// Seed a single user's accounts from environment variables
    ///
    /// Reads `FB_PAGE_ID`/`FB_PAGE_ACCESS_TOKEN`, `IG_USER_ID`/
    /// `IG_ACCESS_TOKEN`, and `LINKEDIN_USER_ID`/`LINKEDIN_ACCESS_TOKEN`
    /// (plus `LINKEDIN_ORGANIZATION_ID` for Company posting). Variables
    /// that are absent leave that platform disconnected.
    pub async fn seed_from_env(&self, user_id: &str) {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let (Some(page_id), Some(access_token)) =
            (env("FB_PAGE_ID"), env("FB_PAGE_ACCESS_TOKEN"))
        {
            self.connect(
                user_id,
                Platform::Facebook,
                PlatformCredential::Facebook {
                    page_id,
                    access_token,
                },
            )
            .await;
        }

        if let (Some(ig_user_id), Some(access_token)) = (env("IG_USER_ID"), env("IG_ACCESS_TOKEN"))
        {
            self.connect(
                user_id,
                Platform::Instagram,
                PlatformCredential::Instagram {
                    ig_user_id,
                    access_token,
                },
            )
            .await;
        }

        if let (Some(member_id), Some(access_token)) =
            (env("LINKEDIN_USER_ID"), env("LINKEDIN_ACCESS_TOKEN"))
        {
            self.connect(
                user_id,
                Platform::LinkedinPersonal,
                PlatformCredential::LinkedIn {
                    member_id: member_id.clone(),
                    organization_id: None,
                    access_token: access_token.clone(),
                },
            )
            .await;

            if let Some(organization_id) = env("LINKEDIN_ORGANIZATION_ID") {
                self.connect(
                    user_id,
                    Platform::LinkedinCompany,
                    PlatformCredential::LinkedIn {
                        member_id,
                        organization_id: Some(organization_id),
                        access_token,
                    },
                )
                .await;
            }
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, user_id: &str, platform: Platform) -> Option<PlatformCredential> {
        self.accounts
            .read()
            .await
            .get(&(user_id.to_string(), platform))
            .cloned()
    }
}

// ============================================================================
// Posts
// ============================================================================

/// Read/write access to stored post documents
///
/// The publish core only reads posts and persists final status/results;
/// draft CRUD belongs to a collaborator.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Fetch one post
    async fn get(&self, post_id: &str) -> Option<Post>;

    /// Scheduled posts whose time has elapsed
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Vec<Post>;

    /// Persist the outcome of a publish attempt
    async fn record_publish(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<DateTime<Utc>>,
        results: HashMap<String, serde_json::Value>,
    );
}

/// In-memory post store
#[derive(Default)]
pub struct InMemoryPostStore {
    posts: RwLock<HashMap<String, Post>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a post
    pub async fn upsert(&self, post: Post) {
        self.posts.write().await.insert(post.id.clone(), post);
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn get(&self, post_id: &str) -> Option<Post> {
        self.posts.read().await.get(post_id).cloned()
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Vec<Post> {
        self.posts
            .read()
            .await
            .values()
            .filter(|post| {
                post.status == PostStatus::Scheduled
                    && post.scheduled_at.map(|at| at <= now).unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    async fn record_publish(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<DateTime<Utc>>,
        results: HashMap<String, serde_json::Value>,
    ) {
        let mut posts = self.posts.write().await;

        if let Some(post) = posts.get_mut(post_id) {
            post.status = status;
            post.published_at = published_at;
            post.platform_results = results;
        }
    }
}

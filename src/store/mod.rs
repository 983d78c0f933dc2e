// Repository seams for the feed.
//
// The materializer never talks to sqlx directly; it goes through these traits
// so the SQLite store can be swapped for the in-memory one in tests.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DiscussionNode, User, Visibility};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Read surface over the discussion graph. Every method sees only
/// non-deleted rows; ordering is newest first throughout.
#[async_trait]
pub trait DiscussionStore: Send + Sync {
    /// Root-level posts with the given visibility, `created_at` descending.
    async fn roots(&self, visibility: Visibility) -> Result<Vec<DiscussionNode>>;

    /// Children of `parent_id` that carry `comment_text`, `created_at`
    /// descending. An id with no matching rows (including a dangling one)
    /// yields an empty list.
    async fn comment_children(&self, parent_id: i64) -> Result<Vec<DiscussionNode>>;

    /// Number of children of `parent_id` with `like_marker_count > 0`.
    async fn like_count(&self, parent_id: i64) -> Result<i64>;

    /// Whether a like-bearing child of `parent_id` authored by `viewer_id`
    /// exists.
    async fn viewer_liked(&self, parent_id: i64, viewer_id: i64) -> Result<bool>;

    /// Number of children of `parent_id` with `comment_text` present.
    async fn comment_count(&self, parent_id: i64) -> Result<i64>;
}

/// Lookup of user accounts. Soft-deleted users do not resolve.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Insert payload for the write surface of the concrete stores. Writes are
/// used by seeding and tests; the materializer itself never mutates.
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub parent_id: Option<i64>,
    pub visibility: Option<Visibility>,
    pub author_id: Option<i64>,
    /// `None` means "now".
    pub created_at: Option<i64>,
    pub like_marker_count: i64,
    pub title: Option<String>,
    pub comment_text: Option<String>,
}

impl NewNode {
    pub fn root(author_id: i64, title: &str, body: &str) -> Self {
        NewNode {
            author_id: Some(author_id),
            title: Some(title.to_string()),
            comment_text: Some(body.to_string()),
            ..Default::default()
        }
    }

    pub fn comment(parent_id: i64, author_id: i64, text: &str) -> Self {
        NewNode {
            parent_id: Some(parent_id),
            author_id: Some(author_id),
            comment_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn like(parent_id: i64, author_id: i64) -> Self {
        NewNode {
            parent_id: Some(parent_id),
            author_id: Some(author_id),
            like_marker_count: 1,
            ..Default::default()
        }
    }

    pub fn at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Some(Visibility::Private);
        self
    }
}

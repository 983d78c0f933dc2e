use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::models::{DiscussionNode, User, Visibility};
use crate::store::{DiscussionStore, NewNode, UserDirectory};

// In-memory store implementing the same repository surface as the SQLite
// store. Used by tests; the filter logic mirrors the SQL queries.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    failing: AtomicBool,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<DiscussionNode>,
    users: Vec<User>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every store call fail, simulating an unavailable backend.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("store offline"))
        } else {
            Ok(())
        }
    }

    pub async fn create_user(&self, display_name: &str, email: &str) -> User {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            deleted: false,
        };
        inner.users.push(user.clone());
        user
    }

    pub async fn create_node(&self, new: NewNode) -> DiscussionNode {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let node = DiscussionNode {
            id: inner.next_id,
            parent_id: new.parent_id,
            visibility: new.visibility.unwrap_or(Visibility::Public),
            author_id: new.author_id,
            created_at: new.created_at.unwrap_or_else(|| Utc::now().timestamp()),
            like_marker_count: new.like_marker_count,
            title: new.title,
            comment_text: new.comment_text,
            deleted: false,
        };
        inner.nodes.push(node.clone());
        node
    }

    /// Insert a node with an explicit id and parent, bypassing id assignment.
    /// Lets tests build dangling references and parent cycles.
    pub async fn insert_raw(&self, node: DiscussionNode) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(node.id);
        inner.nodes.push(node);
    }

    pub async fn soft_delete_node(&self, id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.iter_mut().find(|n| n.id == id) {
            node.deleted = true;
        }
    }

    pub async fn soft_delete_user(&self, id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.deleted = true;
        }
    }

    fn sort_newest_first(nodes: &mut [DiscussionNode]) {
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    }
}

#[async_trait]
impl DiscussionStore for MemoryStore {
    async fn roots(&self, visibility: Visibility) -> Result<Vec<DiscussionNode>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut roots: Vec<DiscussionNode> = inner
            .nodes
            .iter()
            .filter(|n| n.parent_id.is_none() && !n.deleted && n.visibility == visibility)
            .cloned()
            .collect();
        Self::sort_newest_first(&mut roots);
        Ok(roots)
    }

    async fn comment_children(&self, parent_id: i64) -> Result<Vec<DiscussionNode>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut children: Vec<DiscussionNode> = inner
            .nodes
            .iter()
            .filter(|n| n.parent_id == Some(parent_id) && !n.deleted && n.comment_text.is_some())
            .cloned()
            .collect();
        Self::sort_newest_first(&mut children);
        Ok(children)
    }

    async fn like_count(&self, parent_id: i64) -> Result<i64> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .iter()
            .filter(|n| n.parent_id == Some(parent_id) && !n.deleted && n.like_marker_count > 0)
            .count() as i64)
    }

    async fn viewer_liked(&self, parent_id: i64, viewer_id: i64) -> Result<bool> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.nodes.iter().any(|n| {
            n.parent_id == Some(parent_id)
                && !n.deleted
                && n.like_marker_count > 0
                && n.author_id == Some(viewer_id)
        }))
    }

    async fn comment_count(&self, parent_id: i64) -> Result<i64> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .iter()
            .filter(|n| n.parent_id == Some(parent_id) && !n.deleted && n.comment_text.is_some())
            .count() as i64)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.id == id && !u.deleted)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.email == email && !u.deleted)
            .cloned())
    }
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use sqlx::{sqlite::SqlitePool, Row};
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::models::{DiscussionNode, User, Visibility};
use crate::store::{DiscussionStore, NewNode, UserDirectory};

// Async SQLite store with an SQLx connection pool and LRU read caches in
// front of the hot child-list and count queries. Caches are invalidated on
// write, after the statement has committed.
pub struct SqliteStore {
    pub pool: SqlitePool,
    children_cache: Mutex<LruCache<i64, Vec<DiscussionNode>>>,
    count_cache: Mutex<LruCache<String, i64>>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, cache_capacity: usize) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let capacity = NonZeroUsize::new(cache_capacity.max(1)).unwrap();

        Ok(SqliteStore {
            pool,
            children_cache: Mutex::new(LruCache::new(capacity)),
            count_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub async fn init(&self) -> Result<()> {
        // One table for posts, comments and like markers alike. parent_id = 0
        // is the legacy root sentinel; like_marker_count > 0 marks a like row,
        // comment_text presence marks a comment row.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL DEFAULT 0,
                visibility TEXT NOT NULL DEFAULT 'public',
                author_id INTEGER,
                created_at INTEGER NOT NULL,
                like_marker_count INTEGER NOT NULL DEFAULT 0,
                title TEXT,
                comment_text TEXT,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        // Covering indexes for the feed read path
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent_created
             ON nodes(parent_id, deleted, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_nodes_roots
             ON nodes(parent_id, visibility, deleted)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn node_from_row(row: &sqlx::sqlite::SqliteRow) -> DiscussionNode {
        let parent_raw: i64 = row.get("parent_id");
        let visibility_raw: String = row.get("visibility");
        DiscussionNode {
            id: row.get("id"),
            // Legacy rows use 0 where newer rows use NULL; both mean root
            parent_id: if parent_raw == 0 { None } else { Some(parent_raw) },
            visibility: Visibility::from_str(&visibility_raw).unwrap_or(Visibility::Public),
            author_id: row.get("author_id"),
            created_at: row.get("created_at"),
            like_marker_count: row.get("like_marker_count"),
            title: row.get("title"),
            comment_text: row.get("comment_text"),
            deleted: row.get::<i64, _>("deleted") != 0,
        }
    }

    fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
        User {
            id: row.get("id"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            deleted: row.get::<i64, _>("deleted") != 0,
        }
    }

    pub async fn create_user(&self, display_name: &str, email: &str) -> Result<User> {
        let result = sqlx::query("INSERT INTO users (display_name, email) VALUES (?, ?)")
            .bind(display_name)
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            deleted: false,
        })
    }

    pub async fn create_node(&self, new: NewNode) -> Result<DiscussionNode> {
        let created_at = new.created_at.unwrap_or_else(|| Utc::now().timestamp());
        let visibility = new.visibility.unwrap_or(Visibility::Public);
        let parent_raw = new.parent_id.unwrap_or(0);

        let result = sqlx::query(
            "INSERT INTO nodes
             (parent_id, visibility, author_id, created_at, like_marker_count, title, comment_text)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(parent_raw)
        .bind(visibility.as_str())
        .bind(new.author_id)
        .bind(created_at)
        .bind(new.like_marker_count)
        .bind(&new.title)
        .bind(&new.comment_text)
        .execute(&self.pool)
        .await?;

        let node = DiscussionNode {
            id: result.last_insert_rowid(),
            parent_id: new.parent_id,
            visibility,
            author_id: new.author_id,
            created_at,
            like_marker_count: new.like_marker_count,
            title: new.title,
            comment_text: new.comment_text,
            deleted: false,
        };

        self.invalidate_parent(parent_raw).await;

        Ok(node)
    }

    pub async fn soft_delete_node(&self, id: i64) -> Result<()> {
        let row = sqlx::query("SELECT parent_id FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        sqlx::query("UPDATE nodes SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if let Some(row) = row {
            self.invalidate_parent(row.get("parent_id")).await;
        }
        self.invalidate_parent(id).await;

        Ok(())
    }

    pub async fn soft_delete_user(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn invalidate_parent(&self, parent_id: i64) {
        self.children_cache.lock().await.pop(&parent_id);
        let mut counts = self.count_cache.lock().await;
        counts.pop(&format!("like:{}", parent_id));
        counts.pop(&format!("comment:{}", parent_id));
    }

    async fn cached_count(&self, key: String, query: &str, parent_id: i64) -> Result<i64> {
        {
            let mut cache = self.count_cache.lock().await;
            if let Some(count) = cache.get(&key).copied() {
                return Ok(count);
            }
        }

        let row = sqlx::query(query)
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get(0);

        self.count_cache.lock().await.put(key, count);
        Ok(count)
    }
}

#[async_trait]
impl DiscussionStore for SqliteStore {
    async fn roots(&self, visibility: Visibility) -> Result<Vec<DiscussionNode>> {
        let rows = sqlx::query(
            "SELECT id, parent_id, visibility, author_id, created_at,
                    like_marker_count, title, comment_text, deleted
             FROM nodes
             WHERE (parent_id = 0 OR parent_id IS NULL)
               AND deleted = 0 AND visibility = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(visibility.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::node_from_row).collect())
    }

    async fn comment_children(&self, parent_id: i64) -> Result<Vec<DiscussionNode>> {
        {
            let mut cache = self.children_cache.lock().await;
            if let Some(children) = cache.get(&parent_id).cloned() {
                return Ok(children);
            }
        }

        let rows = sqlx::query(
            "SELECT id, parent_id, visibility, author_id, created_at,
                    like_marker_count, title, comment_text, deleted
             FROM nodes
             WHERE parent_id = ? AND deleted = 0 AND comment_text IS NOT NULL
             ORDER BY created_at DESC, id DESC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        let children: Vec<DiscussionNode> = rows.iter().map(Self::node_from_row).collect();
        self.children_cache
            .lock()
            .await
            .put(parent_id, children.clone());

        Ok(children)
    }

    async fn like_count(&self, parent_id: i64) -> Result<i64> {
        self.cached_count(
            format!("like:{}", parent_id),
            "SELECT COUNT(*) FROM nodes
             WHERE parent_id = ? AND deleted = 0 AND like_marker_count > 0",
            parent_id,
        )
        .await
    }

    async fn viewer_liked(&self, parent_id: i64, viewer_id: i64) -> Result<bool> {
        // Viewer-dependent, so never cached
        let row = sqlx::query(
            "SELECT EXISTS(
                SELECT 1 FROM nodes
                WHERE parent_id = ? AND deleted = 0
                  AND like_marker_count > 0 AND author_id = ?
             )",
        )
        .bind(parent_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>(0) != 0)
    }

    async fn comment_count(&self, parent_id: i64) -> Result<i64> {
        self.cached_count(
            format!("comment:{}", parent_id),
            "SELECT COUNT(*) FROM nodes
             WHERE parent_id = ? AND deleted = 0 AND comment_text IS NOT NULL",
            parent_id,
        )
        .await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, deleted FROM users WHERE id = ? AND deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::user_from_row))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, display_name, email, deleted FROM users WHERE email = ? AND deleted = 0",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::user_from_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("agora_test.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let store = SqliteStore::new(&url, 16).await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn roots_are_public_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let user = store.create_user("ada", "ada@example.com").await.unwrap();

        store
            .create_node(NewNode::root(user.id, "old", "first post").at(100))
            .await
            .unwrap();
        store
            .create_node(NewNode::root(user.id, "new", "second post").at(200))
            .await
            .unwrap();
        store
            .create_node(NewNode::root(user.id, "hidden", "private post").at(300).private())
            .await
            .unwrap();

        let roots = store.roots(Visibility::Public).await.unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].title.as_deref(), Some("new"));
        assert_eq!(roots[1].title.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn counts_separate_likes_from_comments() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let author = store.create_user("ada", "ada@example.com").await.unwrap();
        let fan = store.create_user("bob", "bob@example.com").await.unwrap();

        let root = store
            .create_node(NewNode::root(author.id, "post", "hello").at(100))
            .await
            .unwrap();
        store
            .create_node(NewNode::comment(root.id, fan.id, "nice").at(110))
            .await
            .unwrap();
        store
            .create_node(NewNode::like(root.id, fan.id).at(120))
            .await
            .unwrap();

        assert_eq!(store.like_count(root.id).await.unwrap(), 1);
        assert_eq!(store.comment_count(root.id).await.unwrap(), 1);
        assert!(store.viewer_liked(root.id, fan.id).await.unwrap());
        assert!(!store.viewer_liked(root.id, author.id).await.unwrap());

        // Comment rows are the only children surfaced for traversal
        let children = store.comment_children(root.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].comment_text.as_deref(), Some("nice"));
    }

    #[tokio::test]
    async fn soft_delete_hides_rows_and_invalidates_caches() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let user = store.create_user("ada", "ada@example.com").await.unwrap();

        let root = store
            .create_node(NewNode::root(user.id, "post", "hello").at(100))
            .await
            .unwrap();
        let comment = store
            .create_node(NewNode::comment(root.id, user.id, "bye").at(110))
            .await
            .unwrap();

        // Populate the caches, then delete behind them
        assert_eq!(store.comment_count(root.id).await.unwrap(), 1);
        assert_eq!(store.comment_children(root.id).await.unwrap().len(), 1);

        store.soft_delete_node(comment.id).await.unwrap();
        assert_eq!(store.comment_count(root.id).await.unwrap(), 0);
        assert!(store.comment_children(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_users_do_not_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        let user = store.create_user("ada", "ada@example.com").await.unwrap();

        assert!(store.find_user(user.id).await.unwrap().is_some());
        assert!(store
            .find_by_email("ada@example.com")
            .await
            .unwrap()
            .is_some());

        store.soft_delete_user(user.id).await.unwrap();
        assert!(store.find_user(user.id).await.unwrap().is_none());
        assert!(store
            .find_by_email("ada@example.com")
            .await
            .unwrap()
            .is_none());
    }
}

// ThreadMaterializer - materializes the public discussion feed as fully
// nested comment trees, decorated with like aggregates and author names.
//
// The traversal is iterative and level-by-level rather than recursive: each
// round fetches the comment children of the previous level concurrently, a
// visited set drops repeated ids so a corrupt parent chain cannot loop, and
// depth/node guards truncate pathological trees. The whole call runs under a
// timeout. Reads only; viewing never mutates anything.

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::timeout;

use crate::error::{AppError, AppResult};
use crate::feed::TraversalLimits;
use crate::models::{DecoratedNode, DiscussionNode, Visibility};
use crate::store::{DiscussionStore, UserDirectory};
use crate::viewer::ViewerContext;

pub struct ThreadMaterializer {
    store: Arc<dyn DiscussionStore>,
    directory: Arc<dyn UserDirectory>,
    limits: TraversalLimits,
}

/// Per-node aggregates, all counted against the node's direct children only.
struct Aggregates {
    like_count: i64,
    viewer_has_liked: bool,
    comment_count: i64,
}

impl ThreadMaterializer {
    pub fn new(
        store: Arc<dyn DiscussionStore>,
        directory: Arc<dyn UserDirectory>,
        limits: TraversalLimits,
    ) -> Self {
        ThreadMaterializer {
            store,
            directory,
            limits,
        }
    }

    /// The public top-level feed for `viewer`: public, non-deleted roots,
    /// newest first, each carrying its decorated comment tree.
    ///
    /// All-or-nothing: an unresolvable viewer fails with `UserNotFound`, a
    /// store failure anywhere during traversal fails with `StoreUnavailable`,
    /// and no partial tree is ever returned.
    pub async fn build_feed(&self, viewer: &ViewerContext) -> AppResult<Vec<DecoratedNode>> {
        let deadline = self.limits.timeout;
        match timeout(deadline, self.feed_inner(viewer.user_id)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "feed materialization exceeded {}ms",
                deadline.as_millis()
            ))),
        }
    }

    /// The decorated comment tree below a single node. Same contract as
    /// `build_feed`; a dangling or unknown `node_id` yields an empty list.
    pub async fn build_subtree(
        &self,
        node_id: i64,
        viewer: &ViewerContext,
    ) -> AppResult<Vec<DecoratedNode>> {
        let deadline = self.limits.timeout;
        match timeout(deadline, self.subtree_inner(node_id, viewer.user_id)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "subtree materialization exceeded {}ms",
                deadline.as_millis()
            ))),
        }
    }

    async fn feed_inner(&self, viewer_id: i64) -> AppResult<Vec<DecoratedNode>> {
        self.resolve_viewer(viewer_id).await?;
        let roots = self.store.roots(Visibility::Public).await?;
        tracing::debug!(roots = roots.len(), viewer = viewer_id, "materializing feed");
        self.materialize(roots, viewer_id).await
    }

    async fn subtree_inner(&self, node_id: i64, viewer_id: i64) -> AppResult<Vec<DecoratedNode>> {
        self.resolve_viewer(viewer_id).await?;
        let children = self.store.comment_children(node_id).await?;
        self.materialize(children, viewer_id).await
    }

    async fn resolve_viewer(&self, viewer_id: i64) -> AppResult<()> {
        match self.directory.find_user(viewer_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::UserNotFound(format!(
                "viewer {} does not resolve to a live account",
                viewer_id
            ))),
        }
    }

    /// Core traversal: collect levels breadth-first, decorate every collected
    /// node, then assemble deepest level first so children are always built
    /// before their parent.
    async fn materialize(
        &self,
        seed: Vec<DiscussionNode>,
        viewer_id: i64,
    ) -> AppResult<Vec<DecoratedNode>> {
        // Ordered child ids per parent; assembly replays this order.
        let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut visited: HashSet<i64> = seed.iter().map(|n| n.id).collect();
        let mut total = seed.len();

        let mut levels: Vec<Vec<DiscussionNode>> = vec![seed];
        let mut depth = 0;

        while !levels[depth].is_empty() {
            // The timeout can only fire at an await that yields; make each
            // level one even when the store answers without suspending
            tokio::task::yield_now().await;

            if depth >= self.limits.max_depth {
                tracing::warn!(
                    depth,
                    limit = self.limits.max_depth,
                    "feed traversal truncated at depth limit"
                );
                break;
            }

            let parent_ids: Vec<i64> = levels[depth].iter().map(|n| n.id).collect();
            let fetched = try_join_all(
                parent_ids
                    .iter()
                    .map(|id| self.store.comment_children(*id)),
            )
            .await?;

            let mut next = Vec::new();
            'level: for (parent_id, children) in parent_ids.into_iter().zip(fetched) {
                for child in children {
                    if total >= self.limits.max_nodes {
                        tracing::warn!(
                            limit = self.limits.max_nodes,
                            "feed traversal truncated at node limit"
                        );
                        break 'level;
                    }
                    // Repeated id means a corrupt parent chain; drop it
                    if !visited.insert(child.id) {
                        tracing::warn!(node = child.id, "cycle in comment graph, skipping node");
                        continue;
                    }
                    children_of.entry(parent_id).or_default().push(child.id);
                    total += 1;
                    next.push(child);
                }
            }

            levels.push(next);
            depth += 1;
        }

        let collected: Vec<&DiscussionNode> = levels.iter().flatten().collect();
        let aggregates = self.aggregates_for(&collected, viewer_id).await?;
        let authors = self.resolve_authors(&collected).await?;

        // Bottom-up assembly: by the time a level is processed, every child
        // it references is already in `built`.
        let mut built: HashMap<i64, DecoratedNode> = HashMap::new();
        for level in levels.iter().rev() {
            for node in level {
                let comments = children_of
                    .get(&node.id)
                    .map(|ids| ids.iter().filter_map(|id| built.remove(id)).collect())
                    .unwrap_or_default();
                let agg = &aggregates[&node.id];
                built.insert(
                    node.id,
                    DecoratedNode {
                        id: node.id,
                        parent_id: node.parent_id,
                        title: node.title.clone(),
                        content: node.comment_text.clone(),
                        author_name: node
                            .author_id
                            .and_then(|id| authors.get(&id).cloned()),
                        created_at: node.created_at,
                        like_count: agg.like_count,
                        viewer_has_liked: agg.viewer_has_liked,
                        comment_count: agg.comment_count,
                        comments,
                    },
                );
            }
        }

        Ok(levels[0]
            .iter()
            .filter_map(|n| built.remove(&n.id))
            .collect())
    }

    /// Count queries for every collected node, siblings in flight together.
    async fn aggregates_for(
        &self,
        nodes: &[&DiscussionNode],
        viewer_id: i64,
    ) -> AppResult<HashMap<i64, Aggregates>> {
        let results = try_join_all(nodes.iter().map(|node| async move {
            let (like_count, viewer_has_liked, comment_count) = futures::try_join!(
                self.store.like_count(node.id),
                self.store.viewer_liked(node.id, viewer_id),
                self.store.comment_count(node.id),
            )?;
            anyhow::Ok((
                node.id,
                Aggregates {
                    like_count,
                    viewer_has_liked,
                    comment_count,
                },
            ))
        }))
        .await?;

        Ok(results.into_iter().collect())
    }

    /// One directory lookup per distinct author; unresolvable authors simply
    /// have no entry and decorate as `None`.
    async fn resolve_authors(
        &self,
        nodes: &[&DiscussionNode],
    ) -> AppResult<HashMap<i64, String>> {
        let ids: Vec<i64> = nodes
            .iter()
            .filter_map(|n| n.author_id)
            .collect::<HashSet<i64>>()
            .into_iter()
            .collect();

        let users = try_join_all(ids.iter().map(|id| self.directory.find_user(*id))).await?;

        Ok(ids
            .into_iter()
            .zip(users)
            .filter_map(|(id, user)| user.map(|u| (id, u.display_name)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use crate::store::{MemoryStore, NewNode};
    use std::time::Duration;

    fn materializer_with_limits(
        store: Arc<MemoryStore>,
        limits: TraversalLimits,
    ) -> ThreadMaterializer {
        ThreadMaterializer::new(store.clone(), store, limits)
    }

    fn raw(id: i64, parent_id: Option<i64>, created_at: i64) -> crate::models::DiscussionNode {
        crate::models::DiscussionNode {
            id,
            parent_id,
            visibility: Visibility::Public,
            author_id: None,
            created_at,
            like_marker_count: 0,
            title: None,
            comment_text: Some(format!("node {}", id)),
            deleted: false,
        }
    }

    #[tokio::test]
    async fn cycle_in_parent_chain_terminates() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;

        // Root 10 -> comment 11 -> comment 12 -> back to 11
        let mut root = raw(10, None, 100);
        root.title = Some("root".into());
        store.insert_raw(root).await;
        store.insert_raw(raw(11, Some(10), 110)).await;
        store.insert_raw(raw(12, Some(11), 120)).await;
        store.insert_raw(raw(11, Some(12), 130)).await;

        let m = materializer_with_limits(store, TraversalLimits::default());
        let feed = m.build_feed(&ViewerContext::new(viewer.id)).await.unwrap();

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].comments.len(), 1);
        assert_eq!(feed[0].comments[0].id, 11);
        assert_eq!(feed[0].comments[0].comments.len(), 1);
        assert_eq!(feed[0].comments[0].comments[0].id, 12);
        // The repeated id 11 below 12 was dropped
        assert!(feed[0].comments[0].comments[0].comments.is_empty());
    }

    #[tokio::test]
    async fn depth_limit_truncates_instead_of_failing() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;

        let root = store
            .create_node(NewNode::root(viewer.id, "deep", "root").at(100))
            .await;
        let mut parent = root.id;
        for i in 0..6 {
            let comment = store
                .create_node(NewNode::comment(parent, viewer.id, "reply").at(100 + i))
                .await;
            parent = comment.id;
        }

        let limits = TraversalLimits {
            max_depth: 2,
            ..TraversalLimits::default()
        };
        let m = materializer_with_limits(store, limits);
        let feed = m.build_feed(&ViewerContext::new(viewer.id)).await.unwrap();

        let first = &feed[0].comments[0];
        let second = &first.comments[0];
        assert!(second.comments.is_empty());
        // The truncated node still reports what lies beneath it
        assert_eq!(second.comment_count, 1);
    }

    #[tokio::test]
    async fn node_limit_caps_materialized_tree() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;

        let root = store
            .create_node(NewNode::root(viewer.id, "wide", "root").at(100))
            .await;
        for i in 0..20 {
            store
                .create_node(NewNode::comment(root.id, viewer.id, "reply").at(200 + i))
                .await;
        }

        let limits = TraversalLimits {
            max_nodes: 5,
            ..TraversalLimits::default()
        };
        let m = materializer_with_limits(store, limits);
        let feed = m.build_feed(&ViewerContext::new(viewer.id)).await.unwrap();

        assert_eq!(feed.len(), 1);
        // Root plus four newest comments
        assert_eq!(feed[0].comments.len(), 4);
        assert_eq!(feed[0].comment_count, 20);
    }

    #[tokio::test]
    async fn subtree_of_unknown_node_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;

        let m = materializer_with_limits(store, TraversalLimits::default());
        let subtree = m
            .build_subtree(9999, &ViewerContext::new(viewer.id))
            .await
            .unwrap();
        assert!(subtree.is_empty());
    }

    #[tokio::test]
    async fn store_outage_mid_traversal_fails_whole_call() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;
        store
            .create_node(NewNode::root(viewer.id, "post", "hello").at(100))
            .await;

        let m = materializer_with_limits(store.clone(), TraversalLimits::default());
        store.set_failing(true);

        let err = m
            .build_feed(&ViewerContext::new(viewer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_timeout_error() {
        let store = Arc::new(MemoryStore::new());
        let viewer = store.create_user("v", "v@example.com").await;
        let root = store
            .create_node(NewNode::root(viewer.id, "post", "hello").at(100))
            .await;
        let mut parent = root.id;
        for i in 0..50 {
            let comment = store
                .create_node(NewNode::comment(parent, viewer.id, "reply").at(100 + i))
                .await;
            parent = comment.id;
        }

        let limits = TraversalLimits {
            max_depth: 100,
            timeout: Duration::from_nanos(1),
            ..TraversalLimits::default()
        };
        let m = materializer_with_limits(store, limits);
        let err = m
            .build_feed(&ViewerContext::new(viewer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}

use std::time::Duration;

use crate::config::FeedConfig;

/// Bounds on a single feed traversal. Depth and node limits truncate the
/// tree; the timeout fails the request.
#[derive(Debug, Clone, Copy)]
pub struct TraversalLimits {
    /// Maximum comment levels below the roots.
    pub max_depth: usize,
    /// Maximum total nodes materialized per request, roots included.
    pub max_nodes: usize,
    pub timeout: Duration,
}

impl TraversalLimits {
    pub fn from_config(feed: &FeedConfig) -> Self {
        TraversalLimits {
            max_depth: feed.max_depth,
            max_nodes: feed.max_nodes,
            timeout: Duration::from_millis(feed.timeout_ms),
        }
    }
}

impl Default for TraversalLimits {
    fn default() -> Self {
        TraversalLimits {
            max_depth: 32,
            max_nodes: 10_000,
            timeout: Duration::from_secs(5),
        }
    }
}

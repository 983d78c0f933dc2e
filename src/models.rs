// Domain types for the discussion feed.
//
// Posts, comments and like markers all live in the same `nodes` table and are
// modeled uniformly as DiscussionNode. A row with `comment_text` present is a
// comment; a row with `like_marker_count > 0` is a like-bearing interaction.
// The aggregate like count of a node is computed by counting such children,
// never read from the column itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// One row of the discussion graph: a root post, a comment, or a like marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionNode {
    pub id: i64,
    /// `None` for root-level posts. The store maps the legacy `0` sentinel to
    /// `None` on read.
    pub parent_id: Option<i64>,
    /// Only meaningful on roots; the top-level feed lists public roots only.
    pub visibility: Visibility,
    /// Absent for deleted/legacy authors.
    pub author_id: Option<i64>,
    /// UTC seconds. Ordering key, newest first.
    pub created_at: i64,
    /// Raw marker column; `> 0` means this row is a like-bearing interaction.
    pub like_marker_count: i64,
    /// Roots may carry a title; comments never do.
    pub title: Option<String>,
    /// Present iff the row is a comment.
    pub comment_text: Option<String>,
    pub deleted: bool,
}

impl DiscussionNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_comment(&self) -> bool {
        self.comment_text.is_some()
    }

    pub fn is_like_marker(&self) -> bool {
        self.like_marker_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub deleted: bool,
}

/// A node plus its computed aggregates, as served to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoratedNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: Option<String>,
    /// Resolved display name; `None` when the author is missing or
    /// unresolvable.
    pub author_name: Option<String>,
    pub created_at: i64,
    pub like_count: i64,
    pub viewer_has_liked: bool,
    pub comment_count: i64,
    pub comments: Vec<DecoratedNode>,
}

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static STATUS_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/status/(\d+)").expect("valid regex"));

// --- Query ---

/// One configured search: free-text terms plus a language filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub terms: String,
    pub language: String,
}

impl Query {
    pub fn new(terms: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            terms: terms.into(),
            language: language.into(),
        }
    }

    /// The string typed into the site search box, e.g. `Lula ONU lang:pt`.
    pub fn search_text(&self) -> String {
        if self.language.is_empty() {
            self.terms.clone()
        } else {
            format!("{} lang:{}", self.terms, self.language)
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.search_text())
    }
}

// --- StatusLink ---

/// Canonical URL of a thread root (`https://x.com/<user>/status/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusLink(String);

impl StatusLink {
    /// Resolve `href` against `base_url` and cut everything after the numeric
    /// status segment. Returns `None` when the href is not a status link.
    pub fn canonicalize(href: &str, base_url: &str) -> Option<Self> {
        let resolved = if href.starts_with("http://") || href.starts_with("https://") {
            url::Url::parse(href).ok()?
        } else {
            url::Url::parse(base_url).ok()?.join(href).ok()?
        };

        let path = resolved.path();
        let caps = STATUS_ID_RE.captures(path)?;
        let end = caps.get(0)?.end();

        let mut canonical = resolved.clone();
        canonical.set_path(&path[..end]);
        canonical.set_query(None);
        canonical.set_fragment(None);
        Some(Self(canonical.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric id of the thread root.
    pub fn status_id(&self) -> Option<&str> {
        status_id_from_path(&self.0)
    }
}

impl std::fmt::Display for StatusLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric status id parsed from any URL or path containing `/status/<digits>`.
pub fn status_id_from_path(path: &str) -> Option<&str> {
    STATUS_ID_RE
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

// --- Posts and conversations ---

/// One rendered post, extracted best-effort from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Option<String>,
    pub href: Option<String>,
    pub author_handle: Option<String>,
    pub display_name: Option<String>,
    pub body_text: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Posts collected for one thread, in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub link: StatusLink,
    pub posts: Vec<PostRecord>,
}

impl ConversationRecord {
    pub fn new(link: StatusLink) -> Self {
        Self {
            link,
            posts: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.posts.iter().any(|p| p.id.as_deref() == Some(id))
    }

    /// Append a post unless it has no id or its id is already present.
    /// Returns whether the post was added.
    pub fn push_unique(&mut self, post: PostRecord) -> bool {
        let Some(id) = post.id.as_deref() else {
            return false;
        };
        if self.contains_id(id) {
            return false;
        }
        self.posts.push(post);
        true
    }

    /// Earliest-timestamped post; the first post when none carry a timestamp.
    /// Ties keep traversal order.
    pub fn root(&self) -> Option<&PostRecord> {
        self.posts
            .iter()
            .filter(|p| p.published_at.is_some())
            .min_by_key(|p| p.published_at)
            .or_else(|| self.posts.first())
    }

    /// JSON text form stored in the `conversation` column.
    pub fn to_json_text(&self) -> String {
        serde_json::to_string(&self.posts).unwrap_or_else(|_| "[]".to_string())
    }
}

// --- Matches ---

/// A reply flagged by the match detector, joined with its thread root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub query: String,
    pub root_tweet_id: Option<String>,
    pub root_user: Option<String>,
    pub root_text: Option<String>,
    pub root_time: Option<DateTime<Utc>>,
    pub grok_tweet_id: Option<String>,
    pub grok_user: Option<String>,
    pub grok_displayname: Option<String>,
    pub grok_text: String,
    pub grok_time: Option<DateTime<Utc>>,
    pub conversation: ConversationRecord,
}

impl MatchRecord {
    pub fn new(query: &Query, conversation: &ConversationRecord, hit: &PostRecord) -> Self {
        let root = conversation.root();
        Self {
            id: Uuid::new_v4(),
            query: query.search_text(),
            root_tweet_id: root.and_then(|r| r.id.clone()),
            root_user: root.and_then(|r| r.author_handle.clone()),
            root_text: root.map(|r| r.body_text.clone()),
            root_time: root.and_then(|r| r.published_at),
            grok_tweet_id: hit.id.clone(),
            grok_user: hit.author_handle.clone(),
            grok_displayname: hit.display_name.clone(),
            grok_text: hit.body_text.clone(),
            grok_time: hit.published_at,
            conversation: conversation.clone(),
        }
    }
}

// --- Survey ---

/// Ordinal score for one reply line. `Unmapped` keeps the position of a line
/// that matched no vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<i8>", into = "Option<i8>")]
pub enum Score {
    Value(i8),
    Unmapped,
}

impl Score {
    pub fn value(self) -> Option<i8> {
        match self {
            Score::Value(v) => Some(v),
            Score::Unmapped => None,
        }
    }
}

impl From<Option<i8>> for Score {
    fn from(v: Option<i8>) -> Self {
        v.map(Score::Value).unwrap_or(Score::Unmapped)
    }
}

impl From<Score> for Option<i8> {
    fn from(s: Score) -> Self {
        s.value()
    }
}

/// Result of one survey run. `parsed_lines` and `mapped_scores` have equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub persona: Option<String>,
    pub prompt: String,
    pub raw_response: String,
    pub parsed_lines: Vec<String>,
    pub mapped_scores: Vec<Score>,
}

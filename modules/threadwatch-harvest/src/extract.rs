//! Field extraction from one rendered post.
//!
//! Each field is resolved by a prioritized rule table: rules are tried in
//! order and the first one that yields a value wins. Fields are independent,
//! so a miss on one never blocks the others. Rules run on the element's
//! serialized markup, which keeps them pure and testable without a browser.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use threadwatch_browser::{BrowserSession, ElementHandle};
use threadwatch_common::{status_id_from_path, ExtractionFailure, PostRecord};
use tracing::{debug, warn};

/// Rendered post elements on search results and thread pages.
pub const POST_SELECTOR: &str = "article[data-testid='tweet']";

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static TEXT_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-testid='tweetText']").expect("valid selector"));
static USER_NAME_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-testid='User-Name'] span").expect("valid selector"));
static DIR_AUTO_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[dir='auto'] span").expect("valid selector"));
static TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time[datetime]").expect("valid selector"));

static ABSOLUTE_PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?(?:twitter|x)\.com/([A-Za-z0-9_]{1,15})(?:[/?#]|$)")
        .expect("valid regex")
});
static RELATIVE_PROFILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]{1,15})/?$").expect("valid regex"));

/// First path segments that are site sections, not accounts.
const RESERVED_PATHS: &[&str] = &[
    "home",
    "explore",
    "search",
    "i",
    "hashtag",
    "settings",
    "notifications",
    "messages",
    "compose",
];

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

/// One named extraction strategy.
pub struct Rule<T> {
    pub name: &'static str,
    pub apply: fn(&PostView) -> Option<T>,
}

/// Try `rules` in order; the first value wins.
pub fn first_match<T>(
    field: &'static str,
    rules: &[Rule<T>],
    view: &PostView,
) -> Result<T, ExtractionFailure> {
    for rule in rules {
        if let Some(value) = (rule.apply)(view) {
            debug!(field, rule = rule.name, "Field extracted");
            return Ok(value);
        }
    }
    Err(ExtractionFailure::missing(field))
}

/// `(href, id)` of the post's own status link.
pub const STATUS_RULES: &[Rule<(String, String)>] = &[Rule {
    name: "first-status-anchor",
    apply: status_anchor,
}];

pub const BODY_RULES: &[Rule<String>] = &[
    Rule {
        name: "text-container",
        apply: text_container,
    },
    Rule {
        name: "whole-element-text",
        apply: whole_text,
    },
];

pub const HANDLE_RULES: &[Rule<String>] = &[
    Rule {
        name: "absolute-profile-url",
        apply: absolute_profile_handle,
    },
    Rule {
        name: "relative-profile-path",
        apply: relative_profile_handle,
    },
];

pub const DISPLAY_NAME_RULES: &[Rule<String>] = &[
    Rule {
        name: "user-name-header-span",
        apply: user_name_span,
    },
    Rule {
        name: "first-dir-auto-span",
        apply: dir_auto_span,
    },
];

pub const TIMESTAMP_RULES: &[Rule<DateTime<Utc>>] = &[Rule {
    name: "time-datetime-attribute",
    apply: time_attribute,
}];

// ---------------------------------------------------------------------------
// PostView
// ---------------------------------------------------------------------------

/// Parsed markup of one post element.
pub struct PostView {
    doc: Html,
}

impl PostView {
    /// `None` when the markup holds no element at all.
    pub fn parse(html: &str) -> Option<Self> {
        if html.trim().is_empty() {
            return None;
        }
        let doc = Html::parse_fragment(html);
        let has_element = doc
            .root_element()
            .children()
            .any(|c| ElementRef::wrap(c).is_some());
        has_element.then_some(Self { doc })
    }

    fn anchors(&self) -> impl Iterator<Item = &str> {
        self.doc
            .select(&ANCHOR)
            .filter_map(|a| a.value().attr("href"))
    }

    fn first_text(&self, selector: &Selector) -> Option<String> {
        self.doc
            .select(selector)
            .map(element_text)
            .find(|t| !t.is_empty())
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn status_anchor(view: &PostView) -> Option<(String, String)> {
    view.anchors().find_map(|href| {
        status_id_from_path(href).map(|id| (href.to_string(), id.to_string()))
    })
}

fn text_container(view: &PostView) -> Option<String> {
    view.first_text(&TEXT_CONTAINER)
}

fn whole_text(view: &PostView) -> Option<String> {
    let text = element_text(view.doc.root_element());
    (!text.is_empty()).then_some(text)
}

fn profile_handle(view: &PostView, re: &Regex) -> Option<String> {
    view.anchors()
        .filter(|href| status_id_from_path(href).is_none())
        .filter_map(|href| re.captures(href).map(|c| c[1].to_string()))
        .find(|handle| !RESERVED_PATHS.contains(&handle.to_ascii_lowercase().as_str()))
}

fn absolute_profile_handle(view: &PostView) -> Option<String> {
    profile_handle(view, &ABSOLUTE_PROFILE_RE)
}

fn relative_profile_handle(view: &PostView) -> Option<String> {
    profile_handle(view, &RELATIVE_PROFILE_RE)
}

fn user_name_span(view: &PostView) -> Option<String> {
    view.first_text(&USER_NAME_SPAN)
}

fn dir_auto_span(view: &PostView) -> Option<String> {
    view.first_text(&DIR_AUTO_SPAN)
}

/// Only the first `time` element counts; a value it carries that is not
/// RFC 3339 is a miss, not a reason to look further down the post.
fn time_attribute(view: &PostView) -> Option<DateTime<Utc>> {
    let raw = view.doc.select(&TIME).next()?.value().attr("datetime")?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(raw, error = %e, "Unparseable post timestamp");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn optional<T>(result: Result<T, ExtractionFailure>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(miss) => {
            debug!(field = miss.field, reason = miss.reason.as_str(), "Field not extracted");
            None
        }
    }
}

/// Structured record for one post. `None` when the markup is unusable.
pub fn extract_post(html: &str) -> Option<PostRecord> {
    let view = PostView::parse(html)?;

    let (href, id) = optional(first_match("id", STATUS_RULES, &view)).unzip();
    let body_text = optional(first_match("body_text", BODY_RULES, &view)).unwrap_or_default();

    Some(PostRecord {
        id,
        href,
        author_handle: optional(first_match("author_handle", HANDLE_RULES, &view)),
        display_name: optional(first_match("display_name", DISPLAY_NAME_RULES, &view)),
        body_text,
        published_at: optional(first_match("published_at", TIMESTAMP_RULES, &view)),
    })
}

/// Status href of a post, without extracting the other fields.
pub fn extract_status_href(html: &str) -> Option<String> {
    let view = PostView::parse(html)?;
    optional(first_match("id", STATUS_RULES, &view)).map(|(href, _)| href)
}

/// Read and extract one live element. Failures are logged and yield `None`.
pub async fn read_post(session: &dyn BrowserSession, handle: &ElementHandle) -> Option<PostRecord> {
    let html = match session.element_html(handle).await {
        Ok(html) => html,
        Err(e) => {
            warn!(index = handle.index, error = %e, "Could not read post element");
            return None;
        }
    };
    let post = extract_post(&html);
    if post.is_none() {
        warn!(index = handle.index, "Post element had no usable markup");
    }
    post
}

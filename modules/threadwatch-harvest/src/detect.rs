use threadwatch_common::{ConversationRecord, PostRecord};

/// Flags posts whose handle, display name or text contains the marker.
///
/// Matching is a case-insensitive substring test with no word boundaries,
/// so `grok` also matches inside unrelated words.
#[derive(Debug, Clone)]
pub struct MatchDetector {
    marker: String,
}

impl MatchDetector {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_lowercase(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_match(&self, post: &PostRecord) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(&self.marker);
        post.author_handle.as_deref().is_some_and(hit)
            || post.display_name.as_deref().is_some_and(hit)
            || hit(&post.body_text)
    }

    /// Matching posts in traversal order. Empty when nothing matches.
    pub fn detect<'a>(&self, conversation: &'a ConversationRecord) -> Vec<&'a PostRecord> {
        conversation
            .posts
            .iter()
            .filter(|p| self.is_match(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadwatch_common::StatusLink;

    fn post(handle: &str, name: &str, text: &str) -> PostRecord {
        PostRecord {
            id: Some(handle.to_string()),
            href: None,
            author_handle: Some(handle.to_string()),
            display_name: Some(name.to_string()),
            body_text: text.to_string(),
            published_at: None,
        }
    }

    #[test]
    fn handle_match_is_case_insensitive() {
        let d = MatchDetector::new("grok");
        assert!(d.is_match(&post("GROKbot", "X", "hello")));
    }

    #[test]
    fn body_substring_matches() {
        let d = MatchDetector::new("grok");
        assert!(d.is_match(&post("bob", "X", "I love grok!")));
    }

    #[test]
    fn display_name_matches() {
        let d = MatchDetector::new("GROK");
        assert!(d.is_match(&post("bob", "Grok Fan", "hi")));
    }

    #[test]
    fn marker_inside_unrelated_word_still_matches() {
        let d = MatchDetector::new("grok");
        assert!(d.is_match(&post("bob", "X", "they grokked it")));
    }

    #[test]
    fn absent_optional_fields_do_not_match() {
        let d = MatchDetector::new("grok");
        let p = PostRecord {
            id: None,
            href: None,
            author_handle: None,
            display_name: None,
            body_text: "nothing here".to_string(),
            published_at: None,
        };
        assert!(!d.is_match(&p));
    }

    #[test]
    fn detect_keeps_order_and_may_be_empty() {
        let d = MatchDetector::new("grok");
        let mut conv =
            ConversationRecord::new(StatusLink::canonicalize("/a/status/1", "https://x.com").unwrap());
        assert!(d.detect(&conv).is_empty());

        conv.push_unique(post("alice", "A", "plain"));
        conv.push_unique(post("grok", "Grok", "answer"));
        conv.push_unique(post("carol", "C", "@grok is this true?"));
        let hits: Vec<_> = d.detect(&conv).iter().filter_map(|p| p.author_handle.clone()).collect();
        assert_eq!(hits, vec!["grok", "carol"]);
    }
}

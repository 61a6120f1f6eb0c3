use std::sync::LazyLock;

use regex::Regex;
use threadwatch_common::Score;

static DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-4])\b").expect("valid regex"));

/// Phrases checked in order; the more specific phrase of each pair comes first.
const PHRASES: &[(&str, i8)] = &[
    ("discordo muito", -2),
    ("discordo", -1),
    ("concordo muito", 2),
    ("concordo", 1),
];

/// Lines of a reply and the score of each, positionally aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLines {
    pub lines: Vec<String>,
    pub scores: Vec<Score>,
}

fn digit_score(digit: &str) -> Option<i8> {
    match digit {
        "1" => Some(-2),
        "2" => Some(-1),
        "3" => Some(1),
        "4" => Some(2),
        _ => None,
    }
}

/// Score of one already lower-cased line.
pub fn map_line(line: &str) -> Score {
    if let Some(v) = DIGIT_RE
        .captures(line)
        .and_then(|c| digit_score(c.get(1)?.as_str()))
    {
        return Score::Value(v);
    }
    PHRASES
        .iter()
        .find(|(phrase, _)| line.contains(phrase))
        .map(|&(_, v)| Score::Value(v))
        .unwrap_or(Score::Unmapped)
}

/// Lower-case the reply, keep its non-empty trimmed lines, score each one.
/// A line that matches nothing keeps its slot as `Score::Unmapped`.
pub fn map_text_to_score(text: &str) -> MappedLines {
    let lines: Vec<String> = text
        .to_lowercase()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    let scores = lines.iter().map(|l| map_line(l)).collect();
    MappedLines { lines, scores }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_reply_preserves_positions() {
        let m = map_text_to_score("discordo muito\n3\nfoo");
        assert_eq!(m.lines, vec!["discordo muito", "3", "foo"]);
        assert_eq!(
            m.scores,
            vec![Score::Value(-2), Score::Value(1), Score::Unmapped]
        );
    }

    #[test]
    fn digit_table() {
        let m = map_text_to_score("1\n2\n3\n4\n5");
        assert_eq!(
            m.scores,
            vec![
                Score::Value(-2),
                Score::Value(-1),
                Score::Value(1),
                Score::Value(2),
                Score::Unmapped
            ]
        );
    }

    #[test]
    fn digit_wins_over_phrase() {
        assert_eq!(map_line("4) discordo"), Score::Value(2));
    }

    #[test]
    fn digit_inside_a_number_is_not_a_token() {
        assert_eq!(map_line("em 2024 concordo"), Score::Value(1));
    }

    #[test]
    fn specific_phrases_checked_first() {
        let m = map_text_to_score("Concordo muito.\nDISCORDO\nconcordo");
        assert_eq!(
            m.scores,
            vec![Score::Value(2), Score::Value(-1), Score::Value(1)]
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        let m = map_text_to_score("\n  concordo  \n\n\t\ndiscordo\n");
        assert_eq!(m.lines, vec!["concordo", "discordo"]);
        assert_eq!(m.lines.len(), m.scores.len());
    }

    #[test]
    fn empty_reply_maps_to_nothing() {
        let m = map_text_to_score("");
        assert!(m.lines.is_empty());
        assert!(m.scores.is_empty());
    }
}

//! Resilient parsing of grader output
//!
//! Graders are asked for small JSON objects or fixed labels, but model
//! output drifts: code fences, prose around the object, quoted numbers.
//! Every parser here is total and fails closed. Nothing in this module
//! returns an error.
//!
//! | Gate | Expected shape | Default when unparseable |
//! |---|---|---|
//! | relevance | `{"Score": 1-10, "Explanation": ".."}` | score 1 (irrelevant) |
//! | hallucination | `not hallucinated` / `hallucinated` | hallucinated |
//! | helpfulness | `{"Score": 0 or 1, "Explanation": ".."}` | unhelpful |

use crate::prompts::{GROUNDED_LABEL, HALLUCINATED_LABEL};
use crate::verdict::{GroundingVerdict, HelpfulnessGrade, RelevanceGrade};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static SCORE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"?\bscore"?\s*[:=]\s*\[?\s*"?(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#)
        .expect("score pattern is valid")
});

// Largest float that still holds every integer exactly (2^53)
const MAX_WHOLE_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Score and explanation read from a grader response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReading {
    pub score: i64,
    pub explanation: Option<String>,
}

/// Read the `Score` field from a grader response
///
/// When the response holds a valid JSON object, only that object is read.
/// Otherwise the number following the first `Score` key is used. Scores must
/// be integers; fractional or oversized values are unreadable.
pub fn read_score(text: &str) -> Option<ScoreReading> {
    if let Some(object) = outer_object(text) {
        return read_object(&object);
    }

    let captures = SCORE_KEY.captures(text)?;
    let score = captures.get(1)?.as_str().parse().ok()?;
    Some(ScoreReading {
        score,
        explanation: None,
    })
}

fn outer_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str(&text[start..=end]).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}

fn read_object(object: &serde_json::Map<String, Value>) -> Option<ScoreReading> {
    let field = |name: &str| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };

    let score = field("score").and_then(score_value)?;
    let explanation = field("explanation")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ScoreReading { score, explanation })
}

fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_WHOLE_FLOAT)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) if items.len() == 1 => score_value(&items[0]),
        _ => None,
    }
}

/// Parse a relevance grade, clamped to `[1, 10]`, defaulting to 1
pub fn parse_relevance(text: &str) -> RelevanceGrade {
    match read_score(text) {
        Some(reading) => RelevanceGrade {
            score: reading.score.clamp(
                i64::from(RelevanceGrade::MIN_SCORE),
                i64::from(RelevanceGrade::MAX_SCORE),
            ) as u8,
            explanation: reading.explanation,
            parsed: true,
        },
        None => RelevanceGrade::unparsed(),
    }
}

/// Parse a grounding label, defaulting to hallucinated
///
/// The response is trimmed, case-folded and stripped of surrounding quotes
/// and a trailing period, then matched exactly against the grounded label.
pub fn parse_grounding(text: &str) -> GroundingVerdict {
    let raw = text.to_string();
    if normalize_label(text) == GROUNDED_LABEL {
        GroundingVerdict::Grounded { raw }
    } else {
        GroundingVerdict::Hallucinated { raw }
    }
}

/// Whether the grounding response matched one of the two labels
pub fn is_known_grounding_label(text: &str) -> bool {
    let normalized = normalize_label(text);
    normalized == GROUNDED_LABEL || normalized == HALLUCINATED_LABEL
}

fn normalize_label(text: &str) -> String {
    text.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.') || c.is_whitespace())
        .to_lowercase()
}

/// Parse a helpfulness grade; an unparseable response carries no score
pub fn parse_helpfulness(text: &str) -> HelpfulnessGrade {
    match read_score(text) {
        Some(reading) => HelpfulnessGrade {
            score: Some(reading.score),
            explanation: reading.explanation,
        },
        None => HelpfulnessGrade {
            score: None,
            explanation: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_structured_relevance() {
        let grade = parse_relevance(
            r#"{"Score": 9, "Explanation": "The facts describe removal of mechanical parking."}"#,
        );
        assert_eq!(grade.score, 9);
        assert!(grade.parsed);
        assert_eq!(
            grade.explanation.as_deref(),
            Some("The facts describe removal of mechanical parking.")
        );
    }

    #[test]
    fn test_structured_inside_code_fence_and_prose() {
        let text =
            "Let me think.\n```json\n{\n  \"Score\": \"8\",\n  \"Explanation\": \"close\"\n}\n```";
        assert_eq!(parse_relevance(text).score, 8);
    }

    #[test]
    fn test_bracketed_score_from_template() {
        assert_eq!(parse_relevance(r#"{"Score": [7], "Explanation": "ok"}"#).score, 7);
    }

    #[test]
    fn test_fallback_to_key_token() {
        // trailing comma makes the object invalid JSON
        let text = r#"{"Score": 6, "Explanation": "weak",}"#;
        let grade = parse_relevance(text);
        assert_eq!(grade.score, 6);
        assert!(grade.parsed);
        assert_eq!(grade.explanation, None);

        assert_eq!(parse_relevance("Score: 10 because it matches").score, 10);
        assert_eq!(parse_relevance("Score: 7.").score, 7);
    }

    #[test]
    fn test_unparseable_relevance_fails_closed() {
        let grade = parse_relevance("These facts look highly relevant to me.");
        assert_eq!(grade, RelevanceGrade::unparsed());
        assert_eq!(grade.score, 1);

        assert_eq!(parse_relevance(r#"{"Explanation": "no score"}"#).score, 1);
        assert_eq!(parse_relevance("").score, 1);
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        assert_eq!(parse_relevance(r#"{"Score": 42}"#).score, 10);
        assert_eq!(parse_relevance(r#"{"Score": 0}"#).score, 1);
        assert_eq!(parse_relevance(r#"{"Score": -3}"#).score, 1);
    }

    #[test]
    fn test_fractional_scores_are_unreadable() {
        assert_eq!(parse_relevance(r#"{"Score": 6.5}"#), RelevanceGrade::unparsed());
        assert_eq!(parse_relevance(r#"{"Score": "6.5"}"#).score, 1);
        assert_eq!(parse_relevance("Score: 6.5").score, 1);
        assert_eq!(parse_relevance(r#"{"Score": 6.5, "Explanation": "x",}"#).score, 1);

        assert_eq!(parse_helpfulness(r#"{"Score": 0.6}"#).score, None);
        assert_eq!(parse_helpfulness("Score: 0.6").score, None);
    }

    #[test]
    fn test_oversized_scores_are_unreadable() {
        assert_eq!(parse_relevance(r#"{"Score": 1e300}"#), RelevanceGrade::unparsed());
        assert_eq!(parse_relevance("Score: 99999999999999999999").score, 1);
        assert_eq!(parse_helpfulness(r#"{"Score": 1e300}"#).score, None);
        assert_eq!(parse_helpfulness("Score: 1e300").score, None);
    }

    #[test]
    fn test_whole_float_scores_are_accepted() {
        assert_eq!(parse_relevance(r#"{"Score": 8.0}"#).score, 8);
        assert_eq!(parse_helpfulness(r#"{"Score": 1.0}"#).score, Some(1));
    }

    #[test]
    fn test_valid_object_without_score_ignores_surrounding_text() {
        let text = r#"Score: 10 {"Explanation": "no score here"}"#;
        assert_eq!(parse_relevance(text).score, 1);
    }

    #[test]
    fn test_grounding_labels() {
        assert!(parse_grounding("not hallucinated").is_grounded());
        assert!(parse_grounding("  \"Not Hallucinated.\"\n").is_grounded());
        assert!(!parse_grounding("hallucinated").is_grounded());
        assert!(!parse_grounding("The answer is not hallucinated").is_grounded());
        assert!(!parse_grounding("").is_grounded());
    }

    #[test]
    fn test_grounding_keeps_raw_text() {
        let verdict = parse_grounding(" hallucinated ");
        assert_eq!(verdict.raw(), " hallucinated ");
        assert!(is_known_grounding_label(verdict.raw()));
        assert!(!is_known_grounding_label("maybe"));
    }

    #[test]
    fn test_helpfulness_parse() {
        assert_eq!(parse_helpfulness(r#"{"Score": 1}"#).score, Some(1));
        assert_eq!(parse_helpfulness(r#"{"score": 0, "explanation": "vague"}"#).score, Some(0));
        assert_eq!(parse_helpfulness("I think it helps").score, None);
    }

    proptest! {
        #[test]
        fn relevance_score_always_in_range(text in ".*") {
            let grade = parse_relevance(&text);
            prop_assert!((1..=10).contains(&grade.score));
        }

        #[test]
        fn digitless_relevance_defaults_to_minimum(text in "[^0-9]*") {
            prop_assert_eq!(parse_relevance(&text).score, 1);
        }

        #[test]
        fn unknown_grounding_text_is_hallucinated(text in "[a-z ]{0,40}") {
            prop_assume!(text.trim() != GROUNDED_LABEL);
            prop_assert!(!parse_grounding(&text).is_grounded());
        }
    }
}

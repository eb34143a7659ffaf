//! Gate verdicts
//!
//! One tagged type per gate. Each variant keeps the raw score or text the
//! grader produced so callers can log and inspect why a gate routed the
//! way it did.

use serde::{Deserialize, Serialize};

/// Parsed output of the relevance grader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceGrade {
    /// Score in `[1, 10]`
    pub score: u8,

    /// Grader reasoning, when it could be recovered
    pub explanation: Option<String>,

    /// False when the score is the fail-closed default
    pub parsed: bool,
}

impl RelevanceGrade {
    /// Minimum score, used when nothing can be parsed
    pub const MIN_SCORE: u8 = 1;

    /// Maximum score on the rubric
    pub const MAX_SCORE: u8 = 10;

    /// Fail-closed grade
    pub fn unparsed() -> Self {
        Self {
            score: Self::MIN_SCORE,
            explanation: None,
            parsed: false,
        }
    }
}

/// Relevance gate verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RelevanceVerdict {
    Relevant(RelevanceGrade),
    Irrelevant(RelevanceGrade),
}

impl RelevanceVerdict {
    /// Apply the pass threshold to a grade
    pub fn from_grade(grade: RelevanceGrade, threshold: u8) -> Self {
        if grade.score >= threshold {
            Self::Relevant(grade)
        } else {
            Self::Irrelevant(grade)
        }
    }

    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::Relevant(_))
    }

    pub fn grade(&self) -> &RelevanceGrade {
        match self {
            Self::Relevant(grade) | Self::Irrelevant(grade) => grade,
        }
    }

    pub fn score(&self) -> u8 {
        self.grade().score
    }
}

/// Hallucination gate verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GroundingVerdict {
    Grounded { raw: String },
    Hallucinated { raw: String },
}

impl GroundingVerdict {
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded { .. })
    }

    /// Grader output as received
    pub fn raw(&self) -> &str {
        match self {
            Self::Grounded { raw } | Self::Hallucinated { raw } => raw,
        }
    }
}

/// Parsed output of the helpfulness grader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpfulnessGrade {
    /// Score as emitted, `None` when unparseable
    pub score: Option<i64>,

    /// Grader reasoning, when it could be recovered
    pub explanation: Option<String>,
}

/// Helpfulness gate verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HelpfulnessVerdict {
    Helpful(HelpfulnessGrade),
    Unhelpful(HelpfulnessGrade),
}

impl HelpfulnessVerdict {
    /// Only the exact pass score counts as helpful
    pub fn from_grade(grade: HelpfulnessGrade, pass_score: u8) -> Self {
        if grade.score == Some(i64::from(pass_score)) {
            Self::Helpful(grade)
        } else {
            Self::Unhelpful(grade)
        }
    }

    pub fn is_helpful(&self) -> bool {
        matches!(self, Self::Helpful(_))
    }

    pub fn grade(&self) -> &HelpfulnessGrade {
        match self {
            Self::Helpful(grade) | Self::Unhelpful(grade) => grade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(score: u8) -> RelevanceGrade {
        RelevanceGrade {
            score,
            explanation: None,
            parsed: true,
        }
    }

    #[test]
    fn test_relevance_threshold_boundary() {
        assert!(RelevanceVerdict::from_grade(grade(7), 7).is_relevant());
        assert!(RelevanceVerdict::from_grade(grade(10), 7).is_relevant());
        assert!(!RelevanceVerdict::from_grade(grade(6), 7).is_relevant());
        assert!(!RelevanceVerdict::from_grade(RelevanceGrade::unparsed(), 7).is_relevant());
    }

    #[test]
    fn test_helpfulness_requires_exact_pass_score() {
        let helpful = HelpfulnessGrade {
            score: Some(1),
            explanation: None,
        };
        let other = HelpfulnessGrade {
            score: Some(2),
            explanation: None,
        };
        let missing = HelpfulnessGrade {
            score: None,
            explanation: None,
        };

        assert!(HelpfulnessVerdict::from_grade(helpful, 1).is_helpful());
        assert!(!HelpfulnessVerdict::from_grade(other, 1).is_helpful());
        assert!(!HelpfulnessVerdict::from_grade(missing, 1).is_helpful());
    }

    #[test]
    fn test_verdict_serialization_is_tagged() {
        let verdict = RelevanceVerdict::from_grade(grade(9), 7);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["verdict"], "relevant");
        assert_eq!(json["score"], 9);
    }
}

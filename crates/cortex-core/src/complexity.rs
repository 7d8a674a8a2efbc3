//! Complexity estimation for escalation decisions.

use serde::Serialize;
use tracing::debug;

/// Keywords that each add [`KEYWORD_WEIGHT`] when present.
pub const COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture",
    "refactor",
    "optimize",
    "security",
    "algorithm",
    "performance",
    "scalability",
    "distributed",
    "design pattern",
    "best practices",
    "complex",
];

/// File-extension markers counted for the multi-file signal.
pub const FILE_EXTENSIONS: &[&str] = &[".go", ".rs", ".py", ".ts", ".js", ".java"];

/// Score added per distinct keyword match.
pub const KEYWORD_WEIGHT: f64 = 0.15;
/// Score added when the text references many files.
pub const FILE_WEIGHT: f64 = 0.2;
/// Score added per length boundary crossed.
pub const LENGTH_WEIGHT: f64 = 0.1;

const FILE_MENTION_LIMIT: usize = 3;
const LENGTH_STEPS: [usize; 2] = [500, 1000];

/// Complexity score with its contributing factors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityScore {
    /// Overall score in [0, 1].
    pub score: f64,
    /// Distinct keywords found, in vocabulary order.
    pub keyword_matches: Vec<&'static str>,
    /// Whether the multi-file signal fired.
    pub file_signal: bool,
    /// Bonus from text length (0.0, 0.1 or 0.2).
    pub length_bonus: f64,
}

/// Lexical complexity estimator.
///
/// Deterministic and stateless: the same text always yields the same score.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplexityEstimator;

impl ComplexityEstimator {
    /// Creates a new estimator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Estimates complexity of `text`.
    #[must_use]
    pub fn estimate(&self, text: &str) -> ComplexityScore {
        let lower = text.to_lowercase();

        let keyword_matches: Vec<&'static str> =
            COMPLEXITY_KEYWORDS.iter().copied().filter(|k| lower.contains(k)).collect();

        let file_signal = lower.matches("file").count() > FILE_MENTION_LIMIT
            || FILE_EXTENSIONS.iter().any(|ext| lower.matches(ext).count() > FILE_MENTION_LIMIT);

        let length = text.chars().count();
        let length_bonus =
            LENGTH_STEPS.iter().filter(|step| length > **step).count() as f64 * LENGTH_WEIGHT;

        let mut score = keyword_matches.len() as f64 * KEYWORD_WEIGHT + length_bonus;
        if file_signal {
            score += FILE_WEIGHT;
        }
        let score = score.clamp(0.0, 1.0);

        debug!(
            complexity_score = score,
            keyword_matches = keyword_matches.len(),
            file_signal,
            length_bonus,
            "Estimated task complexity"
        );

        ComplexityScore { score, keyword_matches, file_signal, length_bonus }
    }

    /// Convenience wrapper returning only the score.
    #[must_use]
    pub fn score(&self, text: &str) -> f64 {
        self.estimate(text).score
    }
}

/// Truncates `text` to `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_task_complexity() {
        let score = ComplexityEstimator::new().estimate("list files in current directory");
        assert!(score.score.abs() < f64::EPSILON);
        assert!(score.keyword_matches.is_empty());
        assert!(!score.file_signal);
    }

    #[test]
    fn test_keywords_are_counted_once() {
        let estimator = ComplexityEstimator::new();
        let score = estimator.estimate("Refactor the REFACTOR and refactor again for security");
        assert_eq!(score.keyword_matches, vec!["refactor", "security"]);
        assert!((score.score - 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_complex_matches_inside_other_words() {
        let score = ComplexityEstimator::new().estimate("explain its complexity");
        assert_eq!(score.keyword_matches, vec!["complex"]);
    }

    #[test]
    fn test_file_signal() {
        let estimator = ComplexityEstimator::new();
        assert!(!estimator.estimate("a.rs b.rs c.rs").file_signal);
        assert!(estimator.estimate("a.rs b.rs c.rs d.rs").file_signal);
        assert!(estimator.estimate("file file file file").file_signal);
        // Extensions are counted separately, not summed.
        assert!(!estimator.estimate("a.rs b.py c.ts d.js e.go").file_signal);
        assert!(estimator.estimate("A.JAVA B.JAVA C.JAVA D.JAVA").file_signal);
    }

    #[test]
    fn test_length_bonus() {
        let estimator = ComplexityEstimator::new();
        assert!(estimator.estimate(&"x".repeat(500)).length_bonus.abs() < f64::EPSILON);
        assert!((estimator.estimate(&"x".repeat(501)).length_bonus - 0.1).abs() < 1e-9);
        assert!((estimator.estimate(&"x".repeat(1001)).length_bonus - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_score_saturates_at_one() {
        let mut text = String::from(
            "architecture refactor optimize security algorithm performance scalability \
             distributed design pattern best practices complex ",
        );
        text.push_str(&"file.rs ".repeat(200));
        let score = ComplexityEstimator::new().estimate(&text);
        assert!((score.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_monotonic_in_keywords() {
        let estimator = ComplexityEstimator::new();
        let mut text = String::new();
        let mut previous = estimator.score(&text);
        for keyword in COMPLEXITY_KEYWORDS {
            text.push_str(keyword);
            text.push(' ');
            let current = estimator.score(&text);
            assert!(current >= previous, "score dropped after adding '{keyword}'");
            previous = current;
        }
    }

    #[test]
    fn test_score_in_unit_interval() {
        let estimator = ComplexityEstimator::new();
        let long = "security ".repeat(1000);
        for text in ["", "hello", long.as_str(), "ünïcödé .rs .rs .rs .rs"] {
            let score = estimator.score(text);
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 100), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("héllo", 2), "hé...");
    }
}

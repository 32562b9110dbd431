use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Probability per class label, as produced by one forward pass
pub type LabelDistribution = HashMap<String, f64>;

/// Arg-max of one inference call, with the full distribution it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationCandidate {
    pub label: String,
    pub confidence: f64,
    pub distribution: LabelDistribution,
    pub frame_id: u64,
}

impl ClassificationCandidate {
    /// Pick the arg-max entry. NaN probabilities never win.
    pub fn from_distribution(distribution: LabelDistribution, frame_id: u64) -> Option<Self> {
        let (label, confidence) = distribution
            .iter()
            .filter(|(_, p)| !p.is_nan())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(label, p)| (label.clone(), *p))?;

        Some(Self {
            label,
            confidence,
            distribution,
            frame_id,
        })
    }
}

/// Last accepted candidate, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Cleaned, human-readable label
    pub label: String,
    /// Label as emitted by the model
    pub raw_label: String,
    pub confidence: f64,
    pub distribution: Arc<LabelDistribution>,
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl ClassificationResult {
    /// Promote a candidate if the distribution gives its own label at least
    /// `threshold`; otherwise the candidate is dropped.
    pub fn accept(candidate: ClassificationCandidate, threshold: f64) -> Option<Self> {
        let confidence = *candidate.distribution.get(&candidate.label)?;
        if confidence < threshold {
            return None;
        }

        Some(Self {
            label: clean_label(&candidate.label),
            raw_label: candidate.label,
            confidence,
            distribution: Arc::new(candidate.distribution),
            frame_id: candidate.frame_id,
            timestamp: Utc::now(),
        })
    }
}

/// Turn a raw model label such as `"n02123045 tabby, tabby cat"` into `"Tabby"`.
///
/// Keeps the text before the first comma, drops a leading technical id
/// (a letter, digits, then whitespace), then capitalizes the first
/// character and lower-cases the rest.
pub fn clean_label(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or(raw);
    let words = strip_technical_id(first).trim();

    let mut chars = words.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn strip_technical_id(text: &str) -> &str {
    match text.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return text,
    }

    let digits_end = text[1..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |i| i + 1);
    if digits_end == 1 {
        return text;
    }

    let rest = &text[digits_end..];
    let words = rest.trim_start();
    if words.len() == rest.len() {
        // id must be followed by whitespace
        return text;
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(label: &str, confidence: f64) -> ClassificationCandidate {
        let mut distribution = LabelDistribution::new();
        distribution.insert(label.to_string(), confidence);
        distribution.insert("n00000001 other".to_string(), confidence / 2.0);
        ClassificationCandidate::from_distribution(distribution, 1).unwrap()
    }

    #[test]
    fn test_clean_label_examples() {
        assert_eq!(clean_label("n02123045 tabby, tabby cat"), "Tabby");
        assert_eq!(clean_label("n04285008 sports car"), "Sports car");
        assert_eq!(clean_label("airliner"), "Airliner");
    }

    #[test]
    fn test_clean_label_normalizes_case() {
        assert_eq!(clean_label("n03792782 MOUNTAIN Bike, all-terrain bike"), "Mountain bike");
        assert_eq!(clean_label("GOLDEN retriever"), "Golden retriever");
    }

    #[test]
    fn test_clean_label_keeps_non_id_prefixes() {
        // No whitespace after the digits: not an id
        assert_eq!(clean_label("n02123045"), "N02123045");
        // Letter without digits
        assert_eq!(clean_label("n cat"), "N cat");
        assert_eq!(clean_label(""), "");
    }

    #[test]
    fn test_arg_max_selection() {
        let mut distribution = LabelDistribution::new();
        distribution.insert("a".to_string(), 0.2);
        distribution.insert("b".to_string(), 0.7);
        distribution.insert("c".to_string(), f64::NAN);

        let candidate = ClassificationCandidate::from_distribution(distribution, 9).unwrap();
        assert_eq!(candidate.label, "b");
        assert_eq!(candidate.confidence, 0.7);
        assert_eq!(candidate.distribution.len(), 3);
    }

    #[test]
    fn test_empty_distribution_has_no_candidate() {
        assert!(ClassificationCandidate::from_distribution(LabelDistribution::new(), 0).is_none());
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(ClassificationResult::accept(candidate("n02123045 tabby, tabby cat", 0.29), 0.30).is_none());

        let accepted = ClassificationResult::accept(candidate("n02123045 tabby, tabby cat", 0.30), 0.30).unwrap();
        assert_eq!(accepted.label, "Tabby");
        assert_eq!(accepted.raw_label, "n02123045 tabby, tabby cat");
        assert_eq!(accepted.confidence, 0.30);
    }
}

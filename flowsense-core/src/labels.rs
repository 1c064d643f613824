//! Label vocabulary

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::normalize_label;

/// Running per-label counts, keyed by normalized label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounter {
    counts: BTreeMap<String, u64>,
}

impl LabelCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one raw label
    pub fn observe(&mut self, raw: &str) {
        *self.counts.entry(normalize_label(raw)).or_insert(0) += 1;
    }

    /// Fold another counter into this one
    pub fn merge(&mut self, other: &LabelCounter) {
        for (label, count) in &other.counts {
            *self.counts.entry(label.clone()).or_insert(0) += count;
        }
    }

    /// Count for a normalized label
    pub fn count(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Total number of observations
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Freeze the counter into a vocabulary
    pub fn finish(self) -> LabelVocabulary {
        LabelVocabulary::from_counts(self.counts)
    }
}

/// Ordered, distinct, normalized class labels with their corpus counts.
///
/// A label's class index is its position in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LabelRepr", into = "LabelRepr")]
pub struct LabelVocabulary {
    labels: Vec<String>,
    counts: Vec<u64>,
    positions: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelRepr {
    labels: BTreeMap<String, u64>,
}

impl LabelVocabulary {
    fn from_counts(counts: BTreeMap<String, u64>) -> Self {
        let (labels, counts): (Vec<String>, Vec<u64>) = counts.into_iter().unzip();
        let positions = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self {
            labels,
            counts,
            positions,
        }
    }

    /// Build a vocabulary from raw labels, normalizing and counting them
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counter = LabelCounter::new();
        for label in labels {
            counter.observe(label.as_ref());
        }
        counter.finish()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if there are no classes
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class labels in index order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Corpus counts in index order
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Label for a class index
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Class index of a raw label, after normalization
    pub fn index_of(&self, raw: &str) -> Option<usize> {
        self.positions.get(&normalize_label(raw)).copied()
    }

    /// Whether a raw label belongs to the vocabulary
    pub fn contains(&self, raw: &str) -> bool {
        self.index_of(raw).is_some()
    }

    /// Fail with every distinct label in `raw` that is not a member
    pub fn check_known<I, S>(&self, raw: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unseen: BTreeSet<String> = raw
            .into_iter()
            .map(|l| normalize_label(l.as_ref()))
            .filter(|l| !self.positions.contains_key(l))
            .collect();
        if unseen.is_empty() {
            Ok(())
        } else {
            Err(Error::UnseenLabel {
                labels: unseen.into_iter().collect(),
            })
        }
    }
}

impl From<LabelRepr> for LabelVocabulary {
    fn from(repr: LabelRepr) -> Self {
        Self::from_counts(repr.labels)
    }
}

impl From<LabelVocabulary> for LabelRepr {
    fn from(vocab: LabelVocabulary) -> Self {
        Self {
            labels: vocab.labels.into_iter().zip(vocab.counts).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_normalized_and_sorted() {
        let vocab = LabelVocabulary::from_labels([" PortScan", "BENIGN ", "benign", "DDoS"]);
        assert_eq!(vocab.labels(), ["benign", "ddos", "portscan"]);
        assert_eq!(vocab.counts(), [2, 1, 1]);
        assert_eq!(vocab.index_of("  DDOS "), Some(1));
        assert_eq!(vocab.label(2), Some("portscan"));
    }

    #[test]
    fn unseen_labels_are_listed_once() {
        let vocab = LabelVocabulary::from_labels(["benign", "ddos"]);
        assert!(vocab.check_known(["BENIGN", "ddos"]).is_ok());

        match vocab.check_known(["bot", "Bot", "heartbleed", "benign"]) {
            Err(Error::UnseenLabel { labels }) => assert_eq!(labels, ["bot", "heartbleed"]),
            other => panic!("expected unseen label error, got {other:?}"),
        }
    }

    #[test]
    fn counters_merge() {
        let mut a = LabelCounter::new();
        a.observe("x");
        let mut b = LabelCounter::new();
        b.observe("X");
        b.observe("y");
        a.merge(&b);
        assert_eq!(a.count("x"), 2);
        assert_eq!(a.total(), 3);
    }

    #[test]
    fn vocabulary_survives_serialization() {
        let vocab = LabelVocabulary::from_labels(["b", "a", "a"]);
        let bytes = bincode::serialize(&vocab).unwrap();
        let back: LabelVocabulary = bincode::deserialize(&bytes).unwrap();
        assert_eq!(vocab, back);
        assert_eq!(back.index_of("b"), Some(1));
    }
}

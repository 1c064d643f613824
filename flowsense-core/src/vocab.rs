//! Categorical vocabularies and the one-hot encoder fitted from them

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sort category values deterministically.
///
/// When every value parses as a finite number the values sort numerically (so
/// "2" precedes "10"); otherwise they sort lexicographically.
pub fn sort_categories(values: &mut [String]) {
    let numeric: Option<Vec<f64>> = values
        .iter()
        .map(|v| v.parse::<f64>().ok().filter(|x| x.is_finite()))
        .collect();

    match numeric {
        Some(keys) => {
            let mut keyed: Vec<(f64, String)> = keys.into_iter().zip(values.iter().cloned()).collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            for (slot, (_, value)) in values.iter_mut().zip(keyed) {
                *slot = value;
            }
        }
        None => values.sort_unstable(),
    }
}

/// Running union of distinct values for each categorical feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyBuilder {
    features: Vec<(String, BTreeSet<String>)>,
}

impl VocabularyBuilder {
    /// Create an empty builder for the given feature names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: names.into_iter().map(|n| (n.into(), BTreeSet::new())).collect(),
        }
    }

    /// Record an observed value for feature `index`
    pub fn observe(&mut self, index: usize, value: &str) {
        if let Some((_, set)) = self.features.get_mut(index) {
            if !set.contains(value) {
                set.insert(value.to_string());
            }
        }
    }

    /// Union another builder over the same features into this one
    pub fn merge(&mut self, other: &VocabularyBuilder) -> Result<()> {
        if self.features.len() != other.features.len()
            || self.features.iter().zip(&other.features).any(|(a, b)| a.0 != b.0)
        {
            return Err(Error::SchemaMismatch(
                "Cannot merge vocabularies over different features".into(),
            ));
        }
        for ((_, mine), (_, theirs)) in self.features.iter_mut().zip(&other.features) {
            mine.extend(theirs.iter().cloned());
        }
        Ok(())
    }

    /// Distinct values seen so far for feature `index`
    pub fn distinct_count(&self, index: usize) -> usize {
        self.features.get(index).map_or(0, |(_, s)| s.len())
    }

    /// Freeze the observed values into a vocabulary
    pub fn finish(self) -> CategoricalVocabulary {
        CategoricalVocabulary::from_values(
            self.features
                .into_iter()
                .map(|(name, set)| (name, set.into_iter().collect()))
                .collect(),
        )
    }
}

/// Finalized, ordered distinct values per categorical feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalVocabulary {
    features: Vec<(String, Vec<String>)>,
}

impl CategoricalVocabulary {
    /// Build a vocabulary, deduplicating and ordering each feature's values
    pub fn from_values(features: Vec<(String, Vec<String>)>) -> Self {
        let features = features
            .into_iter()
            .map(|(name, values)| {
                let mut values: Vec<String> = values
                    .into_iter()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                sort_categories(&mut values);
                (name, values)
            })
            .collect();
        Self { features }
    }

    /// Fit a one-hot encoder with an all-zero outcome for unknown values
    pub fn fit_encoder(&self) -> OneHotEncoder {
        OneHotEncoder::from_categories(self.features.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncoderRepr {
    features: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone)]
struct EncodedFeature {
    name: String,
    categories: Vec<String>,
    positions: HashMap<String, usize>,
    offset: usize,
}

/// One-hot encoder with independent width per feature.
///
/// A value outside a feature's fitted categories encodes to an all-zero block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EncoderRepr", into = "EncoderRepr")]
pub struct OneHotEncoder {
    features: Vec<EncodedFeature>,
    width: usize,
}

impl OneHotEncoder {
    fn from_categories(features: Vec<(String, Vec<String>)>) -> Self {
        let mut offset = 0;
        let features = features
            .into_iter()
            .map(|(name, categories)| {
                let positions = categories
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), i))
                    .collect();
                let feature = EncodedFeature {
                    name,
                    categories,
                    positions,
                    offset,
                };
                offset += feature.categories.len();
                feature
            })
            .collect();
        Self {
            features,
            width: offset,
        }
    }

    /// Total width of the encoded block
    pub fn width(&self) -> usize {
        self.width
    }

    /// Encoded feature names in order
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    /// Fitted categories of feature `index`
    pub fn categories(&self, index: usize) -> Option<&[String]> {
        self.features.get(index).map(|f| f.categories.as_slice())
    }

    /// Position of `value` within feature `index`'s block, if it is known
    pub fn position(&self, index: usize, value: &str) -> Option<usize> {
        self.features.get(index)?.positions.get(value).copied()
    }

    /// Append the encoding of `values` (one per feature, in order) to `out`
    pub fn encode_into(&self, values: &[Option<String>], out: &mut Vec<f64>) -> Result<()> {
        if values.len() != self.features.len() {
            return Err(Error::SchemaMismatch(format!(
                "Encoder expects {} categorical values, got {}",
                self.features.len(),
                values.len()
            )));
        }
        let start = out.len();
        out.resize(start + self.width, 0.0);
        for (feature, value) in self.features.iter().zip(values) {
            let hit = value.as_deref().and_then(|v| feature.positions.get(v));
            if let Some(position) = hit {
                out[start + feature.offset + position] = 1.0;
            }
        }
        Ok(())
    }
}

impl PartialEq for OneHotEncoder {
    fn eq(&self, other: &Self) -> bool {
        self.features.len() == other.features.len()
            && self
                .features
                .iter()
                .zip(&other.features)
                .all(|(a, b)| a.name == b.name && a.categories == b.categories)
    }
}

impl TryFrom<EncoderRepr> for OneHotEncoder {
    type Error = Error;

    fn try_from(repr: EncoderRepr) -> Result<Self> {
        for (name, categories) in &repr.features {
            let distinct: BTreeSet<&String> = categories.iter().collect();
            if distinct.len() != categories.len() {
                return Err(Error::ArtifactLoad(format!(
                    "Encoder feature '{name}' has duplicate categories"
                )));
            }
        }
        Ok(Self::from_categories(repr.features))
    }
}

impl From<OneHotEncoder> for EncoderRepr {
    fn from(encoder: OneHotEncoder) -> Self {
        Self {
            features: encoder
                .features
                .into_iter()
                .map(|f| (f.name, f.categories))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn vocabulary() -> CategoricalVocabulary {
        let mut builder = VocabularyBuilder::new(["A", "B"]);
        for v in ["1", "0", "1"] {
            builder.observe(0, v);
        }
        for v in ["2", "0", "1"] {
            builder.observe(1, v);
        }
        builder.finish()
    }

    #[test]
    fn unseen_value_encodes_to_zero_block() {
        let encoder = vocabulary().fit_encoder();
        assert_eq!(encoder.width(), 5);

        let mut out = Vec::new();
        encoder.encode_into(&[some("2"), some("1")], &mut out).unwrap();
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_value_encodes_to_zero_block() {
        let encoder = vocabulary().fit_encoder();
        let mut out = vec![9.0];
        encoder.encode_into(&[None, some("0")], &mut out).unwrap();
        assert_eq!(out, [9.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn features_keep_independent_widths() {
        let vocab = CategoricalVocabulary::from_values(vec![
            ("a".into(), vec!["x".into()]),
            ("b".into(), vec!["p".into(), "q".into(), "r".into(), "q".into()]),
        ]);
        let encoder = vocab.fit_encoder();
        assert_eq!(encoder.categories(0).unwrap().len(), 1);
        assert_eq!(encoder.categories(1).unwrap(), ["p", "q", "r"]);
        assert_eq!(encoder.width(), 4);
    }

    #[test]
    fn numeric_categories_sort_numerically() {
        let mut values = vec!["10".to_string(), "2".to_string(), "0".to_string()];
        sort_categories(&mut values);
        assert_eq!(values, ["0", "2", "10"]);

        let mut mixed = vec!["b".to_string(), "10".to_string(), "2".to_string()];
        sort_categories(&mut mixed);
        assert_eq!(mixed, ["10", "2", "b"]);
    }

    #[test]
    fn merge_is_a_union() {
        let mut left = VocabularyBuilder::new(["A"]);
        left.observe(0, "0");
        let mut right = VocabularyBuilder::new(["A"]);
        right.observe(0, "1");
        right.observe(0, "0");
        left.merge(&right).unwrap();
        assert_eq!(left.distinct_count(0), 2);

        let other = VocabularyBuilder::new(["B"]);
        assert!(left.merge(&other).is_err());
    }

    #[test]
    fn encoder_survives_serialization() {
        let encoder = vocabulary().fit_encoder();
        let bytes = bincode::serialize(&encoder).unwrap();
        let back: OneHotEncoder = bincode::deserialize(&bytes).unwrap();
        assert_eq!(encoder, back);
        assert_eq!(back.position(1, "2"), Some(2));
    }
}

//! Record transforms: the preprocessing shared by training and inference

use crate::error::{Error, Result};
use crate::record::FlowRecord;
use crate::record_batch::RecordBatch;
use crate::schema::FeatureSchema;
use crate::stats::{finite_or_zero, FeatureScale, ScalingStatistics};
use crate::vocab::OneHotEncoder;

/// A stateless transformation applied to one record at a time
pub trait RecordTransform: Send + Sync {
    /// The type produced for each record
    type Output;

    /// Transform a single record
    fn apply(&self, record: &FlowRecord) -> Result<Self::Output>;

    /// Width of every produced vector
    fn output_width(&self) -> usize;

    /// Transform every row of a batch.
    ///
    /// Fails as a whole when the batch lacks a feature column; otherwise
    /// yields one result per row.
    fn apply_batch(&self, batch: &RecordBatch, schema: &FeatureSchema) -> Result<Vec<Result<Self::Output>>> {
        Ok(batch
            .to_records(schema)?
            .into_iter()
            .map(|record| record.and_then(|r| self.apply(&r)))
            .collect())
    }
}

/// Fixed-length model input: scaled numeric block followed by the one-hot block
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatureVector {
    values: Vec<f64>,
}

impl EncodedFeatureVector {
    /// Values in layout order
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Length of the vector
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the vector is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the underlying values
    pub fn into_inner(self) -> Vec<f64> {
        self.values
    }
}

impl AsRef<[f64]> for EncodedFeatureVector {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// The preprocessing transform.
///
/// Built from fitted statistics and a fitted encoder and never refit: numeric
/// fields are sanitized, clipped and z-scored with the stored mean and
/// deviation, then categorical fields are one-hot encoded.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    scales: Vec<FeatureScale>,
    encoder: OneHotEncoder,
    clip_bound: f64,
}

impl Preprocessor {
    /// Create a preprocessor, checking that statistics and encoder agree with
    /// the schema's feature order
    pub fn new(
        schema: &FeatureSchema,
        stats: &ScalingStatistics,
        encoder: &OneHotEncoder,
        clip_bound: f64,
    ) -> Result<Self> {
        check_consistency(schema, stats, encoder)?;
        if !(clip_bound.is_finite() && clip_bound > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "clip bound must be a positive finite number, got {clip_bound}"
            )));
        }
        Ok(Self {
            scales: stats.scales().copied().collect(),
            encoder: encoder.clone(),
            clip_bound,
        })
    }

    /// Number of numeric features
    pub fn numeric_width(&self) -> usize {
        self.scales.len()
    }

    /// Width of the one-hot block
    pub fn categorical_width(&self) -> usize {
        self.encoder.width()
    }

    /// Scale one sanitized numeric value with feature `index`'s statistics
    #[inline]
    fn scale(&self, scale: &FeatureScale, value: f64) -> f64 {
        let bound = self.clip_bound;
        let clipped = finite_or_zero(value).clamp(-bound, bound);
        finite_or_zero(scale.apply(clipped)).clamp(-bound, bound)
    }

    /// Append the encoding of `record` to `out`
    pub fn encode_into(&self, record: &FlowRecord, out: &mut Vec<f64>) -> Result<()> {
        if record.numeric().len() != self.scales.len() {
            return Err(Error::SchemaMismatch(format!(
                "Record has {} numeric fields, expected {}",
                record.numeric().len(),
                self.scales.len()
            )));
        }
        out.reserve(self.output_width());
        for (scale, value) in self.scales.iter().zip(record.numeric()) {
            out.push(self.scale(scale, *value));
        }
        self.encoder.encode_into(record.categorical(), out)
    }
}

impl RecordTransform for Preprocessor {
    type Output = EncodedFeatureVector;

    fn apply(&self, record: &FlowRecord) -> Result<EncodedFeatureVector> {
        let mut values = Vec::with_capacity(self.output_width());
        self.encode_into(record, &mut values)?;
        Ok(EncodedFeatureVector { values })
    }

    fn output_width(&self) -> usize {
        self.scales.len() + self.encoder.width()
    }
}

/// Check that statistics and encoder cover exactly the schema's features, in
/// order
pub fn check_consistency(
    schema: &FeatureSchema,
    stats: &ScalingStatistics,
    encoder: &OneHotEncoder,
) -> Result<()> {
    if !stats.names().eq(schema.numeric().iter().map(String::as_str)) {
        return Err(Error::SchemaMismatch(
            "Scaling statistics do not match the schema's numeric features".into(),
        ));
    }
    if !encoder.feature_names().eq(schema.categorical().iter().map(String::as_str)) {
        return Err(Error::SchemaMismatch(
            "Encoder does not match the schema's categorical features".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::CategoricalVocabulary;
    use proptest::prelude::*;

    fn fixture() -> (FeatureSchema, Preprocessor) {
        let schema = FeatureSchema::new(["x", "y"], ["A", "B"], "Label").unwrap();
        let stats = ScalingStatistics::from_scales(vec![
            ("x".into(), FeatureScale { mean: 20.0, std: 10.0, count: 3 }),
            ("y".into(), FeatureScale { mean: 1.0, std: 0.0, count: 3 }),
        ]);
        let encoder = CategoricalVocabulary::from_values(vec![
            ("A".into(), vec!["0".into(), "1".into()]),
            ("B".into(), vec!["0".into(), "1".into(), "2".into()]),
        ])
        .fit_encoder();
        let pre = Preprocessor::new(&schema, &stats, &encoder, 1e9).unwrap();
        (schema, pre)
    }

    fn record(x: f64, y: f64, a: &str, b: &str) -> FlowRecord {
        FlowRecord::new(vec![x, y], vec![Some(a.into()), Some(b.into())], None)
    }

    #[test]
    fn layout_is_numeric_then_one_hot() {
        let (_, pre) = fixture();
        let v = pre.apply(&record(30.0, 4.0, "1", "2")).unwrap();
        assert_eq!(v.as_slice(), [1.0, 3.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(pre.output_width(), 7);
    }

    #[test]
    fn unseen_category_gives_zero_block() {
        let (_, pre) = fixture();
        let v = pre.apply(&record(20.0, 1.0, "2", "1")).unwrap();
        assert_eq!(&v.as_slice()[2..], [0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn non_finite_inputs_are_sanitized() {
        let (_, pre) = fixture();
        let v = pre.apply(&record(f64::INFINITY, f64::NAN, "0", "0")).unwrap();
        assert_eq!(v.as_slice()[0], -2.0);
        assert_eq!(v.as_slice()[1], -1.0);
    }

    #[test]
    fn mismatched_statistics_are_rejected() {
        let schema = FeatureSchema::new(["x"], ["A"], "Label").unwrap();
        let stats = ScalingStatistics::from_scales(vec![(
            "z".into(),
            FeatureScale { mean: 0.0, std: 1.0, count: 1 },
        )]);
        let encoder = CategoricalVocabulary::from_values(vec![("A".into(), vec![])]).fit_encoder();
        assert!(matches!(
            Preprocessor::new(&schema, &stats, &encoder, 1e9),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn batch_missing_column_fails_whole() {
        let (schema, pre) = fixture();
        let batch = RecordBatch::new(&["x", "y", "A"], vec![vec!["1".into(), "2".into(), "0".into()]]);
        assert!(matches!(pre.apply_batch(&batch, &schema), Err(Error::Schema { .. })));
    }

    #[test]
    fn batch_reports_rows_individually() {
        let (schema, pre) = fixture();
        let rows = vec![
            vec!["1".into(), "2".into(), "0".into(), "1".into()],
            vec!["bad".into(), "2".into(), "0".into(), "1".into()],
        ];
        let batch = RecordBatch::new(&["x", "y", "A", "B"], rows);
        let out = pre.apply_batch(&batch, &schema).unwrap();
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(Error::MalformedInput { row: 1, .. })));
    }

    proptest! {
        #[test]
        fn output_is_finite_bounded_and_deterministic(
            x in prop::num::f64::ANY,
            y in prop::num::f64::ANY,
            a in "[0-3]",
            b in "[0-3]",
        ) {
            let (_, pre) = fixture();
            let r = record(x, y, &a, &b);
            let first = pre.apply(&r).unwrap();
            let second = pre.apply(&r).unwrap();
            for v in first.as_slice() {
                prop_assert!(v.is_finite());
                prop_assert!(v.abs() <= 1e9);
            }
            let bits = |v: &EncodedFeatureVector| v.as_slice().iter().map(|f| f.to_bits()).collect::<Vec<_>>();
            prop_assert_eq!(bits(&first), bits(&second));
        }
    }
}

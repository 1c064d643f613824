//! Running moments and the scaling statistics derived from them

use serde::{Deserialize, Serialize};

/// Running sum, sum of squares and count for one numeric feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMoments {
    /// Sum of observed values
    pub sum: f64,

    /// Sum of squared observed values
    pub sum_sq: f64,

    /// Number of observed values
    pub count: u64,
}

/// Replace NaN and infinities with zero
#[inline]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl RunningMoments {
    /// Add one chunk's worth of values.
    ///
    /// The chunk is summed on its own first and then folded into the running
    /// totals. Non-finite values count as zero.
    pub fn add_chunk<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        let mut chunk = RunningMoments::default();
        for value in values {
            let value = finite_or_zero(value);
            chunk.sum += value;
            chunk.sum_sq += value * value;
            chunk.count += 1;
        }
        self.merge(&chunk);
    }

    /// Fold another partial result into this one
    pub fn merge(&mut self, other: &RunningMoments) {
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.count += other.count;
    }

    /// Population mean and standard deviation.
    ///
    /// A feature that was never observed gets mean = std = 0. Variance that
    /// comes out slightly negative from cancellation is clamped to zero.
    pub fn finalize(&self) -> FeatureScale {
        if self.count == 0 {
            return FeatureScale {
                mean: 0.0,
                std: 0.0,
                count: 0,
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        let mean = self.sum / n;
        let variance = self.sum_sq / n - mean * mean;
        FeatureScale {
            mean,
            std: variance.max(0.0).sqrt(),
            count: self.count,
        }
    }
}

/// Mean and standard deviation of one numeric feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureScale {
    /// Mean over the training corpus
    pub mean: f64,

    /// Population standard deviation over the training corpus
    pub std: f64,

    /// Number of values the statistics were computed from
    pub count: u64,
}

impl FeatureScale {
    /// Z-score a value. A zero (or unusable) deviation scales by one.
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        let scale = if self.std.is_finite() && self.std > 0.0 {
            self.std
        } else {
            1.0
        };
        (value - self.mean) / scale
    }
}

/// Per-feature scaling statistics, in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingStatistics {
    features: Vec<(String, FeatureScale)>,
}

impl ScalingStatistics {
    /// Finalize running moments into scaling statistics
    pub fn from_moments<'a, I>(moments: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a RunningMoments)>,
    {
        Self {
            features: moments
                .into_iter()
                .map(|(name, m)| (name.clone(), m.finalize()))
                .collect(),
        }
    }

    /// Build statistics directly from known values
    pub fn from_scales(features: Vec<(String, FeatureScale)>) -> Self {
        Self { features }
    }

    /// Statistics for a feature by name
    pub fn get(&self, name: &str) -> Option<&FeatureScale> {
        self.features.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Feature names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|(n, _)| n.as_str())
    }

    /// Statistics in order
    pub fn scales(&self) -> impl Iterator<Item = &FeatureScale> {
        self.features.iter().map(|(_, s)| s)
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if there are no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn moments_over<C: AsRef<[f64]>>(chunks: &[C]) -> RunningMoments {
        let mut m = RunningMoments::default();
        for chunk in chunks {
            m.add_chunk(chunk.as_ref().iter().copied());
        }
        m
    }

    #[test]
    fn ten_twenty_thirty() {
        let partitions = [
            vec![vec![10.0, 20.0, 30.0]],
            vec![vec![10.0], vec![20.0, 30.0]],
            vec![vec![30.0], vec![10.0], vec![20.0]],
        ];
        for chunks in partitions {
            let scale = moments_over(&chunks).finalize();
            assert!((scale.mean - 20.0).abs() < 1e-12);
            assert!((scale.std - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
            assert!((scale.std - 8.165).abs() < 1e-3);
        }
    }

    #[test]
    fn empty_feature_falls_back_to_zero() {
        let scale = RunningMoments::default().finalize();
        assert_eq!(scale.mean, 0.0);
        assert_eq!(scale.std, 0.0);
        assert_eq!(scale.apply(5.0), 5.0);
    }

    #[test]
    fn non_finite_values_count_as_zero() {
        let scale = moments_over(&[&[f64::INFINITY, f64::NAN, 4.0]]).finalize();
        assert_eq!(scale.count, 3);
        assert!((scale.mean - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn negative_variance_is_clamped() {
        let m = RunningMoments {
            sum: 3.0 * 0.1,
            sum_sq: 3.0 * 0.1 * 0.1 - 1e-18,
            count: 3,
        };
        let scale = m.finalize();
        assert!(scale.std >= 0.0);
        assert!(!scale.std.is_nan());
    }

    #[test]
    fn constant_feature_is_centred() {
        let scale = moments_over(&[&[7.0, 7.0, 7.0]]).finalize();
        assert_eq!(scale.std, 0.0);
        assert_eq!(scale.apply(9.0), 2.0);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_statistics(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..200),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let single = moments_over(&[&values]).finalize();

            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(values.len())).collect();
            points.push(0);
            points.push(values.len());
            points.sort_unstable();
            points.dedup();
            let chunks: Vec<&[f64]> = points.windows(2).map(|w| &values[w[0]..w[1]]).collect();
            let chunked = moments_over(&chunks).finalize();

            let tol = |a: f64, b: f64| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0);
            prop_assert_eq!(single.count, chunked.count);
            prop_assert!(tol(single.mean, chunked.mean));
            prop_assert!(tol(single.std, chunked.std));
        }

        #[test]
        fn merge_is_commutative(
            a in prop::collection::vec(-1.0e3f64..1.0e3, 0..50),
            b in prop::collection::vec(-1.0e3f64..1.0e3, 0..50),
        ) {
            let (ma, mb) = (moments_over(&[&a]), moments_over(&[&b]));
            let mut ab = ma;
            ab.merge(&mb);
            let mut ba = mb;
            ba.merge(&ma);
            prop_assert_eq!(ab, ba);
        }
    }
}

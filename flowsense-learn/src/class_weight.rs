//! Class balancing weights

/// Balanced inverse-frequency weights: `n_samples / (n_classes * count_c)`.
///
/// A class that never occurs gets weight 1.
pub fn balanced_class_weights(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let (n_samples, n_classes) = (total as f64, counts.len() as f64);
    counts
        .iter()
        .map(|&count| {
            if count == 0 {
                1.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let count = count as f64;
                n_samples / (n_classes * count)
            }
        })
        .collect()
}

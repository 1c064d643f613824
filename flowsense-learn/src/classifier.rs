//! Online one-vs-rest logistic classifier

use flowsense_core::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Parameters of the online classifier together with its fixed class list
/// and class weights.
///
/// One binary logistic model per class, trained one-vs-rest by weighted SGD
/// with L2 shrinkage and learning rate `eta0 / (1 + alpha * eta0 * t)`, where
/// `t` counts samples seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    /// Class labels, in class-index order
    classes: Vec<String>,

    /// Weight applied to samples of each class
    class_weights: Vec<f64>,

    /// Per-class coefficients, `classes x features`
    coefficients: Array2<f64>,

    /// Per-class intercepts
    intercepts: Array1<f64>,

    /// Hyperparameters
    config: TrainerConfig,

    /// Samples seen across all updates
    samples_seen: u64,

    /// Incremental updates applied
    updates: u64,
}

impl ClassifierState {
    /// Create an untrained classifier
    pub fn new(classes: Vec<String>, n_features: usize, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        if classes.is_empty() {
            return Err(Error::InvalidArgument("Classifier needs at least one class".into()));
        }
        let k = classes.len();
        Ok(Self {
            class_weights: vec![1.0; k],
            coefficients: Array2::zeros((k, n_features)),
            intercepts: Array1::zeros(k),
            classes,
            config,
            samples_seen: 0,
            updates: 0,
        })
    }

    /// Fix the per-class sample weights
    pub fn set_class_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if weights.len() != self.classes.len() {
            return Err(Error::InvalidArgument(format!(
                "{} class weights for {} classes",
                weights.len(),
                self.classes.len()
            )));
        }
        if weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(Error::InvalidArgument("class weights must be positive and finite".into()));
        }
        self.class_weights = weights;
        Ok(())
    }

    /// Class labels in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Per-class sample weights
    pub fn class_weights(&self) -> &[f64] {
        &self.class_weights
    }

    /// Input width
    pub fn n_features(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Samples seen across all updates
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// Incremental updates applied
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Check internal dimensions
    pub fn validate(&self) -> Result<()> {
        let k = self.classes.len();
        if k == 0
            || self.class_weights.len() != k
            || self.intercepts.len() != k
            || self.coefficients.nrows() != k
        {
            return Err(Error::SchemaMismatch("Classifier parameter shapes disagree".into()));
        }
        Ok(())
    }

    fn check_width(&self, x: &[f64]) -> Result<()> {
        if x.len() == self.n_features() {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(format!(
                "Feature vector has width {}, classifier expects {}",
                x.len(),
                self.n_features()
            )))
        }
    }

    /// Apply one incremental update over a chunk, in row order.
    ///
    /// `y` holds class indices. Every row is validated before any parameter
    /// changes.
    pub fn partial_fit<V: AsRef<[f64]>>(&mut self, x: &[V], y: &[usize]) -> Result<()> {
        if x.len() != y.len() {
            return Err(Error::InvalidArgument(format!(
                "{} feature rows for {} targets",
                x.len(),
                y.len()
            )));
        }
        for (row, &target) in x.iter().zip(y) {
            self.check_width(row.as_ref())?;
            if target >= self.classes.len() {
                return Err(Error::InvalidArgument(format!("class index {target} out of range")));
            }
        }
        if x.is_empty() {
            return Ok(());
        }

        let TrainerConfig {
            alpha,
            eta0,
            fit_intercept,
        } = self.config;

        for (row, &target) in x.iter().zip(y) {
            let row = ArrayView1::from(row.as_ref());
            #[allow(clippy::cast_precision_loss)]
            let eta = eta0 / (1.0 + alpha * eta0 * self.samples_seen as f64);
            let sample_weight = self.class_weights[target];

            for class in 0..self.classes.len() {
                let mut w = self.coefficients.row_mut(class);
                let z = w.dot(&row) + self.intercepts[class];
                let truth = if class == target { 1.0 } else { 0.0 };
                let gradient = sample_weight * (sigmoid(z) - truth);

                w.zip_mut_with(&row, |wj, &xj| *wj -= eta * (gradient * xj + alpha * *wj));
                if fit_intercept {
                    self.intercepts[class] -= eta * gradient;
                }
            }
            self.samples_seen += 1;
        }
        self.updates += 1;
        Ok(())
    }

    /// Per-class decision values
    pub fn decision_function(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.check_width(x)?;
        let scores = self.coefficients.dot(&ArrayView1::from(x)) + &self.intercepts;
        Ok(scores.to_vec())
    }

    /// Per-class probabilities, normalized across the one-vs-rest models
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut p: Vec<f64> = self.decision_function(x)?.into_iter().map(sigmoid).collect();
        let total: f64 = p.iter().sum();
        if total > 0.0 {
            for v in &mut p {
                *v /= total;
            }
        }
        Ok(p)
    }

    /// Index of the predicted class; ties go to the lowest index
    pub fn predict(&self, x: &[f64]) -> Result<usize> {
        let scores = self.decision_function(x)?;
        let mut best = 0;
        for (class, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] {
                best = class;
            }
        }
        Ok(best)
    }

    /// Label of the predicted class
    pub fn predict_label(&self, x: &[f64]) -> Result<&str> {
        let index = self.predict(x)?;
        Ok(self.classes[index].as_str())
    }
}

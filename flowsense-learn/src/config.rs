//! Trainer configuration

use flowsense_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters of the online classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// L2 regularization strength
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Initial learning rate
    #[serde(default = "default_eta0")]
    pub eta0: f64,

    /// Learn a per-class intercept
    #[serde(default = "default_fit_intercept")]
    pub fit_intercept: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            eta0: default_eta0(),
            fit_intercept: default_fit_intercept(),
        }
    }
}

impl TrainerConfig {
    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "alpha must be a non-negative finite number, got {}",
                self.alpha
            )));
        }
        if !(self.eta0.is_finite() && self.eta0 > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "eta0 must be a positive finite number, got {}",
                self.eta0
            )));
        }
        Ok(())
    }
}

fn default_alpha() -> f64 {
    1e-4
}

fn default_eta0() -> f64 {
    0.01
}

fn default_fit_intercept() -> bool {
    true
}

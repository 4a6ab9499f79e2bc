use crate::error::{AppError, Result};
use crate::ml::models::{ClassProbabilities, PredictionResult, TrainingDataset};
use crate::models::{DamageLevel, FEATURE_COUNT};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Fitted Gaussian Naive Bayes model.
///
/// Immutable once constructed: a new fit produces a new value. Row `k` of
/// `theta`/`var` and entry `k` of `class_prior` belong to `classes[k]`, and
/// `classes` is always a subsequence of [`DamageLevel::ALL`] in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Classes seen during fitting, in the fixed class ordering
    classes: Vec<DamageLevel>,

    /// Prior probability of each class
    class_prior: Array1<f64>,

    /// Per-class feature means (n_classes × n_features)
    theta: Array2<f64>,

    /// Per-class feature variances, floored at `epsilon` (n_classes × n_features)
    var: Array2<f64>,

    /// Variance floor used during fitting
    epsilon: f64,

    /// Number of samples the model was fitted on
    n_training_samples: usize,
}

impl GaussianNaiveBayes {
    /// Estimate priors, means and population variances per class.
    ///
    /// The variance floor is `var_smoothing` times the largest per-feature
    /// variance of the whole dataset, computed once and shared by all classes.
    pub fn fit(dataset: &TrainingDataset, var_smoothing: f64) -> Result<Self> {
        if dataset.n_samples == 0 {
            return Err(AppError::InsufficientData(
                "cannot fit a model on an empty dataset".to_string(),
            ));
        }
        if dataset.n_features != FEATURE_COUNT {
            return Err(AppError::InvalidInput(format!(
                "expected {} features, dataset has {}",
                FEATURE_COUNT, dataset.n_features
            )));
        }

        let counts = dataset.class_counts();
        let classes: Vec<DamageLevel> = DamageLevel::ALL
            .into_iter()
            .filter(|level| counts[level.index()] > 0)
            .collect();

        if classes.len() < 2 {
            return Err(AppError::InsufficientData(format!(
                "at least 2 classes are required to fit, found {}",
                classes.len()
            )));
        }

        let max_variance = dataset
            .features
            .var_axis(Axis(0), 0.0)
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v));
        // A dataset where every feature is constant has no scale to borrow;
        // fall back to the smoothing factor itself so variances stay positive.
        let epsilon = if max_variance > 0.0 {
            var_smoothing * max_variance
        } else {
            var_smoothing
        };

        let n_classes = classes.len();
        let n_features = dataset.n_features;
        let mut class_prior = Array1::zeros(n_classes);
        let mut theta = Array2::zeros((n_classes, n_features));
        let mut var = Array2::zeros((n_classes, n_features));

        for (k, level) in classes.iter().enumerate() {
            let rows: Vec<usize> = dataset
                .labels
                .iter()
                .enumerate()
                .filter(|(_, label)| *label == level)
                .map(|(i, _)| i)
                .collect();

            let class_features = dataset.features.select(Axis(0), &rows);
            let mean = class_features
                .mean_axis(Axis(0))
                .ok_or_else(|| AppError::Internal(format!("class '{}' has no rows", level)))?;
            let variance = class_features
                .var_axis(Axis(0), 0.0)
                .mapv(|v| v.max(epsilon));

            class_prior[k] = rows.len() as f64 / dataset.n_samples as f64;
            theta.row_mut(k).assign(&mean);
            var.row_mut(k).assign(&variance);
        }

        tracing::debug!(
            n_samples = dataset.n_samples,
            n_classes,
            epsilon,
            "Fitted Gaussian Naive Bayes model"
        );

        Ok(Self {
            classes,
            class_prior,
            theta,
            var,
            epsilon,
            n_training_samples: dataset.n_samples,
        })
    }

    /// Log joint likelihood `log P(c) + Σ_j log N(x_j; μ_cj, σ²_cj)` per fitted class
    fn joint_log_likelihood(&self, x: ArrayView1<'_, f64>) -> Vec<f64> {
        (0..self.classes.len())
            .map(|k| {
                let log_density: f64 = self
                    .theta
                    .row(k)
                    .iter()
                    .zip(self.var.row(k).iter())
                    .zip(x.iter())
                    .map(|((&mu, &sigma2), &xj)| {
                        -0.5 * (2.0 * PI * sigma2).ln() - (xj - mu).powi(2) / (2.0 * sigma2)
                    })
                    .sum();
                self.class_prior[k].ln() + log_density
            })
            .collect()
    }

    /// Posterior distribution over the fitted classes, normalised after
    /// subtracting the maximum log joint.
    ///
    /// A vector so far from every class that all log joints overflow to
    /// `-inf` has no defined posterior and is rejected.
    fn posterior(&self, x: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        let jll = self.joint_log_likelihood(x);
        let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(AppError::InvalidInput(
                "feature vector out of representable range".to_string(),
            ));
        }

        let exp: Vec<f64> = jll.iter().map(|v| (v - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|v| v / sum).collect())
    }

    /// Index of the highest posterior; exact ties go to the earlier class
    fn argmax(posterior: &[f64]) -> usize {
        let mut best = 0;
        for (k, &p) in posterior.iter().enumerate().skip(1) {
            if p > posterior[best] {
                best = k;
            }
        }
        best
    }

    /// Classify one feature vector
    pub fn predict(&self, features: &[f64]) -> Result<PredictionResult> {
        validate_vector(features, self.theta.ncols())?;

        let x = ArrayView1::from(features);
        let posterior = self.posterior(x)?;
        let best = Self::argmax(&posterior);

        // Classes absent from training get zero mass.
        let mut probabilities = [0.0; DamageLevel::COUNT];
        for (k, level) in self.classes.iter().enumerate() {
            probabilities[level.index()] = posterior[k];
        }

        Ok(PredictionResult {
            predicted_level: self.classes[best],
            confidence: posterior[best],
            probabilities: ClassProbabilities::from_array(probabilities),
        })
    }

    /// Predicted labels for every row of a feature matrix
    pub fn predict_labels(&self, features: &Array2<f64>) -> Result<Vec<DamageLevel>> {
        if features.ncols() != self.theta.ncols() {
            return Err(AppError::InvalidInput(format!(
                "expected {} features, got {}",
                self.theta.ncols(),
                features.ncols()
            )));
        }

        features
            .rows()
            .into_iter()
            .map(|row| -> Result<DamageLevel> {
                Ok(self.classes[Self::argmax(&self.posterior(row)?)])
            })
            .collect()
    }

    /// Encode as an opaque snapshot blob (bit-exact f64 round trip)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a snapshot blob, rejecting structurally inconsistent models
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = bincode::deserialize(bytes)?;
        model.check_consistency()?;
        Ok(model)
    }

    fn check_consistency(&self) -> Result<()> {
        let n_classes = self.classes.len();
        let ordered = self.classes.windows(2).all(|w| w[0] < w[1]);
        let shapes_ok = n_classes >= 2
            && self.class_prior.len() == n_classes
            && self.theta.dim() == (n_classes, FEATURE_COUNT)
            && self.var.dim() == (n_classes, FEATURE_COUNT);
        let variances_ok = self.var.iter().all(|v| v.is_finite() && *v > 0.0);
        let means_ok = self.theta.iter().all(|v| v.is_finite());
        let priors_ok = self.class_prior.iter().all(|p| p.is_finite() && *p > 0.0)
            && (self.class_prior.sum() - 1.0).abs() < 1e-9;

        if ordered && shapes_ok && variances_ok && means_ok && priors_ok {
            Ok(())
        } else {
            Err(AppError::Serialization(
                "model snapshot is structurally inconsistent".to_string(),
            ))
        }
    }

    pub fn classes(&self) -> &[DamageLevel] {
        &self.classes
    }

    pub fn class_prior(&self) -> &Array1<f64> {
        &self.class_prior
    }

    pub fn theta(&self) -> &Array2<f64> {
        &self.theta
    }

    pub fn var(&self) -> &Array2<f64> {
        &self.var
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn n_training_samples(&self) -> usize {
        self.n_training_samples
    }
}

fn validate_vector(features: &[f64], expected: usize) -> Result<()> {
    if features.len() != expected {
        return Err(AppError::InvalidInput(format!(
            "expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
        return Err(AppError::InvalidInput(format!(
            "feature {} is not a finite number",
            pos
        )));
    }
    Ok(())
}

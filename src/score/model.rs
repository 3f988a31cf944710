//! Online logistic model turning market features into an execution confidence.
//!
//! Large-range features arrive log-scaled from extraction. The logit is clamped to
//! `±MAX_LOGIT` so a confident model still moves when a contradicting label arrives.
use std::collections::HashMap;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::features::{MarketFeatures, FEATURE_NAMES};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 100;
/// Default maximum mini-batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;
/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;

/// Confidence returned before any training
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Bound on the magnitude of the logit, keeps predictions within about `[5e-5, 1 - 5e-5]`
pub const MAX_LOGIT: f64 = 10.0;

/// One labelled observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingExample {
    /// Features at decision time
    pub features: MarketFeatures,
    /// Realized profit ratio in `[0, 1]`: the share of the expected profit that a
    /// settlement actually returned, 0 for a revert or failed submission
    pub target: f64,
    /// Whether a submission was attempted
    pub executed: bool,
}

/// Training hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    /// Passes over sampled mini-batches
    pub epochs: usize,
    /// Upper bound of the mini-batch size
    pub batch_size: usize,
    /// Step size of the weight updates
    pub learning_rate: f64,
    /// Fixed sampling seed, random if `None`
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: None,
        }
    }
}

/// Linear model over the canonical features
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Weight per feature name
    weights: HashMap<&'static str, f64>,
    /// Intercept
    bias: f64,
    /// Step size of the updates
    learning_rate: f64,
}

impl Model {
    /// Zero-initialized model.
    #[must_use]
    pub fn new(learning_rate: f64) -> Self {
        Self {
            weights: FEATURE_NAMES.iter().map(|name| (*name, 0.0)).collect(),
            bias: 0.0,
            learning_rate,
        }
    }

    /// Weight of a feature, `None` for an unknown name
    #[must_use]
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }

    /// The intercept
    #[must_use]
    pub const fn bias(&self) -> f64 {
        self.bias
    }

    /// `bias + Σ weight·value` over the canonical features
    #[must_use]
    pub fn score(&self, features: &MarketFeatures) -> f64 {
        features.iter().fold(self.bias, |acc, (name, value)| {
            acc + self.weights.get(name).copied().unwrap_or_default() * value
        })
    }

    /// Probability-like output of the model
    #[must_use]
    pub fn predict(&self, features: &MarketFeatures) -> f64 {
        sigmoid(self.score(features).clamp(-MAX_LOGIT, MAX_LOGIT))
    }

    /// One gradient step towards `target`
    fn update(&mut self, features: &MarketFeatures, target: f64) {
        let error = target - self.predict(features);
        let step = self.learning_rate * error;
        for (name, value) in features.iter() {
            if let Some(weight) = self.weights.get_mut(name) {
                *weight += step * value;
            }
        }
        self.bias += step;
    }
}

/// Logistic function
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    if x.is_nan() {
        return NEUTRAL_CONFIDENCE;
    }
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Owns the model and the training corpus.
///
/// Scoring takes `&self` and training `&mut self`, so the two never overlap.
#[derive(Debug)]
pub struct OpportunityScorer {
    /// The model being trained
    model: Model,
    /// Every example seen so far
    corpus: Vec<TrainingExample>,
    /// Whether the model has been trained at least once
    trained: bool,
    /// Hyper-parameters
    config: TrainingConfig,
    /// Mini-batch sampler
    rng: StdRng,
}

impl Default for OpportunityScorer {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl OpportunityScorer {
    /// Creates an untrained scorer.
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            model: Model::new(config.learning_rate),
            corpus: Vec::new(),
            trained: false,
            config,
            rng,
        }
    }

    /// Confidence that executing is worthwhile, in `[0, 1]`.
    /// Exactly [`NEUTRAL_CONFIDENCE`] until the first training.
    #[must_use]
    pub fn predict_confidence(&self, features: &MarketFeatures) -> f64 {
        if !self.trained {
            return NEUTRAL_CONFIDENCE;
        }
        self.model.predict(features)
    }

    /// Appends `examples` to the corpus, then runs the configured number of epochs,
    /// each on a mini-batch sampled with replacement from the whole corpus.
    pub fn train(&mut self, examples: impl IntoIterator<Item = TrainingExample>) {
        self.corpus.extend(examples);
        if self.corpus.is_empty() {
            return;
        }

        let batch_size = self.config.batch_size.clamp(1, self.corpus.len());
        for _ in 0..self.config.epochs {
            for _ in 0..batch_size {
                let example = self.corpus[self.rng.random_range(0..self.corpus.len())];
                self.model.update(&example.features, example.target);
            }
        }
        self.trained = true;

        debug!(
            "scorer::train: {} examples, bias {:.4}",
            self.corpus.len(),
            self.model.bias()
        );
    }

    /// Whether the model has been trained
    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.trained
    }

    /// Number of accumulated examples
    #[must_use]
    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// The underlying model
    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }
}

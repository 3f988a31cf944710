//! # Scoring Module
//!
//! Confidence scoring of opportunities: feature extraction and an online logistic
//! model trained on execution outcomes.

/// Market features of a path
pub mod features;
/// Trainable confidence model
pub mod model;

pub use features::{extract_features, MarketContext, MarketFeatures, FEATURE_NAMES, FEATURE_SET_VERSION};
pub use model::{Model, OpportunityScorer, TrainingConfig, TrainingExample};

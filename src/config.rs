//! Tunable thresholds, weights and budgets for the scoring engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::RiskLevel;

/// Threshold and point mapping for one behavioral ratio.
///
/// A ratio above `threshold` earns points linearly, reaching `max_points` at
/// `saturation` and staying there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRule {
    pub threshold: f64,
    pub saturation: f64,
    pub max_points: f64,
}

impl RatioRule {
    pub fn triggered(&self, ratio: f64) -> bool {
        ratio > self.threshold
    }

    pub fn points(&self, ratio: f64) -> f64 {
        if !self.triggered(ratio) {
            return 0.0;
        }
        let span = self.saturation - self.threshold;
        if span <= 0.0 {
            return self.max_points;
        }
        (self.max_points * (ratio - self.threshold) / span).min(self.max_points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    /// Claims required in the window before ratios are scored.
    pub min_claims: usize,
    pub weekend: RatioRule,
    pub batch: RatioRule,
    pub robotic: RatioRule,
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            min_claims: 10,
            weekend: RatioRule {
                threshold: 0.15,
                saturation: 0.45,
                max_points: 10.0,
            },
            batch: RatioRule {
                threshold: 0.30,
                saturation: 0.80,
                max_points: 40.0,
            },
            robotic: RatioRule {
                threshold: 0.20,
                saturation: 0.60,
                max_points: 50.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Multiplier applied to violation frequency times magnitude.
    pub score_scale: f64,
    /// Excess percentages above this are CRITICAL, at or below are WARNING.
    pub critical_above_pct: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            score_scale: 10.0,
            critical_above_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KickbackConfig {
    /// Claims with a beneficiary required before indicators are scored.
    pub min_claims: usize,
    /// Share of beneficiaries counted as "top" for concentration.
    pub top_share: f64,
    pub concentration_threshold: f64,
    pub gini_threshold: f64,
}

impl Default for KickbackConfig {
    fn default() -> Self {
        Self {
            min_claims: 10,
            top_share: 0.05,
            concentration_threshold: 0.40,
            gini_threshold: 0.60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub min_cohort: usize,
    /// |z| at or above this is an outlier.
    pub outlier_z: f64,
    pub window_days: u32,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            min_cohort: 5,
            outlier_z: 3.0,
            window_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub behavioral: f64,
    pub capacity_violations: f64,
    pub kickback_indicators: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            behavioral: 0.30,
            capacity_violations: 0.40,
            kickback_indicators: 0.30,
        }
    }
}

impl CompositeWeights {
    pub fn total(&self) -> f64 {
        self.behavioral + self.capacity_violations + self.kickback_indicators
    }
}

/// Score cut points for HIGH and MEDIUM. Anything below `medium` is LOW.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    pub high: f64,
    pub medium: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            high: 70.0,
            medium: 40.0,
        }
    }
}

impl SeverityBands {
    pub fn classify(&self, score: f64) -> RiskLevel {
        if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Concurrent provider analyses during a sweep.
    pub workers: usize,
    pub window_days: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            window_days: 90,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub behavioral: BehavioralConfig,
    pub capacity: CapacityConfig,
    pub kickback: KickbackConfig,
    pub peers: PeerConfig,
    pub weights: CompositeWeights,
    pub severity: SeverityBands,
    pub sweep: SweepConfig,
}

impl ScoringConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| EngineError::Config {
                    reason: format!("failed to read {}: {err}", path.display()),
                })?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let weights = [
            ("weights.behavioral", self.weights.behavioral),
            ("weights.capacity_violations", self.weights.capacity_violations),
            ("weights.kickback_indicators", self.weights.kickback_indicators),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return invalid(format!("{name} must be a non-negative number, got {weight}"));
            }
        }
        if (self.weights.total() - 1.0).abs() > 1e-6 {
            return invalid(format!(
                "weights must sum to 1.0, got {}",
                self.weights.total()
            ));
        }

        let ratios = [
            ("behavioral.weekend.threshold", self.behavioral.weekend.threshold),
            ("behavioral.batch.threshold", self.behavioral.batch.threshold),
            ("behavioral.robotic.threshold", self.behavioral.robotic.threshold),
            ("kickback.top_share", self.kickback.top_share),
            (
                "kickback.concentration_threshold",
                self.kickback.concentration_threshold,
            ),
            ("kickback.gini_threshold", self.kickback.gini_threshold),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.kickback.top_share == 0.0 {
            return invalid("kickback.top_share must be greater than 0".to_string());
        }

        if !(self.severity.medium > 0.0 && self.severity.medium <= self.severity.high) {
            return invalid(format!(
                "severity bands must satisfy 0 < medium <= high, got medium {} high {}",
                self.severity.medium, self.severity.high
            ));
        }
        if self.peers.outlier_z <= 0.0 {
            return invalid("peers.outlier_z must be positive".to_string());
        }
        if self.sweep.workers == 0 {
            return invalid("sweep.workers must be at least 1".to_string());
        }
        Ok(())
    }
}

fn invalid(reason: String) -> EngineResult<()> {
    Err(EngineError::Config { reason })
}

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::{CompositeWeights, ScoringConfig};
use crate::models::{CompositeAnalysis, ModuleAnalysis};

/// Combine the three module analyses into one composite result.
///
/// Pure: the same inputs always produce the same output, `analyzed_at`
/// included, so callers can cache on (provider, window, claim-set version).
pub fn score_composite(
    provider_id: Uuid,
    behavioral: ModuleAnalysis,
    capacity: ModuleAnalysis,
    kickback: ModuleAnalysis,
    window_days: u32,
    analyzed_at: DateTime<Utc>,
    config: &ScoringConfig,
) -> CompositeAnalysis {
    let composite_score = weighted_score(
        behavioral.risk_score,
        capacity.risk_score,
        kickback.risk_score,
        &config.weights,
    );

    let mut all_findings = Vec::with_capacity(
        behavioral.findings.len() + capacity.findings.len() + kickback.findings.len(),
    );
    let mut failed_modules = Vec::new();
    let mut modules = BTreeMap::new();

    for analysis in [behavioral, capacity, kickback] {
        all_findings.extend(analysis.findings.iter().cloned());
        if analysis.failed {
            failed_modules.push(analysis.module);
        }
        modules.insert(analysis.module, analysis);
    }

    CompositeAnalysis {
        provider_id,
        composite_score,
        severity: config.severity.classify(composite_score),
        modules,
        total_findings: all_findings.len(),
        all_findings,
        window_days,
        analyzed_at,
        partial: !failed_modules.is_empty(),
        failed_modules,
    }
}

/// Weighted sum of module scores, rounded to one decimal and clamped to [0, 100].
pub fn weighted_score(
    behavioral: f64,
    capacity: f64,
    kickback: f64,
    weights: &CompositeWeights,
) -> f64 {
    let raw = behavioral * weights.behavioral
        + capacity * weights.capacity_violations
        + kickback * weights.kickback_indicators;
    let rounded = (raw * 10.0).round() / 10.0;
    if rounded.is_finite() {
        rounded.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// First date excluded from a window ending on `as_of` (inclusive).
pub fn window_start(as_of: NaiveDate, window_days: u32) -> NaiveDate {
    as_of - Duration::days(i64::from(window_days.max(1)))
}

pub fn in_window(date: NaiveDate, as_of: NaiveDate, window_days: u32) -> bool {
    date > window_start(as_of, window_days) && date <= as_of
}

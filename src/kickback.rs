//! Beneficiary concentration and claim-count inequality, the usual shape of
//! referral kickback schemes where a handful of recruited patients carry most
//! of a provider's billing.

use std::collections::HashMap;

use uuid::Uuid;

use crate::config::{KickbackConfig, ScoringConfig};
use crate::error::EngineResult;
use crate::models::{Claim, Evidence, Finding, FindingSeverity, Module, ModuleAnalysis};

#[derive(Debug, Clone, PartialEq)]
pub struct KickbackMetrics {
    /// Claims that carry a beneficiary id.
    pub total_claims: usize,
    pub beneficiaries: usize,
    pub top_beneficiaries: usize,
    pub top_claims: usize,
    pub concentration: f64,
    pub gini_coefficient: f64,
}

impl KickbackMetrics {
    pub fn compute(claims: &[Claim], top_share: f64) -> EngineResult<Self> {
        let mut per_beneficiary: HashMap<&str, usize> = HashMap::new();
        for claim in claims {
            if let Some(beneficiary) = claim.checked_beneficiary()? {
                *per_beneficiary.entry(beneficiary).or_insert(0) += 1;
            }
        }

        let mut counts: Vec<usize> = per_beneficiary.into_values().collect();
        counts.sort_unstable();

        let beneficiaries = counts.len();
        let total_claims: usize = counts.iter().sum();
        let top_beneficiaries = if beneficiaries == 0 {
            0
        } else {
            ((beneficiaries as f64 * top_share).ceil() as usize).clamp(1, beneficiaries)
        };
        let top_claims: usize = counts.iter().rev().take(top_beneficiaries).sum();
        let concentration = if total_claims == 0 {
            0.0
        } else {
            top_claims as f64 / total_claims as f64
        };

        Ok(Self {
            total_claims,
            beneficiaries,
            top_beneficiaries,
            top_claims,
            concentration,
            gini_coefficient: gini(&counts),
        })
    }
}

/// Discrete Gini coefficient of `counts`, which must be sorted ascending.
///
/// `G = (2 * sum(i * x_i) - (n + 1) * sum(x_i)) / (n * sum(x_i))` with 1-indexed
/// rank `i`. Fewer than two values, or all zeros, give 0.
pub fn gini(counts: &[usize]) -> f64 {
    let n = counts.len();
    if n < 2 {
        return 0.0;
    }
    let total: f64 = counts.iter().map(|&x| x as f64).sum();
    if total == 0.0 {
        return 0.0;
    }
    let ranked: f64 = counts
        .iter()
        .enumerate()
        .map(|(i, &x)| (i + 1) as f64 * x as f64)
        .sum();
    let n = n as f64;
    ((2.0 * ranked - (n + 1.0) * total) / (n * total)).clamp(0.0, 1.0)
}

/// Points for one triggered indicator: its value mapped onto 0-100.
fn indicator_points(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        (value * 100.0).min(100.0)
    } else {
        0.0
    }
}

/// Turn metrics into findings and a module score.
pub fn score_indicators(metrics: &KickbackMetrics, config: &KickbackConfig) -> (f64, Vec<Finding>) {
    let mut findings = Vec::new();

    let points = indicator_points(metrics.concentration, config.concentration_threshold);
    if points > 0.0 {
        findings.push(Finding::new(
            Module::KickbackIndicators,
            FindingSeverity::High,
            format!(
                "Top {} beneficiaries account for {:.1}% of claims",
                metrics.top_beneficiaries,
                metrics.concentration * 100.0
            ),
            Evidence::BeneficiaryConcentration {
                top_beneficiaries: metrics.top_beneficiaries,
                top_claims: metrics.top_claims,
                total_claims: metrics.total_claims,
                ratio: metrics.concentration,
                points,
            },
        ));
    }

    let points = indicator_points(metrics.gini_coefficient, config.gini_threshold);
    if points > 0.0 {
        findings.push(Finding::new(
            Module::KickbackIndicators,
            FindingSeverity::High,
            format!(
                "Claims per beneficiary are highly unequal (Gini {:.2} across {} beneficiaries)",
                metrics.gini_coefficient, metrics.beneficiaries
            ),
            Evidence::ClaimCountInequality {
                beneficiaries: metrics.beneficiaries,
                gini_coefficient: metrics.gini_coefficient,
                points,
            },
        ));
    }

    let score = findings.iter().map(|f| f.evidence.points()).sum::<f64>();
    (score.min(100.0), findings)
}

pub fn analyze(
    provider_id: Uuid,
    claims: &[Claim],
    config: &ScoringConfig,
) -> EngineResult<ModuleAnalysis> {
    let rules = &config.kickback;
    let metrics = KickbackMetrics::compute(claims, rules.top_share)?;

    if metrics.total_claims < rules.min_claims {
        return Ok(ModuleAnalysis::scored(
            provider_id,
            Module::KickbackIndicators,
            0.0,
            vec![Finding::insufficient_data(
                Module::KickbackIndicators,
                metrics.total_claims,
                rules.min_claims,
            )],
            &config.severity,
        ));
    }

    let (score, findings) = score_indicators(&metrics, rules);
    Ok(ModuleAnalysis::scored(
        provider_id,
        Module::KickbackIndicators,
        score,
        findings,
        &config.severity,
    ))
}

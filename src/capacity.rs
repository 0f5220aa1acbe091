//! Days on which a provider billed more distinct patients than its license allows.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::error::EngineResult;
use crate::models::{Claim, Evidence, Finding, FindingSeverity, Module, ModuleAnalysis};

#[derive(Debug, Clone, PartialEq)]
pub struct CapacityViolation {
    pub date: NaiveDate,
    pub billed_patients: usize,
    pub licensed_capacity: u32,
    pub excess: usize,
    /// `None` when the licensed capacity is zero.
    pub excess_percentage: Option<f64>,
}

/// Magnitude an undefined excess percentage contributes to the score.
const UNDEFINED_EXCESS_PCT: f64 = 100.0;

/// Distinct beneficiaries billed per date. Claims without a beneficiary are ignored.
pub fn billed_patients_by_date(claims: &[Claim]) -> EngineResult<BTreeMap<NaiveDate, usize>> {
    let mut by_date: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    for claim in claims {
        if let Some(beneficiary) = claim.checked_beneficiary()? {
            by_date.entry(claim.claim_date).or_default().insert(beneficiary);
        }
    }
    Ok(by_date
        .into_iter()
        .map(|(date, patients)| (date, patients.len()))
        .collect())
}

pub fn find_violations(
    claims: &[Claim],
    licensed_capacity: u32,
) -> EngineResult<Vec<CapacityViolation>> {
    let limit = licensed_capacity as usize;
    let violations = billed_patients_by_date(claims)?
        .into_iter()
        .filter(|&(_, billed)| billed > limit)
        .map(|(date, billed_patients)| {
            let excess = billed_patients - limit;
            CapacityViolation {
                date,
                billed_patients,
                licensed_capacity,
                excess,
                excess_percentage: (licensed_capacity > 0)
                    .then(|| excess as f64 * 100.0 / f64::from(licensed_capacity)),
            }
        })
        .collect();
    Ok(violations)
}

/// Frequency times magnitude: `scale * (violating days / window) * (1 + mean excess% / 100)`.
/// Days over a zero capacity count as 100% over.
pub fn violation_score(violations: &[CapacityViolation], window_days: u32, scale: f64) -> f64 {
    if violations.is_empty() {
        return 0.0;
    }
    let days = violations.len() as f64;
    let frequency = days / f64::from(window_days.max(1));
    let mean_excess = violations
        .iter()
        .map(|v| v.excess_percentage.unwrap_or(UNDEFINED_EXCESS_PCT))
        .sum::<f64>()
        / days;
    (scale * frequency * (1.0 + mean_excess / 100.0)).min(100.0)
}

pub fn analyze(
    provider_id: Uuid,
    claims: &[Claim],
    licensed_capacity: Option<u32>,
    window_days: u32,
    config: &ScoringConfig,
) -> EngineResult<ModuleAnalysis> {
    let Some(capacity) = licensed_capacity else {
        return Ok(ModuleAnalysis::scored(
            provider_id,
            Module::CapacityViolations,
            0.0,
            Vec::new(),
            &config.severity,
        ));
    };

    let violations = find_violations(claims, capacity)?;
    let score = violation_score(&violations, window_days, config.capacity.score_scale);

    let findings = violations
        .iter()
        .map(|v| {
            let severity = match v.excess_percentage {
                Some(pct) if pct <= config.capacity.critical_above_pct => FindingSeverity::Warning,
                _ => FindingSeverity::Critical,
            };
            let over = match v.excess_percentage {
                Some(pct) => format!("{pct:.1}% over"),
                None => "no patients licensed".to_string(),
            };
            Finding::new(
                Module::CapacityViolations,
                severity,
                format!(
                    "Billed {} patients on {} against a licensed capacity of {} ({over})",
                    v.billed_patients, v.date, v.licensed_capacity
                ),
                Evidence::CapacityExceeded {
                    date: v.date,
                    billed_patients: v.billed_patients,
                    licensed_capacity: v.licensed_capacity,
                    excess: v.excess,
                    excess_percentage: v.excess_percentage,
                },
            )
        })
        .collect();

    Ok(ModuleAnalysis::scored(
        provider_id,
        Module::CapacityViolations,
        score,
        findings,
        &config.severity,
    ))
}

//! Timing and duplication anomalies in a provider's claim history.

use std::collections::HashMap;

use chrono::{Datelike, Timelike, Weekday};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::error::EngineResult;
use crate::models::{Claim, Evidence, Finding, FindingSeverity, Module, ModuleAnalysis};

/// Raw counts behind the three behavioral ratios.
#[derive(Debug, Clone, PartialEq)]
pub struct BehavioralMetrics {
    pub total_claims: usize,
    pub weekend_claims: usize,
    pub timestamped_claims: usize,
    pub peak_hour: Option<u32>,
    pub claims_in_peak_hour: usize,
    pub duplicate_claims: usize,
}

impl BehavioralMetrics {
    pub fn compute(claims: &[Claim]) -> EngineResult<Self> {
        let mut weekend_claims = 0usize;
        let mut hours = [0usize; 24];
        let mut timestamped_claims = 0usize;
        let mut patterns: HashMap<(&str, i64), usize> = HashMap::new();

        for claim in claims {
            let cents = claim.checked_amount_cents()?;
            *patterns
                .entry((claim.billing_code.as_str(), cents))
                .or_insert(0) += 1;

            if matches!(claim.claim_date.weekday(), Weekday::Sat | Weekday::Sun) {
                weekend_claims += 1;
            }
            if let Some(submitted_at) = claim.submitted_at {
                hours[submitted_at.hour() as usize] += 1;
                timestamped_claims += 1;
            }
        }

        // Lowest hour wins a tie so the peak is stable.
        let (peak_hour, claims_in_peak_hour) = hours
            .iter()
            .enumerate()
            .fold((None, 0usize), |(best, best_count), (hour, &count)| {
                if count > best_count {
                    (Some(hour as u32), count)
                } else {
                    (best, best_count)
                }
            });

        let duplicate_claims = patterns.values().filter(|&&n| n > 1).sum();

        Ok(Self {
            total_claims: claims.len(),
            weekend_claims,
            timestamped_claims,
            peak_hour,
            claims_in_peak_hour,
            duplicate_claims,
        })
    }

    pub fn weekend_ratio(&self) -> f64 {
        ratio(self.weekend_claims, self.total_claims)
    }

    /// `None` when no claim carries a submission timestamp.
    pub fn batch_ratio(&self) -> Option<f64> {
        (self.timestamped_claims > 0)
            .then(|| ratio(self.claims_in_peak_hour, self.timestamped_claims))
    }

    pub fn robotic_ratio(&self) -> f64 {
        ratio(self.duplicate_claims, self.total_claims)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn analyze(
    provider_id: Uuid,
    claims: &[Claim],
    window_days: u32,
    config: &ScoringConfig,
) -> EngineResult<ModuleAnalysis> {
    let rules = &config.behavioral;
    if claims.len() < rules.min_claims {
        return Ok(ModuleAnalysis::scored(
            provider_id,
            Module::Behavioral,
            0.0,
            vec![Finding::insufficient_data(
                Module::Behavioral,
                claims.len(),
                rules.min_claims,
            )],
            &config.severity,
        ));
    }

    let metrics = BehavioralMetrics::compute(claims)?;
    let mut findings = Vec::new();

    let weekend_ratio = metrics.weekend_ratio();
    if rules.weekend.triggered(weekend_ratio) {
        let points = rules.weekend.points(weekend_ratio);
        findings.push(Finding::new(
            Module::Behavioral,
            FindingSeverity::Medium,
            format!(
                "{:.1}% of claims in the last {window_days} days are dated on a weekend",
                weekend_ratio * 100.0
            ),
            Evidence::WeekendBilling {
                weekend_claims: metrics.weekend_claims,
                total_claims: metrics.total_claims,
                ratio: weekend_ratio,
                points,
            },
        ));
    }

    if let (Some(batch_ratio), Some(peak_hour)) = (metrics.batch_ratio(), metrics.peak_hour) {
        if rules.batch.triggered(batch_ratio) {
            let points = rules.batch.points(batch_ratio);
            findings.push(Finding::new(
                Module::Behavioral,
                FindingSeverity::High,
                format!(
                    "{:.1}% of timestamped claims were submitted during hour {peak_hour:02}:00",
                    batch_ratio * 100.0
                ),
                Evidence::BatchSubmission {
                    peak_hour,
                    claims_in_peak_hour: metrics.claims_in_peak_hour,
                    timestamped_claims: metrics.timestamped_claims,
                    ratio: batch_ratio,
                    points,
                },
            ));
        }
    }

    let robotic_ratio = metrics.robotic_ratio();
    if rules.robotic.triggered(robotic_ratio) {
        let points = rules.robotic.points(robotic_ratio);
        findings.push(Finding::new(
            Module::Behavioral,
            FindingSeverity::High,
            format!(
                "{:.1}% of claims repeat another claim's billing code and amount exactly",
                robotic_ratio * 100.0
            ),
            Evidence::RoboticBilling {
                duplicate_claims: metrics.duplicate_claims,
                total_claims: metrics.total_claims,
                ratio: robotic_ratio,
                points,
            },
        ));
    }

    let score: f64 = findings.iter().map(|f| f.evidence.points()).sum();
    Ok(ModuleAnalysis::scored(
        provider_id,
        Module::Behavioral,
        score.min(100.0),
        findings,
        &config.severity,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::fixtures::{date, provider_id, sample_claim, submitted_at_hour};
    use crate::models::RiskLevel;
    use chrono::NaiveDate;

    /// Mondays through Fridays starting 2026-01-05.
    fn weekday(i: usize) -> NaiveDate {
        let week = (i / 5) as u32;
        let day = (i % 5) as u32;
        date(2026, 1, 5 + week * 7 + day)
    }

    fn distinct_weekday_claims(n: usize) -> Vec<Claim> {
        (0..n)
            .map(|i| {
                sample_claim(
                    provider_id(1),
                    Some("BEN-1"),
                    "99213",
                    100.0 + i as f64,
                    weekday(i % 15),
                )
            })
            .collect()
    }

    #[test]
    fn too_few_claims_is_informational_only() {
        let config = ScoringConfig::default();
        let claims = distinct_weekday_claims(5);
        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();

        assert_eq!(analysis.risk_score, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.findings[0].kind(), "insufficient_data");
        assert!(analysis.findings[0].is_informational());
    }

    #[test]
    fn clean_history_scores_zero() {
        let config = ScoringConfig::default();
        let claims = distinct_weekday_claims(20);
        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();

        assert_eq!(analysis.risk_score, 0.0);
        assert!(analysis.findings.is_empty());
    }

    #[test]
    fn weekend_billing_scales_above_threshold() {
        let config = ScoringConfig::default();
        let mut claims = distinct_weekday_claims(14);
        for i in 0..6 {
            // Saturdays 2026-01-10 and 2026-01-17, Sunday 2026-01-11
            let day = [date(2026, 1, 10), date(2026, 1, 11), date(2026, 1, 17)][i % 3];
            claims.push(sample_claim(
                provider_id(1),
                Some("BEN-2"),
                "99214",
                300.0 + i as f64,
                day,
            ));
        }

        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();
        assert_eq!(analysis.findings.len(), 1);
        let finding = &analysis.findings[0];
        assert_eq!(finding.severity, FindingSeverity::Medium);
        // ratio 0.30 sits halfway between 0.15 and 0.45
        assert!((analysis.risk_score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn batch_submission_uses_peak_hour() {
        let config = ScoringConfig::default();
        let claims: Vec<Claim> = distinct_weekday_claims(20)
            .into_iter()
            .enumerate()
            .map(|(i, claim)| submitted_at_hour(claim, if i < 18 { 2 } else { 14 }))
            .collect();

        let metrics = BehavioralMetrics::compute(&claims).unwrap();
        assert_eq!(metrics.peak_hour, Some(2));
        assert_eq!(metrics.batch_ratio(), Some(0.9));

        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.findings[0].severity, FindingSeverity::High);
        assert_eq!(analysis.risk_score, 40.0);
    }

    #[test]
    fn missing_timestamps_exclude_batch_ratio() {
        let claims = distinct_weekday_claims(20);
        let metrics = BehavioralMetrics::compute(&claims).unwrap();
        assert_eq!(metrics.batch_ratio(), None);
        assert_eq!(metrics.peak_hour, None);
    }

    #[test]
    fn exact_duplicates_count_as_robotic() {
        let config = ScoringConfig::default();
        let mut claims = distinct_weekday_claims(10);
        for i in 0..10 {
            claims.push(sample_claim(
                provider_id(1),
                Some("BEN-3"),
                "97110",
                55.25,
                weekday(i),
            ));
        }

        let metrics = BehavioralMetrics::compute(&claims).unwrap();
        assert_eq!(metrics.duplicate_claims, 10);
        assert_eq!(metrics.robotic_ratio(), 0.5);

        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();
        assert_eq!(analysis.findings[0].kind(), "robotic_billing");
        // (0.5 - 0.2) / (0.6 - 0.2) of 50 points
        assert!((analysis.risk_score - 37.5).abs() < 1e-9);
    }

    #[test]
    fn every_pattern_at_once_caps_at_one_hundred() {
        let config = ScoringConfig::default();
        let claims: Vec<Claim> = (0..20)
            .map(|i| {
                let day = if i % 2 == 0 { date(2026, 1, 10) } else { date(2026, 1, 11) };
                submitted_at_hour(
                    sample_claim(provider_id(1), Some("BEN-1"), "T1019", 80.0, day),
                    3,
                )
            })
            .collect();

        let analysis = analyze(provider_id(1), &claims, 30, &config).unwrap();
        assert_eq!(analysis.findings.len(), 3);
        assert_eq!(analysis.risk_score, 100.0);
        assert_eq!(analysis.risk_level, RiskLevel::High);
    }

    #[test]
    fn negative_amount_is_malformed() {
        let config = ScoringConfig::default();
        let mut claims = distinct_weekday_claims(12);
        claims[3].amount = -10.0;
        let err = analyze(provider_id(1), &claims, 30, &config).unwrap_err();
        assert!(matches!(err, EngineError::MalformedClaim { .. }));
    }
}

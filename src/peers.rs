//! Z-score of a provider's mean claim amount against its facility-type/state cohort.

use uuid::Uuid;

use crate::config::PeerConfig;
use crate::error::EngineResult;
use crate::models::{Claim, PeerAggregates, PeerComparison};

/// Mean claim amount, or `None` for an empty claim set.
pub fn mean_claim_amount(claims: &[Claim]) -> EngineResult<Option<f64>> {
    if claims.is_empty() {
        return Ok(None);
    }
    let mut total = 0.0;
    for claim in claims {
        claim.checked_amount_cents()?;
        total += claim.amount;
    }
    Ok(Some(total / claims.len() as f64))
}

/// Population mean and standard deviation of per-provider values.
pub fn cohort_aggregates(values: &[f64]) -> PeerAggregates {
    if values.is_empty() {
        return PeerAggregates {
            mean: 0.0,
            stddev: 0.0,
            n: 0,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    PeerAggregates {
        mean,
        stddev: variance.sqrt(),
        n: values.len(),
    }
}

pub fn z_score(value: f64, mean: f64, stddev: f64) -> Option<f64> {
    if !(stddev.is_finite() && stddev > 0.0) {
        return None;
    }
    let z = (value - mean) / stddev;
    z.is_finite().then_some(z)
}

/// Compare one provider against its cohort. A comparison that cannot be made is
/// reported as not comparable, never as a zero z-score.
pub fn compare(
    provider_id: Uuid,
    provider_mean: Option<f64>,
    cohort: PeerAggregates,
    config: &PeerConfig,
) -> PeerComparison {
    let not_comparable = |reason: String| PeerComparison {
        provider_id,
        provider_mean,
        cohort,
        z_score: None,
        comparable: false,
        outlier: false,
        reason: Some(reason),
    };

    let Some(value) = provider_mean else {
        return not_comparable("provider has no claims in the window".to_string());
    };
    if cohort.n < config.min_cohort {
        return not_comparable(format!(
            "cohort has {} providers, {} required",
            cohort.n, config.min_cohort
        ));
    }
    let Some(z) = z_score(value, cohort.mean, cohort.stddev) else {
        return not_comparable("cohort billing has no spread".to_string());
    };

    PeerComparison {
        provider_id,
        provider_mean,
        cohort,
        z_score: Some(z),
        comparable: true,
        outlier: z.abs() >= config.outlier_z,
        reason: None,
    }
}

//! Claim and provider builders shared by unit tests.

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::models::{Claim, Provider};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn provider_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn sample_claim(
    provider_id: Uuid,
    beneficiary: Option<&str>,
    code: &str,
    amount: f64,
    claim_date: NaiveDate,
) -> Claim {
    Claim {
        provider_id,
        beneficiary_id: beneficiary.map(str::to_string),
        billing_code: code.to_string(),
        amount,
        claim_date,
        submitted_at: None,
        units: Some(1),
    }
}

pub fn submitted_at_hour(mut claim: Claim, hour: u32) -> Claim {
    let time = NaiveTime::from_hms_opt(hour, 15, 0).unwrap();
    claim.submitted_at = Some(claim.claim_date.and_time(time));
    claim
}

/// `patients` claims on one date, one per distinct beneficiary.
pub fn day_of_patients(provider_id: Uuid, claim_date: NaiveDate, patients: usize) -> Vec<Claim> {
    (0..patients)
        .map(|i| {
            let beneficiary = format!("BEN-{i:04}");
            sample_claim(
                provider_id,
                Some(&beneficiary),
                "T1019",
                40.0 + i as f64,
                claim_date,
            )
        })
        .collect()
}

pub fn sample_provider(
    n: u128,
    facility_type: &str,
    state: &str,
    licensed_capacity: Option<u32>,
) -> Provider {
    Provider {
        id: provider_id(n),
        npi: format!("{:010}", 1_000_000_000 + n),
        name: format!("Provider {n}"),
        facility_type: facility_type.to_string(),
        licensed_capacity,
        city: Some("Minneapolis".to_string()),
        state: state.to_string(),
        zip: Some("55401".to_string()),
    }
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SeverityBands;
use crate::error::{EngineError, EngineResult};

/// One billed claim as supplied by the claim store. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub provider_id: Uuid,
    pub beneficiary_id: Option<String>,
    pub billing_code: String,
    pub amount: f64,
    pub claim_date: NaiveDate,
    pub submitted_at: Option<NaiveDateTime>,
    pub units: Option<u32>,
}

impl Claim {
    /// Amount in whole cents, rejecting negative or non-finite values.
    pub fn checked_amount_cents(&self) -> EngineResult<i64> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(EngineError::MalformedClaim {
                reason: format!(
                    "claim {} on {} has invalid amount {}",
                    self.billing_code, self.claim_date, self.amount
                ),
            });
        }
        if self.units == Some(0) {
            return Err(EngineError::MalformedClaim {
                reason: format!(
                    "claim {} on {} bills zero units",
                    self.billing_code, self.claim_date
                ),
            });
        }
        Ok((self.amount * 100.0).round() as i64)
    }

    /// Beneficiary id, if present. A blank id is malformed rather than absent.
    pub fn checked_beneficiary(&self) -> EngineResult<Option<&str>> {
        match self.beneficiary_id.as_deref() {
            None => Ok(None),
            Some(id) if id.trim().is_empty() => Err(EngineError::MalformedClaim {
                reason: format!(
                    "claim {} on {} has a blank beneficiary id",
                    self.billing_code, self.claim_date
                ),
            }),
            Some(id) => Ok(Some(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub npi: String,
    pub name: String,
    pub facility_type: String,
    pub licensed_capacity: Option<u32>,
    pub city: Option<String>,
    pub state: String,
    pub zip: Option<String>,
}

/// The compact provider view carried on sweep rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: Uuid,
    pub npi: String,
    pub name: String,
    pub facility_type: String,
    pub state: String,
}

impl From<&Provider> for ProviderSummary {
    fn from(provider: &Provider) -> Self {
        Self {
            id: provider.id,
            npi: provider.npi.clone(),
            name: provider.name.clone(),
            facility_type: provider.facility_type.clone(),
            state: provider.state.clone(),
        }
    }
}

/// Population filter for `list_providers` and sweeps. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFilter {
    pub facility_types: Vec<String>,
    pub state: Option<String>,
}

impl ProviderFilter {
    pub fn matches(&self, provider: &Provider) -> bool {
        let facility_ok = self.facility_types.is_empty()
            || self
                .facility_types
                .iter()
                .any(|facility| facility.eq_ignore_ascii_case(&provider.facility_type));
        let state_ok = self
            .state
            .as_deref()
            .map_or(true, |state| state.eq_ignore_ascii_case(&provider.state));
        facility_ok && state_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Behavioral,
    CapacityViolations,
    KickbackIndicators,
}

impl Module {
    pub const ALL: [Module; 3] = [
        Module::Behavioral,
        Module::CapacityViolations,
        Module::KickbackIndicators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Behavioral => "behavioral",
            Module::CapacityViolations => "capacity_violations",
            Module::KickbackIndicators => "kickback_indicators",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete risk tier for module and composite scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("LOW"),
            RiskLevel::Medium => f.write_str("MEDIUM"),
            RiskLevel::High => f.write_str("HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingSeverity {
    Info,
    Warning,
    Medium,
    High,
    Critical,
}

/// Structured evidence, one schema per finding type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    InsufficientData {
        claims: usize,
        minimum: usize,
    },
    WeekendBilling {
        weekend_claims: usize,
        total_claims: usize,
        ratio: f64,
        points: f64,
    },
    BatchSubmission {
        peak_hour: u32,
        claims_in_peak_hour: usize,
        timestamped_claims: usize,
        ratio: f64,
        points: f64,
    },
    RoboticBilling {
        duplicate_claims: usize,
        total_claims: usize,
        ratio: f64,
        points: f64,
    },
    CapacityExceeded {
        date: NaiveDate,
        billed_patients: usize,
        licensed_capacity: u32,
        excess: usize,
        /// Absent when the licensed capacity is zero.
        excess_percentage: Option<f64>,
    },
    BeneficiaryConcentration {
        top_beneficiaries: usize,
        top_claims: usize,
        total_claims: usize,
        ratio: f64,
        points: f64,
    },
    ClaimCountInequality {
        beneficiaries: usize,
        gini_coefficient: f64,
        points: f64,
    },
    ModuleFailed {
        reason: String,
    },
}

impl Evidence {
    pub fn kind(&self) -> &'static str {
        match self {
            Evidence::InsufficientData { .. } => "insufficient_data",
            Evidence::WeekendBilling { .. } => "weekend_billing",
            Evidence::BatchSubmission { .. } => "batch_submission",
            Evidence::RoboticBilling { .. } => "robotic_billing",
            Evidence::CapacityExceeded { .. } => "capacity_exceeded",
            Evidence::BeneficiaryConcentration { .. } => "beneficiary_concentration",
            Evidence::ClaimCountInequality { .. } => "claim_count_inequality",
            Evidence::ModuleFailed { .. } => "module_failed",
        }
    }

    /// The part of the evidence that distinguishes two findings of the same type.
    fn key_detail(&self) -> String {
        match self {
            Evidence::CapacityExceeded { date, .. } => date.to_string(),
            Evidence::BatchSubmission { peak_hour, .. } => peak_hour.to_string(),
            _ => String::new(),
        }
    }

    /// Points this evidence contributed to its module score.
    pub fn points(&self) -> f64 {
        match self {
            Evidence::WeekendBilling { points, .. }
            | Evidence::BatchSubmission { points, .. }
            | Evidence::RoboticBilling { points, .. }
            | Evidence::BeneficiaryConcentration { points, .. }
            | Evidence::ClaimCountInequality { points, .. } => *points,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FindingKey {
    pub module: Module,
    pub kind: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub module: Module,
    pub severity: FindingSeverity,
    pub description: String,
    pub evidence: Evidence,
}

impl Finding {
    pub fn new(
        module: Module,
        severity: FindingSeverity,
        description: impl Into<String>,
        evidence: Evidence,
    ) -> Self {
        Self {
            module,
            severity,
            description: description.into(),
            evidence,
        }
    }

    pub fn insufficient_data(module: Module, claims: usize, minimum: usize) -> Self {
        Self::new(
            module,
            FindingSeverity::Info,
            format!("Insufficient data: {claims} claims in window, {minimum} required"),
            Evidence::InsufficientData { claims, minimum },
        )
    }

    pub fn kind(&self) -> &'static str {
        self.evidence.kind()
    }

    pub fn key(&self) -> FindingKey {
        FindingKey {
            module: self.module,
            kind: self.evidence.kind(),
            detail: self.evidence.key_detail(),
        }
    }

    pub fn is_informational(&self) -> bool {
        self.severity == FindingSeverity::Info
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAnalysis {
    pub provider_id: Uuid,
    pub module: Module,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    /// Set when the analyzer could not run and this result stands in for it.
    pub failed: bool,
}

impl ModuleAnalysis {
    /// Build a module result. The score is clamped to [0, 100] and forced to 0
    /// when no finding carries points.
    pub fn scored(
        provider_id: Uuid,
        module: Module,
        score: f64,
        findings: Vec<Finding>,
        bands: &SeverityBands,
    ) -> Self {
        let scorable = findings.iter().any(|finding| !finding.is_informational());
        let risk_score = if scorable && score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            provider_id,
            module,
            risk_score,
            risk_level: bands.classify(risk_score),
            findings,
            failed: false,
        }
    }

    /// Stand-in for an analyzer that could not run.
    pub fn failed(provider_id: Uuid, module: Module, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            provider_id,
            module,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            findings: vec![Finding::new(
                module,
                FindingSeverity::Info,
                format!("{module} analysis could not run: {reason}"),
                Evidence::ModuleFailed { reason },
            )],
            failed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeAnalysis {
    pub provider_id: Uuid,
    pub composite_score: f64,
    pub severity: RiskLevel,
    pub modules: BTreeMap<Module, ModuleAnalysis>,
    pub all_findings: Vec<Finding>,
    pub total_findings: usize,
    pub window_days: u32,
    pub analyzed_at: DateTime<Utc>,
    pub partial: bool,
    pub failed_modules: Vec<Module>,
}

impl CompositeAnalysis {
    pub fn module(&self, module: Module) -> Option<&ModuleAnalysis> {
        self.modules.get(&module)
    }

    pub fn has_critical_findings(&self) -> bool {
        self.all_findings
            .iter()
            .any(|finding| finding.severity == FindingSeverity::Critical)
    }
}

/// Cohort baseline returned by the claim store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerAggregates {
    pub mean: f64,
    pub stddev: f64,
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerComparison {
    pub provider_id: Uuid,
    pub provider_mean: Option<f64>,
    pub cohort: PeerAggregates,
    pub z_score: Option<f64>,
    pub comparable: bool,
    pub outlier: bool,
    /// Why the comparison is not comparable, when it is not.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub provider: ProviderSummary,
    pub composite_score: f64,
    pub severity: RiskLevel,
    pub total_findings: usize,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub provider_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub generated_at: DateTime<Utc>,
    pub min_score: f64,
    pub limit: usize,
    pub entries: Vec<SweepEntry>,
    pub providers_considered: usize,
    pub providers_scored: usize,
    pub providers_skipped: usize,
    pub deadline_exceeded: bool,
    pub failures: Vec<SweepFailure>,
}

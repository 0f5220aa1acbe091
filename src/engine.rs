use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::behavioral;
use crate::capacity;
use crate::config::ScoringConfig;
use crate::error::EngineResult;
use crate::kickback;
use crate::models::{
    Claim, CompositeAnalysis, Module, ModuleAnalysis, PeerComparison, Provider, SweepResult,
};
use crate::peers;
use crate::risk;
use crate::store::ClaimStore;
use crate::sweep::{self, SweepRequest};

/// Entry point for scoring. Holds no mutable state; clones share the store.
#[derive(Clone)]
pub struct RiskEngine {
    store: Arc<dyn ClaimStore>,
    config: Arc<ScoringConfig>,
    clock: Option<DateTime<Utc>>,
}

impl RiskEngine {
    pub fn new(store: Arc<dyn ClaimStore>, config: ScoringConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock: None,
        }
    }

    /// Pin the timestamp stamped on every analysis.
    pub fn with_clock(mut self, analyzed_at: DateTime<Utc>) -> Self {
        self.clock = Some(analyzed_at);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ClaimStore> {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    pub async fn analyze(
        &self,
        provider_id: Uuid,
        window_days: u32,
    ) -> EngineResult<CompositeAnalysis> {
        let provider = self.store.get_provider(provider_id).await?;
        self.analyze_provider(&provider, window_days).await
    }

    pub(crate) async fn analyze_provider(
        &self,
        provider: &Provider,
        window_days: u32,
    ) -> EngineResult<CompositeAnalysis> {
        let claims = self.store.get_claims(provider.id, window_days).await?;
        debug!(provider_id = %provider.id, claims = claims.len(), window_days, "fetched claims");
        Ok(self.score_claims(provider, &claims, window_days))
    }

    /// Score an in-memory claim set. Analyzer failures become findings; this never fails.
    pub fn score_claims(
        &self,
        provider: &Provider,
        claims: &[Claim],
        window_days: u32,
    ) -> CompositeAnalysis {
        let config = self.config.as_ref();
        let behavioral = run_module(provider.id, Module::Behavioral, || {
            behavioral::analyze(provider.id, claims, window_days, config)
        });
        let capacity = run_module(provider.id, Module::CapacityViolations, || {
            capacity::analyze(
                provider.id,
                claims,
                provider.licensed_capacity,
                window_days,
                config,
            )
        });
        let kickback = run_module(provider.id, Module::KickbackIndicators, || {
            kickback::analyze(provider.id, claims, config)
        });

        let analysis = risk::score_composite(
            provider.id,
            behavioral,
            capacity,
            kickback,
            window_days,
            self.now(),
            config,
        );
        info!(
            provider_id = %provider.id,
            score = analysis.composite_score,
            severity = %analysis.severity,
            findings = analysis.total_findings,
            partial = analysis.partial,
            "scored provider"
        );
        analysis
    }

    pub async fn compare_to_peers(&self, provider_id: Uuid) -> EngineResult<PeerComparison> {
        let window_days = self.config.peers.window_days;
        let provider = self.store.get_provider(provider_id).await?;
        let claims = self.store.get_claims(provider_id, window_days).await?;
        let provider_mean = peers::mean_claim_amount(&claims)?;
        let cohort = self
            .store
            .get_peer_aggregates(
                &provider.facility_type,
                &provider.state,
                provider_id,
                window_days,
            )
            .await?;

        let comparison = peers::compare(provider_id, provider_mean, cohort, &self.config.peers);
        debug!(
            provider_id = %provider_id,
            z_score = ?comparison.z_score,
            cohort_size = cohort.n,
            comparable = comparison.comparable,
            "compared provider to peers"
        );
        Ok(comparison)
    }

    pub async fn sweep(&self, request: SweepRequest) -> EngineResult<SweepResult> {
        sweep::run(self, request).await
    }
}

/// Module boundary: an analyzer error is logged and replaced by a failed result
/// so the remaining modules still count.
fn run_module(
    provider_id: Uuid,
    module: Module,
    analyze: impl FnOnce() -> EngineResult<ModuleAnalysis>,
) -> ModuleAnalysis {
    match analyze() {
        Ok(analysis) => analysis,
        Err(err) => {
            warn!(provider_id = %provider_id, %module, error = %err, "module analysis failed");
            ModuleAnalysis::failed(provider_id, module, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::fixtures::{date, day_of_patients, provider_id, sample_claim, sample_provider};
    use crate::models::{FindingSeverity, RiskLevel};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn pinned() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap()
    }

    fn engine(store: InMemoryStore) -> RiskEngine {
        RiskEngine::new(Arc::new(store), ScoringConfig::default()).with_clock(pinned())
    }

    fn busy_store() -> InMemoryStore {
        let mut store = InMemoryStore::new(date(2026, 1, 31));
        store.insert_provider(sample_provider(1, "adult_day_care", "MN", Some(20)));
        store.insert_claims(day_of_patients(provider_id(1), date(2026, 1, 5), 35));
        store.insert_claims(day_of_patients(provider_id(1), date(2026, 1, 6), 18));
        store
    }

    #[tokio::test]
    async fn analyze_is_deterministic() {
        let engine = engine(busy_store());
        let first = engine.analyze(provider_id(1), 30).await.unwrap();
        let second = engine.analyze(provider_id(1), 30).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.analyzed_at, pinned());
    }

    #[tokio::test]
    async fn empty_history_scores_zero_with_informational_findings() {
        let mut store = InMemoryStore::new(date(2026, 1, 31));
        store.insert_provider(sample_provider(2, "home_health", "MN", Some(20)));
        let engine = engine(store);

        let analysis = engine.analyze(provider_id(2), 30).await.unwrap();
        assert_eq!(analysis.composite_score, 0.0);
        assert_eq!(analysis.severity, RiskLevel::Low);
        assert!(analysis.total_findings > 0);
        assert!(analysis
            .all_findings
            .iter()
            .all(|f| f.kind() == "insufficient_data"));
        assert!(!analysis.has_critical_findings());
        assert!(!analysis.partial);
    }

    #[tokio::test]
    async fn capacity_overage_flows_into_composite() {
        let engine = engine(busy_store());
        let analysis = engine.analyze(provider_id(1), 30).await.unwrap();

        let capacity = analysis.module(Module::CapacityViolations).unwrap();
        assert_eq!(capacity.findings.len(), 1);
        assert_eq!(capacity.findings[0].severity, FindingSeverity::Critical);
        assert!(capacity.risk_score > 0.0);
        assert!(analysis.has_critical_findings());

        let module_findings: usize = analysis.modules.values().map(|m| m.findings.len()).sum();
        assert_eq!(analysis.total_findings, module_findings);
        assert_eq!(analysis.all_findings.len(), module_findings);
    }

    #[tokio::test]
    async fn extra_violating_day_never_lowers_composite() {
        let before = engine(busy_store()).analyze(provider_id(1), 30).await.unwrap();

        let mut store = busy_store();
        store.insert_claims(day_of_patients(provider_id(1), date(2026, 1, 12), 24));
        let after = engine(store).analyze(provider_id(1), 30).await.unwrap();

        let capacity_before = before.module(Module::CapacityViolations).unwrap().risk_score;
        let capacity_after = after.module(Module::CapacityViolations).unwrap().risk_score;
        assert!(capacity_after >= capacity_before);
        assert!(after.composite_score >= before.composite_score);
    }

    #[tokio::test]
    async fn malformed_claim_fails_only_its_modules() {
        let mut store = busy_store();
        let mut bad = sample_claim(provider_id(1), Some("BEN-0001"), "T1019", 40.0, date(2026, 1, 7));
        bad.amount = f64::NAN;
        store.insert_claims([bad]);
        let engine = engine(store);

        let analysis = engine.analyze(provider_id(1), 30).await.unwrap();
        assert!(analysis.partial);
        assert_eq!(analysis.failed_modules, vec![Module::Behavioral]);

        let behavioral = analysis.module(Module::Behavioral).unwrap();
        assert!(behavioral.failed);
        assert_eq!(behavioral.risk_score, 0.0);
        assert_eq!(behavioral.findings[0].kind(), "module_failed");

        let capacity = analysis.module(Module::CapacityViolations).unwrap();
        assert!(!capacity.failed);
        assert_eq!(capacity.findings.len(), 1);
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let engine = engine(busy_store());
        let err = engine.analyze(provider_id(42), 30).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn compare_to_peers_flags_outlier() {
        let mut store = InMemoryStore::new(date(2026, 1, 31));
        for (n, amount) in [(10u128, 90.0), (11, 110.0), (12, 90.0), (13, 110.0), (14, 90.0), (15, 110.0)] {
            store.insert_provider(sample_provider(n, "home_health", "MN", None));
            store.insert_claims([sample_claim(provider_id(n), Some("A"), "T1019", amount, date(2026, 1, 10))]);
        }
        store.insert_provider(sample_provider(1, "home_health", "MN", None));
        store.insert_claims([sample_claim(provider_id(1), Some("A"), "T1019", 130.0, date(2026, 1, 10))]);
        let engine = engine(store);

        let comparison = engine.compare_to_peers(provider_id(1)).await.unwrap();
        assert!(comparison.comparable);
        assert_eq!(comparison.cohort.n, 6);
        assert_eq!(comparison.z_score, Some(3.0));
        assert!(comparison.outlier);
    }

    #[tokio::test]
    async fn bad_peer_claim_does_not_fail_a_healthy_provider() {
        let mut store = InMemoryStore::new(date(2026, 1, 31));
        for (n, amount) in [(10u128, 90.0), (11, 110.0), (12, 90.0), (13, 110.0), (14, 90.0), (15, 110.0)] {
            store.insert_provider(sample_provider(n, "home_health", "MN", None));
            store.insert_claims([sample_claim(provider_id(n), Some("A"), "T1019", amount, date(2026, 1, 10))]);
        }
        store.insert_provider(sample_provider(16, "home_health", "MN", None));
        let mut bad = sample_claim(provider_id(16), Some("B"), "T1019", 100.0, date(2026, 1, 11));
        bad.units = Some(0);
        store.insert_claims([bad]);
        store.insert_provider(sample_provider(1, "home_health", "MN", None));
        store.insert_claims([sample_claim(provider_id(1), Some("A"), "T1019", 130.0, date(2026, 1, 10))]);
        let engine = engine(store);

        let comparison = engine.compare_to_peers(provider_id(1)).await.unwrap();
        assert!(comparison.comparable);
        assert_eq!(comparison.cohort.n, 6);
        assert_eq!(comparison.z_score, Some(3.0));
    }

    #[tokio::test]
    async fn cohort_uses_the_configured_peer_window() {
        let mut store = InMemoryStore::new(date(2026, 1, 31));
        for (n, amount) in [(10u128, 90.0), (11, 110.0), (12, 90.0), (13, 110.0), (14, 90.0), (15, 110.0)] {
            store.insert_provider(sample_provider(n, "home_health", "MN", None));
            store.insert_claims([
                sample_claim(provider_id(n), Some("A"), "T1019", amount, date(2026, 1, 10)),
                sample_claim(provider_id(n), Some("A"), "T1019", 1000.0, date(2025, 12, 10)),
            ]);
        }
        store.insert_provider(sample_provider(1, "home_health", "MN", None));
        store.insert_claims([sample_claim(provider_id(1), Some("A"), "T1019", 130.0, date(2026, 1, 10))]);

        let mut config = ScoringConfig::default();
        config.peers.window_days = 30;
        let engine = RiskEngine::new(Arc::new(store), config).with_clock(pinned());

        let comparison = engine.compare_to_peers(provider_id(1)).await.unwrap();
        assert_eq!(comparison.cohort.mean, 100.0);
        assert_eq!(comparison.cohort.n, 6);
        assert_eq!(comparison.z_score, Some(3.0));
    }

    #[tokio::test]
    async fn compare_to_peers_with_thin_cohort_is_not_comparable() {
        let mut store = busy_store();
        store.insert_provider(sample_provider(2, "adult_day_care", "MN", Some(20)));
        store.insert_claims([sample_claim(provider_id(2), Some("A"), "T1019", 10.0, date(2026, 1, 10))]);
        let engine = engine(store);

        let comparison = engine.compare_to_peers(provider_id(1)).await.unwrap();
        assert!(!comparison.comparable);
        assert_eq!(comparison.z_score, None);
    }
}

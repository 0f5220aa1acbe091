//! Claim store contract and an in-memory implementation backed by CSV files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{Claim, PeerAggregates, Provider, ProviderFilter};
use crate::peers;
use crate::risk;

/// Source of claims, providers and cohort baselines.
///
/// Implementations own the dataset version: every method answers as of the
/// store's own reference date, never a process-wide setting. Facility type and
/// state comparisons ignore ASCII case.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Claims for one provider in the `window_days` ending on the store's
    /// reference date, ordered by claim date then submission time. An unknown
    /// provider is `NotFound`, not an empty history.
    async fn get_claims(&self, provider_id: Uuid, window_days: u32) -> EngineResult<Vec<Claim>>;

    async fn get_provider(&self, provider_id: Uuid) -> EngineResult<Provider>;

    /// Cohort baseline over the same `window_days` the subject is measured on.
    /// Peers without claims in the window, or with malformed claims, are not
    /// counted.
    async fn get_peer_aggregates(
        &self,
        facility_type: &str,
        state: &str,
        exclude_provider_id: Uuid,
        window_days: u32,
    ) -> EngineResult<PeerAggregates>;

    async fn list_providers(&self, filter: &ProviderFilter) -> EngineResult<Vec<Provider>>;
}

#[derive(Debug, Clone)]
pub struct InMemoryStore {
    as_of: NaiveDate,
    providers: BTreeMap<Uuid, Provider>,
    claims: HashMap<Uuid, Vec<Claim>>,
}

impl InMemoryStore {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            providers: BTreeMap::new(),
            claims: HashMap::new(),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn insert_provider(&mut self, provider: Provider) {
        self.providers.insert(provider.id, provider);
    }

    pub fn insert_claims(&mut self, claims: impl IntoIterator<Item = Claim>) {
        for claim in claims {
            self.claims.entry(claim.provider_id).or_default().push(claim);
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.values().map(Vec::len).sum()
    }

    /// Load providers and claims from two CSV files with header rows.
    ///
    /// Column names match the field names of `Provider` and `Claim`; empty
    /// cells read as absent optional values.
    pub fn from_csv(
        providers_path: &Path,
        claims_path: &Path,
        as_of: NaiveDate,
    ) -> EngineResult<Self> {
        let mut store = Self::new(as_of);

        let mut reader = csv::Reader::from_path(providers_path)?;
        for row in reader.deserialize::<Provider>() {
            store.insert_provider(row?);
        }

        let mut reader = csv::Reader::from_path(claims_path)?;
        for row in reader.deserialize::<Claim>() {
            let claim = row?;
            if !store.providers.contains_key(&claim.provider_id) {
                return Err(EngineError::Store {
                    reason: format!(
                        "{} references unknown provider {}",
                        claims_path.display(),
                        claim.provider_id
                    ),
                });
            }
            store.insert_claims([claim]);
        }

        Ok(store)
    }

    fn claims_in_window(&self, provider_id: Uuid, window_days: u32) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self
            .claims
            .get(&provider_id)
            .map(|claims| {
                claims
                    .iter()
                    .filter(|c| risk::in_window(c.claim_date, self.as_of, window_days))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        claims.sort_by(|a, b| {
            a.claim_date
                .cmp(&b.claim_date)
                .then(a.submitted_at.cmp(&b.submitted_at))
        });
        claims
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn get_claims(&self, provider_id: Uuid, window_days: u32) -> EngineResult<Vec<Claim>> {
        if !self.providers.contains_key(&provider_id) {
            return Err(EngineError::NotFound { provider_id });
        }
        Ok(self.claims_in_window(provider_id, window_days))
    }

    async fn get_provider(&self, provider_id: Uuid) -> EngineResult<Provider> {
        self.providers
            .get(&provider_id)
            .cloned()
            .ok_or(EngineError::NotFound { provider_id })
    }

    async fn get_peer_aggregates(
        &self,
        facility_type: &str,
        state: &str,
        exclude_provider_id: Uuid,
        window_days: u32,
    ) -> EngineResult<PeerAggregates> {
        let mut means = Vec::new();
        for peer in self.providers.values() {
            if peer.id == exclude_provider_id
                || !peer.facility_type.eq_ignore_ascii_case(facility_type)
                || !peer.state.eq_ignore_ascii_case(state)
            {
                continue;
            }
            let claims = self.claims_in_window(peer.id, window_days);
            match peers::mean_claim_amount(&claims) {
                Ok(Some(mean)) => means.push(mean),
                Ok(None) => {}
                Err(err) => {
                    warn!(peer_id = %peer.id, error = %err, "peer left out of cohort baseline");
                }
            }
        }
        Ok(peers::cohort_aggregates(&means))
    }

    async fn list_providers(&self, filter: &ProviderFilter) -> EngineResult<Vec<Provider>> {
        Ok(self
            .providers
            .values()
            .filter(|provider| filter.matches(provider))
            .cloned()
            .collect())
    }
}

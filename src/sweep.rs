//! Population-wide scoring pass with a fixed worker budget.
//!
//! Workers pull provider indices from a shared cursor, so the number of
//! in-flight analyses (and claim store queries) never exceeds the budget no
//! matter how large the population is. Results are merged by provider id, so
//! completion order never shows in the output.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::RiskEngine;
use crate::error::EngineResult;
use crate::models::{ProviderFilter, ProviderSummary, SweepEntry, SweepFailure, SweepResult};

#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub filter: ProviderFilter,
    pub min_score: f64,
    pub limit: usize,
    /// Falls back to the configured sweep window.
    pub window_days: Option<u32>,
    /// Providers not yet started at this instant are left out.
    pub deadline: Option<Instant>,
}

impl SweepRequest {
    pub fn new(filter: ProviderFilter, min_score: f64, limit: usize) -> Self {
        Self {
            filter,
            min_score,
            limit,
            window_days: None,
            deadline: None,
        }
    }

    pub fn with_window(mut self, window_days: u32) -> Self {
        self.window_days = Some(window_days);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug)]
enum Outcome {
    Scored(SweepEntry),
    Failed(SweepFailure),
    Skipped,
}

/// Highest score first, then most findings, then lowest provider id.
pub fn compare_entries(a: &SweepEntry, b: &SweepEntry) -> CmpOrdering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then(b.total_findings.cmp(&a.total_findings))
        .then_with(|| a.provider.id.cmp(&b.provider.id))
}

pub(crate) async fn run(engine: &RiskEngine, request: SweepRequest) -> EngineResult<SweepResult> {
    let generated_at = engine.now();
    let providers = engine.store().list_providers(&request.filter).await?;
    let providers_considered = providers.len();
    let window_days = request
        .window_days
        .unwrap_or(engine.config().sweep.window_days);
    let workers = engine
        .config()
        .sweep
        .workers
        .clamp(1, providers_considered.max(1));

    info!(
        providers = providers_considered,
        workers,
        window_days,
        min_score = request.min_score,
        limit = request.limit,
        "starting sweep"
    );

    let providers = Arc::new(providers);
    let cursor = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(workers);

    for _ in 0..workers {
        let engine = engine.clone();
        let providers = Arc::clone(&providers);
        let cursor = Arc::clone(&cursor);
        let deadline = request.deadline;

        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(provider) = providers.get(index) else {
                    break;
                };
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    outcomes.push((provider.id, Outcome::Skipped));
                    continue;
                }

                let outcome = match engine.analyze_provider(provider, window_days).await {
                    Ok(analysis) => Outcome::Scored(SweepEntry {
                        provider: ProviderSummary::from(provider),
                        composite_score: analysis.composite_score,
                        severity: analysis.severity,
                        total_findings: analysis.total_findings,
                        partial: analysis.partial,
                    }),
                    Err(err) => {
                        warn!(provider_id = %provider.id, error = %err, "provider skipped in sweep");
                        Outcome::Failed(SweepFailure {
                            provider_id: provider.id,
                            reason: err.to_string(),
                        })
                    }
                };
                outcomes.push((provider.id, outcome));
            }
            outcomes
        }));
    }

    let mut merged: BTreeMap<Uuid, Outcome> = BTreeMap::new();
    let mut lost_worker = None;
    for handle in handles {
        match handle.await {
            Ok(outcomes) => merged.extend(outcomes),
            Err(err) => {
                warn!(error = %err, "sweep worker stopped before finishing");
                lost_worker = Some(err.to_string());
            }
        }
    }
    // A stopped worker drops every outcome it held; report those providers as failed.
    if let Some(reason) = lost_worker {
        for provider in providers.iter() {
            merged.entry(provider.id).or_insert_with(|| {
                Outcome::Failed(SweepFailure {
                    provider_id: provider.id,
                    reason: format!("sweep worker stopped: {reason}"),
                })
            });
        }
    }

    let mut entries = Vec::new();
    let mut failures = Vec::new();
    let mut providers_scored = 0usize;
    let mut providers_skipped = 0usize;

    for outcome in merged.into_values() {
        match outcome {
            Outcome::Scored(entry) => {
                providers_scored += 1;
                if entry.composite_score >= request.min_score {
                    entries.push(entry);
                }
            }
            Outcome::Failed(failure) => failures.push(failure),
            Outcome::Skipped => providers_skipped += 1,
        }
    }

    entries.sort_by(compare_entries);
    entries.truncate(request.limit);

    let deadline_exceeded = providers_skipped > 0;
    if deadline_exceeded {
        warn!(skipped = providers_skipped, "sweep deadline reached before every provider started");
    }
    info!(
        scored = providers_scored,
        returned = entries.len(),
        failed = failures.len(),
        "sweep finished"
    );

    Ok(SweepResult {
        generated_at,
        min_score: request.min_score,
        limit: request.limit,
        entries,
        providers_considered,
        providers_scored,
        providers_skipped,
        deadline_exceeded,
        failures,
    })
}

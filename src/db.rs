//! Postgres-backed claim store.
//!
//! Reads the externally owned `providers` and `claims` tables. Queries are
//! checked at runtime so the crate builds without a live database.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{Claim, PeerAggregates, Provider, ProviderFilter};
use crate::risk;
use crate::store::ClaimStore;

pub async fn connect(database_url: &str, max_connections: u32) -> EngineResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgClaimStore {
    pool: PgPool,
    as_of: NaiveDate,
}

impl PgClaimStore {
    pub fn new(pool: PgPool, as_of: NaiveDate) -> Self {
        Self { pool, as_of }
    }

    async fn provider_exists(&self, provider_id: Uuid) -> EngineResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM providers WHERE id = $1)")
                .bind(provider_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

fn to_u32(value: Option<i32>, column: &str) -> EngineResult<Option<u32>> {
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| EngineError::Store {
                reason: format!("{column} must be non-negative, got {v}"),
            })
        })
        .transpose()
}

fn provider_from_row(row: &PgRow) -> EngineResult<Provider> {
    Ok(Provider {
        id: row.try_get("id")?,
        npi: row.try_get("npi")?,
        name: row.try_get("name")?,
        facility_type: row.try_get("facility_type")?,
        licensed_capacity: to_u32(row.try_get("licensed_capacity")?, "licensed_capacity")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip: row.try_get("zip")?,
    })
}

fn claim_from_row(row: &PgRow) -> EngineResult<Claim> {
    Ok(Claim {
        provider_id: row.try_get("provider_id")?,
        beneficiary_id: row.try_get("beneficiary_id")?,
        billing_code: row.try_get("billing_code")?,
        amount: row.try_get("amount")?,
        claim_date: row.try_get::<NaiveDate, _>("claim_date")?,
        submitted_at: row.try_get::<Option<NaiveDateTime>, _>("submitted_at")?,
        units: to_u32(row.try_get("units")?, "units")?,
    })
}

const PROVIDER_COLUMNS: &str =
    "id, npi, name, facility_type, licensed_capacity, city, state, zip";

/// Provider listing query with one numbered placeholder per active filter.
/// Matching is case-insensitive; bind lowercased values in the same order.
fn list_providers_query(filter: &ProviderFilter) -> String {
    let mut query = format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE TRUE");
    let mut param = 0;

    if !filter.facility_types.is_empty() {
        param += 1;
        query.push_str(&format!(" AND LOWER(facility_type) = ANY(${param})"));
    }
    if filter.state.is_some() {
        param += 1;
        query.push_str(&format!(" AND LOWER(state) = ${param}"));
    }
    query.push_str(" ORDER BY id");
    query
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn get_claims(&self, provider_id: Uuid, window_days: u32) -> EngineResult<Vec<Claim>> {
        let rows = sqlx::query(
            r#"
            SELECT provider_id, beneficiary_id, billing_code, amount::float8 AS amount,
                   claim_date, submitted_at, units
            FROM claims
            WHERE provider_id = $1 AND claim_date > $2 AND claim_date <= $3
            ORDER BY claim_date, submitted_at NULLS FIRST
            "#,
        )
        .bind(provider_id)
        .bind(risk::window_start(self.as_of, window_days))
        .bind(self.as_of)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() && !self.provider_exists(provider_id).await? {
            return Err(EngineError::NotFound { provider_id });
        }
        rows.iter().map(claim_from_row).collect()
    }

    async fn get_provider(&self, provider_id: Uuid) -> EngineResult<Provider> {
        let query = format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EngineError::NotFound { provider_id })?;
        provider_from_row(&row)
    }

    async fn get_peer_aggregates(
        &self,
        facility_type: &str,
        state: &str,
        exclude_provider_id: Uuid,
        window_days: u32,
    ) -> EngineResult<PeerAggregates> {
        // Peers with a non-positive unit count or a negative amount are malformed and left out.
        let row = sqlx::query(
            r#"
            WITH peer_means AS (
                SELECT c.provider_id, AVG(c.amount)::float8 AS mean_amount
                FROM claims c
                JOIN providers p ON p.id = c.provider_id
                WHERE LOWER(p.facility_type) = LOWER($1) AND LOWER(p.state) = LOWER($2)
                  AND p.id <> $3
                  AND c.claim_date > $4 AND c.claim_date <= $5
                GROUP BY c.provider_id
                HAVING BOOL_AND(c.amount >= 0 AND (c.units IS NULL OR c.units > 0))
            )
            SELECT COALESCE(AVG(mean_amount), 0)::float8 AS mean,
                   COALESCE(STDDEV_POP(mean_amount), 0)::float8 AS stddev,
                   COUNT(*) AS n
            FROM peer_means
            "#,
        )
        .bind(facility_type)
        .bind(state)
        .bind(exclude_provider_id)
        .bind(risk::window_start(self.as_of, window_days))
        .bind(self.as_of)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.try_get("n")?;
        Ok(PeerAggregates {
            mean: row.try_get("mean")?,
            stddev: row.try_get("stddev")?,
            n: usize::try_from(n).unwrap_or(0),
        })
    }

    async fn list_providers(&self, filter: &ProviderFilter) -> EngineResult<Vec<Provider>> {
        let query = list_providers_query(filter);
        let mut rows = sqlx::query(&query);
        if !filter.facility_types.is_empty() {
            let lowered: Vec<String> = filter
                .facility_types
                .iter()
                .map(|facility| facility.to_ascii_lowercase())
                .collect();
            rows = rows.bind(lowered);
        }
        if let Some(state) = &filter.state {
            rows = rows.bind(state.to_ascii_lowercase());
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(provider_from_row).collect()
    }
}

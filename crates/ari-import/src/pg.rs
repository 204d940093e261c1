//! Postgres store: one transaction per import batch.

use anyhow::{Context, Result};
use ari_core::VerificationLevel;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::policy::{render_promote_verification, render_upsert, EntityRow, FieldValue, TableSpec};
use crate::store::{CascadeStore, ExistingDisclosure, NaturalKey, UpsertOutcome};

pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("applying migrations")?;
    info!("migrations applied");
    Ok(())
}

fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, value: FieldValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        FieldValue::Uuid(v) => query.bind(v),
        FieldValue::Text(v) => query.bind(v),
        FieldValue::Float(v) => query.bind(v),
        FieldValue::Bool(v) => query.bind(v),
    }
}

pub struct PgStore {
    tx: Transaction<'static, Postgres>,
}

impl PgStore {
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await.context("opening import transaction")?;
        Ok(Self { tx })
    }
}

#[async_trait]
impl CascadeStore for PgStore {
    async fn find_by_natural_key(&mut self, key: NaturalKey<'_>) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = match key {
            NaturalKey::Location {
                state,
                locality,
                postcode,
            } => {
                sqlx::query_as(
                    "SELECT id FROM locations WHERE state = $1::region_code AND locality = $2 AND postcode = $3",
                )
                .bind(state.as_str())
                .bind(locality)
                .bind(postcode)
                .fetch_optional(&mut *self.tx)
                .await?
            }
            NaturalKey::BusinessAbn(abn) => {
                sqlx::query_as("SELECT id FROM businesses WHERE abn = $1 LIMIT 1")
                    .bind(abn)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
            NaturalKey::BusinessAcn(acn) => {
                sqlx::query_as("SELECT id FROM businesses WHERE acn = $1 LIMIT 1")
                    .bind(acn)
                    .fetch_optional(&mut *self.tx)
                    .await?
            }
            NaturalKey::Credential {
                credential_type,
                number,
            } => {
                sqlx::query_as(
                    "SELECT id FROM credentials WHERE credential_type = $1::credential_kind AND credential_number = $2",
                )
                .bind(credential_type.as_str())
                .bind(number)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };
        Ok(row.map(|(id,)| id))
    }

    async fn disclosures(&mut self, listing_id: Uuid, kind: &str) -> Result<Vec<ExistingDisclosure>> {
        let rows: Vec<(Uuid, bool)> = sqlx::query_as(
            "SELECT id, is_active FROM trust_disclosures WHERE listing_id = $1 AND kind = $2::disclosure_kind",
        )
        .bind(listing_id)
        .bind(kind)
        .fetch_all(&mut *self.tx)
        .await
        .context("listing trust disclosures")?;
        Ok(rows
            .into_iter()
            .map(|(id, is_active)| ExistingDisclosure { id, is_active })
            .collect())
    }

    async fn upsert(&mut self, spec: &TableSpec, row: &EntityRow) -> Result<Option<UpsertOutcome>> {
        let sql = render_upsert(spec);
        let mut query = sqlx::query(&sql);
        for value in row.bind_values(spec) {
            query = bind_value(query, value);
        }
        let returned = query
            .fetch_optional(&mut *self.tx)
            .await
            .with_context(|| format!("upserting into {}", spec.table()))?;
        let Some(returned) = returned else {
            return Ok(None);
        };
        Ok(Some(UpsertOutcome {
            id: returned.try_get("id")?,
            inserted: returned.try_get("inserted")?,
        }))
    }

    async fn promote_verification(&mut self, listing_id: Uuid, level: VerificationLevel) -> Result<bool> {
        let sql = render_promote_verification();
        let result = sqlx::query(&sql)
            .bind(listing_id)
            .bind(level.as_str())
            .execute(&mut *self.tx)
            .await
            .context("promoting listing verification")?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("committing import")
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.context("rolling back import")
    }
}

//! Per-record upsert chain:
//! Location → AccountUser → Business → AdvisorProfile → Listing →
//! {TrustDisclosure, verification promotion} → Credential.
//!
//! A stage that yields no row skips the rest of that record. Any error ends
//! the batch and the caller rolls the whole transaction back.

use std::collections::BTreeMap;

use anyhow::Result;
use ari_core::identity::EntityType;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::input::ImportRecord;
use crate::plan::{self, BusinessScopedIds, RecordPlan};
use crate::policy::{
    EntityRow, TableSpec, ACCOUNT_USERS, ADVISOR_PROFILES, BUSINESSES, CREDENTIALS, LISTINGS, LOCATIONS,
    TRUST_DISCLOSURES,
};
use crate::store::{resolve_identity, CascadeStore, NaturalKey, UpsertOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeSummary {
    pub processed: usize,
    pub skipped: usize,
    pub verification_promoted: usize,
    /// Records whose ACN was already held by a different business.
    pub registration_conflicts: usize,
    pub entities: BTreeMap<&'static str, EntityCounts>,
}

impl CascadeSummary {
    fn empty() -> Self {
        Self {
            entities: EntityType::ALL
                .iter()
                .map(|e| (e.table(), EntityCounts::default()))
                .collect(),
            ..Default::default()
        }
    }

    fn record(&mut self, entity: EntityType, outcome: UpsertOutcome) {
        let counts = self.entities.entry(entity.table()).or_default();
        if outcome.inserted {
            counts.inserted += 1;
        } else {
            counts.updated += 1;
        }
    }

    pub fn counts(&self, entity: EntityType) -> EntityCounts {
        self.entities.get(entity.table()).copied().unwrap_or_default()
    }

    pub fn total_inserted(&self) -> usize {
        self.entities.values().map(|c| c.inserted).sum()
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// A record hit an error mid-cascade; the batch is abandoned.
    #[error("record {index} ({credential}) aborted the batch")]
    Record {
        index: usize,
        credential: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("store failed to {action}")]
    Store {
        action: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Which stage produced no row for a skipped record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skipped(pub EntityType);

async fn write<S: CascadeStore>(
    store: &mut S,
    summary: &mut CascadeSummary,
    spec: &TableSpec,
    row: EntityRow,
) -> Result<Result<Uuid, Skipped>> {
    match store.upsert(spec, &row).await? {
        Some(outcome) => {
            summary.record(spec.entity, outcome);
            Ok(Ok(outcome.id))
        }
        None => Ok(Err(Skipped(spec.entity))),
    }
}

struct BusinessMatch {
    id: Uuid,
    /// ACN to store, unless another business already holds it.
    acn: Option<String>,
    withheld_acn: bool,
}

/// ABN match first, then ACN, then the derived id. Each number is looked up
/// on its own so a record joining two existing businesses is detected.
async fn resolve_business<S: CascadeStore>(
    store: &mut S,
    record: &ImportRecord,
    derived: Uuid,
) -> Result<BusinessMatch> {
    let by_abn = match record.abn.as_deref() {
        Some(abn) => store.find_by_natural_key(NaturalKey::BusinessAbn(abn)).await?,
        None => None,
    };
    let by_acn = match record.acn.as_deref() {
        Some(acn) => store.find_by_natural_key(NaturalKey::BusinessAcn(acn)).await?,
        None => None,
    };
    let id = by_abn.or(by_acn).unwrap_or(derived);
    let withheld_acn = by_acn.is_some_and(|holder| holder != id);
    Ok(BusinessMatch {
        id,
        acn: if withheld_acn { None } else { record.acn.clone() },
        withheld_acn,
    })
}

/// `Ok(Err(_))` when a stage returned nothing; `Err` aborts the batch.
async fn cascade_record<S: CascadeStore>(
    store: &mut S,
    summary: &mut CascadeSummary,
    record: &ImportRecord,
) -> Result<Result<(), Skipped>> {
    let ids = RecordPlan::for_record(record);
    macro_rules! stage {
        ($spec:expr, $row:expr) => {
            match write(store, summary, &$spec, $row).await? {
                Ok(id) => id,
                Err(skipped) => return Ok(Err(skipped)),
            }
        };
    }

    let location_keys = [NaturalKey::Location {
        state: record.state,
        locality: &record.locality,
        postcode: &record.postcode,
    }];
    let location_id = resolve_identity(store, &location_keys, ids.location_id).await?;
    let location_id = stage!(
        LOCATIONS,
        EntityRow::new()
            .set("id", location_id)
            .set("state", record.state.as_str())
            .set("locality", record.locality.as_str())
            .set("postcode", record.postcode.as_str())
            .set("lat", record.coordinates.map(|c| c.lat))
            .set("lng", record.coordinates.map(|c| c.lng))
    );

    let business = resolve_business(store, record, ids.business_id).await?;
    if business.withheld_acn {
        summary.registration_conflicts += 1;
        warn!(
            credential = %record.credential_number,
            acn = record.acn.as_deref().unwrap_or_default(),
            business = %business.id,
            "ACN belongs to another business, not copied"
        );
    }
    let business_id = business.id;
    let scoped = BusinessScopedIds::for_business(business_id);

    let user_id = stage!(
        ACCOUNT_USERS,
        EntityRow::new()
            .set("id", scoped.user_id)
            .set("display_name", record.name.as_str())
            .set("role", plan::USER_ROLE)
    );

    let business_id = stage!(
        BUSINESSES,
        EntityRow::new()
            .set("id", business_id)
            .set("legal_name", record.name.as_str())
            .set("normalized_name", plan::normalized_business_name(record))
            .set("abn", record.abn.clone())
            .set("acn", business.acn)
            .set("primary_location_id", location_id)
            .set("owner_user_id", user_id)
    );

    let advisor_id = stage!(
        ADVISOR_PROFILES,
        EntityRow::new()
            .set("id", scoped.advisor_id)
            .set("user_id", user_id)
            .set("business_id", business_id)
            .set("display_name", record.name.as_str())
            .set("bio", plan::advisor_bio(record))
    );

    let listing_id = stage!(
        LISTINGS,
        EntityRow::new()
            .set("id", scoped.listing_id)
            .set("advisor_id", advisor_id)
            .set("business_id", business_id)
            .set("location_id", location_id)
            .set("headline", ids.headline.as_str())
            .set("status", plan::LISTING_STATUS)
            .set("verification_level", ids.verification_level.as_str())
            .set("source_dataset", record.source_dataset.clone())
            .set("source_url", record.dataset_url.clone())
    );

    let existing = store.disclosures(listing_id, plan::DISCLOSURE_KIND).await?;
    stage!(
        TRUST_DISCLOSURES,
        EntityRow::new()
            .set("id", plan::next_disclosure_id(listing_id, &existing))
            .set("listing_id", listing_id)
            .set("kind", plan::DISCLOSURE_KIND)
            .set("title", plan::disclosure_title(record))
            .set("body", plan::disclosure_body(record))
            .set("is_active", true)
    );
    if store
        .promote_verification(listing_id, ids.verification_level)
        .await?
    {
        summary.verification_promoted += 1;
    }

    let credential_keys = [NaturalKey::Credential {
        credential_type: record.credential_type,
        number: &record.credential_number,
    }];
    let credential_id = resolve_identity(store, &credential_keys, ids.credential_id).await?;
    stage!(
        CREDENTIALS,
        EntityRow::new()
            .set("id", credential_id)
            .set("credential_type", record.credential_type.as_str())
            .set("credential_number", record.credential_number.as_str())
            .set("licensee_number", record.licensee_number.clone())
            .set("business_id", business_id)
            .set("listing_id", listing_id)
    );

    Ok(Ok(()))
}

/// Run every record through the cascade on an open store.
pub async fn run_cascade<S: CascadeStore>(
    store: &mut S,
    records: &[ImportRecord],
) -> Result<CascadeSummary, ImportError> {
    let mut summary = CascadeSummary::empty();
    for (idx, record) in records.iter().enumerate() {
        let outcome = cascade_record(store, &mut summary, record)
            .await
            .map_err(|err| ImportError::Record {
                index: idx + 1,
                credential: format!("{} {}", record.credential_type, record.credential_number),
                source: err.into(),
            })?;
        match outcome {
            Ok(()) => {
                summary.processed += 1;
                debug!(credential = %record.credential_number, "record imported");
            }
            Err(Skipped(stage)) => {
                summary.skipped += 1;
                warn!(credential = %record.credential_number, stage = stage.table(), "record skipped");
            }
        }
    }
    Ok(summary)
}

/// Run the batch in `store` and commit, or roll everything back on error.
pub async fn import_batch<S: CascadeStore>(
    mut store: S,
    records: &[ImportRecord],
) -> Result<CascadeSummary, ImportError> {
    match run_cascade(&mut store, records).await {
        Ok(summary) => {
            store.commit().await.map_err(|err| ImportError::Store {
                action: "commit",
                source: err.into(),
            })?;
            info!(
                processed = summary.processed,
                skipped = summary.skipped,
                inserted = summary.total_inserted(),
                "import committed"
            );
            Ok(summary)
        }
        Err(err) => {
            warn!(error = %err, "import failed, rolling back");
            store.rollback().await.map_err(|err| ImportError::Store {
                action: "roll back",
                source: err.into(),
            })?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::read_batch;
    use crate::policy::FieldValue;
    use crate::store::MemoryDatabase;
    use ari_core::identity::derive_id;

    const SAMPLE: &str = "name,state,locality,postcode,credential_type,credential_number,abn_acn,lat,lng\n\
Acme Finance,VIC,Richmond,3121,acl,123456,12345678901,-37.8183,144.998\n\
Jane Citizen,VIC,Cremorne,3121,acr,500100,987654321,,\n";

    fn records() -> Vec<ImportRecord> {
        read_batch(SAMPLE.as_bytes()).unwrap().records
    }

    #[tokio::test]
    async fn example_row_builds_business_and_location() {
        let db = MemoryDatabase::new();
        let summary = import_batch(db.begin(), &records()[..1]).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.counts(EntityType::Credential).inserted, 1);

        let tables = db.snapshot();
        let business = derive_id(EntityType::Business, "12345678901");
        assert_eq!(
            tables.value("businesses", business, "abn"),
            Some(&FieldValue::Text(Some("12345678901".into())))
        );
        assert_eq!(tables.value("businesses", business, "acn"), Some(&FieldValue::Text(None)));
        let location = derive_id(EntityType::Location, "VIC|RICHMOND|3121");
        assert_eq!(
            tables.value("locations", location, "locality"),
            Some(&FieldValue::Text(Some("RICHMOND".into())))
        );
    }

    #[tokio::test]
    async fn second_run_inserts_nothing() {
        let db = MemoryDatabase::new();
        let first = import_batch(db.begin(), &records()).await.unwrap();
        assert_eq!(first.counts(EntityType::Listing).inserted, 2);
        let rows_after_first = db.snapshot().total_rows();

        let second = import_batch(db.begin(), &records()).await.unwrap();
        assert_eq!(second.total_inserted(), 0);
        assert_eq!(second.counts(EntityType::Listing).updated, 2);
        assert_eq!(second.verification_promoted, 0);
        assert_eq!(db.snapshot().total_rows(), rows_after_first);
    }

    #[tokio::test]
    async fn empty_stage_skips_only_that_record() {
        let db = MemoryDatabase::new();
        let store = db.begin().reject_table("trust_disclosures");
        let summary = import_batch(store, &records()).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.counts(EntityType::Credential).inserted, 0);
        assert_eq!(db.snapshot().row_count("listings"), 2);
    }
}

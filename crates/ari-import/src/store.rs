//! The write surface of the cascade, and an in-process implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use ari_core::{CredentialType, RegionCode, VerificationLevel};
use async_trait::async_trait;
use uuid::Uuid;

use crate::policy::{EntityRow, FieldPolicy, FieldValue, TableSpec, LISTINGS, TRUST_DISCLOSURES};

/// Existing-row keys consulted before a derived id is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalKey<'a> {
    Location {
        state: RegionCode,
        locality: &'a str,
        postcode: &'a str,
    },
    BusinessAbn(&'a str),
    BusinessAcn(&'a str),
    Credential {
        credential_type: CredentialType,
        number: &'a str,
    },
}

/// A stored disclosure for one listing and kind, active or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingDisclosure {
    pub id: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: Uuid,
    pub inserted: bool,
}

/// One open unit of work. Dropping a store without `commit` discards it.
#[async_trait]
pub trait CascadeStore: Send {
    async fn find_by_natural_key(&mut self, key: NaturalKey<'_>) -> Result<Option<Uuid>>;

    async fn disclosures(&mut self, listing_id: Uuid, kind: &str) -> Result<Vec<ExistingDisclosure>>;

    /// `Ok(None)` means the statement produced no row.
    async fn upsert(&mut self, spec: &TableSpec, row: &EntityRow) -> Result<Option<UpsertOutcome>>;

    /// Returns whether the stored level was raised.
    async fn promote_verification(&mut self, listing_id: Uuid, level: VerificationLevel) -> Result<bool>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// First existing row matching `keys` in order, else `derived`.
pub async fn resolve_identity<S: CascadeStore>(
    store: &mut S,
    keys: &[NaturalKey<'_>],
    derived: Uuid,
) -> Result<Uuid> {
    for key in keys {
        if let Some(id) = store.find_by_natural_key(*key).await? {
            return Ok(id);
        }
    }
    Ok(derived)
}

type Table = BTreeMap<Uuid, BTreeMap<&'static str, FieldValue>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    tables: BTreeMap<&'static str, Table>,
}

impl MemoryTables {
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, BTreeMap::len)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn value(&self, table: &str, id: Uuid, column: &str) -> Option<&FieldValue> {
        self.tables.get(table)?.get(&id)?.get(column)
    }

    pub fn ids(&self, table: &str) -> Vec<Uuid> {
        self.tables
            .get(table)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default()
    }

    fn find(&self, table: &str, matches: impl Fn(&BTreeMap<&'static str, FieldValue>) -> bool) -> Option<Uuid> {
        self.tables
            .get(table)?
            .iter()
            .find(|(_, row)| matches(row))
            .map(|(id, _)| *id)
    }

    /// First other row holding the same non-null values for every column of `key`.
    fn unique_violation(&self, table: &str, id: Uuid, key: &[&str], row: &BTreeMap<&'static str, FieldValue>) -> Option<Uuid> {
        let values: Vec<&FieldValue> = key.iter().filter_map(|column| row.get(*column)).collect();
        if values.len() != key.len() || values.iter().any(|v| v.is_null()) {
            return None;
        }
        self.tables
            .get(table)?
            .iter()
            .find(|(other_id, other)| {
                **other_id != id
                    && key
                        .iter()
                        .zip(&values)
                        .all(|(column, value)| other.get(*column) == Some(*value))
            })
            .map(|(other_id, _)| *other_id)
    }

    fn text_eq(row: &BTreeMap<&'static str, FieldValue>, column: &str, expected: &str) -> bool {
        row.get(column).and_then(FieldValue::as_text) == Some(expected)
    }
}

/// Shared in-process database; each [`MemoryStore`] is a transaction over it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<MemoryTables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> MemoryStore {
        MemoryStore {
            working: self.snapshot(),
            database: self.clone(),
            fail_after_upserts: None,
            upserts: 0,
            reject_table: None,
        }
    }

    pub fn snapshot(&self) -> MemoryTables {
        self.inner.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Overwrite one committed column outside any import, the way an
    /// operator edits a row by hand. Returns whether the row exists.
    pub fn edit(&self, table: &str, id: Uuid, column: &'static str, value: impl Into<FieldValue>) -> bool {
        let Ok(mut tables) = self.inner.lock() else {
            return false;
        };
        match tables.tables.get_mut(table).and_then(|rows| rows.get_mut(&id)) {
            Some(row) => {
                row.insert(column, value.into());
                true
            }
            None => false,
        }
    }
}

/// Applies the same column policies as the SQL store, against a private copy
/// that replaces the shared tables on commit.
#[derive(Debug)]
pub struct MemoryStore {
    database: MemoryDatabase,
    working: MemoryTables,
    fail_after_upserts: Option<usize>,
    upserts: usize,
    reject_table: Option<&'static str>,
}

impl MemoryStore {
    /// Error out on the upsert after `count` successful ones.
    pub fn fail_after_upserts(mut self, count: usize) -> Self {
        self.fail_after_upserts = Some(count);
        self
    }

    /// Upserts into `table` return no row.
    pub fn reject_table(mut self, table: &'static str) -> Self {
        self.reject_table = Some(table);
        self
    }

    pub fn tables(&self) -> &MemoryTables {
        &self.working
    }

    fn conflicting_row(&self, spec: &TableSpec, row: &EntityRow) -> Option<Uuid> {
        self.working.find(spec.table(), |existing| {
            if spec.active_only && existing.get("is_active") != Some(&FieldValue::Bool(Some(true))) {
                return false;
            }
            spec.conflict_columns.iter().all(|column| {
                let incoming = if *column == "id" {
                    row.id().map(FieldValue::from)
                } else {
                    row.get(column).cloned()
                };
                incoming.is_some() && existing.get(column) == incoming.as_ref()
            })
        })
    }

    fn check_unique_keys(&self, spec: &TableSpec, id: Uuid, row: &BTreeMap<&'static str, FieldValue>) -> Result<()> {
        for key in spec.unique_keys {
            if let Some(other) = self.working.unique_violation(spec.table(), id, key, row) {
                bail!(
                    "duplicate key ({}) in {}: row {id} collides with {other}",
                    key.join(", "),
                    spec.table()
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CascadeStore for MemoryStore {
    async fn find_by_natural_key(&mut self, key: NaturalKey<'_>) -> Result<Option<Uuid>> {
        let found = match key {
            NaturalKey::Location {
                state,
                locality,
                postcode,
            } => self.working.find("locations", |row| {
                MemoryTables::text_eq(row, "state", state.as_str())
                    && MemoryTables::text_eq(row, "locality", locality)
                    && MemoryTables::text_eq(row, "postcode", postcode)
            }),
            NaturalKey::BusinessAbn(abn) => self
                .working
                .find("businesses", |row| MemoryTables::text_eq(row, "abn", abn)),
            NaturalKey::BusinessAcn(acn) => self
                .working
                .find("businesses", |row| MemoryTables::text_eq(row, "acn", acn)),
            NaturalKey::Credential {
                credential_type,
                number,
            } => self.working.find("credentials", |row| {
                MemoryTables::text_eq(row, "credential_type", credential_type.as_str())
                    && MemoryTables::text_eq(row, "credential_number", number)
            }),
        };
        Ok(found)
    }

    async fn disclosures(&mut self, listing_id: Uuid, kind: &str) -> Result<Vec<ExistingDisclosure>> {
        let Some(rows) = self.working.tables.get(TRUST_DISCLOSURES.table()) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|(_, row)| {
                row.get("listing_id").and_then(FieldValue::as_uuid) == Some(listing_id)
                    && MemoryTables::text_eq(row, "kind", kind)
            })
            .map(|(id, row)| ExistingDisclosure {
                id: *id,
                is_active: row.get("is_active") == Some(&FieldValue::Bool(Some(true))),
            })
            .collect())
    }

    async fn upsert(&mut self, spec: &TableSpec, row: &EntityRow) -> Result<Option<UpsertOutcome>> {
        if self.fail_after_upserts == Some(self.upserts) {
            bail!("injected failure writing {}", spec.table());
        }
        self.upserts += 1;
        if self.reject_table == Some(spec.table()) {
            return Ok(None);
        }

        if let Some(existing_id) = self.conflicting_row(spec, row) {
            let mut updated = self
                .working
                .tables
                .get(spec.table())
                .and_then(|t| t.get(&existing_id))
                .cloned()
                .ok_or_else(|| anyhow!("row {existing_id} vanished from {}", spec.table()))?;
            for column in spec.columns {
                if spec.conflict_columns.contains(&column.name) {
                    continue;
                }
                let incoming = row.get(column.name).cloned().unwrap_or(FieldValue::Text(None));
                match column.policy {
                    FieldPolicy::InsertOnly => {}
                    FieldPolicy::FillIfAbsent => {
                        if updated.get(column.name).map_or(true, FieldValue::is_null) {
                            updated.insert(column.name, incoming);
                        }
                    }
                    FieldPolicy::AlwaysRefresh => {
                        updated.insert(column.name, incoming);
                    }
                    FieldPolicy::ClearOnUpsert => {
                        updated.insert(column.name, FieldValue::Text(None));
                    }
                }
            }
            self.check_unique_keys(spec, existing_id, &updated)?;
            self.working
                .tables
                .entry(spec.table())
                .or_default()
                .insert(existing_id, updated);
            return Ok(Some(UpsertOutcome {
                id: existing_id,
                inserted: false,
            }));
        }

        let id = row
            .id()
            .ok_or_else(|| anyhow!("{} row has no id", spec.table()))?;
        let mut stored = BTreeMap::new();
        for column in spec.columns {
            let value = match column.policy {
                FieldPolicy::ClearOnUpsert => FieldValue::Text(None),
                _ => row.get(column.name).cloned().unwrap_or(FieldValue::Text(None)),
            };
            stored.insert(column.name, value);
        }
        if self.working.tables.get(spec.table()).is_some_and(|t| t.contains_key(&id)) {
            bail!("duplicate key {id} in {}", spec.table());
        }
        self.check_unique_keys(spec, id, &stored)?;
        self.working.tables.entry(spec.table()).or_default().insert(id, stored);
        Ok(Some(UpsertOutcome { id, inserted: true }))
    }

    async fn promote_verification(&mut self, listing_id: Uuid, level: VerificationLevel) -> Result<bool> {
        let Some(listing) = self
            .working
            .tables
            .get_mut(LISTINGS.table())
            .and_then(|t| t.get_mut(&listing_id))
        else {
            return Ok(false);
        };
        let current = listing
            .get("verification_level")
            .and_then(FieldValue::as_text)
            .and_then(|v| v.parse::<VerificationLevel>().ok())
            .unwrap_or(VerificationLevel::Unverified);
        if level <= current {
            return Ok(false);
        }
        listing.insert("verification_level", FieldValue::from(level.as_str()));
        Ok(true)
    }

    async fn commit(self) -> Result<()> {
        let mut shared = self
            .database
            .inner
            .lock()
            .map_err(|_| anyhow!("memory database lock poisoned"))?;
        *shared = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

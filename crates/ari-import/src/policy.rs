//! Per-table merge rules and the single upsert statement rendered from them.
//!
//! Every cascade stage writes through one [`TableSpec`]; the SQL store and the
//! in-memory store both interpret the same column policies, so a rule changes
//! in exactly one place.

use std::collections::BTreeMap;

use ari_core::identity::EntityType;
use uuid::Uuid;

/// What happens to a column when the row already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Written on insert, never touched afterwards.
    InsertOnly,
    /// Updated only while the stored value is null.
    FillIfAbsent,
    /// Overwritten from the incoming row.
    AlwaysRefresh,
    /// Soft-delete marker: inserted as null and reset to null on every upsert.
    ClearOnUpsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub policy: FieldPolicy,
}

const fn col(name: &'static str, sql_type: &'static str, policy: FieldPolicy) -> Column {
    Column {
        name,
        sql_type,
        policy,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub entity: EntityType,
    pub conflict_columns: &'static [&'static str],
    /// Conflicts only count against rows with `is_active = true`.
    pub active_only: bool,
    /// Unique constraints besides the conflict target. Rows with a null in
    /// the key never collide.
    pub unique_keys: &'static [&'static [&'static str]],
    pub columns: &'static [Column],
}

impl TableSpec {
    pub fn table(&self) -> &'static str {
        self.entity.table()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns that take a bind parameter, in placeholder order.
    pub fn bound_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.policy != FieldPolicy::ClearOnUpsert)
    }
}

use FieldPolicy::{AlwaysRefresh, ClearOnUpsert, FillIfAbsent, InsertOnly};

pub const LOCATIONS: TableSpec = TableSpec {
    entity: EntityType::Location,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[&["state", "locality", "postcode"]],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("state", "region_code", InsertOnly),
        col("locality", "text", InsertOnly),
        col("postcode", "text", InsertOnly),
        col("lat", "double precision", FillIfAbsent),
        col("lng", "double precision", FillIfAbsent),
    ],
};

pub const ACCOUNT_USERS: TableSpec = TableSpec {
    entity: EntityType::AccountUser,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("display_name", "text", AlwaysRefresh),
        col("role", "text", InsertOnly),
        col("deleted_at", "timestamptz", ClearOnUpsert),
    ],
};

pub const BUSINESSES: TableSpec = TableSpec {
    entity: EntityType::Business,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[&["abn"], &["acn"]],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("legal_name", "text", AlwaysRefresh),
        col("normalized_name", "text", AlwaysRefresh),
        col("abn", "text", FillIfAbsent),
        col("acn", "text", FillIfAbsent),
        col("primary_location_id", "uuid", FillIfAbsent),
        col("owner_user_id", "uuid", FillIfAbsent),
        col("deleted_at", "timestamptz", ClearOnUpsert),
    ],
};

pub const ADVISOR_PROFILES: TableSpec = TableSpec {
    entity: EntityType::AdvisorProfile,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("user_id", "uuid", AlwaysRefresh),
        col("business_id", "uuid", AlwaysRefresh),
        col("display_name", "text", AlwaysRefresh),
        col("bio", "text", AlwaysRefresh),
        col("deleted_at", "timestamptz", ClearOnUpsert),
    ],
};

/// `verification_level` is insert-only here; raising it goes through
/// [`render_promote_verification`].
pub const LISTINGS: TableSpec = TableSpec {
    entity: EntityType::Listing,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("advisor_id", "uuid", AlwaysRefresh),
        col("business_id", "uuid", AlwaysRefresh),
        col("location_id", "uuid", AlwaysRefresh),
        col("headline", "text", AlwaysRefresh),
        col("status", "text", AlwaysRefresh),
        col("verification_level", "verification_level", InsertOnly),
        col("source_dataset", "text", AlwaysRefresh),
        col("source_url", "text", AlwaysRefresh),
        col("deleted_at", "timestamptz", ClearOnUpsert),
    ],
};

pub const TRUST_DISCLOSURES: TableSpec = TableSpec {
    entity: EntityType::TrustDisclosure,
    conflict_columns: &["listing_id", "kind"],
    active_only: true,
    unique_keys: &[],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("listing_id", "uuid", InsertOnly),
        col("kind", "disclosure_kind", InsertOnly),
        col("title", "text", AlwaysRefresh),
        col("body", "text", AlwaysRefresh),
        col("is_active", "boolean", InsertOnly),
    ],
};

pub const CREDENTIALS: TableSpec = TableSpec {
    entity: EntityType::Credential,
    conflict_columns: &["id"],
    active_only: false,
    unique_keys: &[&["credential_type", "credential_number"]],
    columns: &[
        col("id", "uuid", InsertOnly),
        col("credential_type", "credential_kind", InsertOnly),
        col("credential_number", "text", InsertOnly),
        col("licensee_number", "text", AlwaysRefresh),
        col("business_id", "uuid", FillIfAbsent),
        col("listing_id", "uuid", AlwaysRefresh),
        col("deleted_at", "timestamptz", ClearOnUpsert),
    ],
};

/// A bindable column value. Nulls keep their type so the store can bind them.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uuid(Option<Uuid>),
    Text(Option<String>),
    Float(Option<f64>),
    Bool(Option<bool>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Uuid(v) => v.is_none(),
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Float(v) => v.is_none(),
            FieldValue::Bool(v) => v.is_none(),
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(v) => *v,
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(Some(value))
    }
}

impl From<Option<Uuid>> for FieldValue {
    fn from(value: Option<Uuid>) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(Some(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(Some(value))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(Some(value))
    }
}

/// Column values for one upsert, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRow {
    values: BTreeMap<&'static str, FieldValue>,
}

impl EntityRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<FieldValue>) -> Self {
        self.values.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    pub fn id(&self) -> Option<Uuid> {
        self.get("id").and_then(FieldValue::as_uuid)
    }

    /// Values in placeholder order. Unset columns bind as a typed null.
    pub fn bind_values(&self, spec: &TableSpec) -> Vec<FieldValue> {
        spec.bound_columns()
            .map(|c| {
                self.values
                    .get(c.name)
                    .cloned()
                    .unwrap_or(FieldValue::Text(None))
            })
            .collect()
    }
}

/// `INSERT ... ON CONFLICT ... DO UPDATE ... RETURNING id, inserted`.
///
/// `(xmax = 0)` is true only for a freshly inserted tuple.
pub fn render_upsert(spec: &TableSpec) -> String {
    let table = spec.table();
    let mut names = Vec::new();
    let mut values = Vec::new();
    let mut placeholder = 0;
    for column in spec.columns {
        names.push(column.name);
        if column.policy == ClearOnUpsert {
            values.push("NULL".to_string());
        } else {
            placeholder += 1;
            values.push(format!("${placeholder}::{}", column.sql_type));
        }
    }

    let mut assignments: Vec<String> = spec
        .columns
        .iter()
        .filter(|c| !spec.conflict_columns.contains(&c.name))
        .filter_map(|c| match c.policy {
            InsertOnly => None,
            FillIfAbsent => Some(format!("{0} = COALESCE({table}.{0}, EXCLUDED.{0})", c.name)),
            AlwaysRefresh => Some(format!("{0} = EXCLUDED.{0}", c.name)),
            ClearOnUpsert => Some(format!("{} = NULL", c.name)),
        })
        .collect();
    assignments.push("updated_at = now()".to_string());

    let predicate = if spec.active_only { " WHERE is_active" } else { "" };
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}){predicate} DO UPDATE SET {} RETURNING id, (xmax = 0) AS inserted",
        names.join(", "),
        values.join(", "),
        spec.conflict_columns.join(", "),
        assignments.join(", "),
    )
}

/// Raise a listing's verification level; never lowers it.
pub fn render_promote_verification() -> String {
    format!(
        "UPDATE {} SET verification_level = $2::verification_level, updated_at = now() \
         WHERE id = $1 AND verification_level < $2::verification_level",
        LISTINGS.table()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_upsert_fills_coordinates_only() {
        let sql = render_upsert(&LOCATIONS);
        assert!(sql.starts_with(
            "INSERT INTO locations (id, state, locality, postcode, lat, lng) VALUES ($1::uuid, $2::region_code, $3::text, $4::text, $5::double precision, $6::double precision)"
        ));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET lat = COALESCE(locations.lat, EXCLUDED.lat), lng = COALESCE(locations.lng, EXCLUDED.lng), updated_at = now()"));
        assert!(!sql.contains("state = "));
        assert!(sql.ends_with("RETURNING id, (xmax = 0) AS inserted"));
    }

    #[test]
    fn soft_delete_marker_is_cleared_not_bound() {
        let sql = render_upsert(&CREDENTIALS);
        assert!(sql.contains("deleted_at = NULL"));
        assert_eq!(sql.matches('$').count(), CREDENTIALS.bound_columns().count());
        assert!(sql.contains("VALUES ($1::uuid, $2::credential_kind, $3::text, $4::text, $5::uuid, $6::uuid, NULL)"));
    }

    #[test]
    fn disclosure_conflict_is_scoped_to_active_rows() {
        let sql = render_upsert(&TRUST_DISCLOSURES);
        assert!(sql.contains("ON CONFLICT (listing_id, kind) WHERE is_active DO UPDATE SET title = EXCLUDED.title, body = EXCLUDED.body"));
        assert!(!sql.contains("is_active = "));
    }

    #[test]
    fn verification_level_never_appears_in_listing_update() {
        let sql = render_upsert(&LISTINGS);
        let update = sql.split("DO UPDATE SET").nth(1).unwrap();
        assert!(!update.contains("verification_level"));
        assert!(render_promote_verification().contains("verification_level < $2::verification_level"));
    }

    #[test]
    fn conflict_targets_and_unique_keys_match_the_schema() {
        let schema = include_str!("../migrations/0001_entity_graph.sql");
        let specs = [
            LOCATIONS,
            ACCOUNT_USERS,
            BUSINESSES,
            ADVISOR_PROFILES,
            LISTINGS,
            TRUST_DISCLOSURES,
            CREDENTIALS,
        ];
        for spec in specs {
            let declared = |columns: &[&str]| {
                let columns = columns.join(", ");
                columns == "id"
                    || schema.contains(&format!("UNIQUE ({columns})"))
                    || schema.contains(&format!("ON {} ({columns})", spec.table()))
            };
            assert!(declared(spec.conflict_columns), "{} conflict target", spec.table());
            for key in spec.unique_keys {
                assert!(declared(key), "{} unique key {key:?}", spec.table());
            }
        }
        assert_eq!(TRUST_DISCLOSURES.conflict_columns, ["listing_id", "kind"]);
        assert!(schema.contains("ON trust_disclosures (listing_id, kind)"));
        assert!(schema.contains("businesses (abn) WHERE abn IS NOT NULL"));
        assert!(schema.contains("businesses (acn) WHERE acn IS NOT NULL"));
    }

    #[test]
    fn unset_columns_bind_as_null() {
        let row = EntityRow::new().set("id", Uuid::nil()).set("display_name", "Acme");
        let values = row.bind_values(&ACCOUNT_USERS);
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], FieldValue::Uuid(Some(Uuid::nil())));
        assert!(values[2].is_null());
    }
}

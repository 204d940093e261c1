//! Derived identities and display content for one validated record.

use std::collections::{BTreeMap, HashSet};

use ari_core::identity::{self, derive_id, EntityType};
use ari_core::normalize::normalize_name;
use ari_core::{EntityKind, VerificationLevel};
use uuid::Uuid;

use crate::input::ImportRecord;
use crate::store::ExistingDisclosure;

pub const DISCLOSURE_KIND: &str = "licence_authorisation";
pub const LISTING_STATUS: &str = "active";
pub const USER_ROLE: &str = "advisor";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPlan {
    pub location_key: String,
    pub business_key: String,
    pub credential_key: String,
    pub location_id: Uuid,
    pub business_id: Uuid,
    pub credential_id: Uuid,
    pub headline: String,
    pub verification_level: VerificationLevel,
}

impl RecordPlan {
    pub fn for_record(record: &ImportRecord) -> Self {
        let location_key = identity::location_key(record.state, &record.locality, &record.postcode);
        let registration = record.abn.as_deref().or(record.acn.as_deref());
        let business_key = identity::business_key(registration, &record.name, &location_key);
        let credential_key =
            identity::credential_key(record.credential_type.as_str(), &record.credential_number);

        Self {
            location_id: derive_id(EntityType::Location, &location_key),
            business_id: derive_id(EntityType::Business, &business_key),
            credential_id: derive_id(EntityType::Credential, &credential_key),
            headline: headline(record),
            verification_level: VerificationLevel::for_credential(record.credential_type),
            location_key,
            business_key,
            credential_key,
        }
    }
}

/// Ids owned by a business. Keyed on the business row id so a business
/// found through a natural key keeps its user, profile and listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessScopedIds {
    pub user_id: Uuid,
    pub advisor_id: Uuid,
    pub listing_id: Uuid,
}

impl BusinessScopedIds {
    pub fn for_business(business_id: Uuid) -> Self {
        let key = business_id.to_string();
        Self {
            user_id: derive_id(EntityType::AccountUser, &key),
            advisor_id: derive_id(EntityType::AdvisorProfile, &key),
            listing_id: derive_id(EntityType::Listing, &key),
        }
    }
}

/// Id of a listing's first disclosure.
pub fn disclosure_id(listing_id: Uuid) -> Uuid {
    disclosure_version_id(listing_id, 0)
}

pub fn disclosure_version_id(listing_id: Uuid, version: usize) -> Uuid {
    let key = match version {
        0 => format!("{listing_id}:{DISCLOSURE_KIND}"),
        n => format!("{listing_id}:{DISCLOSURE_KIND}:{n}"),
    };
    derive_id(EntityType::TrustDisclosure, &key)
}

/// The active disclosure's id, or else the lowest version id no stored row
/// holds. Deactivated rows keep their ids, so a replacement never reuses one.
pub fn next_disclosure_id(listing_id: Uuid, existing: &[ExistingDisclosure]) -> Uuid {
    if let Some(active) = existing.iter().find(|d| d.is_active) {
        return active.id;
    }
    let mut version = 0;
    loop {
        let id = disclosure_version_id(listing_id, version);
        if existing.iter().all(|d| d.id != id) {
            return id;
        }
        version += 1;
    }
}

pub fn headline(record: &ImportRecord) -> String {
    let role = match record.entity_kind {
        EntityKind::Representative => "representative",
        _ => "licensee",
    };
    format!("Credit {role} in {} {}", title_case(&record.locality), record.state)
}

pub fn normalized_business_name(record: &ImportRecord) -> String {
    normalize_name(&record.name)
}

pub fn advisor_bio(record: &ImportRecord) -> String {
    match (&record.licensee_number, record.entity_kind) {
        (Some(licence), EntityKind::Representative) => format!(
            "Authorised credit representative {} acting under Australian Credit Licence {licence}.",
            record.credential_number
        ),
        _ => format!("Holder of Australian Credit Licence {}.", record.credential_number),
    }
}

pub fn disclosure_title(record: &ImportRecord) -> String {
    format!("{} {}", record.credential_type.as_str().to_ascii_uppercase(), record.credential_number)
}

pub fn disclosure_body(record: &ImportRecord) -> String {
    let mut body = format!(
        "{} is listed on the public credit register as {} {}",
        record.name,
        match record.entity_kind {
            EntityKind::Representative => "credit representative",
            _ => "credit licensee",
        },
        record.credential_number
    );
    if let Some(licence) = &record.licensee_number {
        body.push_str(&format!(", authorised under licence {licence}"));
    }
    body.push_str(". Authorised to arrange credit without acting as the credit provider.");
    body
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct derived ids per entity table, as reported by a dry run.
pub fn unique_id_counts<'a>(records: impl IntoIterator<Item = &'a ImportRecord>) -> BTreeMap<&'static str, usize> {
    let mut seen: BTreeMap<&'static str, HashSet<Uuid>> =
        EntityType::ALL.iter().map(|e| (e.table(), HashSet::new())).collect();
    for record in records {
        let plan = RecordPlan::for_record(record);
        let scoped = BusinessScopedIds::for_business(plan.business_id);
        let ids = [
            (EntityType::Location, plan.location_id),
            (EntityType::AccountUser, scoped.user_id),
            (EntityType::Business, plan.business_id),
            (EntityType::AdvisorProfile, scoped.advisor_id),
            (EntityType::Listing, scoped.listing_id),
            (EntityType::TrustDisclosure, disclosure_id(scoped.listing_id)),
            (EntityType::Credential, plan.credential_id),
        ];
        for (entity, id) in ids {
            seen.entry(entity.table()).or_default().insert(id);
        }
    }
    seen.into_iter().map(|(table, ids)| (table, ids.len())).collect()
}

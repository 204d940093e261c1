//! Collapse register rows that describe the same real-world entity.

use std::collections::HashMap;

use ari_core::normalize::normalize_name;
use ari_core::CandidateRecord;

pub fn dedupe_key(record: &CandidateRecord) -> String {
    match record.registration_number() {
        Some(number) => format!("reg:{number}"),
        None => format!(
            "name:{}|postcode:{}|type:{}",
            normalize_name(&record.name),
            record.postcode,
            record.entity_kind.as_str()
        ),
    }
}

/// Keep one record per dedupe key.
///
/// Higher `EntityKind::dedupe_priority` wins; on a tie the later record wins.
/// Output keeps the order in which each key was first seen.
pub fn deduplicate(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<CandidateRecord> = Vec::new();

    for mut record in records {
        let key = dedupe_key(&record);
        record.dedupe_key = Some(key.clone());
        match slots.get(&key) {
            Some(&idx) => {
                if record.entity_kind.dedupe_priority() >= kept[idx].entity_kind.dedupe_priority() {
                    kept[idx] = record;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ari_core::{CredentialType, EntityKind, RegionCode};

    fn record(kind: EntityKind, name: &str, abn: Option<&str>, postcode: &str) -> CandidateRecord {
        CandidateRecord {
            source_dataset: "test".into(),
            entity_kind: kind,
            credential_type: match kind {
                EntityKind::Representative => CredentialType::Acr,
                _ => CredentialType::Acl,
            },
            credential_number: "1".into(),
            licensee_number: None,
            name: name.into(),
            abn: abn.map(Into::into),
            acn: None,
            authorisation: String::new(),
            locality: "RICHMOND".into(),
            state: RegionCode::Vic,
            postcode: postcode.into(),
            lat: None,
            lng: None,
            start_date: None,
            end_date: None,
            status: "Current".into(),
            dataset_url: String::new(),
            distance_km: None,
            city: None,
            dedupe_key: None,
        }
    }

    #[test]
    fn representative_beats_licensee_with_same_registration() {
        let licensee = record(EntityKind::Licensee, "Acme Finance Pty Ltd", Some("12345678901"), "3000");
        let rep = record(EntityKind::Representative, "Acme Finance", Some("12345678901"), "3121");
        let out = deduplicate(vec![rep.clone(), licensee]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_kind, EntityKind::Representative);
        assert_eq!(out[0].postcode, "3121");
        assert_eq!(out[0].dedupe_key.as_deref(), Some("reg:12345678901"));
    }

    #[test]
    fn ties_keep_most_recent() {
        let first = record(EntityKind::Licensee, "Acme", Some("12345678901"), "3000");
        let second = record(EntityKind::Licensee, "Acme Updated", Some("12345678901"), "3000");
        let out = deduplicate(vec![first, second]);
        assert_eq!(out[0].name, "Acme Updated");
    }

    #[test]
    fn unregistered_names_group_by_postcode_and_kind() {
        let a = record(EntityKind::Representative, "Jane  Citizen", None, "3121");
        let b = record(EntityKind::Representative, "JANE CITIZEN.", None, "3121");
        let c = record(EntityKind::Representative, "Jane Citizen", None, "3000");
        let d = record(EntityKind::Licensee, "Jane Citizen", None, "3121");
        let out = deduplicate(vec![a, b, c, d]);
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0].dedupe_key.as_deref(),
            Some("name:JANE CITIZEN|postcode:3121|type:representative")
        );
    }
}

//! Deterministic identifiers for the persisted entity graph.
//!
//! Ids are name-based UUIDs (v5: SHA-1 over namespace bytes + UTF-8 name,
//! version and variant bits overwritten). Each entity type has its own fixed
//! namespace so equal semantic keys never collide across tables.

use uuid::Uuid;

use crate::normalize::{normalize_locality, normalize_name};
use crate::RegionCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Location,
    AccountUser,
    Business,
    AdvisorProfile,
    Listing,
    TrustDisclosure,
    Credential,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Location,
        EntityType::AccountUser,
        EntityType::Business,
        EntityType::AdvisorProfile,
        EntityType::Listing,
        EntityType::TrustDisclosure,
        EntityType::Credential,
    ];

    pub fn namespace(self) -> Uuid {
        match self {
            EntityType::Location => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b01),
            EntityType::AccountUser => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b02),
            EntityType::Business => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b03),
            EntityType::AdvisorProfile => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b04),
            EntityType::Listing => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b05),
            EntityType::TrustDisclosure => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b06),
            EntityType::Credential => Uuid::from_u128(0x6f1c2a8e_4b7d_4e0a_9c3f_1d2e3f4a5b07),
        }
    }

    /// Prefix of the semantic name hashed under this type's namespace.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityType::Location => "location",
            EntityType::AccountUser => "user",
            EntityType::Business => "business",
            EntityType::AdvisorProfile => "advisor",
            EntityType::Listing => "listing",
            EntityType::TrustDisclosure => "disclosure",
            EntityType::Credential => "credential",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            EntityType::Location => "locations",
            EntityType::AccountUser => "account_users",
            EntityType::Business => "businesses",
            EntityType::AdvisorProfile => "advisor_profiles",
            EntityType::Listing => "listings",
            EntityType::TrustDisclosure => "trust_disclosures",
            EntityType::Credential => "credentials",
        }
    }
}

pub fn derive_id(entity: EntityType, key: &str) -> Uuid {
    let name = format!("{}:{}", entity.prefix(), key);
    Uuid::new_v5(&entity.namespace(), name.as_bytes())
}

pub fn location_key(state: RegionCode, locality: &str, postcode: &str) -> String {
    format!("{}|{}|{}", state.as_str(), normalize_locality(locality), postcode.trim())
}

/// Registration number when known, else normalized name scoped to a location.
pub fn business_key(registration_number: Option<&str>, name: &str, location_key: &str) -> String {
    match registration_number {
        Some(number) if !number.trim().is_empty() => number.trim().to_string(),
        _ => format!("name:{}|{}", normalize_name(name), location_key),
    }
}

pub fn credential_key(credential_type: &str, credential_number: &str) -> String {
    format!("{}:{}", credential_type.trim().to_ascii_lowercase(), credential_number.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_stable() {
        let a = derive_id(EntityType::Business, "12345678901");
        let b = derive_id(EntityType::Business, "12345678901");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn derived_ids_differ_by_key_and_type() {
        let business = derive_id(EntityType::Business, "12345678901");
        assert_ne!(business, derive_id(EntityType::Business, "12345678902"));
        assert_ne!(business, derive_id(EntityType::Listing, "12345678901"));
    }

    #[test]
    fn derived_ids_match_plain_v5_over_prefixed_name() {
        let expected = Uuid::new_v5(&EntityType::Credential.namespace(), b"credential:acl:123456");
        assert_eq!(derive_id(EntityType::Credential, "acl:123456"), expected);
    }

    #[test]
    fn business_key_falls_back_to_name_and_location() {
        let loc = location_key(RegionCode::Vic, " richmond ", "3121");
        assert_eq!(loc, "VIC|RICHMOND|3121");
        assert_eq!(business_key(Some("12345678901"), "Acme", &loc), "12345678901");
        assert_eq!(
            business_key(None, "Acme Finance Pty. Ltd.", &loc),
            "name:ACME FINANCE PTY LTD|VIC|RICHMOND|3121"
        );
        assert_eq!(business_key(Some(" "), "Acme", &loc), "name:ACME|VIC|RICHMOND|3121");
    }

    #[test]
    fn namespaces_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for entity in EntityType::ALL {
            assert!(seen.insert(entity.namespace()));
        }
    }
}

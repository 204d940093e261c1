//! Core domain model for ARI: candidate records, register enums, normalization,
//! geo math and deterministic identity derivation.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod geo;
pub mod identity;
pub mod normalize;

pub const CRATE_NAME: &str = "ari-core";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised {kind} value `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Which side of a licence a register row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Licensee,
    Representative,
    Other,
}

impl EntityKind {
    /// Dedupe priority: representatives carry the most specific contact data.
    pub fn dedupe_priority(self) -> u8 {
        match self {
            EntityKind::Representative => 3,
            EntityKind::Licensee => 2,
            EntityKind::Other => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Licensee => "licensee",
            EntityKind::Representative => "representative",
            EntityKind::Other => "other",
        }
    }
}

impl FromStr for EntityKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "licensee" => Ok(EntityKind::Licensee),
            "representative" => Ok(EntityKind::Representative),
            "other" => Ok(EntityKind::Other),
            _ => Err(ParseEnumError::new("entity kind", s)),
        }
    }
}

/// Credential kinds accepted at the database boundary (`credential_kind` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// Australian credit licence.
    Acl,
    /// Authorised credit representative.
    Acr,
}

impl CredentialType {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::Acl => "acl",
            CredentialType::Acr => "acr",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acl" => Ok(CredentialType::Acl),
            "acr" => Ok(CredentialType::Acr),
            _ => Err(ParseEnumError::new("credential type", s)),
        }
    }
}

/// Australian state/territory codes (`region_code` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionCode {
    Act,
    Nsw,
    Nt,
    Qld,
    Sa,
    Tas,
    Vic,
    Wa,
}

impl RegionCode {
    pub const ALL: [RegionCode; 8] = [
        RegionCode::Act,
        RegionCode::Nsw,
        RegionCode::Nt,
        RegionCode::Qld,
        RegionCode::Sa,
        RegionCode::Tas,
        RegionCode::Vic,
        RegionCode::Wa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RegionCode::Act => "ACT",
            RegionCode::Nsw => "NSW",
            RegionCode::Nt => "NT",
            RegionCode::Qld => "QLD",
            RegionCode::Sa => "SA",
            RegionCode::Tas => "TAS",
            RegionCode::Vic => "VIC",
            RegionCode::Wa => "WA",
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionCode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize::parse_state(s).ok_or_else(|| ParseEnumError::new("region code", s))
    }
}

/// Listing verification strength. Declaration order is the promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    Unverified,
    RegistryMatched,
    LicenceVerified,
    Enhanced,
}

impl VerificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationLevel::Unverified => "unverified",
            VerificationLevel::RegistryMatched => "registry_matched",
            VerificationLevel::LicenceVerified => "licence_verified",
            VerificationLevel::Enhanced => "enhanced",
        }
    }

    pub fn for_credential(credential_type: CredentialType) -> Self {
        match credential_type {
            CredentialType::Acl => VerificationLevel::LicenceVerified,
            CredentialType::Acr => VerificationLevel::RegistryMatched,
        }
    }
}

impl FromStr for VerificationLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unverified" => Ok(VerificationLevel::Unverified),
            "registry_matched" => Ok(VerificationLevel::RegistryMatched),
            "licence_verified" => Ok(VerificationLevel::LicenceVerified),
            "enhanced" => Ok(VerificationLevel::Enhanced),
            _ => Err(ParseEnumError::new("verification level", s)),
        }
    }
}

/// Registration number kinds, chosen by digit length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationKind {
    Abn,
    Acn,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationNumber {
    pub kind: RegistrationKind,
    pub digits: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One normalized register entry, produced by stage 1 and consumed by stage 2.
///
/// Serializes flat so it can be written to and read back from the
/// intermediate candidate CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub source_dataset: String,
    pub entity_kind: EntityKind,
    pub credential_type: CredentialType,
    pub credential_number: String,
    pub licensee_number: Option<String>,
    pub name: String,
    pub abn: Option<String>,
    pub acn: Option<String>,
    pub authorisation: String,
    pub locality: String,
    pub state: RegionCode,
    pub postcode: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub dataset_url: String,
    pub distance_km: Option<f64>,
    pub city: Option<String>,
    pub dedupe_key: Option<String>,
}

impl CandidateRecord {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    /// ABN wins over ACN when both are known.
    pub fn registration_number(&self) -> Option<&str> {
        self.abn.as_deref().or(self.acn.as_deref())
    }

    pub fn is_current_on(&self, day: NaiveDate) -> bool {
        normalize::is_current(self.end_date, day)
    }

    pub fn location_key(&self) -> String {
        identity::location_key(self.state, &self.locality, &self.postcode)
    }

    pub fn business_key(&self) -> String {
        identity::business_key(
            self.registration_number(),
            &self.name,
            &self.location_key(),
        )
    }
}

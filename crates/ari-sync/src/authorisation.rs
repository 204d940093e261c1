//! Decides whether an entity may arrange credit as an intermediary.
//!
//! Representatives often do not restate their authorisations and point at
//! their licensee instead ("Same as Registrant", or a bare licence number),
//! so resolution may take a second hop through the licensee register.

use std::collections::HashMap;
use std::sync::OnceLock;

use ari_core::{CandidateRecord, EntityKind};
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorisationOutcome {
    Intermediary,
    NotIntermediary,
    /// Text deferred to a licensee that is not in the register.
    LicenseeMissing,
    /// Text present but in no phrasing we recognise.
    Unrecognised,
}

impl AuthorisationOutcome {
    pub fn is_intermediary(self) -> bool {
        self == AuthorisationOutcome::Intermediary
    }

    pub fn is_unresolved(self) -> bool {
        matches!(
            self,
            AuthorisationOutcome::LicenseeMissing | AuthorisationOutcome::Unrecognised
        )
    }
}

fn intermediary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\bwhere\s+(?:\w+\s+){0,3}(?:is|are)\s+not\s+or\s+will\s+not\s+be\s+the\s+(?:\w+\s+){0,2}(?:provider|lessor)\b",
        )
        .expect("intermediary pattern is valid")
    })
}

/// Phrasings that describe a non-intermediary authorisation.
const KNOWN_PHRASES: [&str; 4] = ["credit provider", "lessor", "credit activit", "credit service"];

pub fn matches_intermediary_pattern(text: &str) -> bool {
    intermediary_pattern().is_match(text)
}

fn defers_to_registrant(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    lower.contains("same as registrant")
        || lower.contains("different to registrant")
        || is_numeric_reference(&lower)
}

fn is_numeric_reference(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
}

/// Licence number → that licensee's authorisation text.
#[derive(Debug, Default, Clone)]
pub struct LicenseeAuthorisations {
    by_number: HashMap<String, String>,
}

impl LicenseeAuthorisations {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a CandidateRecord>) -> Self {
        let by_number = records
            .into_iter()
            .filter(|r| r.entity_kind == EntityKind::Licensee)
            .map(|r| (r.credential_number.trim().to_string(), r.authorisation.clone()))
            .collect();
        Self { by_number }
    }

    pub fn insert(&mut self, licence_number: &str, text: &str) {
        self.by_number
            .insert(licence_number.trim().to_string(), text.to_string());
    }

    pub fn get(&self, licence_number: &str) -> Option<&str> {
        self.by_number.get(licence_number.trim()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

pub fn resolve_text(
    text: &str,
    licensee_number: Option<&str>,
    licensees: &LicenseeAuthorisations,
) -> AuthorisationOutcome {
    if matches_intermediary_pattern(text) {
        return AuthorisationOutcome::Intermediary;
    }

    if defers_to_registrant(text) {
        let numeric = text.trim();
        let linked = is_numeric_reference(numeric)
            .then(|| licensees.get(numeric))
            .flatten()
            .or_else(|| licensee_number.and_then(|n| licensees.get(n)));
        return match linked {
            Some(linked) if matches_intermediary_pattern(linked) => AuthorisationOutcome::Intermediary,
            Some(_) => AuthorisationOutcome::NotIntermediary,
            None => AuthorisationOutcome::LicenseeMissing,
        };
    }

    let lower = text.to_ascii_lowercase();
    if lower.contains("intermediary") {
        return AuthorisationOutcome::Intermediary;
    }
    if lower.trim().is_empty() || KNOWN_PHRASES.iter().any(|p| lower.contains(p)) {
        AuthorisationOutcome::NotIntermediary
    } else {
        AuthorisationOutcome::Unrecognised
    }
}

pub fn resolve(record: &CandidateRecord, licensees: &LicenseeAuthorisations) -> AuthorisationOutcome {
    resolve_text(&record.authorisation, record.licensee_number.as_deref(), licensees)
}

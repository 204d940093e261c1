//! Register rows → candidate records.
//!
//! Rows missing a credential number, a name or a recognisable state are
//! dropped here and only show up as a lower count downstream.

use ari_core::normalize::{
    clean_text, non_empty, normalize_locality, normalize_postcode, parse_coordinate, parse_date,
    parse_state, registration_numbers,
};
use ari_core::{CandidateRecord, CredentialType, EntityKind};

use crate::registry::SourceConfig;
use crate::tabular::TabularRow;

/// Column names of the licensee register export.
pub mod licensee_columns {
    pub const NUMBER: &str = "CRED_LIC_NUM";
    pub const NAME: &str = "CRED_LIC_NAME";
    pub const START: &str = "CRED_LIC_START_DT";
    pub const END: &str = "CRED_LIC_END_DT";
    pub const STATUS: &str = "CRED_LIC_STATUS";
    pub const ABN_ACN: &str = "CRED_LIC_ABN_ACN";
    pub const LOCALITY: &str = "CRED_LIC_LOCALITY";
    pub const STATE: &str = "CRED_LIC_STATE";
    pub const POSTCODE: &str = "CRED_LIC_PCODE";
    pub const LAT: &str = "CRED_LIC_LAT";
    pub const LNG: &str = "CRED_LIC_LNG";
    pub const AUTHORISATIONS: &str = "CRED_LIC_AUTHORISATIONS";
}

/// Column names of the representative register export.
pub mod representative_columns {
    pub const NUMBER: &str = "CRED_REP_NUM";
    pub const LICENSEE_NUMBER: &str = "CRED_LIC_NUM";
    pub const NAME: &str = "CRED_REP_NAME";
    pub const ABN: &str = "CRED_REP_ABN";
    pub const ACN: &str = "CRED_REP_ACN";
    pub const START: &str = "CRED_REP_START_DT";
    pub const END: &str = "CRED_REP_END_DT";
    pub const LOCALITY: &str = "CRED_REP_LOCALITY";
    pub const STATE: &str = "CRED_REP_STATE";
    pub const POSTCODE: &str = "CRED_REP_PCODE";
    pub const AUTHORISATIONS: &str = "CRED_REP_AUTHORISATIONS";
}

pub fn licensee_row_to_candidate(row: &TabularRow, source_id: &str, dataset_url: &str) -> Option<CandidateRecord> {
    use licensee_columns as c;

    let credential_number = non_empty(row.get(c::NUMBER))?;
    let name = non_empty(row.get(c::NAME))?;
    let state = parse_state(row.get(c::STATE))?;
    let (abn, acn) = registration_numbers([row.get(c::ABN_ACN)]);

    Some(CandidateRecord {
        source_dataset: source_id.to_string(),
        entity_kind: EntityKind::Licensee,
        credential_type: CredentialType::Acl,
        credential_number,
        licensee_number: None,
        name,
        abn,
        acn,
        authorisation: clean_text(row.get(c::AUTHORISATIONS)),
        locality: normalize_locality(row.get(c::LOCALITY)),
        state,
        postcode: normalize_postcode(row.get(c::POSTCODE)),
        lat: parse_coordinate(row.get(c::LAT)),
        lng: parse_coordinate(row.get(c::LNG)),
        start_date: parse_date(row.get(c::START)),
        end_date: parse_date(row.get(c::END)),
        status: clean_text(row.get(c::STATUS)),
        dataset_url: dataset_url.to_string(),
        distance_km: None,
        city: None,
        dedupe_key: None,
    })
}

pub fn representative_row_to_candidate(
    row: &TabularRow,
    source_id: &str,
    dataset_url: &str,
) -> Option<CandidateRecord> {
    use representative_columns as c;

    let credential_number = non_empty(row.get(c::NUMBER))?;
    let name = non_empty(row.get(c::NAME))?;
    let state = parse_state(row.get(c::STATE))?;
    let (abn, acn) = registration_numbers([row.get(c::ABN), row.get(c::ACN)]);

    Some(CandidateRecord {
        source_dataset: source_id.to_string(),
        entity_kind: EntityKind::Representative,
        credential_type: CredentialType::Acr,
        credential_number,
        licensee_number: non_empty(row.get(c::LICENSEE_NUMBER)),
        name,
        abn,
        acn,
        authorisation: clean_text(row.get(c::AUTHORISATIONS)),
        locality: normalize_locality(row.get(c::LOCALITY)),
        state,
        postcode: normalize_postcode(row.get(c::POSTCODE)),
        lat: None,
        lng: None,
        start_date: parse_date(row.get(c::START)),
        end_date: parse_date(row.get(c::END)),
        status: String::from("current"),
        dataset_url: dataset_url.to_string(),
        distance_km: None,
        city: None,
        dedupe_key: None,
    })
}

pub fn rows_to_candidates(source: &SourceConfig, rows: &[TabularRow], dataset_url: &str) -> Vec<CandidateRecord> {
    rows.iter()
        .filter_map(|row| match source.entity_kind {
            EntityKind::Licensee => licensee_row_to_candidate(row, &source.source_id, dataset_url),
            EntityKind::Representative => {
                representative_row_to_candidate(row, &source.source_id, dataset_url)
            }
            EntityKind::Other => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::{parse_delimited, Delimiter};
    use ari_core::RegionCode;
    use chrono::NaiveDate;

    const LICENSEES: &str = "CRED_LIC_NUM\tCRED_LIC_NAME\tCRED_LIC_START_DT\tCRED_LIC_END_DT\tCRED_LIC_STATUS\tCRED_LIC_ABN_ACN\tCRED_LIC_LOCALITY\tCRED_LIC_STATE\tCRED_LIC_PCODE\tCRED_LIC_LAT\tCRED_LIC_LNG\tCRED_LIC_AUTHORISATIONS\n\
123456\tAcme  Finance Pty Ltd\t1/7/2010\t\tCurrent\t12 345 678 901\tRichmond\tVIC\t3121\t-37.8183\t144.9980\tEngage in credit activities other than as a credit provider\n\
\tNo Number Pty Ltd\t1/7/2010\t\tCurrent\t\tRichmond\tVIC\t3121\t\t\t\n\
654321\tOffshore Ltd\t1/7/2010\t\tCurrent\t\tAuckland\tNZ\t1010\t\t\t\n";

    #[test]
    fn licensee_rows_map_and_invalid_rows_drop() {
        let rows = parse_delimited(LICENSEES, Delimiter::Tab, false).unwrap();
        assert_eq!(rows.len(), 3);
        let out: Vec<_> = rows
            .iter()
            .filter_map(|r| licensee_row_to_candidate(r, "credit-licensees", "https://x/lic.tsv"))
            .collect();
        assert_eq!(out.len(), 1);
        let rec = &out[0];
        assert_eq!(rec.name, "Acme Finance Pty Ltd");
        assert_eq!(rec.abn.as_deref(), Some("12345678901"));
        assert_eq!(rec.acn, None);
        assert_eq!(rec.state, RegionCode::Vic);
        assert_eq!(rec.locality, "RICHMOND");
        assert_eq!(rec.start_date, NaiveDate::from_ymd_opt(2010, 7, 1));
        assert_eq!(rec.end_date, None);
        assert!(rec.coordinates().is_some());
        assert_eq!(rec.credential_type, CredentialType::Acl);
    }

    #[test]
    fn representative_rows_keep_licensee_link() {
        let text = "CRED_REP_NUM\tCRED_LIC_NUM\tCRED_REP_NAME\tCRED_REP_ABN\tCRED_REP_ACN\tCRED_REP_START_DT\tCRED_REP_END_DT\tCRED_REP_LOCALITY\tCRED_REP_STATE\tCRED_REP_PCODE\tCRED_REP_AUTHORISATIONS\n\
500100\t123456\tJane Citizen\t\t987654321\t2/3/2015\t\tHawthorn\tVictoria\t3122\tSame as Registrant\n";
        let rows = parse_delimited(text, Delimiter::Tab, false).unwrap();
        let rec = representative_row_to_candidate(&rows[0], "credit-representatives", "u").unwrap();
        assert_eq!(rec.licensee_number.as_deref(), Some("123456"));
        assert_eq!(rec.acn.as_deref(), Some("987654321"));
        assert_eq!(rec.registration_number(), Some("987654321"));
        assert_eq!(rec.state, RegionCode::Vic);
        assert_eq!(rec.entity_kind, EntityKind::Representative);
        assert_eq!(rec.authorisation, "Same as Registrant");
    }
}

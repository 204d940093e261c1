//! Free-text cleanup for register fields.
//!
//! `normalize_name` output is only ever used to build keys; display values go
//! through `clean_text`, which preserves case and punctuation.

use chrono::NaiveDate;

use crate::{RegionCode, RegistrationKind, RegistrationNumber};

/// Uppercase, drop everything outside `[A-Z0-9]` and whitespace, collapse runs of whitespace.
pub fn normalize_name(input: &str) -> String {
    input
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim and collapse internal whitespace, leaving the text otherwise intact.
pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_empty(input: &str) -> Option<String> {
    let cleaned = clean_text(input);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn normalize_locality(input: &str) -> String {
    clean_text(input).to_uppercase()
}

/// Postcodes lose their leading zero in some exports (`800` for Darwin).
pub fn normalize_postcode(input: &str) -> String {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 3 {
        format!("0{digits}")
    } else {
        digits
    }
}

pub fn parse_state(input: &str) -> Option<RegionCode> {
    let key = input
        .trim()
        .to_ascii_uppercase()
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let code = match key.as_str() {
        "ACT" | "AUSTRALIAN CAPITAL TERRITORY" => RegionCode::Act,
        "NSW" | "NEW SOUTH WALES" => RegionCode::Nsw,
        "NT" | "NORTHERN TERRITORY" => RegionCode::Nt,
        "QLD" | "QUEENSLAND" => RegionCode::Qld,
        "SA" | "SOUTH AUSTRALIA" => RegionCode::Sa,
        "TAS" | "TASMANIA" => RegionCode::Tas,
        "VIC" | "VICTORIA" => RegionCode::Vic,
        "WA" | "WESTERN AUSTRALIA" => RegionCode::Wa,
        _ => return None,
    };
    Some(code)
}

/// Parse `d/m/yyyy`. Anything else, including empty input, is "no date".
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parts = trimmed.split('/');
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let year_text = parts.next()?.trim();
    if parts.next().is_some() || year_text.len() != 4 {
        return None;
    }
    let year = year_text.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A missing end date means the entry is still current.
pub fn is_current(end_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    match end_date {
        Some(end) => end >= today,
        None => true,
    }
}

/// Strip non-digits and classify by length: 11 digits is an ABN, 9 an ACN.
pub fn split_registration_number(raw: &str) -> Option<RegistrationNumber> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let kind = match digits.len() {
        11 => RegistrationKind::Abn,
        9 => RegistrationKind::Acn,
        _ => return None,
    };
    Some(RegistrationNumber { kind, digits })
}

/// Returns `(abn, acn)` from any number of loosely formatted registration fields.
pub fn registration_numbers<'a>(
    raw_values: impl IntoIterator<Item = &'a str>,
) -> (Option<String>, Option<String>) {
    let mut abn = None;
    let mut acn = None;
    for raw in raw_values {
        match split_registration_number(raw) {
            Some(RegistrationNumber {
                kind: RegistrationKind::Abn,
                digits,
            }) if abn.is_none() => abn = Some(digits),
            Some(RegistrationNumber {
                kind: RegistrationKind::Acn,
                digits,
            }) if acn.is_none() => acn = Some(digits),
            _ => {}
        }
    }
    (abn, acn)
}

pub fn parse_coordinate(input: &str) -> Option<f64> {
    let value = input.trim().parse::<f64>().ok()?;
    if value.is_finite() && value != 0.0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_uppercased_and_stripped() {
        assert_eq!(normalize_name("  Acme  Finance Pty. Ltd. "), "ACME FINANCE PTY LTD");
        assert_eq!(normalize_name("O'Brien & Co\tLending"), "OBRIEN CO LENDING");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn dates_parse_day_month_year() {
        assert_eq!(parse_date("1/7/2010"), NaiveDate::from_ymd_opt(2010, 7, 1));
        assert_eq!(parse_date(" 31/12/2024 "), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024-01-01"), None);
        assert_eq!(parse_date("31/02/2024"), None);
        assert_eq!(parse_date("1/1/24"), None);
    }

    #[test]
    fn missing_end_date_counts_as_current() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert!(is_current(None, today));
        assert!(is_current(Some(today), today));
        assert!(!is_current(NaiveDate::from_ymd_opt(2026, 10, 17), today));
    }

    #[test]
    fn registration_numbers_classify_by_length() {
        let abn = split_registration_number("12 345 678 901").unwrap();
        assert_eq!(abn.kind, RegistrationKind::Abn);
        assert_eq!(abn.digits, "12345678901");

        let acn = split_registration_number("123-456-789").unwrap();
        assert_eq!(acn.kind, RegistrationKind::Acn);

        assert!(split_registration_number("1234567890").is_none());
        assert!(split_registration_number("").is_none());
    }

    #[test]
    fn registration_pair_takes_first_of_each_kind() {
        let (abn, acn) = registration_numbers(["", "123456789", "12345678901", "99999999999"]);
        assert_eq!(abn.as_deref(), Some("12345678901"));
        assert_eq!(acn.as_deref(), Some("123456789"));
    }

    #[test]
    fn states_accept_codes_and_full_names() {
        assert_eq!(parse_state("vic"), Some(RegionCode::Vic));
        assert_eq!(parse_state("New South Wales"), Some(RegionCode::Nsw));
        assert_eq!(parse_state("N.T."), Some(RegionCode::Nt));
        assert_eq!(parse_state("Overseas"), None);
    }

    #[test]
    fn postcodes_keep_leading_zero() {
        assert_eq!(normalize_postcode("800"), "0800");
        assert_eq!(normalize_postcode(" 3121 "), "3121");
    }
}

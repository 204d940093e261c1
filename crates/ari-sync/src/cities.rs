//! Fixed registry of cities a discovery run can be scoped to.

use ari_core::{Coordinates, RegionCode};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub slug: &'static str,
    pub name: &'static str,
    pub state: RegionCode,
    pub centre: Coordinates,
}

const fn city(slug: &'static str, name: &'static str, state: RegionCode, lat: f64, lng: f64) -> City {
    City {
        slug,
        name,
        state,
        centre: Coordinates { lat, lng },
    }
}

pub const CITIES: &[City] = &[
    city("adelaide", "Adelaide", RegionCode::Sa, -34.9285, 138.6007),
    city("brisbane", "Brisbane", RegionCode::Qld, -27.4698, 153.0251),
    city("canberra", "Canberra", RegionCode::Act, -35.2809, 149.1300),
    city("darwin", "Darwin", RegionCode::Nt, -12.4634, 130.8456),
    city("geelong", "Geelong", RegionCode::Vic, -38.1499, 144.3617),
    city("gold-coast", "Gold Coast", RegionCode::Qld, -28.0167, 153.4000),
    city("hobart", "Hobart", RegionCode::Tas, -42.8821, 147.3272),
    city("melbourne", "Melbourne", RegionCode::Vic, -37.8136, 144.9631),
    city("newcastle", "Newcastle", RegionCode::Nsw, -32.9283, 151.7817),
    city("perth", "Perth", RegionCode::Wa, -31.9505, 115.8605),
    city("sydney", "Sydney", RegionCode::Nsw, -33.8688, 151.2093),
];

pub const DEFAULT_CITIES: &str = "melbourne";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CityListError {
    #[error("unknown city `{0}` (known: {known})", known = known_slugs())]
    Unknown(String),
    #[error("no cities given")]
    Empty,
}

fn known_slugs() -> String {
    CITIES.iter().map(|c| c.slug).collect::<Vec<_>>().join(", ")
}

pub fn find_city(name: &str) -> Option<&'static City> {
    let slug = name.trim().to_ascii_lowercase().replace([' ', '_'], "-");
    CITIES.iter().find(|c| c.slug == slug)
}

/// Parse a comma-separated city list, dropping repeats.
pub fn parse_city_list(list: &str) -> Result<Vec<&'static City>, CityListError> {
    let mut out: Vec<&'static City> = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let city = find_city(part).ok_or_else(|| CityListError::Unknown(part.to_string()))?;
        if !out.iter().any(|c| c.slug == city.slug) {
            out.push(city);
        }
    }
    if out.is_empty() {
        return Err(CityListError::Empty);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_lists_parse_case_insensitively() {
        let cities = parse_city_list("Melbourne, gold coast,melbourne").unwrap();
        let slugs: Vec<_> = cities.iter().map(|c| c.slug).collect();
        assert_eq!(slugs, vec!["melbourne", "gold-coast"]);
    }

    #[test]
    fn unknown_or_empty_lists_are_rejected() {
        assert_eq!(
            parse_city_list("melbourne,atlantis"),
            Err(CityListError::Unknown("atlantis".to_string()))
        );
        assert_eq!(parse_city_list(" , "), Err(CityListError::Empty));
    }
}

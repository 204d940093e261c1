//! Postcode centroid lookup used to give representatives coordinates.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use ari_core::normalize::{normalize_locality, normalize_postcode, parse_state};
use ari_core::{CandidateRecord, Coordinates, RegionCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GazetteerRow {
    postcode: String,
    locality: String,
    state: String,
    lat: f64,
    lng: f64,
}

#[derive(Debug, Default, Clone)]
pub struct PostcodeGazetteer {
    entries: HashMap<(RegionCode, String), Vec<(String, Coordinates)>>,
}

impl PostcodeGazetteer {
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut gazetteer = Self::default();
        for (idx, row) in reader.deserialize::<GazetteerRow>().enumerate() {
            let row = row.with_context(|| format!("gazetteer row {}", idx + 2))?;
            let Some(state) = parse_state(&row.state) else {
                continue;
            };
            gazetteer
                .entries
                .entry((state, normalize_postcode(&row.postcode)))
                .or_default()
                .push((
                    normalize_locality(&row.locality),
                    Coordinates {
                        lat: row.lat,
                        lng: row.lng,
                    },
                ));
        }
        Ok(gazetteer)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("reading {}", path.display()))
    }

    /// Exact locality match first, else the first locality sharing the postcode.
    pub fn lookup(&self, state: RegionCode, postcode: &str, locality: &str) -> Option<Coordinates> {
        let candidates = self.entries.get(&(state, postcode.to_string()))?;
        let locality = normalize_locality(locality);
        candidates
            .iter()
            .find(|(name, _)| *name == locality)
            .or_else(|| candidates.first())
            .map(|(_, coords)| *coords)
    }

    /// Fill coordinates on records that have none. Returns how many were filled.
    pub fn backfill(&self, records: &mut [CandidateRecord]) -> usize {
        let mut filled = 0;
        for record in records.iter_mut().filter(|r| r.coordinates().is_none()) {
            if let Some(coords) = self.lookup(record.state, &record.postcode, &record.locality) {
                record.lat = Some(coords.lat);
                record.lng = Some(coords.lng);
                filled += 1;
            }
        }
        filled
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "postcode,locality,state,lat,lng\n\
3121,Cremorne,VIC,-37.8290,144.9930\n\
3121,Richmond,VIC,-37.8183,144.9980\n\
800,Darwin,NT,-12.4634,130.8456\n";

    #[test]
    fn lookup_prefers_exact_locality() {
        let g = PostcodeGazetteer::from_reader(SAMPLE.as_bytes()).unwrap();
        let c = g.lookup(RegionCode::Vic, "3121", "richmond").unwrap();
        assert_eq!(c.lat, -37.8183);
        let c = g.lookup(RegionCode::Vic, "3121", "Burnley").unwrap();
        assert_eq!(c.lat, -37.8290);
        assert!(g.lookup(RegionCode::Nsw, "3121", "Richmond").is_none());
        assert!(g.lookup(RegionCode::Nt, "0800", "Darwin").is_some());
    }
}

//! Place-name geocoding over a static gazetteer.
//!
//! Roughly 300 Ghana city and region centroids, resolved in three stages:
//!
//! 1. exact match on the normalized name,
//! 2. word-boundary match over keys sorted shortest-first, so a short query
//!    like "wa" resolves to the city of Wa and never to "nkawkaw",
//! 3. fuzzy match (normalized Levenshtein >= 0.80) to absorb misspellings
//!    like "Kumase" -> "Kumasi".
//!
//! Every stage can fail; callers get `None` and must handle it explicitly.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::extract::contains_word;

/// Minimum normalized-Levenshtein similarity for a fuzzy hit.
const FUZZY_THRESHOLD: f64 = 0.80;

static GAZETTEER_JSON: &str = include_str!("../data/gazetteer.json");

#[derive(Debug, Deserialize)]
struct GazetteerFile {
    cities: HashMap<String, (f64, f64)>,
    regions: HashMap<String, (f64, f64)>,
}

/// Static gazetteer of Ghana place names.
#[derive(Debug)]
pub struct Gazetteer {
    /// Normalized key -> centroid; cities and regions merged, cities first.
    entries: HashMap<String, (f64, f64)>,
    /// Keys sorted shortest-first for the word-boundary stage.
    keys_by_len: Vec<String>,
    /// Region-only view for region centroid lookups.
    regions: HashMap<String, (f64, f64)>,
}

static GAZETTEER: Lazy<Gazetteer> = Lazy::new(|| {
    Gazetteer::from_json(GAZETTEER_JSON).expect("bundled gazetteer.json is valid")
});

impl Gazetteer {
    /// The process-wide gazetteer parsed from the bundled data file.
    pub fn shared() -> &'static Gazetteer {
        &GAZETTEER
    }

    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: GazetteerFile = serde_json::from_str(json)?;
        let mut entries = HashMap::new();
        let mut regions = HashMap::new();
        // Region entries first so a city spelling overrides a region alias
        // of the same name.
        for (key, coords) in &file.regions {
            let norm = normalize(key);
            entries.insert(norm.clone(), *coords);
            regions.insert(norm, *coords);
        }
        for (key, coords) in &file.cities {
            entries.insert(normalize(key), *coords);
        }
        let mut keys_by_len: Vec<String> = entries.keys().cloned().collect();
        keys_by_len.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        Ok(Self {
            entries,
            keys_by_len,
            regions,
        })
    }

    /// Resolve a place name to (lat, lng).
    pub fn geocode(&self, name: &str) -> Option<(f64, f64)> {
        let query = normalize(name);
        if query.is_empty() {
            return None;
        }

        // Stage 1: exact.
        if let Some(&coords) = self.entries.get(&query) {
            return Some(coords);
        }

        // Stage 2: the query appears as a whole word inside a key; shortest
        // key wins so the most specific name is preferred.
        for key in &self.keys_by_len {
            if contains_word(key, &query) {
                return Some(self.entries[key]);
            }
        }

        // Stage 3: fuzzy.
        let mut best: Option<(&str, f64)> = None;
        for key in self.entries.keys() {
            let score = strsim::normalized_levenshtein(&query, key);
            if score >= FUZZY_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }
        best.map(|(key, _)| self.entries[key])
    }

    /// Centroid of a region by name, exact (normalized) match only.
    pub fn region_centroid(&self, region: &str) -> Option<(f64, f64)> {
        let norm = normalize(region);
        self.regions
            .get(&norm)
            .or_else(|| self.regions.get(&format!("{norm} region")))
            .copied()
    }
}

/// Lowercase, collapse whitespace and hyphens, strip punctuation, expand the
/// common "gt." abbreviation.
fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace("gt.", "greater");
    let mut out = String::with_capacity(lowered.len());
    let mut last_space = true;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup() {
        let g = Gazetteer::shared();
        let (lat, lng) = g.geocode("Tamale").unwrap();
        assert!((lat - 9.4034).abs() < 1e-3);
        assert!((lng + 0.8393).abs() < 1e-3);
    }

    #[test]
    fn normalization_handles_case_and_punctuation() {
        let g = Gazetteer::shared();
        assert_eq!(g.geocode("  ACCRA "), g.geocode("accra"));
        assert_eq!(g.geocode("cape-coast"), g.geocode("Cape Coast"));
        assert_eq!(g.geocode("gt. accra"), g.geocode("greater accra"));
    }

    #[test]
    fn short_names_do_not_match_inside_longer_keys() {
        let g = Gazetteer::shared();
        let wa = g.geocode("wa").unwrap();
        let nkawkaw = g.geocode("nkawkaw").unwrap();
        assert!((wa.0 - 10.0601).abs() < 1e-3, "wa resolved to {wa:?}");
        assert!((nkawkaw.0 - 6.55).abs() < 1e-3);
    }

    #[test]
    fn fuzzy_catches_misspellings() {
        let g = Gazetteer::shared();
        let kumasi = g.geocode("Kumasi").unwrap();
        let fuzzy = g.geocode("Kumase").unwrap();
        assert_eq!(kumasi, fuzzy);
        assert!(g.geocode("xyzzyplugh").is_none());
    }

    #[test]
    fn region_centroids_accept_bare_and_suffixed_names() {
        let g = Gazetteer::shared();
        assert!(g.region_centroid("Ashanti").is_some());
        assert!(g.region_centroid("Ashanti Region").is_some());
        assert!(g.region_centroid("Atlantis").is_none());
    }
}

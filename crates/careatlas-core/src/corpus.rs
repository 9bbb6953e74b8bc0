//! In-memory corpus store.
//!
//! Built once from a snapshot at startup and immutable for the life of the
//! process; every index is derived at load time. Concurrent readers need no
//! synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::types::{Facility, FacilityId, FacilityType, Specialty};

/// Immutable facility table with attribute indices.
#[derive(Debug)]
pub struct CorpusStore {
    facilities: Vec<Arc<Facility>>,
    by_id: HashMap<FacilityId, usize>,
    by_region: HashMap<String, Vec<usize>>,
    by_specialty: HashMap<Specialty, Vec<usize>>,
    by_type: HashMap<FacilityType, Vec<usize>>,
}

impl CorpusStore {
    /// Build the store from a snapshot.
    ///
    /// Duplicate ids abort the load; coordinates outside Ghana's bounding
    /// box are cleared so the facility is kept but excluded from spatial
    /// operations.
    pub fn from_snapshot(snapshot: Vec<Facility>) -> CoreResult<Self> {
        let mut facilities = Vec::with_capacity(snapshot.len());
        let mut by_id = HashMap::with_capacity(snapshot.len());
        let mut by_region: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_specialty: HashMap<Specialty, Vec<usize>> = HashMap::new();
        let mut by_type: HashMap<FacilityType, Vec<usize>> = HashMap::new();

        for mut facility in snapshot {
            if facility.coords().is_none() {
                facility.latitude = None;
                facility.longitude = None;
            }

            let idx = facilities.len();
            if by_id.insert(facility.id.clone(), idx).is_some() {
                return Err(CoreError::Corpus(format!(
                    "duplicate facility id '{}'",
                    facility.id
                )));
            }
            if let Some(region) = &facility.region {
                by_region
                    .entry(region.to_lowercase())
                    .or_default()
                    .push(idx);
            }
            for specialty in &facility.specialties {
                by_specialty.entry(*specialty).or_default().push(idx);
            }
            by_type.entry(facility.facility_type).or_default().push(idx);
            facilities.push(Arc::new(facility));
        }

        let with_coords = facilities.iter().filter(|f| f.coords().is_some()).count();
        info!(
            total = facilities.len(),
            with_coords,
            regions = by_region.len(),
            "corpus loaded"
        );

        Ok(Self {
            facilities,
            by_id,
            by_region,
            by_specialty,
            by_type,
        })
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    pub fn get(&self, id: &FacilityId) -> Option<&Arc<Facility>> {
        self.by_id.get(id).map(|&idx| &self.facilities[idx])
    }

    /// All facilities in load order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<Facility>> {
        self.facilities.iter()
    }

    /// Facilities in a region; matching is case-insensitive and accepts a
    /// substring of the stored region name ("accra" finds "Greater Accra").
    pub fn by_region(&self, region: &str) -> Vec<&Arc<Facility>> {
        let wanted = region.to_lowercase();
        let mut out = Vec::new();
        for (key, indices) in &self.by_region {
            if key.contains(&wanted) || wanted.contains(key.as_str()) {
                out.extend(indices.iter().map(|&i| &self.facilities[i]));
            }
        }
        // Also match city names so "Kumasi" works as a location filter.
        for f in &self.facilities {
            if let Some(city) = &f.city {
                if city.to_lowercase().contains(&wanted) && !out.iter().any(|o| o.id == f.id) {
                    out.push(f);
                }
            }
        }
        out
    }

    pub fn by_specialty(&self, specialty: Specialty) -> Vec<&Arc<Facility>> {
        self.by_specialty
            .get(&specialty)
            .map(|indices| indices.iter().map(|&i| &self.facilities[i]).collect())
            .unwrap_or_default()
    }

    pub fn by_type(&self, facility_type: FacilityType) -> Vec<&Arc<Facility>> {
        self.by_type
            .get(&facility_type)
            .map(|indices| indices.iter().map(|&i| &self.facilities[i]).collect())
            .unwrap_or_default()
    }

    /// Facilities matching an arbitrary predicate, preserving load order.
    pub fn filter<F>(&self, predicate: F) -> Vec<&Arc<Facility>>
    where
        F: Fn(&Facility) -> bool,
    {
        self.facilities.iter().filter(|f| predicate(f)).collect()
    }

    /// Distinct region names present in the corpus (original casing).
    pub fn regions(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for f in &self.facilities {
            if let Some(region) = &f.region {
                seen.insert(region.clone());
            }
        }
        seen.into_iter().collect()
    }
}

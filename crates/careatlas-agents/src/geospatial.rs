//! Geospatial analyst: radius and k-NN queries, grid cold-spot scanning,
//! regional medical deserts, regional equity, and city-to-city distance.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use tracing::debug;

use careatlas_core::config::constants::{geo as geo_consts, ghana, stats as stat_consts};
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::CoreResult;
use careatlas_core::geo::{haversine_km, SpatialIndex};
use careatlas_core::geocode::Gazetteer;
use careatlas_core::stats::{column_means, covariance, invert, mahalanobis_sq, standardize};
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, Citation, ColdSpot, Desert, FacilityRef, Intent,
    Plan, RegionProfile, RiskLevel, Specialty,
};

/// Radius used when the query names none.
const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Default k for nearest-facility queries.
const DEFAULT_K: usize = 5;

static RADIUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"within|radius|around|close|proxim").expect("radius trigger"));
static NEAREST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"nearest|closest").expect("nearest trigger"));
static DESERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"desert|no .*access|unreachable").expect("desert trigger"));
static GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gap|coverage|cold.?spot|underserved").expect("gap trigger"));
static EQUITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"equit|fair|balance|compar").expect("equity trigger"));
static CITY_DISTANCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"distance.*(between|from)|how far").expect("distance trigger"));

pub struct GeoAnalyst {
    corpus: Arc<CorpusStore>,
    spatial: Arc<SpatialIndex>,
}

impl GeoAnalyst {
    pub fn new(corpus: Arc<CorpusStore>, spatial: Arc<SpatialIndex>) -> Self {
        Self { corpus, spatial }
    }

    pub fn run(&self, query: &str, plan: &Plan, step: usize) -> CoreResult<AgentResult> {
        let lower = query.to_lowercase();
        let params = &plan.params;
        let specialty = params.specialty;
        let center = params
            .region
            .as_deref()
            .and_then(|place| Gazetteer::shared().geocode(place));

        let result = if CITY_DISTANCE_RE.is_match(&lower) && params.city_pair.is_some() {
            self.city_distance(params.city_pair.as_ref().map(|(a, b)| (a.as_str(), b.as_str())))
        } else if plan.intent == Intent::MedicalDesert || DESERT_RE.is_match(&lower) {
            self.medical_deserts(specialty, step)
        } else if NEAREST_RE.is_match(&lower) {
            match center {
                Some(origin) => self.nearest(origin, DEFAULT_K, specialty, step),
                None => unknown_location(params.region.as_deref()),
            }
        } else if RADIUS_RE.is_match(&lower) || params.radius_km.is_some() {
            match center {
                Some(origin) => {
                    let radius = params.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
                    self.within_radius(origin, radius, specialty, step)
                }
                None => unknown_location(params.region.as_deref()),
            }
        } else if EQUITY_RE.is_match(&lower) && !GAP_RE.is_match(&lower) {
            self.regional_equity(step)
        } else {
            self.cold_spots(specialty)
        };
        debug!(action = result.data.name(), "geo analyst done");
        Ok(result)
    }

    /// Facilities within a radius, sorted by distance, capped for display.
    pub fn within_radius(
        &self,
        center: (f64, f64),
        radius_km: f64,
        specialty: Option<Specialty>,
        step: usize,
    ) -> AgentResult {
        let hits = self.spatial.within_radius(center, radius_km, specialty);
        let total_found = hits.len();
        let facilities: Vec<FacilityRef> = hits
            .into_iter()
            .take(geo_consts::RADIUS_RESULT_CAP)
            .filter_map(|(id, d)| {
                let f = self.corpus.get(&id)?;
                Some(FacilityRef::from_facility(f).with_distance(d))
            })
            .collect();

        let citations = facilities
            .iter()
            .map(|f| Citation {
                facility_id: f.id.clone(),
                field: "coordinates".to_string(),
                value: format!("{:.1} km", f.distance_km.unwrap_or(0.0)),
                confidence: 1.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::RadiusSearch {
            center_lat: center.0,
            center_lng: center.1,
            radius_km,
            specialty,
            total_found,
            facilities,
        };
        AgentResult::new(AgentKind::Geo, data).with_citations(citations)
    }

    pub fn nearest(
        &self,
        origin: (f64, f64),
        k: usize,
        specialty: Option<Specialty>,
        step: usize,
    ) -> AgentResult {
        let facilities: Vec<FacilityRef> = self
            .spatial
            .nearest(origin, k, specialty)
            .into_iter()
            .filter_map(|(id, d)| {
                let f = self.corpus.get(&id)?;
                Some(FacilityRef::from_facility(f).with_distance(d))
            })
            .collect();

        let citations = facilities
            .iter()
            .map(|f| Citation {
                facility_id: f.id.clone(),
                field: "coordinates".to_string(),
                value: format!("{:.1} km", f.distance_km.unwrap_or(0.0)),
                confidence: 1.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::NearestFacilities {
            origin_lat: origin.0,
            origin_lng: origin.1,
            k,
            specialty,
            facilities,
        };
        AgentResult::new(AgentKind::Geo, data).with_citations(citations)
    }

    /// Grid scan over Ghana's bounding box: cells whose nearest facility
    /// exceeds the threshold are cold spots. The scan parallelizes cleanly
    /// because the spatial index is read-only.
    pub fn cold_spots(&self, specialty: Option<Specialty>) -> AgentResult {
        let step_deg = geo_consts::COLD_SPOT_GRID_DEG;
        let threshold = geo_consts::COLD_SPOT_KM;
        let cells = grid_points(step_deg);
        let total_cells = cells.len();

        if self.spatial.is_empty()
            || specialty.map_or(false, |s| self.spatial.specialty_count(s) == 0)
        {
            let data = ActionData::ColdSpots {
                specialty,
                grid_resolution_deg: step_deg,
                threshold_km: threshold,
                total_cells,
                coverage_percentage: 0.0,
                cold_spots: Vec::new(),
            };
            return AgentResult::new(AgentKind::Geo, data);
        }

        let mut spots: Vec<ColdSpot> = cells
            .par_iter()
            .filter_map(|&cell| {
                let (id, distance) = self.spatial.nearest_distance_km(cell, specialty)?;
                if distance <= threshold {
                    return None;
                }
                let name = self.corpus.get(&id).map(|f| f.name.clone());
                Some(ColdSpot {
                    grid_lat: cell.0,
                    grid_lng: cell.1,
                    nearest_facility: name,
                    distance_km: distance,
                })
            })
            .collect();
        let uncovered = spots.len();
        spots.sort_by(|a, b| b.distance_km.total_cmp(&a.distance_km));
        spots.truncate(geo_consts::COLD_SPOT_LIMIT);

        let coverage = if total_cells > 0 {
            (total_cells - uncovered) as f64 / total_cells as f64 * 100.0
        } else {
            0.0
        };

        let data = ActionData::ColdSpots {
            specialty,
            grid_resolution_deg: step_deg,
            threshold_km: threshold,
            total_cells,
            coverage_percentage: (coverage * 10.0).round() / 10.0,
            cold_spots: spots,
        };
        AgentResult::new(AgentKind::Geo, data)
    }

    /// Regions whose residents must travel beyond the threshold to reach a
    /// facility offering the specialty, measured from region centroids.
    pub fn medical_deserts(&self, specialty: Option<Specialty>, step: usize) -> AgentResult {
        let centroids = self.region_centroids();
        let regions_analyzed = centroids.len();

        let mut deserts = Vec::new();
        if !(self.spatial.is_empty()
            || specialty.map_or(false, |s| self.spatial.specialty_count(s) == 0))
        {
            for (region, centroid, total) in &centroids {
                let Some((_, distance)) = self.spatial.nearest_distance_km(*centroid, specialty)
                else {
                    continue;
                };
                if distance <= geo_consts::DESERT_KM {
                    continue;
                }
                let severity = if distance > geo_consts::DESERT_CRITICAL_KM {
                    RiskLevel::Critical
                } else if distance > geo_consts::DESERT_HIGH_KM {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                };
                deserts.push(Desert {
                    region: region.clone(),
                    center_lat: centroid.0,
                    center_lng: centroid.1,
                    nearest_distance_km: distance,
                    total_facilities_in_region: *total,
                    severity,
                });
            }
        }
        deserts.sort_by(|a, b| b.nearest_distance_km.total_cmp(&a.nearest_distance_km));

        let citations = deserts
            .iter()
            .filter_map(|d| {
                self.corpus.by_region(&d.region).first().map(|f| Citation {
                    facility_id: f.id.clone(),
                    field: "region".to_string(),
                    value: d.region.clone(),
                    confidence: 1.0,
                    step_index: step,
                })
            })
            .collect();

        let data = ActionData::MedicalDeserts {
            specialty,
            threshold_km: geo_consts::DESERT_KM,
            regions_analyzed,
            deserts,
        };
        AgentResult::new(AgentKind::Geo, data).with_citations(citations)
    }

    /// Per-region resource profile with a Mahalanobis flag on regions far
    /// from the national centroid in (density, specialties, doctors, beds)
    /// space.
    pub fn regional_equity(&self, step: usize) -> AgentResult {
        let mut by_region: BTreeMap<String, (usize, std::collections::BTreeSet<Specialty>, u64, u64)> =
            BTreeMap::new();
        for f in self.corpus.all() {
            let Some(region) = &f.region else { continue };
            let entry = by_region.entry(region.clone()).or_default();
            entry.0 += 1;
            entry.1.extend(f.specialties.iter().copied());
            entry.2 += f.doctors as u64;
            entry.3 += f.capacity as u64;
        }

        let names: Vec<String> = by_region.keys().cloned().collect();
        let features: Vec<Vec<f64>> = by_region
            .values()
            .map(|(count, specs, doctors, beds)| {
                vec![*count as f64, specs.len() as f64, *doctors as f64, *beds as f64]
            })
            .collect();

        // The Mahalanobis flag needs more regions than features.
        let distances: Option<Vec<f64>> = if features.len() > 4 {
            let scaled = standardize(&features);
            covariance(&scaled)
                .and_then(|cov| invert(&cov))
                .map(|inv| {
                    let mean = column_means(&scaled);
                    scaled
                        .iter()
                        .map(|row| mahalanobis_sq(row, &mean, &inv))
                        .collect()
                })
                .ok()
        } else {
            None
        };

        let mut regions = Vec::with_capacity(names.len());
        let mut flagged_names = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let (count, specs, doctors, beds) = &by_region[name];
            let d2 = distances.as_ref().map(|d| d[i]);
            let flagged = d2.map_or(false, |d| d > stat_consts::CHI2_975_4DF);
            if flagged {
                flagged_names.push(name.clone());
            }
            regions.push(RegionProfile {
                region: name.clone(),
                total_facilities: *count,
                total_doctors: *doctors,
                total_beds: *beds,
                unique_specialties: specs.len(),
                mahalanobis_sq: d2,
                flagged,
            });
        }
        regions.sort_by(|a, b| b.total_facilities.cmp(&a.total_facilities));

        let citations = flagged_names
            .iter()
            .filter_map(|region| {
                self.corpus.by_region(region).first().map(|f| Citation {
                    facility_id: f.id.clone(),
                    field: "region".to_string(),
                    value: region.clone(),
                    confidence: 0.9,
                    step_index: step,
                })
            })
            .collect();

        let data = ActionData::RegionalEquity {
            threshold: stat_consts::CHI2_975_4DF,
            regions,
            flagged: flagged_names,
        };
        AgentResult::new(AgentKind::Geo, data).with_citations(citations)
    }

    /// Geodesic distance between two named cities; an unresolvable name is
    /// an explicit failure.
    pub fn city_distance(&self, pair: Option<(&str, &str)>) -> AgentResult {
        let Some((a, b)) = pair else {
            return unknown_location(None);
        };
        let gazetteer = Gazetteer::shared();
        let (Some(ca), Some(cb)) = (gazetteer.geocode(a), gazetteer.geocode(b)) else {
            let missing = if gazetteer.geocode(a).is_none() { a } else { b };
            return unknown_location(Some(missing));
        };
        let data = ActionData::CityDistance {
            city_a: a.to_string(),
            city_b: b.to_string(),
            a_lat: ca.0,
            a_lng: ca.1,
            b_lat: cb.0,
            b_lng: cb.1,
            distance_km: haversine_km(ca, cb),
        };
        AgentResult::new(AgentKind::Geo, data)
    }

    /// Region centroids: mean of facility coordinates per region, with the
    /// gazetteer as fallback for regions whose facilities carry none.
    fn region_centroids(&self) -> Vec<(String, (f64, f64), usize)> {
        let mut sums: BTreeMap<String, (f64, f64, usize, usize)> = BTreeMap::new();
        for f in self.corpus.all() {
            let Some(region) = &f.region else { continue };
            let entry = sums.entry(region.clone()).or_default();
            entry.3 += 1;
            if let Some((lat, lng)) = f.coords() {
                entry.0 += lat;
                entry.1 += lng;
                entry.2 += 1;
            }
        }
        sums.into_iter()
            .filter_map(|(region, (lat, lng, with_coords, total))| {
                let centroid = if with_coords > 0 {
                    (lat / with_coords as f64, lng / with_coords as f64)
                } else {
                    Gazetteer::shared().region_centroid(&region)?
                };
                Some((region, centroid, total))
            })
            .collect()
    }
}

/// The explicit geocode-miss result.
fn unknown_location(place: Option<&str>) -> AgentResult {
    let error = match place {
        Some(place) => format!("unknown_location: {place}"),
        None => "unknown_location".to_string(),
    };
    AgentResult::new(AgentKind::Geo, ActionData::Failed { error })
}

/// Lat/lng grid over Ghana's bounding box at the given step. Shared with
/// the planner's maximin placement.
pub(crate) fn grid_points(step_deg: f64) -> Vec<(f64, f64)> {
    let mut points = Vec::new();
    let mut lat = ghana::LAT_RANGE.0;
    while lat < ghana::LAT_RANGE.1 {
        let mut lng = ghana::LNG_RANGE.0;
        while lng < ghana::LNG_RANGE.1 {
            points.push((lat, lng));
            lng += step_deg;
        }
        lat += step_deg;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_degree_grid_covers_ghana() {
        let cells = grid_points(0.25);
        // 26 lat steps x 18 lng steps.
        assert_eq!(cells.len(), 26 * 18);
        assert!(cells
            .iter()
            .all(|&(lat, lng)| careatlas_core::types::in_ghana_bbox(lat, lng)));
    }

    #[test]
    fn unknown_location_result_is_a_failure_with_reason() {
        let result = unknown_location(Some("narnia"));
        match result.data {
            ActionData::Failed { ref error } => {
                assert!(error.contains("unknown_location"));
                assert!(error.contains("narnia"));
            }
            ref other => panic!("unexpected {}", other.name()),
        }
    }
}

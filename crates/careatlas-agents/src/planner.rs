//! Planner: actionable deployment plans built on the other layers.
//!
//! Emergency routing ranks candidates by capability score then distance;
//! specialist tours run greedy nearest-neighbour then 2-opt; placement uses
//! maximin over a grid (the point farthest from any existing facility fills
//! the largest gap).

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use tracing::debug;

use careatlas_core::config::constants::{ghana, planning};
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::CoreResult;
use careatlas_core::geo::{haversine_km, SpatialIndex};
use careatlas_core::geocode::Gazetteer;
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, CapacityStatus, Citation, EquipmentPlacement,
    EquipmentTag, Facility, FacilityRef, Intent, Plan, RegionCapacity, RiskLevel,
    RoutedFacility, SiteSuggestion, Specialty, TourStop,
};

static EMERGENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"emergenc|route .*patient|nearest capable|urgent").expect("emergency trigger")
});
static DEPLOY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"deploy|rotation|visiting .*route|multi.?stop|tour").expect("deploy trigger")
});
static EQUIPMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"equipment.*distribut|mobile .*unit|place .*scanner|deploy .*equip")
        .expect("equipment trigger")
});
static PLACEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"new facilit|build .*(hospital|clinic|facility)|where .*build|optimal location")
        .expect("placement trigger")
});
static CAPACITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"capacity|bed .*need|staff .*need|overload|bottleneck").expect("capacity trigger")
});

pub struct Planner {
    corpus: Arc<CorpusStore>,
    spatial: Arc<SpatialIndex>,
}

impl Planner {
    pub fn new(corpus: Arc<CorpusStore>, spatial: Arc<SpatialIndex>) -> Self {
        Self { corpus, spatial }
    }

    pub fn run(&self, query: &str, plan: &Plan, step: usize) -> CoreResult<AgentResult> {
        let lower = query.to_lowercase();
        let params = &plan.params;

        let result = if DEPLOY_RE.is_match(&lower) && !EQUIPMENT_RE.is_match(&lower) {
            self.specialist_tour(params.specialty, planning::MAX_TOUR_STOPS, step)
        } else if EQUIPMENT_RE.is_match(&lower) || (lower.contains("equipment") && params.equipment.is_some()) {
            self.equipment_distribution(params.equipment.unwrap_or(EquipmentTag::Ct), step)
        } else if PLACEMENT_RE.is_match(&lower) {
            self.new_facility_placement(params.specialty)
        } else if CAPACITY_RE.is_match(&lower) {
            self.capacity_planning(step)
        } else if EMERGENCY_RE.is_match(&lower) || plan.intent == Intent::Planning {
            let origin = params
                .region
                .as_deref()
                .and_then(|place| Gazetteer::shared().geocode(place))
                .unwrap_or(ghana::CENTER);
            self.emergency_routing(origin, params.specialty, step)
        } else {
            self.emergency_routing(ghana::CENTER, params.specialty, step)
        };
        debug!(action = result.data.name(), "planner done");
        Ok(result)
    }

    /// 0-100 readiness score for a facility against a requested specialty.
    ///
    /// Clinical match dominates: the right specialty with limited imaging
    /// beats a scanner with no relevant specialists.
    pub fn capability_score(facility: &Facility, specialty: Option<Specialty>) -> u32 {
        let mut score = 20u32;
        if let Some(tag) = specialty {
            if facility.has_specialty(tag) {
                score += 35;
            }
        }
        if facility.has_equipment_tag(EquipmentTag::Icu)
            || facility.has_equipment_tag(EquipmentTag::OperatingTheater)
        {
            score += 20;
        }
        if facility.capacity > 20 {
            score += 10;
        }
        if facility.doctors > 0 {
            score += 10;
        }
        if facility.has_equipment_tag(EquipmentTag::Ct)
            || facility.has_equipment_tag(EquipmentTag::Mri)
            || facility
                .equipment
                .iter()
                .any(|e| e.to_lowercase().contains("scanner"))
        {
            score += 5;
        }
        score.min(100)
    }

    /// Route a patient to the best nearby facility: candidates within the
    /// emergency radius, ranked by capability score descending then
    /// distance ascending.
    pub fn emergency_routing(
        &self,
        origin: (f64, f64),
        specialty: Option<Specialty>,
        step: usize,
    ) -> AgentResult {
        let candidates =
            self.spatial
                .within_radius(origin, planning::EMERGENCY_RADIUS_KM, specialty);
        let mut routed: Vec<RoutedFacility> = candidates
            .into_iter()
            .filter_map(|(id, distance)| {
                let facility = self.corpus.get(&id)?;
                let score = Self::capability_score(facility, specialty);
                Some(RoutedFacility {
                    facility: FacilityRef::from_facility(facility).with_distance(distance),
                    distance_km: distance,
                    est_travel_min: travel_minutes(distance),
                    capability_score: score,
                })
            })
            .collect();
        routed.sort_by(|a, b| {
            b.capability_score
                .cmp(&a.capability_score)
                .then_with(|| a.distance_km.total_cmp(&b.distance_km))
        });

        let total_options = routed.len();
        let mut iter = routed.into_iter();
        let primary = iter.next();
        let backup = iter.next();
        let alternatives: Vec<RoutedFacility> = iter.take(3).collect();

        let citations = primary
            .iter()
            .chain(backup.iter())
            .map(|r| Citation {
                facility_id: r.facility.id.clone(),
                field: "capabilities".to_string(),
                value: format!("score={}", r.capability_score),
                confidence: r.capability_score as f32 / 100.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::EmergencyRoute {
            origin_lat: origin.0,
            origin_lng: origin.1,
            specialty,
            primary,
            backup,
            alternatives,
            total_options,
        };
        AgentResult::new(AgentKind::Planner, data).with_citations(citations)
    }

    /// Multi-stop rotation for a visiting specialist: top facilities by
    /// capability score, toured greedy-NN from Accra and tightened with
    /// 2-opt. The optimized tour is never longer than the greedy one.
    pub fn specialist_tour(
        &self,
        specialty: Option<Specialty>,
        max_stops: usize,
        step: usize,
    ) -> AgentResult {
        let mut candidates: Vec<(&Arc<Facility>, (f64, f64), u32)> = self
            .corpus
            .all()
            .filter(|f| specialty.map_or(true, |tag| f.has_specialty(tag)))
            .filter_map(|f| {
                let coords = f.coords()?;
                Some((f, coords, Self::capability_score(f, specialty)))
            })
            .collect();
        let facilities_considered = candidates.len();
        candidates.sort_by(|a, b| b.2.cmp(&a.2));
        candidates.truncate(max_stops);

        if candidates.is_empty() {
            let data = ActionData::SpecialistTour {
                specialty,
                stops: Vec::new(),
                total_distance_km: 0.0,
                greedy_distance_km: 0.0,
                facilities_considered,
            };
            return AgentResult::new(AgentKind::Planner, data);
        }

        // Node 0 is the Accra depot.
        let mut coords = vec![ghana::ACCRA];
        coords.extend(candidates.iter().map(|(_, c, _)| *c));
        let n = coords.len();
        let mut dist = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = haversine_km(coords[i], coords[j]);
                dist[i][j] = d;
                dist[j][i] = d;
            }
        }

        let greedy = greedy_tour(&dist);
        let greedy_len = open_tour_length(&dist, &greedy);
        let optimized = two_opt(&dist, greedy);
        let tour_len = open_tour_length(&dist, &optimized);

        let mut stops = Vec::with_capacity(n);
        let mut prev = 0usize;
        for (position, &node) in optimized.iter().enumerate() {
            let leg = if position == 0 { 0.0 } else { dist[prev][node] };
            if node == 0 {
                stops.push(TourStop {
                    stop: 0,
                    name: "Accra (depot)".to_string(),
                    latitude: ghana::ACCRA.0,
                    longitude: ghana::ACCRA.1,
                    facility: None,
                    distance_from_prev_km: leg,
                });
            } else {
                let (facility, coords, _) = &candidates[node - 1];
                stops.push(TourStop {
                    stop: position,
                    name: facility.name.clone(),
                    latitude: coords.0,
                    longitude: coords.1,
                    facility: Some(FacilityRef::from_facility(facility).with_distance(leg)),
                    distance_from_prev_km: leg,
                });
            }
            prev = node;
        }

        let citations = stops
            .iter()
            .filter_map(|s| s.facility.as_ref())
            .map(|f| Citation {
                facility_id: f.id.clone(),
                field: "coordinates".to_string(),
                value: format!("stop in {}", f.city.as_deref().unwrap_or("-")),
                confidence: 1.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::SpecialistTour {
            specialty,
            stops,
            total_distance_km: tour_len,
            greedy_distance_km: greedy_len,
            facilities_considered,
        };
        AgentResult::new(AgentKind::Planner, data).with_citations(citations)
    }

    /// Where to place new units of an equipment type: regions ranked by how
    /// many facilities lack it; within each, the highest-capacity facility
    /// lacking it becomes the recommended host.
    pub fn equipment_distribution(&self, equipment: EquipmentTag, step: usize) -> AgentResult {
        let mut with_count = 0usize;
        let mut without: BTreeMap<String, Vec<&Arc<Facility>>> = BTreeMap::new();
        let mut without_total = 0usize;
        for f in self.corpus.all() {
            if f.has_equipment_tag(equipment) {
                with_count += 1;
            } else {
                without_total += 1;
                if let Some(region) = &f.region {
                    without.entry(region.clone()).or_default().push(f);
                }
            }
        }

        let mut ranked: Vec<(&String, &Vec<&Arc<Facility>>)> = without.iter().collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

        let placements: Vec<EquipmentPlacement> = ranked
            .into_iter()
            .take(5)
            .filter_map(|(region, facilities)| {
                let best = facilities.iter().max_by_key(|f| f.capacity)?;
                Some(EquipmentPlacement {
                    region: region.clone(),
                    facility: FacilityRef::from_facility(best),
                    facilities_served: facilities.len(),
                })
            })
            .collect();

        let citations = placements
            .iter()
            .map(|p| Citation {
                facility_id: p.facility.id.clone(),
                field: "equipment".to_string(),
                value: format!("lacking {equipment}"),
                confidence: 1.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::EquipmentDistribution {
            equipment,
            facilities_with: with_count,
            facilities_without: without_total,
            placements,
        };
        AgentResult::new(AgentKind::Planner, data).with_citations(citations)
    }

    /// Maximin placement: grid points ranked by distance to the nearest
    /// existing facility, farthest first, so each suggestion fills the
    /// largest remaining coverage hole.
    pub fn new_facility_placement(&self, specialty: Option<Specialty>) -> AgentResult {
        let use_specialty =
            specialty.filter(|&tag| self.spatial.specialty_count(tag) > 0);

        if self.spatial.is_empty() {
            let data = ActionData::NewFacilityPlacement {
                specialty,
                suggestions: Vec::new(),
            };
            return AgentResult::new(AgentKind::Planner, data);
        }

        let cells = crate::geospatial::grid_points(planning::PLACEMENT_GRID_DEG);
        let mut scored: Vec<(f64, (f64, f64), Option<String>)> = cells
            .par_iter()
            .filter_map(|&cell| {
                let (id, distance) = self.spatial.nearest_distance_km(cell, use_specialty)?;
                let region = self.corpus.get(&id).and_then(|f| f.region.clone());
                Some((distance, cell, region))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let suggestions: Vec<SiteSuggestion> = scored
            .into_iter()
            .take(planning::PLACEMENT_LIMIT)
            .enumerate()
            .map(|(i, (distance, cell, region))| SiteSuggestion {
                rank: i + 1,
                region,
                latitude: cell.0,
                longitude: cell.1,
                nearest_existing_km: distance,
                priority: if distance > 100.0 {
                    RiskLevel::Critical
                } else if distance > 50.0 {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                },
            })
            .collect();

        let data = ActionData::NewFacilityPlacement {
            specialty,
            suggestions,
        };
        AgentResult::new(AgentKind::Planner, data)
    }

    /// Per-region bed and doctor load with a coarse status.
    pub fn capacity_planning(&self, step: usize) -> AgentResult {
        let mut by_region: BTreeMap<String, (usize, u64, u64)> = BTreeMap::new();
        for f in self.corpus.all() {
            let Some(region) = &f.region else { continue };
            let entry = by_region.entry(region.clone()).or_default();
            entry.0 += 1;
            entry.1 += f.capacity as u64;
            entry.2 += f.doctors as u64;
        }

        let mut regions: Vec<RegionCapacity> = by_region
            .into_iter()
            .map(|(region, (count, beds, doctors))| {
                let beds_per = beds as f64 / count as f64;
                let doctors_per = doctors as f64 / count as f64;
                let status = if beds_per < 5.0 && count > 3 {
                    CapacityStatus::Critical
                } else if beds_per < 15.0 {
                    CapacityStatus::Warning
                } else {
                    CapacityStatus::Adequate
                };
                RegionCapacity {
                    region,
                    facilities: count,
                    total_beds: beds,
                    total_doctors: doctors,
                    beds_per_facility: beds_per,
                    doctors_per_facility: doctors_per,
                    status,
                }
            })
            .collect();
        regions.sort_by(|a, b| a.beds_per_facility.total_cmp(&b.beds_per_facility));
        let critical = regions
            .iter()
            .filter(|r| r.status == CapacityStatus::Critical)
            .count();

        let citations = regions
            .iter()
            .filter(|r| r.status == CapacityStatus::Critical)
            .filter_map(|r| {
                self.corpus.by_region(&r.region).first().map(|f| Citation {
                    facility_id: f.id.clone(),
                    field: "capacity".to_string(),
                    value: format!("{:.1} beds/facility", r.beds_per_facility),
                    confidence: 1.0,
                    step_index: step,
                })
            })
            .collect();

        let data = ActionData::CapacityPlanning {
            critical_regions: critical,
            regions,
        };
        AgentResult::new(AgentKind::Planner, data).with_citations(citations)
    }
}

fn travel_minutes(distance_km: f64) -> u32 {
    (distance_km / planning::TRAVEL_SPEED_KMH * 60.0).round() as u32
}

/// Greedy nearest-neighbour open tour starting at node 0.
fn greedy_tour(dist: &[Vec<f64>]) -> Vec<usize> {
    let n = dist.len();
    let mut tour = vec![0usize];
    let mut visited = vec![false; n];
    visited[0] = true;
    let mut current = 0usize;
    for _ in 1..n {
        let next = (0..n)
            .filter(|&j| !visited[j])
            .min_by(|&a, &b| dist[current][a].total_cmp(&dist[current][b]));
        let Some(next) = next else { break };
        visited[next] = true;
        tour.push(next);
        current = next;
    }
    tour
}

/// Total length of an open tour (no return leg to the depot).
fn open_tour_length(dist: &[Vec<f64>], tour: &[usize]) -> f64 {
    tour.windows(2).map(|w| dist[w[0]][w[1]]).sum()
}

/// 2-opt local search on an open tour with a fixed start. A segment
/// reversal is applied only when it shortens the tour by more than the
/// epsilon; passes stop at the cap or at a local optimum.
fn two_opt(dist: &[Vec<f64>], mut tour: Vec<usize>) -> Vec<usize> {
    let n = tour.len();
    if n < 4 {
        return tour;
    }
    for _ in 0..planning::TWO_OPT_MAX_PASSES {
        let mut improved = false;
        for i in 1..n - 1 {
            for j in (i + 1)..n {
                let before = dist[tour[i - 1]][tour[i]]
                    + if j + 1 < n { dist[tour[j]][tour[j + 1]] } else { 0.0 };
                let after = dist[tour[i - 1]][tour[j]]
                    + if j + 1 < n { dist[tour[i]][tour[j + 1]] } else { 0.0 };
                if after < before - planning::TWO_OPT_EPSILON {
                    tour[i..=j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }
    tour
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_matrix(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let n = points.len();
        let mut dist = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let dx = points[i].0 - points[j].0;
                let dy = points[i].1 - points[j].1;
                dist[i][j] = (dx * dx + dy * dy).sqrt();
            }
        }
        dist
    }

    #[test]
    fn two_opt_never_lengthens_the_tour() {
        // A deliberately crossed path on a unit square plus outliers.
        let points = [
            (0.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (1.0, 0.0),
            (2.0, 0.5),
            (-1.0, 0.5),
        ];
        let dist = square_matrix(&points);
        let greedy = greedy_tour(&dist);
        let greedy_len = open_tour_length(&dist, &greedy);
        let optimized = two_opt(&dist, greedy.clone());
        let optimized_len = open_tour_length(&dist, &optimized);
        assert!(optimized_len <= greedy_len + 1e-12);
        assert_eq!(optimized[0], 0, "start is pinned to the depot");
        // Same set of nodes, just reordered.
        let mut a = greedy;
        let mut b = optimized;
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn two_opt_uncrosses_a_known_crossing() {
        // Visiting the square's corners in 0-2-1-3 order crosses; the
        // optimal open tour through all four has length 3.
        let points = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let dist = square_matrix(&points);
        let crossed = vec![0, 2, 1, 3];
        let fixed = two_opt(&dist, crossed);
        let len = open_tour_length(&dist, &fixed);
        assert!((len - 3.0).abs() < 1e-9, "got {len}");
    }

    #[test]
    fn greedy_tour_visits_every_node_once() {
        let points = [(0.0, 0.0), (3.0, 0.0), (1.0, 0.0), (2.0, 0.0)];
        let dist = square_matrix(&points);
        let tour = greedy_tour(&dist);
        assert_eq!(tour, vec![0, 2, 3, 1]);
    }

    #[test]
    fn travel_time_uses_sixty_kmh() {
        assert_eq!(travel_minutes(60.0), 60);
        assert_eq!(travel_minutes(30.0), 30);
        assert_eq!(travel_minutes(0.0), 0);
    }
}

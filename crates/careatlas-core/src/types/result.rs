//! Typed agent results.
//!
//! Every agent action produces one [`ActionData`] variant with a closed
//! field set. The aggregator never scans loose keys: each variant knows how
//! to surface its map-displayable points via [`ActionData::map_points`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    AgentKind, EquipmentTag, Facility, FacilityId, FacilityType, Specialty,
};

/// A traceable attribution from a response claim to the facility field that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub facility_id: FacilityId,
    pub field: String,
    pub value: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Index of the trace step that produced this citation.
    pub step_index: usize,
}

/// Compact facility view carried inside results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityRef {
    pub id: FacilityId,
    pub name: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub facility_type: FacilityType,
    pub specialties: Vec<Specialty>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl FacilityRef {
    pub fn from_facility(f: &Facility) -> Self {
        let coords = f.coords();
        Self {
            id: f.id.clone(),
            name: f.name.clone(),
            city: f.city.clone(),
            region: f.region.clone(),
            facility_type: f.facility_type,
            specialties: f.specialties.iter().copied().collect(),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            distance_km: None,
        }
    }

    pub fn with_distance(mut self, km: f64) -> Self {
        self.distance_km = Some(km);
        self
    }
}

/// A point the map layer can render. Facility-backed points carry an id;
/// synthetic points (grid cells, placement sites) are identified by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FacilityId>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialties: Vec<Specialty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_type: Option<FacilityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl MapPoint {
    fn from_ref(r: &FacilityRef) -> Option<MapPoint> {
        Some(MapPoint {
            id: Some(r.id.clone()),
            name: r.name.clone(),
            latitude: r.latitude?,
            longitude: r.longitude?,
            city: r.city.clone(),
            region: r.region.clone(),
            specialties: r.specialties.clone(),
            facility_type: Some(r.facility_type),
            distance_km: r.distance_km,
        })
    }

    fn synthetic(name: impl Into<String>, lat: f64, lng: f64, km: Option<f64>) -> MapPoint {
        MapPoint {
            id: None,
            name: name.into(),
            latitude: lat,
            longitude: lng,
            city: None,
            region: None,
            specialties: Vec::new(),
            facility_type: None,
            distance_km: km,
        }
    }
}

// ---------------------------------------------------------------------------
// Severity scales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Critical,
    Warning,
    Adequate,
}

// ---------------------------------------------------------------------------
// Per-action payloads
// ---------------------------------------------------------------------------

/// Summary of the structured filters an action applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty: Option<Specialty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_type: Option<FacilityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_type: Option<String>,
    #[serde(default)]
    pub negated: bool,
}

impl FilterSummary {
    pub fn is_empty(&self) -> bool {
        self.specialty.is_none()
            && self.region.is_none()
            && self.facility_type.is_none()
            && self.organization_type.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IqrStats {
    pub q25: f64,
    pub q75: f64,
    pub iqr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioAnomaly {
    pub facility: FacilityRef,
    pub capacity: u32,
    pub doctors: u32,
    pub ratio: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpofEntry {
    pub specialty: Specialty,
    pub facility_count: usize,
    pub facilities: Vec<FacilityRef>,
    pub regions_covered: Vec<String>,
    pub risk_level: RiskLevel,
}

/// Per-vector fusion weights after normalization (they sum to 3.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorWeights {
    pub full_document: f64,
    pub clinical_detail: f64,
    pub specialties_context: f64,
}

impl VectorWeights {
    pub fn sum(&self) -> f64 {
        self.full_document + self.clinical_detail + self.specialties_context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub facility: FacilityRef,
    /// Raw accumulated RRF score.
    pub rrf_score: f64,
    /// Display-normalized score in [0, 1]: `min(1, rrf_score * 100)`.
    pub display_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintIssue {
    pub kind: ConstraintIssueKind,
    pub severity: Severity,
    pub procedure: String,
    pub requirement: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintIssueKind {
    MissingEquipment,
    InsufficientCapacity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub facility: FacilityRef,
    pub valid: bool,
    pub confidence: f32,
    pub issues: Vec<ConstraintIssue>,
}

/// Anomaly feature counts echoed back for explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCounts {
    pub specialties: usize,
    pub procedures: usize,
    pub equipment: usize,
    pub capabilities: usize,
    pub capacity: u32,
    pub doctors: u32,
}

impl FeatureCounts {
    pub fn from_facility(f: &Facility) -> Self {
        Self {
            specialties: f.specialties.len(),
            procedures: f.procedures.len(),
            equipment: f.equipment.len(),
            capabilities: f.capabilities.len(),
            capacity: f.capacity,
            doctors: f.doctors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub facility: FacilityRef,
    pub iso_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mahalanobis_sq: Option<f64>,
    pub features: FeatureCounts,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagHit {
    pub category: String,
    pub pattern: String,
    pub matched_text: String,
    /// Specialty mentioned fuzzily within five words of the match, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjacent_specialty: Option<Specialty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedFlagReport {
    pub facility: FacilityRef,
    pub flags: Vec<RedFlagHit>,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionGap {
    pub region: String,
    pub specialty_count: usize,
    pub total_facilities: usize,
    pub severity: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdSpot {
    pub grid_lat: f64,
    pub grid_lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_facility: Option<String>,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Desert {
    pub region: String,
    pub center_lat: f64,
    pub center_lng: f64,
    pub nearest_distance_km: f64,
    pub total_facilities_in_region: usize,
    pub severity: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionProfile {
    pub region: String,
    pub total_facilities: usize,
    pub total_doctors: u64,
    pub total_beds: u64,
    pub unique_specialties: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mahalanobis_sq: Option<f64>,
    pub flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedFacility {
    pub facility: FacilityRef,
    pub distance_km: f64,
    pub est_travel_min: u32,
    pub capability_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourStop {
    /// 0 is the Accra depot.
    pub stop: usize,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<FacilityRef>,
    pub distance_from_prev_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentPlacement {
    pub region: String,
    pub facility: FacilityRef,
    /// Facilities in the region lacking the equipment (host included).
    pub facilities_served: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSuggestion {
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub nearest_existing_km: f64,
    pub priority: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCapacity {
    pub region: String,
    pub facilities: usize,
    pub total_beds: u64,
    pub total_doctors: u64,
    pub beds_per_facility: f64,
    pub doctors_per_facility: f64,
    pub status: CapacityStatus,
}

// ---------------------------------------------------------------------------
// The tagged union
// ---------------------------------------------------------------------------

/// Tagged union over agent actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionData {
    Count {
        count: usize,
        filters: FilterSummary,
        facilities: Vec<FacilityRef>,
    },
    RegionAggregation {
        aggregation: BTreeMap<String, usize>,
        top_region: Option<String>,
        top_count: usize,
    },
    SpecialtyDistribution {
        distribution: BTreeMap<String, usize>,
        total_unique_specialties: usize,
    },
    RatioAnomalies {
        threshold: f64,
        iqr: IqrStats,
        anomalies: Vec<RatioAnomaly>,
    },
    RareSpecialties {
        rare_specialties: BTreeMap<String, usize>,
        results: Vec<SpofEntry>,
    },
    Overview {
        total_facilities: usize,
        total_ngos: usize,
        by_type: BTreeMap<String, usize>,
    },
    SemanticSearch {
        method: String,
        weights: VectorWeights,
        filters: FilterSummary,
        retried_unfiltered: bool,
        hits: Vec<SearchHit>,
    },
    Validation {
        total_checked: usize,
        high_severity: usize,
        medium_severity: usize,
        flagged: Vec<ValidationReport>,
    },
    AnomalyScan {
        total_checked: usize,
        stage1_outliers: usize,
        mahalanobis_skipped: bool,
        flagged: Vec<AnomalyReport>,
    },
    RedFlags {
        total_scanned: usize,
        flagged: Vec<RedFlagReport>,
    },
    CoverageGaps {
        specialty: Option<Specialty>,
        regions_analyzed: usize,
        gaps: Vec<RegionGap>,
    },
    RadiusSearch {
        center_lat: f64,
        center_lng: f64,
        radius_km: f64,
        specialty: Option<Specialty>,
        total_found: usize,
        facilities: Vec<FacilityRef>,
    },
    NearestFacilities {
        origin_lat: f64,
        origin_lng: f64,
        k: usize,
        specialty: Option<Specialty>,
        facilities: Vec<FacilityRef>,
    },
    ColdSpots {
        specialty: Option<Specialty>,
        grid_resolution_deg: f64,
        threshold_km: f64,
        total_cells: usize,
        coverage_percentage: f64,
        cold_spots: Vec<ColdSpot>,
    },
    MedicalDeserts {
        specialty: Option<Specialty>,
        threshold_km: f64,
        regions_analyzed: usize,
        deserts: Vec<Desert>,
    },
    RegionalEquity {
        threshold: f64,
        regions: Vec<RegionProfile>,
        flagged: Vec<String>,
    },
    CityDistance {
        city_a: String,
        city_b: String,
        a_lat: f64,
        a_lng: f64,
        b_lat: f64,
        b_lng: f64,
        distance_km: f64,
    },
    EmergencyRoute {
        origin_lat: f64,
        origin_lng: f64,
        specialty: Option<Specialty>,
        primary: Option<RoutedFacility>,
        backup: Option<RoutedFacility>,
        alternatives: Vec<RoutedFacility>,
        total_options: usize,
    },
    SpecialistTour {
        specialty: Option<Specialty>,
        stops: Vec<TourStop>,
        total_distance_km: f64,
        greedy_distance_km: f64,
        facilities_considered: usize,
    },
    EquipmentDistribution {
        equipment: EquipmentTag,
        facilities_with: usize,
        facilities_without: usize,
        placements: Vec<EquipmentPlacement>,
    },
    NewFacilityPlacement {
        specialty: Option<Specialty>,
        suggestions: Vec<SiteSuggestion>,
    },
    CapacityPlanning {
        critical_regions: usize,
        regions: Vec<RegionCapacity>,
    },
    /// The agent failed; the error is mirrored in the trace.
    Failed { error: String },
}

impl ActionData {
    /// Stable action name, mirroring the serde tag.
    pub fn name(&self) -> &'static str {
        match self {
            ActionData::Count { .. } => "count",
            ActionData::RegionAggregation { .. } => "region_aggregation",
            ActionData::SpecialtyDistribution { .. } => "specialty_distribution",
            ActionData::RatioAnomalies { .. } => "ratio_anomalies",
            ActionData::RareSpecialties { .. } => "rare_specialties",
            ActionData::Overview { .. } => "overview",
            ActionData::SemanticSearch { .. } => "semantic_search",
            ActionData::Validation { .. } => "validation",
            ActionData::AnomalyScan { .. } => "anomaly_scan",
            ActionData::RedFlags { .. } => "red_flags",
            ActionData::CoverageGaps { .. } => "coverage_gaps",
            ActionData::RadiusSearch { .. } => "radius_search",
            ActionData::NearestFacilities { .. } => "nearest_facilities",
            ActionData::ColdSpots { .. } => "cold_spots",
            ActionData::MedicalDeserts { .. } => "medical_deserts",
            ActionData::RegionalEquity { .. } => "regional_equity",
            ActionData::CityDistance { .. } => "city_distance",
            ActionData::EmergencyRoute { .. } => "emergency_route",
            ActionData::SpecialistTour { .. } => "specialist_tour",
            ActionData::EquipmentDistribution { .. } => "equipment_distribution",
            ActionData::NewFacilityPlacement { .. } => "new_facility_placement",
            ActionData::CapacityPlanning { .. } => "capacity_planning",
            ActionData::Failed { .. } => "failed",
        }
    }

    /// How many primary records the action produced; drives trace summaries
    /// and the searcher's self-correction check.
    pub fn count(&self) -> usize {
        match self {
            ActionData::Count { count, .. } => *count,
            ActionData::RegionAggregation { aggregation, .. } => aggregation.len(),
            ActionData::SpecialtyDistribution { distribution, .. } => distribution.len(),
            ActionData::RatioAnomalies { anomalies, .. } => anomalies.len(),
            ActionData::RareSpecialties { results, .. } => results.len(),
            ActionData::Overview { total_facilities, .. } => *total_facilities,
            ActionData::SemanticSearch { hits, .. } => hits.len(),
            ActionData::Validation { flagged, .. } => flagged.len(),
            ActionData::AnomalyScan { flagged, .. } => flagged.len(),
            ActionData::RedFlags { flagged, .. } => flagged.len(),
            ActionData::CoverageGaps { gaps, .. } => gaps.len(),
            ActionData::RadiusSearch { facilities, .. } => facilities.len(),
            ActionData::NearestFacilities { facilities, .. } => facilities.len(),
            ActionData::ColdSpots { cold_spots, .. } => cold_spots.len(),
            ActionData::MedicalDeserts { deserts, .. } => deserts.len(),
            ActionData::RegionalEquity { regions, .. } => regions.len(),
            ActionData::CityDistance { .. } => 1,
            ActionData::EmergencyRoute { total_options, .. } => *total_options,
            ActionData::SpecialistTour { stops, .. } => stops.len(),
            ActionData::EquipmentDistribution { placements, .. } => placements.len(),
            ActionData::NewFacilityPlacement { suggestions, .. } => suggestions.len(),
            ActionData::CapacityPlanning { regions, .. } => regions.len(),
            ActionData::Failed { .. } => 0,
        }
    }

    /// Every map-displayable point this result contributes.
    pub fn map_points(&self) -> Vec<MapPoint> {
        let from_refs = |refs: &[FacilityRef]| -> Vec<MapPoint> {
            refs.iter().filter_map(MapPoint::from_ref).collect()
        };

        match self {
            ActionData::Count { facilities, .. }
            | ActionData::RadiusSearch { facilities, .. }
            | ActionData::NearestFacilities { facilities, .. } => from_refs(facilities),

            ActionData::RatioAnomalies { anomalies, .. } => {
                anomalies.iter().filter_map(|a| MapPoint::from_ref(&a.facility)).collect()
            }
            ActionData::RareSpecialties { results, .. } => results
                .iter()
                .flat_map(|e| e.facilities.iter())
                .filter_map(MapPoint::from_ref)
                .collect(),
            ActionData::SemanticSearch { hits, .. } => {
                hits.iter().filter_map(|h| MapPoint::from_ref(&h.facility)).collect()
            }
            ActionData::Validation { flagged, .. } => {
                flagged.iter().filter_map(|v| MapPoint::from_ref(&v.facility)).collect()
            }
            ActionData::AnomalyScan { flagged, .. } => {
                flagged.iter().filter_map(|a| MapPoint::from_ref(&a.facility)).collect()
            }
            ActionData::RedFlags { flagged, .. } => {
                flagged.iter().filter_map(|r| MapPoint::from_ref(&r.facility)).collect()
            }
            ActionData::CoverageGaps { gaps, .. } => gaps
                .iter()
                .filter_map(|g| {
                    Some(MapPoint::synthetic(
                        g.region.clone(),
                        g.latitude?,
                        g.longitude?,
                        None,
                    ))
                })
                .collect(),
            ActionData::ColdSpots { cold_spots, .. } => cold_spots
                .iter()
                .map(|c| {
                    MapPoint::synthetic(
                        format!("cold spot ({:.2}, {:.2})", c.grid_lat, c.grid_lng),
                        c.grid_lat,
                        c.grid_lng,
                        Some(c.distance_km),
                    )
                })
                .collect(),
            ActionData::MedicalDeserts { deserts, .. } => deserts
                .iter()
                .map(|d| {
                    MapPoint::synthetic(
                        d.region.clone(),
                        d.center_lat,
                        d.center_lng,
                        Some(d.nearest_distance_km),
                    )
                })
                .collect(),
            ActionData::EmergencyRoute {
                primary,
                backup,
                alternatives,
                ..
            } => primary
                .iter()
                .chain(backup.iter())
                .chain(alternatives.iter())
                .filter_map(|r| MapPoint::from_ref(&r.facility))
                .collect(),
            ActionData::SpecialistTour { stops, .. } => stops
                .iter()
                .map(|s| {
                    let mut p = MapPoint::synthetic(
                        s.name.clone(),
                        s.latitude,
                        s.longitude,
                        Some(s.distance_from_prev_km),
                    );
                    if let Some(f) = &s.facility {
                        p.id = Some(f.id.clone());
                        p.city = f.city.clone();
                        p.region = f.region.clone();
                        p.specialties = f.specialties.clone();
                        p.facility_type = Some(f.facility_type);
                    }
                    p
                })
                .collect(),
            ActionData::EquipmentDistribution { placements, .. } => placements
                .iter()
                .filter_map(|p| MapPoint::from_ref(&p.facility))
                .collect(),
            ActionData::NewFacilityPlacement { suggestions, .. } => suggestions
                .iter()
                .map(|s| {
                    MapPoint::synthetic(
                        format!("suggested site #{}", s.rank),
                        s.latitude,
                        s.longitude,
                        Some(s.nearest_existing_km),
                    )
                })
                .collect(),

            ActionData::RegionAggregation { .. }
            | ActionData::SpecialtyDistribution { .. }
            | ActionData::Overview { .. }
            | ActionData::RegionalEquity { .. }
            | ActionData::CityDistance { .. }
            | ActionData::CapacityPlanning { .. }
            | ActionData::Failed { .. } => Vec::new(),
        }
    }
}

/// One agent invocation's full output: the action payload plus the
/// citations it appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentKind,
    #[serde(flatten)]
    pub data: ActionData,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl AgentResult {
    pub fn new(agent: AgentKind, data: ActionData) -> Self {
        Self {
            agent,
            data,
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }
}

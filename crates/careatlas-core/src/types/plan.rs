//! Query intents, agent identities, and the per-request execution plan.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EquipmentTag, FacilityType, Specialty};

/// Closed set of 14 query intents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Count,
    Aggregate,
    AnomalyDetection,
    Validation,
    DistanceQuery,
    CoverageGap,
    MedicalDesert,
    SinglePointFailure,
    FacilityLookup,
    ServiceSearch,
    SpecialtySearch,
    Comparison,
    Planning,
    General,
}

impl Intent {
    /// All intents in tie-break order: earlier wins on equal regex scores.
    pub const ALL: [Intent; 14] = [
        Intent::Count,
        Intent::Aggregate,
        Intent::AnomalyDetection,
        Intent::Validation,
        Intent::DistanceQuery,
        Intent::CoverageGap,
        Intent::MedicalDesert,
        Intent::SinglePointFailure,
        Intent::FacilityLookup,
        Intent::ServiceSearch,
        Intent::SpecialtySearch,
        Intent::Comparison,
        Intent::Planning,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Count => "COUNT",
            Intent::Aggregate => "AGGREGATE",
            Intent::AnomalyDetection => "ANOMALY_DETECTION",
            Intent::Validation => "VALIDATION",
            Intent::DistanceQuery => "DISTANCE_QUERY",
            Intent::CoverageGap => "COVERAGE_GAP",
            Intent::MedicalDesert => "MEDICAL_DESERT",
            Intent::SinglePointFailure => "SINGLE_POINT_FAILURE",
            Intent::FacilityLookup => "FACILITY_LOOKUP",
            Intent::ServiceSearch => "SERVICE_SEARCH",
            Intent::SpecialtySearch => "SPECIALTY_SEARCH",
            Intent::Comparison => "COMPARISON",
            Intent::Planning => "PLANNING",
            Intent::General => "GENERAL",
        }
    }

    pub fn parse(s: &str) -> Option<Intent> {
        let wanted = s.trim().to_ascii_uppercase();
        Intent::ALL.iter().copied().find(|i| i.as_str() == wanted)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five analysis agents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Analyst,
    Searcher,
    Validator,
    Geo,
    Planner,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Analyst => "analyst",
            AgentKind::Searcher => "searcher",
            AgentKind::Validator => "validator",
            AgentKind::Geo => "geo",
            AgentKind::Planner => "planner",
        }
    }

    pub fn parse(s: &str) -> Option<AgentKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analyst" => Some(AgentKind::Analyst),
            "searcher" => Some(AgentKind::Searcher),
            "validator" => Some(AgentKind::Validator),
            "geo" => Some(AgentKind::Geo),
            "planner" => Some(AgentKind::Planner),
            _ => None,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the plan's agents are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Single,
    Sequential,
    Parallel,
}

/// Parameters extracted from the query text once, shared by every agent in
/// the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedParams {
    pub specialty: Option<Specialty>,
    pub region: Option<String>,
    pub facility_type: Option<FacilityType>,
    pub equipment: Option<EquipmentTag>,
    pub radius_km: Option<f64>,
    pub city_pair: Option<(String, String)>,
    /// The extracted specialty sits in a negation window.
    pub negated: bool,
}

/// The ordered agent execution plan produced by the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub intent: Intent,
    pub confidence: f32,
    pub agents: Vec<AgentKind>,
    pub flow: Flow,
    pub params: ExtractedParams,
}

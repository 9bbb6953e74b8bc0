//! Domain types shared across the workspace.

mod facility;
mod plan;
mod response;
mod result;

pub use facility::{in_ghana_bbox, EquipmentTag, Facility, FacilityId, FacilityType, Specialty};
pub use plan::{AgentKind, ExtractedParams, Flow, Intent, Plan};
pub use response::{Response, TraceStep};
pub use result::{
    ActionData, AgentResult, AnomalyReport, CapacityStatus, Citation, ColdSpot,
    ConstraintIssue, ConstraintIssueKind, Desert, EquipmentPlacement, FacilityRef,
    FeatureCounts, FilterSummary, IqrStats, MapPoint, RatioAnomaly, RedFlagHit,
    RedFlagReport, RegionCapacity, RegionGap, RegionProfile, RiskLevel, RoutedFacility,
    SearchHit, Severity, SiteSuggestion, SpofEntry, TourStop, ValidationReport,
    VectorWeights,
};

//! The intent routing table, kept as data so a single dispatcher exercises
//! every plan shape.

use careatlas_core::types::{AgentKind, Flow, Intent};

/// Ordered agent list and flow for an intent.
pub fn route(intent: Intent) -> (&'static [AgentKind], Flow) {
    use AgentKind::*;
    match intent {
        Intent::Count | Intent::Aggregate => (&[Analyst], Flow::Single),
        Intent::AnomalyDetection => (&[Analyst, Validator], Flow::Sequential),
        Intent::Validation => (&[Searcher, Validator], Flow::Sequential),
        Intent::DistanceQuery => (&[Geo], Flow::Single),
        Intent::CoverageGap | Intent::MedicalDesert => (&[Geo, Validator], Flow::Sequential),
        Intent::SinglePointFailure => (&[Analyst, Validator], Flow::Sequential),
        Intent::FacilityLookup | Intent::SpecialtySearch => (&[Searcher], Flow::Single),
        Intent::ServiceSearch => (&[Searcher, Analyst], Flow::Sequential),
        Intent::Comparison => (&[Analyst, Geo], Flow::Parallel),
        Intent::Planning => (&[Planner], Flow::Single),
        Intent::General => (&[Searcher, Analyst], Flow::Parallel),
    }
}

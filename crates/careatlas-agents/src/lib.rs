//! CareAtlas agents.
//!
//! The intent classifier plus the five analysis agents:
//!
//! - [`analyst::DataAnalyst`] - structured counts, aggregations, IQR ratio
//!   anomalies, single-point-of-failure ranking
//! - [`searcher::SemanticSearcher`] - multi-vector RRF retrieval
//! - [`reasoner::MedicalReasoner`] - constraint validation, two-stage
//!   anomaly detection, red flags, coverage gaps
//! - [`geospatial::GeoAnalyst`] - radius/k-NN, cold spots, medical deserts,
//!   regional equity, city distances
//! - [`planner::Planner`] - emergency routing, 2-opt specialist tours,
//!   equipment distribution, maximin placement, capacity planning
//!
//! Agents receive the corpus and indexes by reference and emit typed
//! [`careatlas_core::types::AgentResult`] records; scheduling is the
//! orchestrator's job.

pub mod analyst;
pub mod classifier;
pub mod geospatial;
pub mod knowledge;
pub mod planner;
pub mod reasoner;
pub mod searcher;

pub use analyst::DataAnalyst;
pub use classifier::{route, IntentClassifier};
pub use geospatial::GeoAnalyst;
pub use planner::Planner;
pub use reasoner::MedicalReasoner;
pub use searcher::SemanticSearcher;

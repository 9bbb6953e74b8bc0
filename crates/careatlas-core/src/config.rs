//! Engine configuration and frozen domain constants.
//!
//! Anything an operator may reasonably tune lives on [`EngineConfig`];
//! everything that is part of the engine's *contract* (fusion constant,
//! statistical thresholds, grid resolutions) lives in [`constants`] so tests
//! can pin it.

use serde::{Deserialize, Serialize};

/// Tunable engine configuration.
///
/// The defaults reproduce the calibrated production behaviour; tests rely on
/// them, so changing a default is a behavioural change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Identifier of the sentence-embedding model the corpus was indexed
    /// with. Recorded so a mismatched query-side model is detectable.
    pub embedding_model_id: String,
    /// Results requested from each named vector are `3 * top_k`.
    pub search_top_k: usize,
    /// Total wall-clock budget for one plan, in milliseconds.
    pub plan_deadline_ms: u64,
    /// Below this classifier confidence the LLM fallback is consulted.
    pub llm_fallback_threshold: f32,
    /// Character budget for the JSON context slice sent to the summarizer.
    pub synthesis_budget_chars: usize,
    /// Seed for the Isolation Forest; fixed for reproducible anomaly runs.
    pub anomaly_seed: u64,
    /// Whether the final LLM synthesis step is attempted at all.
    pub synthesize_summaries: bool,
    /// Use the embedding-similarity classifier pipeline. When off (or when
    /// the embedder is unavailable) classification runs on the regex
    /// fallback alone, which is fully deterministic.
    pub embedding_classifier: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_model_id: "all-MiniLM-L6-v2".to_string(),
            search_top_k: 30,
            plan_deadline_ms: 10_000,
            llm_fallback_threshold: 0.45,
            synthesis_budget_chars: 3_000,
            anomaly_seed: 42,
            synthesize_summaries: true,
            embedding_classifier: true,
        }
    }
}

/// Frozen engine constants. These are contract, not configuration.
pub mod constants {
    /// Embedding dimensionality shared by all three named vectors.
    pub const EMBEDDING_DIM: usize = 384;

    /// Reciprocal Rank Fusion constant: `score(d) = Σ w(v) / (RRF_K + rank)`.
    pub const RRF_K: f64 = 60.0;

    /// Per-query vector weights are normalized so they sum to this.
    pub const WEIGHT_BUDGET: f64 = 3.0;

    /// Mean Earth radius used by every Haversine computation, km.
    pub const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Ghana geography.
    pub mod ghana {
        /// Bounding box: (south, north) latitude in degrees.
        pub const LAT_RANGE: (f64, f64) = (4.74, 11.17);
        /// Bounding box: (west, east) longitude in degrees.
        pub const LNG_RANGE: (f64, f64) = (-3.26, 1.20);
        /// Geographic centroid, the fallback origin for routing.
        pub const CENTER: (f64, f64) = (7.9465, -1.0232);
        /// Accra, the depot every specialist tour starts from.
        pub const ACCRA: (f64, f64) = (5.6037, -0.1870);
    }

    /// Statistical thresholds for the anomaly and equity analyses.
    pub mod stats {
        /// Inverse chi-square CDF at p = 0.975 with 6 degrees of freedom.
        /// Gate for the Mahalanobis stage of facility anomaly detection.
        pub const CHI2_975_6DF: f64 = 14.4494;
        /// Inverse chi-square CDF at p = 0.975 with 4 degrees of freedom.
        /// Gate for the regional equity analysis.
        pub const CHI2_975_4DF: f64 = 11.1433;
        /// Isolation Forest contamination: fraction of points scored as
        /// outliers in stage 1.
        pub const CONTAMINATION: f64 = 0.05;
        /// Trees in the Isolation Forest ensemble.
        pub const FOREST_TREES: usize = 200;
        /// Bed-to-doctor IQR fence never drops below this ratio.
        pub const RATIO_FLOOR: f64 = 20.0;
    }

    /// Geospatial analysis parameters.
    pub mod geo {
        /// Grid step for the cold-spot scan, degrees (~28 km).
        pub const COLD_SPOT_GRID_DEG: f64 = 0.25;
        /// A grid cell is a cold spot past this distance, km.
        pub const COLD_SPOT_KM: f64 = 55.0;
        /// Cold spots reported per scan.
        pub const COLD_SPOT_LIMIT: usize = 15;
        /// A region is a medical desert past this distance, km.
        pub const DESERT_KM: f64 = 75.0;
        /// Desert severity steps: high above this, km.
        pub const DESERT_HIGH_KM: f64 = 100.0;
        /// Desert severity steps: critical above this, km.
        pub const DESERT_CRITICAL_KM: f64 = 150.0;
        /// Radius queries return at most this many facilities.
        pub const RADIUS_RESULT_CAP: usize = 30;
    }

    /// Planner parameters.
    pub mod planning {
        /// Grid step for maximin placement, degrees.
        pub const PLACEMENT_GRID_DEG: f64 = 0.3;
        /// Placement suggestions returned.
        pub const PLACEMENT_LIMIT: usize = 10;
        /// Maximum stops on a specialist tour (excluding the depot).
        pub const MAX_TOUR_STOPS: usize = 8;
        /// 2-opt improvement epsilon: a reversal must shorten the tour by
        /// more than this to be applied.
        pub const TWO_OPT_EPSILON: f64 = 1e-9;
        /// 2-opt gives up after this many full passes.
        pub const TWO_OPT_MAX_PASSES: usize = 1000;
        /// Emergency routing candidate radius, km.
        pub const EMERGENCY_RADIUS_KM: f64 = 100.0;
        /// Assumed average road speed for travel-time estimates, km/h.
        pub const TRAVEL_SPEED_KMH: f64 = 60.0;
    }

    /// Classifier parameters.
    pub mod classify {
        /// Sigmoid steepness in `confidence = sigma(GAIN * (gap - MIDPOINT))`.
        pub const GAIN: f64 = 20.0;
        /// Score gap at which confidence is exactly 0.5.
        pub const MIDPOINT: f64 = 0.05;
        /// No plan is ever reported below this confidence.
        pub const CONFIDENCE_FLOOR: f32 = 0.10;
        /// Secondary intents join the plan above this similarity.
        pub const MULTI_INTENT_SIM: f64 = 0.40;
        /// The LLM fallback's self-reported confidence must reach this.
        pub const LLM_MIN_CONFIDENCE: f32 = 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn rrf_constant_is_sixty() {
        assert!((RRF_K - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ghana_bounding_box_is_ordered() {
        assert!(ghana::LAT_RANGE.0 < ghana::LAT_RANGE.1);
        assert!(ghana::LNG_RANGE.0 < ghana::LNG_RANGE.1);
        let (lat, lng) = ghana::CENTER;
        assert!(lat > ghana::LAT_RANGE.0 && lat < ghana::LAT_RANGE.1);
        assert!(lng > ghana::LNG_RANGE.0 && lng < ghana::LNG_RANGE.1);
    }

    #[test]
    fn chi2_thresholds_match_tables() {
        // Standard chi-square table values at p = 0.975.
        assert!((stats::CHI2_975_6DF - 14.4494).abs() < 1e-3);
        assert!((stats::CHI2_975_4DF - 11.1433).abs() < 1e-3);
    }
}

//! The structured response returned for every query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentResult, Intent, MapPoint};

/// One entry in the execution trace: the router, each agent invocation, and
/// the aggregator each record exactly one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub agent: String,
    pub action: String,
    pub duration_ms: f64,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceStep {
    pub fn new(
        agent: impl Into<String>,
        action: impl Into<String>,
        duration_ms: f64,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            action: action.into(),
            duration_ms,
            summary: summary.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Final engine output: structured results, map-ready facilities, the
/// synthesized summary, and the full trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub query: String,
    pub intent: Intent,
    pub confidence: f32,
    pub agents_used: Vec<String>,
    /// One entry per agent in the plan, keyed by agent name.
    pub agent_results: BTreeMap<String, AgentResult>,
    pub map_facilities: Vec<MapPoint>,
    pub summary: String,
    pub trace: Vec<TraceStep>,
    pub total_duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    /// Set when any agent errored or timed out; surviving results are kept.
    #[serde(default)]
    pub partial: bool,
}

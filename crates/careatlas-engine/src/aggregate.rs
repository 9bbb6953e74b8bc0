//! Aggregation: merge map-ready facilities from every typed result, and
//! produce the final summary (LLM synthesis under a character budget, with
//! a concatenated-facts fallback).

use std::collections::{BTreeMap, HashSet};

use serde_json::json;
use tracing::warn;

use careatlas_core::traits::{ChatMessage, ChatModel};
use careatlas_core::types::{ActionData, AgentResult, MapPoint};

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a healthcare intelligence \
assistant supporting NGO planners working on facility access in Ghana. \
Summarize the structured agent results for a non-technical reader: lead \
with the most important finding, keep concrete numbers, facility names and \
regions, and frame findings in terms of patient access. 3-8 sentences, no \
jargon, no code.";

/// Merge every agent's map points, deduplicating facility-backed points by
/// id and synthetic points by name. First occurrence wins; iteration is in
/// agent-name order, so reruns merge identically.
pub fn merge_map_points(results: &BTreeMap<String, AgentResult>) -> Vec<MapPoint> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut merged = Vec::new();
    for result in results.values() {
        for point in result.data.map_points() {
            let fresh = match &point.id {
                Some(id) => seen_ids.insert(id.clone()),
                None => seen_names.insert(point.name.clone()),
            };
            if fresh {
                merged.push(point);
            }
        }
    }
    merged
}

/// One-sentence trace summary for an action.
pub fn summarize(data: &ActionData) -> String {
    match data {
        ActionData::Count { count, .. } => format!("Found {count} matching facilities"),
        ActionData::RegionAggregation {
            top_region,
            top_count,
            ..
        } => match top_region {
            Some(region) => format!("Top region: {region} with {top_count} facilities"),
            None => "No regions to aggregate".to_string(),
        },
        ActionData::SpecialtyDistribution {
            total_unique_specialties,
            ..
        } => format!("Distribution across {total_unique_specialties} specialties"),
        ActionData::RatioAnomalies {
            anomalies,
            threshold,
            ..
        } => format!(
            "{} facilities above the bed-to-doctor fence of {threshold:.1}",
            anomalies.len()
        ),
        ActionData::RareSpecialties { results, .. } => format!(
            "{} specialties depend on three or fewer facilities",
            results.len()
        ),
        ActionData::Overview {
            total_facilities,
            total_ngos,
            ..
        } => format!("Corpus holds {total_facilities} facilities and {total_ngos} NGOs"),
        ActionData::SemanticSearch {
            hits,
            retried_unfiltered,
            ..
        } => {
            if *retried_unfiltered {
                format!("Found {} matching facilities (retried unfiltered)", hits.len())
            } else {
                format!("Found {} matching facilities", hits.len())
            }
        }
        ActionData::Validation {
            total_checked,
            flagged,
            ..
        } => format!("Validated {total_checked} facilities, {} flagged", flagged.len()),
        ActionData::AnomalyScan {
            total_checked,
            flagged,
            mahalanobis_skipped,
            ..
        } => {
            if *mahalanobis_skipped {
                format!(
                    "Scanned {total_checked} facilities, {} anomalies (single-stage)",
                    flagged.len()
                )
            } else {
                format!(
                    "Scanned {total_checked} facilities, {} anomalies confirmed by both stages",
                    flagged.len()
                )
            }
        }
        ActionData::RedFlags {
            total_scanned,
            flagged,
        } => format!("Scanned {total_scanned} facilities, {} flagged", flagged.len()),
        ActionData::CoverageGaps { gaps, specialty, .. } => format!(
            "Found {} coverage gaps for {}",
            gaps.len(),
            specialty.map(|s| s.as_str()).unwrap_or("all specialties")
        ),
        ActionData::RadiusSearch {
            total_found,
            radius_km,
            ..
        } => format!("Found {total_found} facilities within {radius_km:.0} km"),
        ActionData::NearestFacilities { facilities, .. } => {
            format!("Found {} nearest facilities", facilities.len())
        }
        ActionData::ColdSpots {
            coverage_percentage,
            cold_spots,
            ..
        } => format!(
            "Coverage {coverage_percentage:.1}%, {} cold spots",
            cold_spots.len()
        ),
        ActionData::MedicalDeserts { deserts, .. } => {
            format!("Found {} medical deserts", deserts.len())
        }
        ActionData::RegionalEquity { regions, flagged, .. } => format!(
            "Analyzed {} regions, {} flagged for inequity",
            regions.len(),
            flagged.len()
        ),
        ActionData::CityDistance {
            city_a,
            city_b,
            distance_km,
            ..
        } => format!("{city_a} to {city_b}: {distance_km:.1} km"),
        ActionData::EmergencyRoute {
            primary,
            total_options,
            ..
        } => match primary {
            Some(p) => format!(
                "Primary: {} at {:.1} km, {} options total",
                p.facility.name, p.distance_km, total_options
            ),
            None => "No reachable facility found".to_string(),
        },
        ActionData::SpecialistTour {
            stops,
            total_distance_km,
            ..
        } => format!(
            "{}-stop rotation covering {total_distance_km:.0} km",
            stops.len().saturating_sub(1)
        ),
        ActionData::EquipmentDistribution {
            equipment,
            facilities_without,
            placements,
            ..
        } => format!(
            "{facilities_without} facilities lack {equipment}; {} placements recommended",
            placements.len()
        ),
        ActionData::NewFacilityPlacement { suggestions, .. } => {
            format!("{} placement sites identified by maximin", suggestions.len())
        }
        ActionData::CapacityPlanning {
            critical_regions,
            regions,
        } => format!(
            "{critical_regions} of {} regions critically under-resourced",
            regions.len()
        ),
        ActionData::Failed { error } => format!("Agent failed: {error}"),
    }
}

/// Concatenated-facts summary used whenever the LLM path is off or fails.
pub fn fallback_summary(results: &BTreeMap<String, AgentResult>) -> String {
    let parts: Vec<String> = results
        .values()
        .map(|r| format!("{}.", summarize(&r.data)))
        .collect();
    if parts.is_empty() {
        "Analysis complete.".to_string()
    } else {
        parts.join(" ")
    }
}

/// Serialize the agent results into a JSON context no larger than
/// `budget_chars`, binary-searching the per-list item cap.
pub fn budgeted_context(results: &BTreeMap<String, AgentResult>, budget_chars: usize) -> String {
    let render = |cap: usize| -> String {
        let slimmed: BTreeMap<&String, serde_json::Value> = results
            .iter()
            .map(|(name, result)| {
                let mut value = serde_json::to_value(result).unwrap_or_else(|_| json!({}));
                truncate_lists(&mut value, cap);
                (name, value)
            })
            .collect();
        serde_json::to_string(&slimmed).unwrap_or_default()
    };

    let full = render(usize::MAX);
    if full.len() <= budget_chars {
        return full;
    }

    // Largest item cap whose rendering fits the budget.
    let (mut lo, mut hi) = (0usize, 20usize);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if render(mid).len() <= budget_chars {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let mut out = render(lo);
    out.truncate(budget_chars);
    out
}

fn truncate_lists(value: &mut serde_json::Value, cap: usize) {
    match value {
        serde_json::Value::Array(items) => {
            items.truncate(cap);
            for item in items {
                truncate_lists(item, cap);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                truncate_lists(v, cap);
            }
        }
        _ => {}
    }
}

/// LLM synthesis with graceful degradation to [`fallback_summary`].
pub async fn synthesize(
    chat: &dyn ChatModel,
    query: &str,
    intent: &str,
    results: &BTreeMap<String, AgentResult>,
    budget_chars: usize,
) -> Option<String> {
    let context = budgeted_context(results, budget_chars);
    let user = format!(
        "User question: \"{query}\"\nIntent: {intent}\n\nAgent results (JSON):\n{context}\n\n\
         Write the summary for an NGO healthcare planner."
    );
    match chat
        .chat(
            &[
                ChatMessage::system(SYNTHESIS_SYSTEM_PROMPT),
                ChatMessage::user(user),
            ],
            512,
            0.3,
        )
        .await
    {
        Ok(reply) if !reply.trim().is_empty() => Some(reply.trim().to_string()),
        Ok(_) => None,
        Err(err) => {
            warn!(%err, "summary synthesis unavailable");
            None
        }
    }
}

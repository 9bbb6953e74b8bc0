//! Planner: emergency routing, specialist tours, equipment distribution,
//! placement, and capacity planning.

use std::sync::Arc;

use careatlas_agents::classifier::extract_params;
use careatlas_agents::Planner;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::geo::SpatialIndex;
use careatlas_core::types::{
    ActionData, AgentKind, CapacityStatus, EquipmentTag, Flow, Intent, Plan, Specialty,
};
use careatlas_testkit::fixture_corpus;

fn planner() -> Planner {
    let corpus = Arc::new(CorpusStore::from_snapshot(fixture_corpus()).unwrap());
    let spatial = Arc::new(SpatialIndex::build(&corpus));
    Planner::new(corpus, spatial)
}

fn plan_for(query: &str) -> Plan {
    Plan {
        intent: Intent::Planning,
        confidence: 0.8,
        agents: vec![AgentKind::Planner],
        flow: Flow::Single,
        params: extract_params(query),
    }
}

#[test]
fn specialist_tour_starts_in_accra_and_never_beats_greedy() {
    let query = "Deploy a cardiology specialist across Ghana";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::SpecialistTour {
            specialty,
            stops,
            total_distance_km,
            greedy_distance_km,
            facilities_considered,
        } => {
            assert_eq!(specialty, Some(Specialty::Cardiology));
            assert_eq!(facilities_considered, 4);
            // Depot plus at most eight facility stops.
            assert!(stops.len() <= 9);
            assert_eq!(stops[0].name, "Accra (depot)");
            assert_eq!(stops[0].stop, 0);
            assert!(stops[0].facility.is_none());
            assert!(stops[1..].iter().all(|s| s.facility.is_some()));
            assert!(total_distance_km <= greedy_distance_km + 1e-9);
            // Leg distances add up to the tour length.
            let legs: f64 = stops.iter().map(|s| s.distance_from_prev_km).sum();
            assert!((legs - total_distance_km).abs() < 1e-6);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn emergency_routing_prefers_capability_then_distance() {
    let query = "Emergency: route a cardiology patient near Kumasi";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::EmergencyRoute {
            specialty,
            primary,
            backup,
            alternatives,
            total_options,
            ..
        } => {
            assert_eq!(specialty, Some(Specialty::Cardiology));
            let primary = primary.expect("a cardiology hospital is in range");
            // Komfo Anokye is the only cardiology facility within 100 km
            // of Kumasi.
            assert_eq!(primary.facility.id.as_str(), "komfo-anokye");
            assert!(primary.capability_score >= 55);
            assert_eq!(
                primary.est_travel_min,
                (primary.distance_km / 60.0 * 60.0).round() as u32
            );
            if let Some(backup) = &backup {
                assert!(backup.capability_score <= primary.capability_score);
            }
            assert!(alternatives.len() <= 3);
            assert!(total_options >= 1);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn emergency_routing_defaults_to_the_national_centroid() {
    let query = "urgent emergency routing please";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::EmergencyRoute {
            origin_lat,
            origin_lng,
            ..
        } => {
            assert!((origin_lat - 7.9465).abs() < 1e-6);
            assert!((origin_lng + 1.0232).abs() < 1e-6);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn equipment_distribution_targets_lacking_regions() {
    let query = "Plan the equipment distribution of mri units";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::EquipmentDistribution {
            equipment,
            facilities_with,
            facilities_without,
            placements,
        } => {
            assert_eq!(equipment, EquipmentTag::Mri);
            assert_eq!(facilities_with, 1); // only Korle Bu has an MRI unit
            assert_eq!(facilities_without, 12);
            assert!(placements.len() <= 5);
            // Each placement host is the highest-capacity holdout in its
            // region and must itself lack the equipment.
            for p in &placements {
                assert!(p.facilities_served >= 1);
                assert_ne!(p.facility.id.as_str(), "korle-bu");
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn maximin_placement_ranks_by_gap_size() {
    let query = "Where should we build a new hospital?";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::NewFacilityPlacement { suggestions, .. } => {
            assert_eq!(suggestions.len(), 10);
            for pair in suggestions.windows(2) {
                assert!(pair[0].nearest_existing_km >= pair[1].nearest_existing_km);
            }
            assert_eq!(suggestions[0].rank, 1);
            // The fixture leaves the north-west wide open.
            assert!(suggestions[0].nearest_existing_km > 50.0);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn capacity_planning_grades_regions() {
    let query = "Which regions have bed capacity bottlenecks?";
    let result = planner().run(query, &plan_for(query), 0).unwrap();
    match result.data {
        ActionData::CapacityPlanning {
            regions,
            critical_regions,
        } => {
            assert_eq!(regions.len(), 7);
            // Upper East holds a single zero-bed NGO.
            let upper_east = regions.iter().find(|r| r.region == "Upper East").unwrap();
            assert_eq!(upper_east.status, CapacityStatus::Warning);
            let accra = regions.iter().find(|r| r.region == "Greater Accra").unwrap();
            assert_eq!(accra.status, CapacityStatus::Adequate);
            assert_eq!(
                critical_regions,
                regions
                    .iter()
                    .filter(|r| r.status == CapacityStatus::Critical)
                    .count()
            );
            for pair in regions.windows(2) {
                assert!(pair[0].beds_per_facility <= pair[1].beds_per_facility);
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

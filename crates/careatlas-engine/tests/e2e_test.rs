//! End-to-end scenarios through the full engine: router, agents,
//! self-correction, aggregator. Classification runs on the deterministic
//! regex pipeline; retrieval runs on the stub embedder and the in-memory
//! index.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use careatlas_core::config::EngineConfig;
use careatlas_core::error::CoreResult;
use careatlas_core::geo::haversine_km;
use careatlas_core::stubs::{ScriptedChatModel, UnavailableChatModel};
use careatlas_core::traits::{ScoredPoint, VectorIndex, VectorQuery};
use careatlas_core::types::{ActionData, Intent};
use careatlas_engine::EngineBuilder;
use careatlas_testkit::{fixture_corpus, fixture_corpus_with_population};

fn test_config() -> EngineConfig {
    EngineConfig {
        embedding_classifier: false,
        synthesize_summaries: false,
        ..EngineConfig::default()
    }
}

async fn engine() -> careatlas_engine::QueryEngine {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    EngineBuilder::new(fixture_corpus())
        .config(test_config())
        .build()
        .await
        .unwrap()
}

/// Every agent the plan names appears in both agents_used and
/// agent_results, and the trace holds router + one step per agent +
/// aggregator.
fn assert_trace_shape(response: &careatlas_core::types::Response) {
    assert_eq!(response.trace.first().unwrap().agent, "router");
    assert_eq!(response.trace.last().unwrap().agent, "aggregator");
    assert_eq!(response.trace.len(), response.agents_used.len() + 2);
    for agent in &response.agents_used {
        assert!(
            response.agent_results.contains_key(agent),
            "missing result for {agent}"
        );
    }
}

#[tokio::test]
async fn scenario_count_with_filter() {
    let response = engine()
        .await
        .run("How many hospitals offer cardiology?")
        .await
        .unwrap();
    assert_eq!(response.intent, Intent::Count);
    assert!(response.confidence >= 0.55);
    assert_eq!(response.agents_used, vec!["analyst"]);
    assert_trace_shape(&response);
    match &response.agent_results["analyst"].data {
        ActionData::Count { count, .. } => assert_eq!(*count, 3),
        other => panic!("unexpected action {}", other.name()),
    }
    assert!(!response.partial);
}

#[tokio::test]
async fn scenario_negation() {
    let response = engine()
        .await
        .run("Facilities in Ashanti without orthopedic services")
        .await
        .unwrap();
    assert_eq!(response.intent, Intent::Count);
    match &response.agent_results["analyst"].data {
        ActionData::Count {
            count,
            facilities,
            filters,
        } => {
            assert!(filters.negated);
            assert_eq!(*count, 1);
            assert_eq!(facilities[0].id.as_str(), "bekwai-general");
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn scenario_radius() {
    let response = engine()
        .await
        .run("Hospitals within 30 km of Tamale")
        .await
        .unwrap();
    assert_eq!(response.agents_used, vec!["geo"]);
    match &response.agent_results["geo"].data {
        ActionData::RadiusSearch {
            center_lat,
            center_lng,
            facilities,
            ..
        } => {
            let center = (*center_lat, *center_lng);
            assert!(!facilities.is_empty());
            for f in facilities {
                let d = haversine_km(center, (f.latitude.unwrap(), f.longitude.unwrap()));
                assert!(d <= 30.0 + 1e-6);
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
    // The radius hits reach the map layer.
    assert!(!response.map_facilities.is_empty());
}

#[tokio::test]
async fn scenario_semantic_fusion() {
    let response = engine()
        .await
        .run("facility with cardiac catheterization")
        .await
        .unwrap();
    assert_eq!(response.agents_used, vec!["searcher"]);
    match &response.agent_results["searcher"].data {
        ActionData::SemanticSearch {
            method, weights, ..
        } => {
            assert_eq!(method, "reciprocal_rank_fusion");
            assert!((weights.sum() - 3.0).abs() < 1e-6);
            assert!(weights.clinical_detail > weights.full_document);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn scenario_two_stage_anomaly() {
    let engine = EngineBuilder::new(fixture_corpus_with_population(30))
        .config(test_config())
        .build()
        .await
        .unwrap();
    let response = engine
        .run("Find suspicious facility capability claims")
        .await
        .unwrap();
    assert_eq!(response.intent, Intent::AnomalyDetection);
    assert_eq!(response.agents_used, vec!["analyst", "validator"]);
    match &response.agent_results["validator"].data {
        ActionData::AnomalyScan {
            flagged,
            stage1_outliers,
            mahalanobis_skipped,
            ..
        } => {
            assert!(!mahalanobis_skipped);
            assert!(flagged.len() <= *stage1_outliers);
            let wonder = flagged
                .iter()
                .find(|r| r.facility.id.as_str() == "hohoe-wonder")
                .expect("planted anomaly flagged");
            assert!(wonder
                .reasons
                .iter()
                .any(|r| r == "procedures > 15 && capacity < 20"));
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn scenario_planning_two_opt() {
    let response = engine()
        .await
        .run("Deploy a cardiology specialist across Ghana")
        .await
        .unwrap();
    assert_eq!(response.intent, Intent::Planning);
    assert_eq!(response.agents_used, vec!["planner"]);
    match &response.agent_results["planner"].data {
        ActionData::SpecialistTour {
            stops,
            total_distance_km,
            greedy_distance_km,
            ..
        } => {
            assert!(*total_distance_km <= greedy_distance_km + 1e-9);
            assert!(!stops.is_empty());
            assert_eq!(stops[0].name, "Accra (depot)");
            assert!(stops.len() - 1 <= 8);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn self_correction_retries_unfiltered_exactly_once() {
    // Psychiatry exists only in Ho (Volta); asking for it in Tamale makes
    // the filtered pass empty, so the orchestrator strips the geocodable
    // qualifier and retries without filters.
    let response = engine()
        .await
        .run("psychiatric care in Tamale")
        .await
        .unwrap();
    let searcher = response
        .agent_results
        .get("searcher")
        .expect("searcher in plan");
    match &searcher.data {
        ActionData::SemanticSearch {
            retried_unfiltered,
            filters,
            hits,
            ..
        } => {
            assert!(retried_unfiltered);
            assert!(filters.is_empty());
            assert!(!hits.is_empty());
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn reruns_are_deterministic() {
    let engine = engine().await;
    let a = engine.run("How many hospitals offer cardiology?").await.unwrap();
    let b = engine.run("How many hospitals offer cardiology?").await.unwrap();
    assert_eq!(a.intent, b.intent);
    assert_eq!(a.agents_used, b.agents_used);
    let ids = |r: &careatlas_core::types::Response| -> HashSet<String> {
        r.map_facilities
            .iter()
            .map(|p| p.name.clone())
            .collect()
    };
    assert_eq!(ids(&a), ids(&b));
}

#[tokio::test]
async fn boundary_rejects_bad_input() {
    let engine = engine().await;
    assert!(engine.run("   ").await.is_err());
    let long = "x".repeat(2001);
    assert!(engine.run(&long).await.is_err());
}

#[tokio::test]
async fn llm_summary_with_fallback_on_outage() {
    let scripted = Arc::new(ScriptedChatModel::single("Three hospitals offer cardiology."));
    let engine = EngineBuilder::new(fixture_corpus())
        .config(EngineConfig {
            embedding_classifier: false,
            ..EngineConfig::default()
        })
        .chat_model(scripted.clone())
        .build()
        .await
        .unwrap();
    let response = engine
        .run("How many hospitals offer cardiology?")
        .await
        .unwrap();
    assert_eq!(response.summary, "Three hospitals offer cardiology.");
    assert_eq!(scripted.calls(), 1);

    let engine = EngineBuilder::new(fixture_corpus())
        .config(EngineConfig {
            embedding_classifier: false,
            ..EngineConfig::default()
        })
        .chat_model(Arc::new(UnavailableChatModel))
        .build()
        .await
        .unwrap();
    let response = engine
        .run("How many hospitals offer cardiology?")
        .await
        .unwrap();
    // Degraded summary: concatenated facts, never empty.
    assert!(response.summary.contains("Found 3 matching facilities"));
    assert!(!response.partial);
}

#[tokio::test]
async fn exhausted_deadline_marks_the_response_partial() {
    let engine = EngineBuilder::new(fixture_corpus())
        .config(EngineConfig {
            embedding_classifier: false,
            synthesize_summaries: false,
            plan_deadline_ms: 0,
            ..EngineConfig::default()
        })
        .build()
        .await
        .unwrap();
    let response = engine
        .run("How many hospitals offer cardiology?")
        .await
        .unwrap();
    assert!(response.partial);
    match &response.agent_results["analyst"].data {
        ActionData::Failed { error } => assert!(error.contains("deadline")),
        other => panic!("unexpected action {}", other.name()),
    }
    // The trace still records the failed step.
    assert!(response
        .trace
        .iter()
        .any(|s| s.agent == "analyst" && s.error.is_some()));
}

/// A vector index that hangs long enough to trip the plan deadline.
struct SlowIndex;

#[async_trait]
impl VectorIndex for SlowIndex {
    async fn search(&self, _query: VectorQuery) -> CoreResult<Vec<ScoredPoint>> {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn slow_collaborator_times_out_but_the_plan_survives() {
    let engine = EngineBuilder::new(fixture_corpus())
        .config(EngineConfig {
            embedding_classifier: false,
            synthesize_summaries: false,
            plan_deadline_ms: 50,
            ..EngineConfig::default()
        })
        .vector_index(Arc::new(SlowIndex))
        .build()
        .await
        .unwrap();
    // SERVICE_SEARCH plans searcher then analyst. The searcher burns the
    // whole plan budget and times out; the rest of the plan is skipped but
    // every planned agent still has a (failed) entry and the aggregator
    // still produces a response.
    let response = engine
        .run("Facilities offering cataract surgery")
        .await
        .unwrap();
    assert!(response.partial);
    assert_eq!(response.agents_used, vec!["searcher", "analyst"]);
    assert!(matches!(
        response.agent_results["searcher"].data,
        ActionData::Failed { .. }
    ));
    assert!(response.agent_results.contains_key("analyst"));
    assert_eq!(response.trace.last().unwrap().agent, "aggregator");
}

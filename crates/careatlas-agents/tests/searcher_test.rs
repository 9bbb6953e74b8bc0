//! Semantic searcher: fusion invariants and filter behaviour against the
//! in-memory index.

use std::collections::HashSet;
use std::sync::Arc;

use careatlas_agents::classifier::extract_params;
use careatlas_agents::SemanticSearcher;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::stubs::{InMemoryVectorIndex, StubEmbedder};
use careatlas_core::types::{ActionData, AgentKind, Flow, Intent, Plan};
use careatlas_testkit::fixture_corpus;

async fn searcher() -> SemanticSearcher {
    let corpus = Arc::new(CorpusStore::from_snapshot(fixture_corpus()).unwrap());
    let embedder = Arc::new(StubEmbedder::new());
    let index = Arc::new(
        InMemoryVectorIndex::build(&corpus, embedder.clone())
            .await
            .unwrap(),
    );
    SemanticSearcher::new(corpus, embedder, index, 30)
}

fn plan_for(query: &str, intent: Intent) -> Plan {
    Plan {
        intent,
        confidence: 0.8,
        agents: vec![AgentKind::Searcher],
        flow: Flow::Single,
        params: extract_params(query),
    }
}

#[tokio::test]
async fn fusion_invariants_hold() {
    let query = "facility with cardiac catheterization";
    let result = searcher()
        .await
        .run(query, &plan_for(query, Intent::FacilityLookup), 0)
        .await
        .unwrap();
    match result.data {
        ActionData::SemanticSearch {
            method,
            weights,
            hits,
            retried_unfiltered,
            ..
        } => {
            assert_eq!(method, "reciprocal_rank_fusion");
            assert!(!retried_unfiltered);
            // Normalized weights sum to 3.0 and the catheterization
            // keyword boosts the clinical vector past full_document.
            assert!((weights.sum() - 3.0).abs() < 1e-6);
            assert!(weights.clinical_detail > weights.full_document);

            assert!(!hits.is_empty());
            // Sorted by fused score, no duplicate facilities.
            for pair in hits.windows(2) {
                assert!(pair[0].rrf_score >= pair[1].rrf_score);
            }
            let ids: HashSet<_> = hits.iter().map(|h| h.facility.id.clone()).collect();
            assert_eq!(ids.len(), hits.len());
            for hit in &hits {
                assert!(hit.display_score <= 1.0);
                assert!((hit.display_score - (hit.rrf_score * 100.0).min(1.0)).abs() < 1e-9);
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn location_filter_restricts_hits() {
    let query = "hospitals in Kumasi";
    let result = searcher()
        .await
        .run(query, &plan_for(query, Intent::FacilityLookup), 0)
        .await
        .unwrap();
    match result.data {
        ActionData::SemanticSearch { hits, filters, .. } => {
            assert_eq!(filters.region.as_deref(), Some("Kumasi"));
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].facility.id.as_str(), "komfo-anokye");
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn search_is_deterministic() {
    let s = searcher().await;
    let query = "clinics that provide cataract surgery";
    let plan = plan_for(query, Intent::ServiceSearch);
    let a = s.run(query, &plan, 0).await.unwrap();
    let b = s.run(query, &plan, 0).await.unwrap();
    let ids = |r: &careatlas_core::types::AgentResult| -> Vec<String> {
        match &r.data {
            ActionData::SemanticSearch { hits, .. } => hits
                .iter()
                .map(|h| h.facility.id.as_str().to_string())
                .collect(),
            _ => panic!("unexpected action"),
        }
    };
    assert_eq!(ids(&a), ids(&b));
}

#[tokio::test]
async fn unfiltered_retry_pass_carries_no_filters() {
    let s = searcher().await;
    // Direct unfiltered pass, as the orchestrator's retry edge invokes it.
    let result = s.search("dialysis in Kumasi", false, 0).await.unwrap();
    match result.data {
        ActionData::SemanticSearch { filters, hits, .. } => {
            assert!(filters.region.is_none());
            assert!(filters.specialty.is_none());
            assert!(!hits.is_empty());
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[tokio::test]
async fn citations_reference_the_step() {
    let query = "maternal health services";
    let result = searcher()
        .await
        .run(query, &plan_for(query, Intent::ServiceSearch), 4)
        .await
        .unwrap();
    assert!(!result.citations.is_empty());
    assert!(result.citations.iter().all(|c| c.step_index == 4));
}

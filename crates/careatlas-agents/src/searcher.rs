//! Semantic searcher: multi-vector retrieval fused by normalized weighted
//! Reciprocal Rank Fusion.
//!
//! Three named vectors are queried with vector-specific templates; their
//! contributions are weighted by query-type keyword hits and normalized so
//! the weights always sum to 3.0, preventing any single representation from
//! dominating the fusion.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use careatlas_core::config::constants::{RRF_K, WEIGHT_BUDGET};
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::CoreResult;
use careatlas_core::extract::{self, contains_word};
use careatlas_core::traits::{PayloadFilter, TextEmbedder, VectorIndex, VectorName, VectorQuery};
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, Citation, FacilityId, FacilityRef, FilterSummary,
    Intent, Plan, SearchHit, Specialty, VectorWeights,
};

use crate::knowledge::{CLINICAL_KEYWORDS, SPECIALTY_KEYWORDS};

/// Per-vector keyword boosts are capped here.
const MAX_KEYWORD_BOOST: usize = 3;

pub struct SemanticSearcher {
    corpus: Arc<CorpusStore>,
    embedder: Arc<dyn TextEmbedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl SemanticSearcher {
    pub fn new(
        corpus: Arc<CorpusStore>,
        embedder: Arc<dyn TextEmbedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            corpus,
            embedder,
            index,
            top_k,
        }
    }

    pub async fn run(&self, query: &str, plan: &Plan, step: usize) -> CoreResult<AgentResult> {
        // Service searches are phrased the way service documents were
        // indexed, which closes most of the phrasing gap.
        let query_text = if plan.intent == Intent::ServiceSearch {
            format!("facility offering {query}")
        } else {
            query.to_string()
        };
        self.search(&query_text, true, step).await
    }

    /// One fused search pass. `apply_filters = false` is the orchestrator's
    /// self-correction retry: same fusion, no payload predicates.
    pub async fn search(
        &self,
        query: &str,
        apply_filters: bool,
        step: usize,
    ) -> CoreResult<AgentResult> {
        let filter = if apply_filters {
            build_filter(query)
        } else {
            PayloadFilter::default()
        };
        let weights = fusion_weights(query);

        // Fused candidate pool: top 3K per vector.
        let fetch = self.top_k * 3;
        let mut fused: BTreeMap<FacilityId, f64> = BTreeMap::new();
        for vector in VectorName::ALL {
            let template = query_template(vector, query);
            let embedding = self.embedder.embed(&template).await?;
            let hits = self
                .index
                .search(VectorQuery {
                    vector,
                    embedding,
                    filter: filter.clone(),
                    limit: fetch,
                })
                .await?;
            let weight = weight_for(&weights, vector);
            for (rank, hit) in hits.iter().enumerate() {
                *fused.entry(hit.id.clone()).or_default() +=
                    weight / (RRF_K + (rank + 1) as f64);
            }
        }

        let mut ranked: Vec<(FacilityId, f64)> = fused.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.top_k);

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .filter_map(|(id, rrf_score)| {
                let facility = self.corpus.get(&id)?;
                Some(SearchHit {
                    facility: FacilityRef::from_facility(facility),
                    rrf_score,
                    display_score: (rrf_score * 100.0).min(1.0),
                })
            })
            .collect();

        let citations = hits
            .iter()
            .map(|h| Citation {
                facility_id: h.facility.id.clone(),
                field: "document".to_string(),
                value: format!("rrf={:.4}", h.rrf_score),
                confidence: h.display_score as f32,
                step_index: step,
            })
            .collect();

        debug!(
            hits = hits.len(),
            filtered = apply_filters && !filter.is_empty(),
            "semantic search done"
        );

        let data = ActionData::SemanticSearch {
            method: "reciprocal_rank_fusion".to_string(),
            weights,
            filters: FilterSummary {
                specialty: filter.specialties.first().copied(),
                region: filter.city_or_region.clone(),
                facility_type: filter.facility_type,
                organization_type: filter.organization_type.clone(),
                negated: false,
            },
            retried_unfiltered: false,
            hits,
        };
        Ok(AgentResult::new(AgentKind::Searcher, data).with_citations(citations))
    }
}

/// Vector-specific query templates, mirroring the index-time document
/// formats.
fn query_template(vector: VectorName, query: &str) -> String {
    match vector {
        VectorName::FullDocument => query.to_string(),
        VectorName::ClinicalDetail => format!("Procedures: {query} | Equipment: {query}"),
        VectorName::SpecialtiesContext => format!("facility with specialties: {query}"),
    }
}

/// Raw weights (base 1.0 plus capped keyword hits) normalized to sum to
/// [`WEIGHT_BUDGET`].
fn fusion_weights(query: &str) -> VectorWeights {
    let lower = query.to_lowercase();
    let clinical_hits = CLINICAL_KEYWORDS
        .iter()
        .filter(|kw| contains_word(&lower, kw))
        .count()
        .min(MAX_KEYWORD_BOOST);
    let specialty_hits = SPECIALTY_KEYWORDS
        .iter()
        .filter(|kw| contains_word(&lower, kw))
        .count()
        .min(MAX_KEYWORD_BOOST);

    let raw_full = 1.0;
    let raw_clinical = 1.0 + clinical_hits as f64;
    let raw_specialty = 1.0 + specialty_hits as f64;
    let scale = WEIGHT_BUDGET / (raw_full + raw_clinical + raw_specialty);

    VectorWeights {
        full_document: raw_full * scale,
        clinical_detail: raw_clinical * scale,
        specialties_context: raw_specialty * scale,
    }
}

fn weight_for(weights: &VectorWeights, vector: VectorName) -> f64 {
    match vector {
        VectorName::FullDocument => weights.full_document,
        VectorName::ClinicalDetail => weights.clinical_detail,
        VectorName::SpecialtiesContext => weights.specialties_context,
    }
}

/// Payload filter extracted from the query text.
fn build_filter(query: &str) -> PayloadFilter {
    let lower = query.to_lowercase();

    let organization_type = if contains_word(&lower, "ngo")
        || contains_word(&lower, "foundation")
        || lower.contains("non-governmental")
    {
        Some("ngo".to_string())
    } else {
        None
    };

    let specialties: Vec<Specialty> = Specialty::ALL
        .into_iter()
        .filter(|tag| tag.keywords().iter().any(|kw| contains_word(&lower, kw)))
        .collect();

    PayloadFilter {
        organization_type,
        facility_type: extract::extract_facility_type(query),
        city_or_region: extract::extract_region(query),
        specialties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_always_sum_to_budget() {
        for query in [
            "facility with cardiac catheterization",
            "hospitals in Accra",
            "mri ct scan ultrasound ventilator icu",
            "cardiology dermatology psychiatry units",
            "",
        ] {
            let w = fusion_weights(query);
            assert!((w.sum() - WEIGHT_BUDGET).abs() < 1e-6, "query: {query}");
        }
    }

    #[test]
    fn clinical_keywords_boost_the_clinical_vector() {
        let w = fusion_weights("facility with cardiac catheterization");
        assert!(
            w.clinical_detail > w.full_document,
            "clinical {} vs full {}",
            w.clinical_detail,
            w.full_document
        );
    }

    #[test]
    fn keyword_boost_is_capped() {
        // Five clinical keywords, but the boost caps at three.
        let w = fusion_weights("mri ct scan ultrasound ventilator icu");
        let uncapped = fusion_weights("mri ultrasound ventilator");
        assert!((w.clinical_detail - uncapped.clinical_detail).abs() < 1e-9);
    }

    #[test]
    fn filter_extraction_covers_all_fields() {
        let f = build_filter("NGO clinics in Cape Coast offering cardiology");
        assert_eq!(f.organization_type.as_deref(), Some("ngo"));
        assert_eq!(
            f.facility_type,
            Some(careatlas_core::types::FacilityType::Clinic)
        );
        assert_eq!(f.city_or_region.as_deref(), Some("Cape Coast"));
        assert_eq!(f.specialties, vec![Specialty::Cardiology]);
    }

    #[test]
    fn plain_queries_produce_empty_filters() {
        assert!(build_filter("anything interesting nearby").is_empty());
    }
}

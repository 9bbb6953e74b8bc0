//! In-memory vector index.
//!
//! Embeds the three per-facility text templates at construction and answers
//! searches with a filtered cosine scan. Optimized for correctness, not
//! throughput; the production index is a remote service behind the same
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::corpus::CorpusStore;
use crate::error::CoreResult;
use crate::traits::{
    cosine_similarity, PayloadFilter, ScoredPoint, TextEmbedder, VectorIndex, VectorName,
    VectorQuery,
};
use crate::types::{FacilityId, FacilityType, Specialty};

struct IndexedFacility {
    id: FacilityId,
    organization_type: Option<String>,
    facility_type: FacilityType,
    city: Option<String>,
    region: Option<String>,
    specialties: Vec<Specialty>,
    vectors: HashMap<VectorName, Vec<f32>>,
}

pub struct InMemoryVectorIndex {
    points: Vec<IndexedFacility>,
}

impl InMemoryVectorIndex {
    /// Embed every facility's three templates and build the index.
    pub async fn build(
        corpus: &CorpusStore,
        embedder: Arc<dyn TextEmbedder>,
    ) -> CoreResult<Self> {
        let mut points = Vec::with_capacity(corpus.len());
        for facility in corpus.all() {
            let mut vectors = HashMap::with_capacity(3);
            for (name, text) in [
                (VectorName::FullDocument, facility.document_text()),
                (VectorName::ClinicalDetail, facility.clinical_text()),
                (VectorName::SpecialtiesContext, facility.specialty_text()),
            ] {
                vectors.insert(name, embedder.embed(&text).await?);
            }
            points.push(IndexedFacility {
                id: facility.id.clone(),
                organization_type: facility
                    .organization_type
                    .as_ref()
                    .map(|s| s.to_lowercase()),
                facility_type: facility.facility_type,
                city: facility.city.as_ref().map(|s| s.to_lowercase()),
                region: facility.region.as_ref().map(|s| s.to_lowercase()),
                specialties: facility.specialties.iter().copied().collect(),
                vectors,
            });
        }
        debug!(points = points.len(), "in-memory vector index built");
        Ok(Self { points })
    }

    fn matches(point: &IndexedFacility, filter: &PayloadFilter) -> bool {
        if let Some(org) = &filter.organization_type {
            if point.organization_type.as_deref() != Some(org.to_lowercase().as_str()) {
                return false;
            }
        }
        if let Some(ftype) = filter.facility_type {
            if point.facility_type != ftype {
                return false;
            }
        }
        if let Some(place) = &filter.city_or_region {
            let wanted = place.to_lowercase();
            let city_hit = point.city.as_deref() == Some(wanted.as_str());
            let region_hit = point.region.as_deref() == Some(wanted.as_str());
            if !city_hit && !region_hit {
                return false;
            }
        }
        if !filter.specialties.is_empty()
            && !filter
                .specialties
                .iter()
                .any(|s| point.specialties.contains(s))
        {
            return false;
        }
        true
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(&self, query: VectorQuery) -> CoreResult<Vec<ScoredPoint>> {
        let mut hits: Vec<ScoredPoint> = self
            .points
            .iter()
            .filter(|p| Self::matches(p, &query.filter))
            .filter_map(|p| {
                let vector = p.vectors.get(&query.vector)?;
                Some(ScoredPoint {
                    id: p.id.clone(),
                    score: cosine_similarity(&query.embedding, vector),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::StubEmbedder;
    use crate::types::Facility;
    use std::collections::BTreeSet;

    fn facility(id: &str, city: &str, specialty: Specialty, procedures: &[&str]) -> Facility {
        let mut specialties = BTreeSet::new();
        specialties.insert(specialty);
        Facility {
            id: FacilityId::new(id),
            name: format!("Facility {id}"),
            city: Some(city.to_string()),
            region: Some("Greater Accra".to_string()),
            facility_type: FacilityType::Hospital,
            organization_type: Some("facility".into()),
            specialties,
            procedures: procedures.iter().map(|s| s.to_string()).collect(),
            equipment: vec![],
            capabilities: vec![],
            capacity: 20,
            doctors: 4,
            latitude: Some(5.6),
            longitude: Some(-0.2),
        }
    }

    async fn build_index() -> InMemoryVectorIndex {
        let corpus = CorpusStore::from_snapshot(vec![
            facility("a", "Accra", Specialty::Cardiology, &["cardiac catheterization"]),
            facility("b", "Kumasi", Specialty::Dialysis, &["hemodialysis"]),
        ])
        .unwrap();
        InMemoryVectorIndex::build(&corpus, Arc::new(StubEmbedder::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn filter_restricts_candidates() {
        let index = build_index().await;
        let embedder = StubEmbedder::new();
        let query = VectorQuery {
            vector: VectorName::ClinicalDetail,
            embedding: embedder.embed("cardiac catheterization").await.unwrap(),
            filter: PayloadFilter {
                city_or_region: Some("Kumasi".to_string()),
                ..Default::default()
            },
            limit: 10,
        };
        let hits = index.search(query).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn similarity_orders_results() {
        let index = build_index().await;
        let embedder = StubEmbedder::new();
        let query = VectorQuery {
            vector: VectorName::ClinicalDetail,
            embedding: embedder
                .embed("Procedures: cardiac catheterization | Equipment: cardiac catheterization")
                .await
                .unwrap(),
            filter: PayloadFilter::default(),
            limit: 10,
        };
        let hits = index.search(query).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id.as_str(), "a");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn region_side_of_the_or_matches() {
        let index = build_index().await;
        let embedder = StubEmbedder::new();
        let query = VectorQuery {
            vector: VectorName::FullDocument,
            embedding: embedder.embed("any facility").await.unwrap(),
            filter: PayloadFilter {
                city_or_region: Some("Greater Accra".to_string()),
                ..Default::default()
            },
            limit: 10,
        };
        // Both facilities sit in the Greater Accra region payload field.
        assert_eq!(index.search(query).await.unwrap().len(), 2);
    }
}

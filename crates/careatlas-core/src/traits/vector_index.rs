//! Vector index seam.
//!
//! The production index is a remote service; the engine only depends on the
//! search RPC modeled here. Three named vectors exist per facility, built
//! from distinct text templates at index time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::types::{FacilityId, FacilityType, Specialty};

/// The three named vectors stored per facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorName {
    FullDocument,
    ClinicalDetail,
    SpecialtiesContext,
}

impl VectorName {
    pub const ALL: [VectorName; 3] = [
        VectorName::FullDocument,
        VectorName::ClinicalDetail,
        VectorName::SpecialtiesContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VectorName::FullDocument => "full_document",
            VectorName::ClinicalDetail => "clinical_detail",
            VectorName::SpecialtiesContext => "specialties_context",
        }
    }
}

/// Equality / set-membership predicates over the indexed payload fields.
///
/// `city_or_region` is an OR across the two location fields: users type
/// city names where regions belong and vice versa, and matching both sides
/// avoids false-zero results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    pub organization_type: Option<String>,
    pub facility_type: Option<FacilityType>,
    pub city_or_region: Option<String>,
    pub specialties: Vec<Specialty>,
}

impl PayloadFilter {
    pub fn is_empty(&self) -> bool {
        self.organization_type.is_none()
            && self.facility_type.is_none()
            && self.city_or_region.is_none()
            && self.specialties.is_empty()
    }
}

/// One search request against a named vector.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: VectorName,
    pub embedding: Vec<f32>,
    pub filter: PayloadFilter,
    pub limit: usize,
}

/// One hit: facility id plus raw similarity score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: FacilityId,
    pub score: f64,
}

/// Search RPC over the facility collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`limit` facilities by similarity under the filter, best first.
    async fn search(&self, query: VectorQuery) -> CoreResult<Vec<ScoredPoint>>;
}

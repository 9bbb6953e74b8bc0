//! CareAtlas core library.
//!
//! Provides the domain model and infrastructure the agents build on:
//!
//! - Domain types ([`types::Facility`], the closed [`types::Specialty`] /
//!   [`types::EquipmentTag`] vocabularies, [`types::Plan`],
//!   [`types::AgentResult`], [`types::Response`])
//! - The immutable [`corpus::CorpusStore`] with derived attribute indices
//! - Query-text extractors and the gazetteer [`geocode::Gazetteer`]
//! - Geospatial primitives ([`geo::BallTree`], [`geo::SpatialIndex`])
//! - Statistics ([`stats::IsolationForest`], Mahalanobis helpers)
//! - Collaborator traits ([`traits::TextEmbedder`], [`traits::VectorIndex`],
//!   [`traits::ChatModel`]) and their stub implementations
//!
//! # Example
//!
//! ```
//! use careatlas_core::geo::haversine_km;
//!
//! let accra = (5.6037, -0.1870);
//! let tamale = (9.4034, -0.8393);
//! assert!(haversine_km(accra, tamale) > 400.0);
//! ```

pub mod config;
pub mod corpus;
pub mod error;
pub mod extract;
pub mod geo;
pub mod geocode;
pub mod stats;
pub mod stubs;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};

//! Plugin Discovery
//!
//! Read-only queries over the registry:
//! - Keyword ranking with suggested categories
//! - Similar plugins
//! - Fused recommendations
//! - Faceted search

pub mod query;
pub mod scoring;
pub mod service;

pub use query::{
    DiscoveryQuery, DiscoveryResult, FacetCount, Recommendation, RecommendationContext,
    RecommendationResult, RecommendationSource, ScoredPlugin, SearchFacets, SearchRequest,
    SearchResponse, SimilarPlugin, SortStrategy, UserProfile,
};
pub use service::DiscoveryService;

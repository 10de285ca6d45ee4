//! Discovery request and response types.

use crate::core::{now, Timestamp};
use crate::model::PluginRegistration;
use serde::{Deserialize, Serialize};

/// Result ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStrategy {
    /// Highest relevance score first
    #[default]
    Relevance,
    /// Highest request count first
    Popularity,
    /// Most recently registered first
    Date,
}

/// Keyword and capability query over active plugins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryQuery {
    /// Keywords matched against name, description and tags
    pub keywords: Vec<String>,
    /// Restrict to a category
    pub category: Option<String>,
    /// Permissions that raise the score when held
    pub required_permissions: Vec<String>,
    /// Ids to leave out
    pub exclude_ids: Vec<String>,
    /// Ordering
    pub sort_by: SortStrategy,
    /// Maximum results
    pub max_results: usize,
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            category: None,
            required_permissions: Vec::new(),
            exclude_ids: Vec::new(),
            sort_by: SortStrategy::Relevance,
            max_results: 20,
        }
    }
}

impl DiscoveryQuery {
    /// Create a query from whitespace-separated keywords.
    pub fn new(text: &str) -> Self {
        Self {
            keywords: text.split_whitespace().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    /// Restrict to a category.
    pub fn in_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Prefer plugins holding a permission.
    pub fn requiring(mut self, permission: &str) -> Self {
        self.required_permissions.push(permission.to_string());
        self
    }

    /// Exclude an id.
    pub fn excluding(mut self, id: &str) -> Self {
        self.exclude_ids.push(id.to_string());
        self
    }

    /// Set ordering.
    pub fn sorted_by(mut self, sort_by: SortStrategy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Set result cap.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// A plugin with its relevance score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPlugin {
    /// Registration snapshot
    pub plugin: PluginRegistration,
    /// Relevance score, at least 1
    pub score: f64,
}

/// Answer to a [`DiscoveryQuery`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Ranked plugins
    pub plugins: Vec<ScoredPlugin>,
    /// Matches before truncation
    pub total: usize,
    /// Well-populated categories
    pub suggested_categories: Vec<String>,
}

/// A plugin with its similarity to a reference plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarPlugin {
    /// Registration snapshot
    pub plugin: PluginRegistration,
    /// Similarity in `[0.3, 1.0]`
    pub similarity: f64,
}

/// What is known about the user asking for recommendations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// User ID
    pub user_id: String,
    /// Plugins the user already installed
    pub installed_plugins: Vec<String>,
    /// Tags the user prefers
    pub preferred_tags: Vec<String>,
}

impl UserProfile {
    /// Create an empty profile.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }

    /// Add an installed plugin.
    pub fn with_installed(mut self, plugin_id: &str) -> Self {
        self.installed_plugins.push(plugin_id.to_string());
        self
    }

    /// Add a preferred tag.
    pub fn with_preferred_tag(mut self, tag: &str) -> Self {
        self.preferred_tags.push(tag.to_string());
        self
    }

    /// True if the plugin is already installed.
    pub fn has_installed(&self, plugin_id: &str) -> bool {
        self.installed_plugins.iter().any(|id| id == plugin_id)
    }
}

/// Where a recommendation is made.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationContext {
    /// Project type, compared with plugin categories
    pub project_type: Option<String>,
}

impl RecommendationContext {
    /// Context for a project type.
    pub fn for_project(project_type: &str) -> Self {
        Self {
            project_type: Some(project_type.to_string()),
        }
    }
}

/// Strategy that produced a recommendation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Not yet installed by the user
    Collaborative,
    /// Matches project type or preferred tags
    ContentBased,
    /// Among the most used plugins
    Popularity,
}

/// A single recommendation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Registration snapshot
    pub plugin: PluginRegistration,
    /// Confidence in `(0, 1]`
    pub confidence: f64,
    /// Producing strategy
    pub source: RecommendationSource,
    /// Human-readable reason
    pub reason: String,
}

/// Fused recommendations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// Recommendations, highest confidence first
    pub recommendations: Vec<Recommendation>,
    /// Mean confidence, zero when empty
    pub confidence: f64,
    /// When the result was produced
    pub generated_at: Timestamp,
}

impl RecommendationResult {
    /// Build a result and compute its mean confidence.
    pub fn new(recommendations: Vec<Recommendation>) -> Self {
        let confidence = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.confidence).sum::<f64>() / recommendations.len() as f64
        };
        Self {
            recommendations,
            confidence,
            generated_at: now(),
        }
    }
}

/// Free-text search with facets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Free text; empty matches everything
    pub query: String,
    /// Restrict to a category
    pub category: Option<String>,
    /// Restrict to an author
    pub author: Option<String>,
    /// Match if any of these tags is present
    pub tags: Vec<String>,
    /// Ordering
    pub sort_by: SortStrategy,
    /// Page size
    pub limit: usize,
    /// Page offset
    pub offset: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            category: None,
            author: None,
            tags: Vec::new(),
            sort_by: SortStrategy::Relevance,
            limit: 20,
            offset: 0,
        }
    }
}

impl SearchRequest {
    /// Create a search for some text.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    /// Restrict to a category.
    pub fn in_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Restrict to an author.
    pub fn by_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    /// Set ordering.
    pub fn sorted_by(mut self, sort_by: SortStrategy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Set page.
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// A facet value and how many results carry it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    /// Facet value
    pub value: String,
    /// Matching results
    pub count: usize,
}

/// Facets over all matches, before pagination.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFacets {
    /// Category counts
    pub categories: Vec<FacetCount>,
    /// Author counts
    pub authors: Vec<FacetCount>,
}

/// Answer to a [`SearchRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Current page
    pub plugins: Vec<PluginRegistration>,
    /// Matches before pagination
    pub total: usize,
    /// Category and author facets
    pub facets: SearchFacets,
}

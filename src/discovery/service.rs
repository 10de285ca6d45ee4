//! Discovery service.
//!
//! Answers find, similar, recommend and search requests against live
//! registry snapshots. Only `active` plugins are ever returned.

use crate::core::Result;
use crate::discovery::query::{
    DiscoveryQuery, DiscoveryResult, FacetCount, Recommendation, RecommendationContext,
    RecommendationResult, RecommendationSource, ScoredPlugin, SearchFacets, SearchRequest,
    SearchResponse, SimilarPlugin, SortStrategy, UserProfile,
};
use crate::discovery::scoring::{relevance, similarity, SIMILARITY_THRESHOLD};
use crate::model::{matches_text, PluginFilter, PluginRegistration, PluginStatus};
use crate::registry::PluginRegistry;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Categories need more active plugins than this to be suggested.
const SUGGESTED_CATEGORY_MIN: usize = 5;

const COLLABORATIVE_CONFIDENCE: f64 = 0.6;
const PROJECT_TYPE_BONUS: f64 = 0.4;
const PREFERRED_TAG_BONUS: f64 = 0.2;
const CONTENT_THRESHOLD: f64 = 0.3;
const POPULARITY_CONFIDENCE: f64 = 0.5;
const POPULAR_COUNT: usize = 5;
const MAX_RECOMMENDATIONS: usize = 10;

/// Discovery over a registry.
pub struct DiscoveryService {
    registry: Arc<PluginRegistry>,
}

impl DiscoveryService {
    /// Create a service reading from a registry.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    async fn active(&self) -> Vec<PluginRegistration> {
        self.registry
            .list(&PluginFilter::new().by_status(PluginStatus::Active))
            .await
    }

    /// Rank active plugins against a keyword query.
    pub async fn find_plugins(&self, query: &DiscoveryQuery) -> Result<DiscoveryResult> {
        let active = self.active().await;
        let suggested_categories = suggested_categories(&active);

        let mut plugins: Vec<ScoredPlugin> = active
            .into_iter()
            .filter(|p| !query.exclude_ids.contains(&p.id))
            .filter(|p| query.category.as_ref().map_or(true, |c| &p.category == c))
            .map(|plugin| {
                let score = relevance(&plugin, &query.keywords, &query.required_permissions);
                ScoredPlugin { plugin, score }
            })
            .collect();

        sort_scored(&mut plugins, query.sort_by);
        let total = plugins.len();
        plugins.truncate(query.max_results);

        debug!(keywords = ?query.keywords, total, returned = plugins.len(), "find plugins");
        Ok(DiscoveryResult {
            plugins,
            total,
            suggested_categories,
        })
    }

    /// Active plugins resembling `plugin_id`, most similar first.
    pub async fn get_similar_plugins(&self, plugin_id: &str, limit: usize) -> Result<Vec<SimilarPlugin>> {
        let reference = self.registry.get(plugin_id).await?;

        let mut similar: Vec<SimilarPlugin> = self
            .active()
            .await
            .into_iter()
            .filter(|p| p.id != reference.id)
            .filter_map(|plugin| {
                let score = similarity(&reference, &plugin);
                (score >= SIMILARITY_THRESHOLD).then_some(SimilarPlugin {
                    plugin,
                    similarity: score,
                })
            })
            .collect();

        similar.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.plugin.id.cmp(&b.plugin.id))
        });
        similar.truncate(limit);
        Ok(similar)
    }

    /// Fuse collaborative, content-based and popularity recommendations.
    ///
    /// Plugins the user already installed are never recommended. When several
    /// strategies pick the same plugin the first one wins, in the order
    /// collaborative, content-based, popularity.
    ///
    /// Collaborative picks need an install history and then cover every
    /// candidate, so content-based and popularity picks only reach the result
    /// for users without one.
    pub async fn recommend_plugins(
        &self,
        user: &UserProfile,
        context: &RecommendationContext,
    ) -> Result<RecommendationResult> {
        let candidates: Vec<PluginRegistration> = self
            .active()
            .await
            .into_iter()
            .filter(|p| !user.has_installed(&p.id))
            .collect();

        let mut all = collaborative(&candidates, user);
        all.extend(content_based(&candidates, user, context));
        all.extend(popular(&candidates));

        let mut seen = HashSet::new();
        let mut recommendations: Vec<Recommendation> = all
            .into_iter()
            .filter(|r| seen.insert(r.plugin.id.clone()))
            .collect();
        recommendations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        recommendations.truncate(MAX_RECOMMENDATIONS);

        debug!(user_id = %user.user_id, count = recommendations.len(), "recommendations built");
        Ok(RecommendationResult::new(recommendations))
    }

    /// Free-text search over active plugins with category and author facets.
    pub async fn search_plugins(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let filter = PluginFilter {
            status: Some(PluginStatus::Active),
            category: request.category.clone(),
            author: request.author.clone(),
            tags: request.tags.clone(),
            limit: None,
            offset: None,
        };
        let matched: Vec<PluginRegistration> = self
            .registry
            .list(&filter)
            .await
            .into_iter()
            .filter(|p| matches_text(p, &request.query))
            .collect();

        let facets = SearchFacets {
            categories: facet(matched.iter().map(|p| p.category.as_str())),
            authors: facet(matched.iter().map(|p| p.author.as_str())),
        };

        let keywords: Vec<String> = request.query.split_whitespace().map(str::to_string).collect();
        let mut scored: Vec<ScoredPlugin> = matched
            .into_iter()
            .map(|plugin| {
                let score = relevance(&plugin, &keywords, &[]);
                ScoredPlugin { plugin, score }
            })
            .collect();
        sort_scored(&mut scored, request.sort_by);

        let total = scored.len();
        let plugins = scored
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|s| s.plugin)
            .collect();

        Ok(SearchResponse {
            plugins,
            total,
            facets,
        })
    }

    /// Active plugins of one category.
    pub async fn get_plugins_by_category(
        &self,
        category: &str,
        sort_by: SortStrategy,
        limit: usize,
    ) -> Result<SearchResponse> {
        let request = SearchRequest::default()
            .in_category(category)
            .sorted_by(sort_by)
            .page(0, limit);
        self.search_plugins(&request).await
    }
}

fn sort_scored(plugins: &mut [ScoredPlugin], sort_by: SortStrategy) {
    plugins.sort_by(|a, b| {
        let primary = match sort_by {
            SortStrategy::Relevance => b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal),
            SortStrategy::Popularity => b.plugin.request_count().cmp(&a.plugin.request_count()),
            SortStrategy::Date => b.plugin.registered_at.cmp(&a.plugin.registered_at),
        };
        primary.then_with(|| a.plugin.id.cmp(&b.plugin.id))
    });
}

fn suggested_categories(active: &[PluginRegistration]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for plugin in active.iter().filter(|p| !p.category.is_empty()) {
        *counts.entry(plugin.category.as_str()).or_insert(0) += 1;
    }
    let mut categories: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > SUGGESTED_CATEGORY_MIN)
        .map(|(c, _)| c.to_string())
        .collect();
    categories.sort();
    categories
}

fn facet<'a>(values: impl Iterator<Item = &'a str>) -> Vec<FacetCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.filter(|v| !v.is_empty()) {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut facets: Vec<FacetCount> = counts
        .into_iter()
        .map(|(value, count)| FacetCount {
            value: value.to_string(),
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    facets
}

fn collaborative(candidates: &[PluginRegistration], user: &UserProfile) -> Vec<Recommendation> {
    if user.installed_plugins.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .map(|p| Recommendation {
            plugin: p.clone(),
            confidence: COLLABORATIVE_CONFIDENCE,
            source: RecommendationSource::Collaborative,
            reason: "Not installed yet".to_string(),
        })
        .collect()
}

fn content_based(
    candidates: &[PluginRegistration],
    user: &UserProfile,
    context: &RecommendationContext,
) -> Vec<Recommendation> {
    candidates
        .iter()
        .filter_map(|p| {
            let mut score = 0.0;
            if context.project_type.as_deref() == Some(p.category.as_str()) {
                score += PROJECT_TYPE_BONUS;
            }
            let tag_matches = user
                .preferred_tags
                .iter()
                .filter(|t| p.tags.contains(t.as_str()))
                .count();
            score += tag_matches as f64 * PREFERRED_TAG_BONUS;

            (score > CONTENT_THRESHOLD).then(|| Recommendation {
                plugin: p.clone(),
                confidence: score.min(1.0),
                source: RecommendationSource::ContentBased,
                reason: format!("Matches project type or {tag_matches} preferred tag(s)"),
            })
        })
        .collect()
}

fn popular(candidates: &[PluginRegistration]) -> Vec<Recommendation> {
    let mut ranked: Vec<&PluginRegistration> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        b.request_count()
            .cmp(&a.request_count())
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
        .into_iter()
        .take(POPULAR_COUNT)
        .map(|p| Recommendation {
            plugin: p.clone(),
            confidence: POPULARITY_CONFIDENCE,
            source: RecommendationSource::Popularity,
            reason: format!("{} requests served", p.request_count()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PluginMetrics;
    use crate::registry::RegistryConfig;
    use crate::storage::MemoryStorage;

    async fn registry_with(plugins: Vec<PluginRegistration>) -> Arc<PluginRegistry> {
        let registry = Arc::new(PluginRegistry::new(
            Arc::new(MemoryStorage::new()),
            RegistryConfig::default(),
        ));
        for plugin in plugins {
            let id = plugin.id.clone();
            let metrics = plugin.metrics.clone();
            registry.register(plugin).await.unwrap();
            registry.update_status(&id, PluginStatus::Active).await.unwrap();
            if let Some(metrics) = metrics {
                registry.update_metrics(&id, metrics).await.unwrap();
            }
        }
        registry
    }

    fn catalog() -> Vec<PluginRegistration> {
        vec![
            PluginRegistration::new("json-fmt", "JSON Formatter", "1.0.0")
                .with_category("tools")
                .with_author("acme")
                .with_description("Pretty prints json")
                .with_tag("json")
                .with_tag("format")
                .with_permission("fs.read")
                .with_metrics(PluginMetrics::with_requests(10)),
            PluginRegistration::new("yaml-fmt", "YAML Formatter", "1.0.0")
                .with_category("tools")
                .with_author("acme")
                .with_tag("yaml")
                .with_tag("format")
                .with_permission("fs.read")
                .with_metrics(PluginMetrics::with_requests(500)),
            PluginRegistration::new("player", "Media Player", "2.0.0")
                .with_category("media")
                .with_author("tunes")
                .with_tag("audio")
                .with_permission("audio.play")
                .with_metrics(PluginMetrics::with_requests(50)),
        ]
    }

    #[tokio::test]
    async fn test_find_by_relevance() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let result = service.find_plugins(&DiscoveryQuery::new("json")).await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.plugins[0].plugin.id, "json-fmt");
        assert_eq!(result.plugins[0].score, 18.0);
        assert!(result.plugins.iter().all(|p| p.score >= 1.0));
    }

    #[tokio::test]
    async fn test_find_excludes_inactive_excluded_and_other_categories() {
        let registry = registry_with(catalog()).await;
        registry
            .register(PluginRegistration::new("draft", "JSON Draft", "0.1.0").with_category("tools"))
            .await
            .unwrap();
        let service = DiscoveryService::new(registry);

        let result = service
            .find_plugins(&DiscoveryQuery::new("json").in_category("tools").excluding("yaml-fmt"))
            .await
            .unwrap();
        let ids: Vec<&str> = result.plugins.iter().map(|p| p.plugin.id.as_str()).collect();
        assert_eq!(ids, vec!["json-fmt"]);
    }

    #[tokio::test]
    async fn test_find_sort_and_truncate() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let result = service
            .find_plugins(
                &DiscoveryQuery::default()
                    .sorted_by(SortStrategy::Popularity)
                    .with_max_results(2),
            )
            .await
            .unwrap();

        assert_eq!(result.total, 3);
        let ids: Vec<&str> = result.plugins.iter().map(|p| p.plugin.id.as_str()).collect();
        assert_eq!(ids, vec!["yaml-fmt", "player"]);
    }

    #[tokio::test]
    async fn test_suggested_categories() {
        let mut plugins = catalog();
        for i in 0..4 {
            plugins.push(PluginRegistration::new(&format!("tool{i}"), "Tool", "1.0.0").with_category("tools"));
        }
        let service = DiscoveryService::new(registry_with(plugins).await);

        let result = service.find_plugins(&DiscoveryQuery::default()).await.unwrap();
        assert_eq!(result.suggested_categories, vec!["tools"]);
    }

    #[tokio::test]
    async fn test_similar_plugins() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let similar = service.get_similar_plugins("json-fmt", 10).await.unwrap();

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].plugin.id, "yaml-fmt");
        assert!(similar.iter().all(|s| s.similarity >= SIMILARITY_THRESHOLD));
        assert!(similar.iter().all(|s| s.plugin.id != "json-fmt"));

        assert!(service
            .get_similar_plugins("missing", 10)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_recommendations() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let user = UserProfile::new("u1")
            .with_installed("json-fmt")
            .with_preferred_tag("format");

        let result = service
            .recommend_plugins(&user, &RecommendationContext::for_project("tools"))
            .await
            .unwrap();

        let ids: HashSet<&str> = result
            .recommendations
            .iter()
            .map(|r| r.plugin.id.as_str())
            .collect();
        assert_eq!(ids.len(), result.recommendations.len());
        assert!(!ids.contains("json-fmt"));
        assert!(result.recommendations.len() <= MAX_RECOMMENDATIONS);
        assert!(result
            .recommendations
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
        assert!(result
            .recommendations
            .iter()
            .all(|r| r.source == RecommendationSource::Collaborative));
        assert!((result.confidence - COLLABORATIVE_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommendations_without_history() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let user = UserProfile::new("newcomer").with_preferred_tag("format");

        let result = service
            .recommend_plugins(&user, &RecommendationContext::for_project("tools"))
            .await
            .unwrap();

        let picks: Vec<(&str, RecommendationSource)> = result
            .recommendations
            .iter()
            .map(|r| (r.plugin.id.as_str(), r.source))
            .collect();
        assert_eq!(
            picks,
            vec![
                ("json-fmt", RecommendationSource::ContentBased),
                ("yaml-fmt", RecommendationSource::ContentBased),
                ("player", RecommendationSource::Popularity),
            ]
        );
        assert!((result.confidence - (0.6 + 0.6 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_content_based_scoring() {
        let plugins = catalog();
        let user = UserProfile::new("u1").with_preferred_tag("format");
        let recs = content_based(&plugins, &user, &RecommendationContext::for_project("tools"));

        let ids: Vec<&str> = recs.iter().map(|r| r.plugin.id.as_str()).collect();
        assert_eq!(ids, vec!["json-fmt", "yaml-fmt"]);
        assert!((recs[0].confidence - 0.6).abs() < 1e-9);

        let no_context = content_based(&plugins, &user, &RecommendationContext::default());
        assert!(no_context.is_empty());
    }

    #[tokio::test]
    async fn test_search_with_facets() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let response = service
            .search_plugins(&SearchRequest::new("formatter"))
            .await
            .unwrap();

        assert_eq!(response.total, 2);
        assert_eq!(
            response.facets.categories,
            vec![FacetCount {
                value: "tools".to_string(),
                count: 2
            }]
        );
        assert_eq!(response.facets.authors[0].value, "acme");

        let page = service
            .search_plugins(&SearchRequest::new("").page(1, 1))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.plugins.len(), 1);
    }

    #[tokio::test]
    async fn test_plugins_by_category() {
        let service = DiscoveryService::new(registry_with(catalog()).await);
        let response = service
            .get_plugins_by_category("tools", SortStrategy::Popularity, 10)
            .await
            .unwrap();

        let ids: Vec<&str> = response.plugins.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["yaml-fmt", "json-fmt"]);
    }
}

//! Relevance and similarity scoring.

use crate::model::PluginRegistration;
use std::collections::BTreeSet;

/// Keyword found in the name.
pub const NAME_MATCH: f64 = 10.0;
/// Keyword found in the description.
pub const DESCRIPTION_MATCH: f64 = 5.0;
/// Keyword found in any tag.
pub const TAG_MATCH: f64 = 3.0;
/// Required permission held.
pub const PERMISSION_MATCH: f64 = 8.0;
/// Lowest relevance score.
pub const MIN_RELEVANCE: f64 = 1.0;

/// Weight of a shared category.
pub const CATEGORY_WEIGHT: f64 = 0.3;
/// Weight of tag overlap.
pub const TAG_WEIGHT: f64 = 0.4;
/// Weight of permission overlap.
pub const PERMISSION_WEIGHT: f64 = 0.3;
/// Similar plugins below this are dropped.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

/// Relevance of a registration to keywords and required permissions.
///
/// Matching is case-insensitive. The result is never below [`MIN_RELEVANCE`].
pub fn relevance(reg: &PluginRegistration, keywords: &[String], required_permissions: &[String]) -> f64 {
    let name = reg.name.to_lowercase();
    let description = reg.description.to_lowercase();
    let tags: Vec<String> = reg.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut score = 0.0;
    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        if keyword.is_empty() {
            continue;
        }
        if name.contains(&keyword) {
            score += NAME_MATCH;
        }
        if description.contains(&keyword) {
            score += DESCRIPTION_MATCH;
        }
        if tags.iter().any(|t| t.contains(&keyword)) {
            score += TAG_MATCH;
        }
    }

    score += required_permissions
        .iter()
        .filter(|p| reg.permissions.contains(p.as_str()))
        .count() as f64
        * PERMISSION_MATCH;

    score.max(MIN_RELEVANCE)
}

/// Shared elements divided by the size of the larger set. Zero when both are empty.
pub fn overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / larger as f64
}

/// Weighted similarity of two registrations in `[0, 1]`.
pub fn similarity(a: &PluginRegistration, b: &PluginRegistration) -> f64 {
    let category = if !a.category.is_empty() && a.category == b.category {
        CATEGORY_WEIGHT
    } else {
        0.0
    };
    category
        + TAG_WEIGHT * overlap(&a.tags, &b.tags)
        + PERMISSION_WEIGHT * overlap(&a.permissions, &b.permissions)
}

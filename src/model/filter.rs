//! Query filters for plugin registrations.
//!
//! Every storage backend and the registry match through [`PluginFilter::matches`],
//! so swapping backends never changes which records a filter selects.

use crate::model::registration::{PluginRegistration, PluginStatus};
use serde::{Deserialize, Serialize};

/// Filter for listing registrations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginFilter {
    /// Filter by status
    pub status: Option<PluginStatus>,
    /// Filter by category
    pub category: Option<String>,
    /// Filter by author
    pub author: Option<String>,
    /// Match if the registration has any of these tags
    pub tags: Vec<String>,
    /// Maximum results
    pub limit: Option<usize>,
    /// Offset for pagination
    pub offset: Option<usize>,
}

impl PluginFilter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by status.
    pub fn by_status(mut self, status: PluginStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by category.
    pub fn by_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Filter by author.
    pub fn by_author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    /// Require one of the given tags.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Set result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set pagination offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check if a registration matches this filter.
    pub fn matches(&self, reg: &PluginRegistration) -> bool {
        if let Some(status) = self.status {
            if reg.status != status {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if &reg.category != category {
                return false;
            }
        }

        if let Some(author) = &self.author {
            if &reg.author != author {
                return false;
            }
        }

        if !self.tags.is_empty() && !self.tags.iter().any(|t| reg.tags.contains(t)) {
            return false;
        }

        true
    }

    /// Filter, order by id and paginate.
    pub fn select<I>(&self, regs: I) -> Vec<PluginRegistration>
    where
        I: IntoIterator<Item = PluginRegistration>,
    {
        let mut results: Vec<PluginRegistration> =
            regs.into_iter().filter(|r| self.matches(r)).collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        results.into_iter().skip(offset).take(limit).collect()
    }
}

/// Case-insensitive free-text match over id, name, description and tags.
///
/// An empty query matches everything.
pub fn matches_text(reg: &PluginRegistration, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    reg.id.to_lowercase().contains(&query)
        || reg.name.to_lowercase().contains(&query)
        || reg.description.to_lowercase().contains(&query)
        || reg.tags.iter().any(|t| t.to_lowercase().contains(&query))
}

/// Criteria for capability-based discovery through the registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryCriteria {
    /// Restrict to a category
    pub category: Option<String>,
    /// Restrict to a status
    pub status: Option<PluginStatus>,
    /// Match if any of these tags is present
    pub tags: Vec<String>,
    /// Permissions the plugin must hold (all of them)
    pub required_capabilities: Vec<String>,
    /// Ids to leave out
    pub exclude_ids: Vec<String>,
    /// Maximum results
    pub limit: Option<usize>,
}

impl DiscoveryCriteria {
    /// Create empty criteria.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a capability.
    pub fn requiring(mut self, capability: &str) -> Self {
        self.required_capabilities.push(capability.to_string());
        self
    }

    /// Exclude an id.
    pub fn excluding(mut self, id: &str) -> Self {
        self.exclude_ids.push(id.to_string());
        self
    }

    /// Restrict to a category.
    pub fn in_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Check if a registration satisfies the criteria.
    pub fn matches(&self, reg: &PluginRegistration) -> bool {
        if self.exclude_ids.iter().any(|id| id == &reg.id) {
            return false;
        }

        let filter = PluginFilter {
            status: self.status,
            category: self.category.clone(),
            author: None,
            tags: self.tags.clone(),
            limit: None,
            offset: None,
        };
        if !filter.matches(reg) {
            return false;
        }

        self.required_capabilities
            .iter()
            .all(|cap| reg.permissions.contains(cap))
    }
}

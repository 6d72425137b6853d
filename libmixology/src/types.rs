//! Domain types shared by repositories and feature machines

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A drink as it appears in lists
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Drink {
    /// Stable identifier, e.g. "old-fashioned"
    pub alias: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Facet ids this drink matches (tasting, skill, glass, colour, type)
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Drink {
    pub fn new(alias: &str, name: &str) -> Self {
        Self {
            alias: alias.to_string(),
            name: name.to_string(),
            image_url: None,
            tags: Vec::new(),
            is_favorite: false,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_favorite(self, is_favorite: bool) -> Self {
        Self {
            is_favorite,
            ..self
        }
    }
}

/// Everything the detail screen shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkDetails {
    pub drink: Drink,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub glass: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub tag: String,
    pub name: String,
}

/// One selectable value of a search facet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facet {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub count: u32,
}

/// Facet values of one aggregation group
///
/// Groups are shared behind an `Arc`; a selected filter remembers the exact
/// group allocation it was picked from.
pub type FacetGroup = Arc<Vec<Facet>>;

/// Search facets available for the current catalog
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub tasting: FacetGroup,
    #[serde(default)]
    pub skill: FacetGroup,
    #[serde(default)]
    pub served_in: FacetGroup,
    #[serde(default)]
    pub colored: FacetGroup,
    #[serde(default)]
    pub with_type: FacetGroup,
}

impl Aggregation {
    /// Groups paired with the filter name the search API expects
    pub fn named_groups(&self) -> [(&'static str, &FacetGroup); 5] {
        [
            ("tasting", &self.tasting),
            ("skill", &self.skill),
            ("servedIn", &self.served_in),
            ("colored", &self.colored),
            ("withType", &self.with_type),
        ]
    }

    /// Filter name of `group`, matched by allocation identity
    pub fn name_of(&self, group: &FacetGroup) -> Option<&'static str> {
        self.named_groups()
            .into_iter()
            .find(|(_, candidate)| Arc::ptr_eq(candidate, group))
            .map(|(name, _)| name)
    }
}

/// A (group, facet) pair picked in the filter panel
///
/// Two selections are equal only if they point at the same group allocation
/// and carry the same facet.
#[derive(Debug, Clone)]
pub struct SelectedFilter {
    pub group: FacetGroup,
    pub facet: Facet,
}

impl SelectedFilter {
    pub fn new(group: &FacetGroup, facet: Facet) -> Self {
        Self {
            group: Arc::clone(group),
            facet,
        }
    }
}

impl PartialEq for SelectedFilter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.group, &other.group) && self.facet == other.facet
    }
}

impl Eq for SelectedFilter {}

impl Hash for SelectedFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.group).hash(state);
        self.facet.hash(state);
    }
}

/// Filter name -> selected facet ids, as sent to the search API
pub type SearchFilters = HashMap<String, Vec<String>>;

/// Drink produced by the bartender from a free-text prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDrink {
    pub alias: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

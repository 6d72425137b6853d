//! In-memory collaborators
//!
//! A catalog-backed [`DrinkRepository`] that can simulate failures and
//! latency and records every call, plus a watch-backed [`FavoriteStore`].
//! Available in all builds so integration tests and the CLI can use them.

use async_trait::async_trait;
use futures::stream::BoxStream;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use super::{DrinkRepository, FavoriteStore, RepositoryResult};
use crate::error::{ConfigError, RepositoryError, Result};
use crate::flow::watch_stream;
use crate::types::{
    Aggregation, Category, Drink, DrinkDetails, Facet, GeneratedDrink, SearchFilters,
};

/// Everything the in-memory repository can serve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub drinks: Vec<DrinkDetails>,
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Collection name -> drink aliases
    #[serde(default)]
    pub collections: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub aggregation: Aggregation,
}

impl Catalog {
    /// Load a catalog from a JSON file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        serde_json::from_str(&content)
            .map_err(|e| RepositoryError::Parse(format!("{}: {}", path.display(), e)).into())
    }

    /// Small built-in catalog
    pub fn sample() -> Self {
        let entries: [(&str, &str, &[&str], &[&str]); 12] = [
            ("old-fashioned", "Old Fashioned", &["bitter", "easy", "rocks", "amber", "whiskey"], &["60ml bourbon", "1 sugar cube", "2 dashes bitters"]),
            ("negroni", "Negroni", &["bitter", "easy", "rocks", "red", "gin"], &["30ml gin", "30ml campari", "30ml sweet vermouth"]),
            ("mojito", "Mojito", &["fresh", "medium", "highball", "clear", "rum"], &["50ml white rum", "mint", "lime", "soda"]),
            ("daiquiri", "Daiquiri", &["sour", "easy", "coupe", "clear", "rum"], &["60ml white rum", "25ml lime", "15ml syrup"]),
            ("margarita", "Margarita", &["sour", "easy", "coupe", "clear", "tequila"], &["50ml tequila", "25ml lime", "20ml triple sec"]),
            ("manhattan", "Manhattan", &["bitter", "easy", "coupe", "amber", "whiskey"], &["50ml rye", "20ml sweet vermouth", "bitters"]),
            ("gimlet", "Gimlet", &["sour", "easy", "coupe", "green", "gin"], &["60ml gin", "20ml lime cordial"]),
            ("pina-colada", "Piña Colada", &["sweet", "medium", "hurricane", "white", "rum"], &["50ml rum", "30ml coconut cream", "50ml pineapple"]),
            ("espresso-martini", "Espresso Martini", &["sweet", "medium", "coupe", "brown", "vodka"], &["50ml vodka", "30ml espresso", "20ml coffee liqueur"]),
            ("aperol-spritz", "Aperol Spritz", &["bitter", "easy", "wine", "orange", "wine"], &["60ml aperol", "90ml prosecco", "soda"]),
            ("whiskey-sour", "Whiskey Sour", &["sour", "medium", "rocks", "amber", "whiskey"], &["50ml bourbon", "25ml lemon", "egg white"]),
            ("paloma", "Paloma", &["fresh", "easy", "highball", "pink", "tequila"], &["50ml tequila", "grapefruit soda", "lime"]),
        ];

        let drinks: Vec<DrinkDetails> = entries
            .iter()
            .map(|(alias, name, tags, ingredients)| DrinkDetails {
                drink: Drink::new(alias, name).with_tags(tags),
                ingredients: ingredients.iter().map(|i| i.to_string()).collect(),
                steps: vec!["Build or shake with ice".to_string(), "Garnish and serve".to_string()],
                glass: tags.get(2).map(|g| g.to_string()),
            })
            .collect();

        let categories = ["whiskey", "gin", "rum", "tequila", "vodka"]
            .iter()
            .map(|tag| Category {
                tag: tag.to_string(),
                name: capitalize(tag),
            })
            .collect();

        let mut collections = HashMap::new();
        collections.insert(
            "classics".to_string(),
            vec!["old-fashioned".to_string(), "negroni".to_string(), "manhattan".to_string(), "daiquiri".to_string()],
        );
        collections.insert(
            "summer".to_string(),
            vec!["mojito".to_string(), "paloma".to_string(), "aperol-spritz".to_string()],
        );

        let aggregation = aggregate(&drinks);

        Self {
            drinks,
            categories,
            collections,
            aggregation,
        }
    }

    fn find(&self, alias: &str) -> Option<&DrinkDetails> {
        self.drinks.iter().find(|d| d.drink.alias == alias)
    }
}

/// Count facet values by tag position (tasting, skill, glass, colour, type)
fn aggregate(drinks: &[DrinkDetails]) -> Aggregation {
    let mut groups: Vec<Vec<Facet>> = vec![Vec::new(); 5];
    for details in drinks {
        for (position, tag) in details.drink.tags.iter().enumerate().take(5) {
            let group = &mut groups[position];
            match group.iter_mut().find(|f| &f.id == tag) {
                Some(facet) => facet.count += 1,
                None => group.push(Facet {
                    id: tag.clone(),
                    label: capitalize(tag),
                    count: 1,
                }),
            }
        }
    }

    let mut groups = groups.into_iter().map(Arc::new);
    let mut next = || groups.next().unwrap_or_default();
    Aggregation {
        tasting: next(),
        skill: next(),
        served_in: next(),
        colored: next(),
        with_type: next(),
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A recorded repository call
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryCall {
    RandomDrinks(usize),
    RandomDrink,
    Categories,
    Drink(String),
    DrinksByTag(String),
    Collection(String),
    Search { query: String, filters: SearchFilters },
    Aggregation,
    Generate(String),
}

/// Configurable behavior of the in-memory repository
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Fail every call with this error
    pub fail_with: Option<RepositoryError>,
    /// Delay before completing each call (simulates network latency)
    pub delay: Duration,
}

pub struct InMemoryDrinkRepository {
    catalog: Catalog,
    behavior: Mutex<MockBehavior>,
    calls: Arc<Mutex<Vec<RepositoryCall>>>,
}

impl InMemoryDrinkRepository {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            behavior: Mutex::new(MockBehavior::default()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Repository whose calls all take `delay`
    pub fn with_delay(catalog: Catalog, delay: Duration) -> Self {
        let repository = Self::new(catalog);
        repository.set_behavior(MockBehavior {
            delay,
            ..Default::default()
        });
        repository
    }

    /// Repository whose calls all fail with `error`
    pub fn failing(catalog: Catalog, error: RepositoryError) -> Self {
        let repository = Self::new(catalog);
        repository.set_behavior(MockBehavior {
            fail_with: Some(error),
            ..Default::default()
        });
        repository
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Queries of the search calls made so far
    pub fn search_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RepositoryCall::Search { query, .. } => Some(query),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, call: RepositoryCall) -> RepositoryResult<()> {
        tracing::debug!(?call, "In-memory repository call");
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);

        let behavior = self.behavior.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if !behavior.delay.is_zero() {
            sleep(behavior.delay).await;
        }
        match behavior.fail_with {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn list(&self) -> Vec<Drink> {
        self.catalog.drinks.iter().map(|d| d.drink.clone()).collect()
    }
}

#[async_trait]
impl DrinkRepository for InMemoryDrinkRepository {
    async fn random_drinks(&self, count: usize) -> RepositoryResult<Vec<Drink>> {
        self.enter(RepositoryCall::RandomDrinks(count)).await?;
        let drinks = self.list();
        let mut rng = rand::thread_rng();
        Ok(drinks.choose_multiple(&mut rng, count).cloned().collect())
    }

    async fn random_drink(&self) -> RepositoryResult<Drink> {
        self.enter(RepositoryCall::RandomDrink).await?;
        let drinks = self.list();
        let mut rng = rand::thread_rng();
        drinks
            .choose(&mut rng)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound("catalog is empty".to_string()))
    }

    async fn categories(&self) -> RepositoryResult<Vec<Category>> {
        self.enter(RepositoryCall::Categories).await?;
        Ok(self.catalog.categories.clone())
    }

    async fn drink(&self, alias: &str) -> RepositoryResult<DrinkDetails> {
        self.enter(RepositoryCall::Drink(alias.to_string())).await?;
        self.catalog
            .find(alias)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(alias.to_string()))
    }

    async fn drinks_by_tag(&self, tag: &str) -> RepositoryResult<Vec<Drink>> {
        self.enter(RepositoryCall::DrinksByTag(tag.to_string())).await?;
        Ok(self
            .list()
            .into_iter()
            .filter(|drink| drink.tags.iter().any(|t| t == tag))
            .collect())
    }

    async fn collection(&self, name: &str) -> RepositoryResult<Vec<Drink>> {
        self.enter(RepositoryCall::Collection(name.to_string())).await?;
        let aliases = self
            .catalog
            .collections
            .get(name)
            .ok_or_else(|| RepositoryError::NotFound(format!("collection {}", name)))?;
        Ok(aliases
            .iter()
            .filter_map(|alias| self.catalog.find(alias))
            .map(|details| details.drink.clone())
            .collect())
    }

    async fn search(&self, query: &str, filters: &SearchFilters) -> RepositoryResult<Vec<Drink>> {
        self.enter(RepositoryCall::Search {
            query: query.to_string(),
            filters: filters.clone(),
        })
        .await?;

        let needle = query.trim().to_lowercase();
        Ok(self
            .list()
            .into_iter()
            .filter(|drink| needle.is_empty() || drink.name.to_lowercase().contains(&needle))
            .filter(|drink| {
                filters
                    .values()
                    .filter(|values| !values.is_empty())
                    .all(|values| values.iter().any(|v| drink.tags.contains(v)))
            })
            .collect())
    }

    async fn aggregation(&self) -> RepositoryResult<Aggregation> {
        self.enter(RepositoryCall::Aggregation).await?;
        Ok(self.catalog.aggregation.clone())
    }

    async fn generate(&self, prompt: &str) -> RepositoryResult<GeneratedDrink> {
        self.enter(RepositoryCall::Generate(prompt.to_string())).await?;

        let words: Vec<&str> = prompt.split_whitespace().collect();
        if words.is_empty() {
            return Err(RepositoryError::Generation("empty prompt".to_string()));
        }

        let prompt_lower = prompt.to_lowercase();
        let ingredients = self
            .catalog
            .drinks
            .iter()
            .filter(|d| d.drink.tags.iter().any(|t| prompt_lower.contains(t.as_str())))
            .flat_map(|d| d.ingredients.iter().cloned())
            .take(4)
            .collect();

        Ok(GeneratedDrink {
            alias: words.join("-").to_lowercase(),
            name: words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(" "),
            description: format!("A house creation inspired by \"{}\"", prompt.trim()),
            ingredients,
        })
    }
}

/// Favorite store kept in memory only
pub struct InMemoryFavoriteStore {
    favorites: watch::Sender<HashSet<String>>,
    /// Latency added to every read and write
    delay: Duration,
}

impl Default for InMemoryFavoriteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFavoriteStore {
    pub fn new() -> Self {
        Self::with_favorites(HashSet::new())
    }

    pub fn with_favorites(favorites: HashSet<String>) -> Self {
        let (favorites, _) = watch::channel(favorites);
        Self {
            favorites,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    async fn latency(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl FavoriteStore for InMemoryFavoriteStore {
    fn observe_favorites(&self) -> BoxStream<'static, HashSet<String>> {
        watch_stream(self.favorites.subscribe())
    }

    async fn favorites(&self) -> Result<HashSet<String>> {
        self.latency().await;
        Ok(self.favorites.borrow().clone())
    }

    async fn save(&self, alias: &str) -> Result<()> {
        self.latency().await;
        self.favorites.send_if_modified(|set| set.insert(alias.to_string()));
        Ok(())
    }

    async fn remove(&self, alias: &str) -> Result<()> {
        self.latency().await;
        self.favorites.send_if_modified(|set| set.remove(alias));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_sample_catalog_shape() {
        let catalog = Catalog::sample();
        assert_eq!(catalog.drinks.len(), 12);
        assert_eq!(catalog.categories.len(), 5);
        assert!(catalog.aggregation.tasting.iter().any(|f| f.id == "bitter"));
        assert!(catalog.aggregation.with_type.iter().any(|f| f.id == "gin"));
    }

    #[tokio::test]
    async fn test_random_drinks_are_distinct() {
        let repository = InMemoryDrinkRepository::new(Catalog::sample());
        let drinks = repository.random_drinks(10).await.unwrap();
        let aliases: HashSet<_> = drinks.iter().map(|d| d.alias.clone()).collect();

        assert_eq!(drinks.len(), 10);
        assert_eq!(aliases.len(), 10);
        assert_eq!(repository.calls(), vec![RepositoryCall::RandomDrinks(10)]);
    }

    #[tokio::test]
    async fn test_search_by_name_and_filters() {
        let repository = InMemoryDrinkRepository::new(Catalog::sample());

        let by_name = repository.search("MAR", &SearchFilters::new()).await.unwrap();
        let names: Vec<_> = by_name.iter().map(|d| d.alias.as_str()).collect();
        assert_eq!(names, vec!["margarita", "espresso-martini"]);

        let mut filters = SearchFilters::new();
        filters.insert("withType".to_string(), vec!["gin".to_string()]);
        filters.insert("tasting".to_string(), vec!["sour".to_string()]);
        let filtered = repository.search("", &filters).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].alias, "gimlet");
    }

    #[tokio::test]
    async fn test_failing_repository() {
        let repository = InMemoryDrinkRepository::failing(
            Catalog::sample(),
            RepositoryError::Network("offline".to_string()),
        );
        let err = repository.categories().await.unwrap_err();
        assert_eq!(err, RepositoryError::Network("offline".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_collection_is_not_found() {
        let repository = InMemoryDrinkRepository::new(Catalog::sample());
        let err = repository.collection("winter").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));

        let classics = repository.collection("classics").await.unwrap();
        assert_eq!(classics.len(), 4);
    }

    #[tokio::test]
    async fn test_generate_slugifies_prompt() {
        let repository = InMemoryDrinkRepository::new(Catalog::sample());
        let drink = repository.generate("smoky gin sour").await.unwrap();
        assert_eq!(drink.alias, "smoky-gin-sour");
        assert_eq!(drink.name, "Smoky Gin Sour");
        assert!(!drink.ingredients.is_empty());
    }

    #[tokio::test]
    async fn test_favorite_store_emits_changes_only() {
        let store = InMemoryFavoriteStore::new();
        let mut changes = store.observe_favorites();
        assert!(changes.next().await.unwrap().is_empty());

        store.save("negroni").await.unwrap();
        assert!(changes.next().await.unwrap().contains("negroni"));

        store.remove("negroni").await.unwrap();
        assert!(changes.next().await.unwrap().is_empty());
        assert!(store.favorites().await.unwrap().is_empty());
    }
}

//! Collaborator contracts used by the feature machines
//!
//! - [`DrinkRepository`]: remote catalog (network, scraping, generation)
//! - [`FavoriteStore`]: persisted set of favorite aliases
//! - [`FavoritesRepository`]: combines both with the shared drink cache so a
//!   favorite toggled anywhere is observed everywhere
//!
//! Implementations of the remote catalog live outside this crate. The
//! in-memory and SQLite implementations here back the CLI and the tests.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::ReactiveCache;
use crate::error::{RepositoryError, Result};
use crate::types::{Aggregation, Category, Drink, DrinkDetails, GeneratedDrink, SearchFilters};

pub mod memory;
pub mod sqlite;

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Remote drink catalog
///
/// Every operation reports failures as [`RepositoryError`] instead of
/// panicking, so processors can turn them into `Async::Fail`.
#[async_trait]
pub trait DrinkRepository: Send + Sync {
    /// Up to `count` distinct random drinks
    async fn random_drinks(&self, count: usize) -> RepositoryResult<Vec<Drink>>;

    async fn random_drink(&self) -> RepositoryResult<Drink>;

    async fn categories(&self) -> RepositoryResult<Vec<Category>>;

    async fn drink(&self, alias: &str) -> RepositoryResult<DrinkDetails>;

    async fn drinks_by_tag(&self, tag: &str) -> RepositoryResult<Vec<Drink>>;

    /// Drinks of a curated collection
    async fn collection(&self, name: &str) -> RepositoryResult<Vec<Drink>>;

    /// Free-text search narrowed by facet filters (filter name -> facet ids)
    async fn search(&self, query: &str, filters: &SearchFilters) -> RepositoryResult<Vec<Drink>>;

    async fn aggregation(&self) -> RepositoryResult<Aggregation>;

    /// Ask the bartender for a drink matching `prompt`
    async fn generate(&self, prompt: &str) -> RepositoryResult<GeneratedDrink>;
}

/// Persisted set of favorite drink aliases
#[async_trait]
pub trait FavoriteStore: Send + Sync {
    /// Current set followed by every change. Restartable.
    fn observe_favorites(&self) -> BoxStream<'static, HashSet<String>>;

    async fn favorites(&self) -> Result<HashSet<String>>;

    async fn save(&self, alias: &str) -> Result<()>;

    async fn remove(&self, alias: &str) -> Result<()>;
}

/// Favorites as the feature machines see them
///
/// Writes go to the store and to the drink cache, so every machine
/// following either one observes the change without being told. Writes
/// through clones of one repository are applied one at a time.
#[derive(Clone)]
pub struct FavoritesRepository {
    store: Arc<dyn FavoriteStore>,
    drinks: Arc<dyn DrinkRepository>,
    cache: Arc<ReactiveCache<String, Drink>>,
    writes: Arc<Mutex<()>>,
}

impl FavoritesRepository {
    pub fn new(
        store: Arc<dyn FavoriteStore>,
        drinks: Arc<dyn DrinkRepository>,
        cache: Arc<ReactiveCache<String, Drink>>,
    ) -> Self {
        Self {
            store,
            drinks,
            cache,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub async fn is_favorite(&self, alias: &str) -> Result<bool> {
        Ok(self.store.favorites().await?.contains(alias))
    }

    /// Put `drink` in the shared cache
    pub fn remember(&self, drink: Drink) {
        self.cache.put(drink.alias.clone(), drink);
    }

    /// Cached versions of one drink, starting with the current one
    pub fn observe_drink(&self, alias: &str) -> BoxStream<'static, Drink> {
        self.cache.observe(alias.to_string())
    }

    pub fn observe_favorite_aliases(&self) -> BoxStream<'static, HashSet<String>> {
        self.store.observe_favorites()
    }

    /// Flip the favorite flag of `drink`. Returns the new flag.
    pub async fn toggle(&self, drink: &Drink) -> Result<bool> {
        // Read and write under one lock so a double tap flips twice
        let _write = self.writes.lock().await;
        let now_favorite = !self.is_favorite(&drink.alias).await?;
        self.write_favorite(drink, now_favorite).await?;
        Ok(now_favorite)
    }

    /// Write the favorite flag of `drink` to the store and the cache
    pub async fn set_favorite(&self, drink: &Drink, favorite: bool) -> Result<()> {
        let _write = self.writes.lock().await;
        self.write_favorite(drink, favorite).await
    }

    async fn write_favorite(&self, drink: &Drink, favorite: bool) -> Result<()> {
        if favorite {
            self.store.save(&drink.alias).await?;
        } else {
            self.store.remove(&drink.alias).await?;
        }

        let cached = self
            .cache
            .peek(&drink.alias)
            .unwrap_or_else(|| drink.clone());
        self.remember(cached.with_favorite(favorite));

        tracing::info!(alias = %drink.alias, favorite, "Favorite updated");
        Ok(())
    }

    /// Favorite drinks, re-resolved whenever the favorite set changes
    ///
    /// Drinks missing from the cache are fetched from the catalog. Output is
    /// sorted by name.
    pub fn observe_favorite_drinks(&self) -> BoxStream<'static, RepositoryResult<Vec<Drink>>> {
        let cache = Arc::clone(&self.cache);
        let drinks = Arc::clone(&self.drinks);

        self.store
            .observe_favorites()
            .then(move |aliases| {
                let cache = Arc::clone(&cache);
                let drinks = Arc::clone(&drinks);
                async move {
                    let mut resolved = Vec::with_capacity(aliases.len());
                    for alias in aliases {
                        let drink = match cache.peek(&alias) {
                            Some(drink) => drink,
                            None => {
                                let drink = drinks.drink(&alias).await?.drink;
                                cache.put(alias.clone(), drink.clone().with_favorite(true));
                                drink
                            }
                        };
                        resolved.push(drink.with_favorite(true));
                    }
                    resolved.sort_by(|a, b| a.name.cmp(&b.name));
                    Ok::<_, RepositoryError>(resolved)
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{Catalog, InMemoryDrinkRepository, InMemoryFavoriteStore};
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn repository() -> (FavoritesRepository, Arc<ReactiveCache<String, Drink>>) {
        let cache = Arc::new(ReactiveCache::new());
        let repository = FavoritesRepository::new(
            Arc::new(InMemoryFavoriteStore::new()),
            Arc::new(InMemoryDrinkRepository::new(Catalog::sample())),
            Arc::clone(&cache),
        );
        (repository, cache)
    }

    #[tokio::test]
    async fn test_toggle_round_trip_updates_cache() {
        let (favorites, cache) = repository();
        let drink = Drink::new("negroni", "Negroni");

        assert!(favorites.toggle(&drink).await.unwrap());
        assert!(favorites.is_favorite("negroni").await.unwrap());
        assert_eq!(cache.peek(&"negroni".to_string()).map(|d| d.is_favorite), Some(true));

        assert!(!favorites.toggle(&drink).await.unwrap());
        assert!(!favorites.is_favorite("negroni").await.unwrap());
        assert_eq!(cache.peek(&"negroni".to_string()).map(|d| d.is_favorite), Some(false));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_flip_twice() {
        let favorites = FavoritesRepository::new(
            Arc::new(InMemoryFavoriteStore::with_delay(Duration::from_millis(20))),
            Arc::new(InMemoryDrinkRepository::new(Catalog::sample())),
            Arc::new(ReactiveCache::new()),
        );
        let drink = Drink::new("gimlet", "Gimlet");
        let other = favorites.clone();

        let (first, second) = tokio::join!(favorites.toggle(&drink), other.toggle(&drink));
        let mut flags = vec![first.unwrap(), second.unwrap()];
        flags.sort();

        assert_eq!(flags, vec![false, true]);
        assert!(!favorites.is_favorite("gimlet").await.unwrap());
    }

    #[tokio::test]
    async fn test_observe_favorite_drinks_follows_store() {
        let (favorites, _cache) = repository();
        let mut drinks = favorites.observe_favorite_drinks();

        let initial = timeout(Duration::from_secs(1), drinks.next()).await.unwrap().unwrap();
        assert!(initial.unwrap().is_empty());

        favorites.toggle(&Drink::new("mojito", "Mojito")).await.unwrap();
        let updated = timeout(Duration::from_secs(1), drinks.next()).await.unwrap().unwrap();
        let updated = updated.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].alias, "mojito");
        assert!(updated[0].is_favorite);
    }
}

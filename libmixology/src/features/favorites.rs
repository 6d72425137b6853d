//! Favorites screen

use futures::future;
use futures::stream::{self, StreamExt};

use crate::async_result::Async;
use crate::config::EngineConfig;
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::FavoritesRepository;
use crate::types::Drink;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FavoritesState {
    pub drinks: Async<Vec<Drink>>,
}

#[derive(Debug, Clone)]
pub enum FavoritesAction {
    /// Initial action
    Load,
    /// Remove from favorites
    ToggleFavorite(Drink),
    DrinkClicked(Drink),
    DiscoverClicked,
}

#[derive(Debug)]
pub enum FavoritesMutation {
    Drinks(Async<Vec<Drink>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FavoritesSideEffect {
    NavigateToDrink(String),
    NavigateToDiscovery,
    ShowMessage(String),
}

impl FavoritesSideEffect {
    pub fn destination(&self) -> Option<Destination> {
        match self {
            FavoritesSideEffect::NavigateToDrink(alias) => Some(Destination::DrinkDetail {
                alias: alias.clone(),
            }),
            FavoritesSideEffect::NavigateToDiscovery => Some(Destination::Discovery),
            FavoritesSideEffect::ShowMessage(_) => None,
        }
    }
}

pub struct Favorites {
    favorites: FavoritesRepository,
}

impl Favorites {
    pub fn new(favorites: FavoritesRepository) -> Self {
        Self { favorites }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        StateMachine::new(
            self,
            FavoritesState::default(),
            Some(FavoritesAction::Load),
            config,
        )
    }
}

impl Feature for Favorites {
    type State = FavoritesState;
    type Action = FavoritesAction;
    type Mutation = FavoritesMutation;
    type SideEffect = FavoritesSideEffect;
    const NAME: &'static str = "favorites";

    fn processor(&self) -> Processor<Self> {
        let loader = self.favorites.clone();
        let remover = self.favorites.clone();

        Processor::<Self>::new()
            .on_latest(
                |action: &FavoritesAction| matches!(action, FavoritesAction::Load).then_some(()),
                move |_, ctx| {
                    let loading = ctx.state().drinks.loading_from();
                    stream::once(future::ready(FavoritesMutation::Drinks(loading)))
                        .chain(
                            loader
                                .observe_favorite_drinks()
                                .map(|drinks| FavoritesMutation::Drinks(Async::from(drinks))),
                        )
                        .boxed()
                },
            )
            .on_effect(
                |action: &FavoritesAction| match action {
                    FavoritesAction::ToggleFavorite(drink) => Some(drink.clone()),
                    _ => None,
                },
                move |drink, ctx| {
                    let favorites = remover.clone();
                    let ctx = ctx.clone();
                    ctx.scope().clone().spawn(async move {
                        if let Err(e) = favorites.set_favorite(&drink, false).await {
                            tracing::warn!(alias = %drink.alias, error = %e, "Failed to remove favorite");
                            ctx.emit(FavoritesSideEffect::ShowMessage(e.to_string()));
                        }
                    });
                },
            )
            .on_effect(
                |action: &FavoritesAction| match action {
                    FavoritesAction::DrinkClicked(drink) => {
                        Some(FavoritesSideEffect::NavigateToDrink(drink.alias.clone()))
                    }
                    FavoritesAction::DiscoverClicked => Some(FavoritesSideEffect::NavigateToDiscovery),
                    _ => None,
                },
                |effect, ctx| ctx.emit(effect),
            )
    }

    fn reduce(state: FavoritesState, mutation: FavoritesMutation) -> FavoritesState {
        match mutation {
            FavoritesMutation::Drinks(drinks) => FavoritesState { drinks },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ReactiveCache;
    use crate::repository::memory::{Catalog, InMemoryDrinkRepository, InMemoryFavoriteStore};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn aliases(state: &FavoritesState) -> Vec<String> {
        state
            .drinks
            .invoke()
            .map(|drinks| drinks.iter().map(|d| d.alias.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_lists_and_removes_favorites() {
        let drinks = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let store = Arc::new(InMemoryFavoriteStore::with_favorites(HashSet::from([
            "paloma".to_string(),
            "gimlet".to_string(),
        ])));
        let favorites = FavoritesRepository::new(store, drinks, Arc::new(ReactiveCache::new()));
        let machine = Favorites::new(favorites).start(&EngineConfig::default());

        let state = timeout(WAIT, machine.await_state(|s| s.drinks.is_success()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aliases(&state), vec!["gimlet".to_string(), "paloma".to_string()]);
        assert!(state.drinks.invoke().unwrap().iter().all(|d| d.is_favorite));

        machine.process(FavoritesAction::ToggleFavorite(Drink::new("gimlet", "Gimlet")));

        let state = timeout(WAIT, machine.await_state(|s| aliases(s).len() == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aliases(&state), vec!["paloma".to_string()]);
    }
}

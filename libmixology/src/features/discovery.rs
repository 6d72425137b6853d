//! Discovery screen: a batch of random drinks and the category list

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::async_result::{execute, Async};
use crate::config::EngineConfig;
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::DrinkRepository;
use crate::types::{Category, Drink};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiscoveryState {
    pub random_drinks: Async<Vec<Drink>>,
    pub categories: Async<Vec<Category>>,
}

#[derive(Debug, Clone)]
pub enum DiscoveryAction {
    /// Initial action
    Load,
    Retry,
    HeartClicked,
    SearchClicked,
    CategoryClicked(Category),
    DrinkClicked(Drink),
}

#[derive(Debug)]
pub enum DiscoveryMutation {
    RandomDrinks(Async<Vec<Drink>>),
    Categories(Async<Vec<Category>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoverySideEffect {
    NavigateToFavorites,
    NavigateToSearch,
    NavigateToCategory(Category),
    NavigateToDrink(String),
}

impl DiscoverySideEffect {
    pub fn destination(&self) -> Destination {
        match self {
            DiscoverySideEffect::NavigateToFavorites => Destination::Favorites,
            DiscoverySideEffect::NavigateToSearch => Destination::Search,
            DiscoverySideEffect::NavigateToCategory(category) => Destination::Category {
                tag: category.tag.clone(),
                name: category.name.clone(),
            },
            DiscoverySideEffect::NavigateToDrink(alias) => Destination::DrinkDetail {
                alias: alias.clone(),
            },
        }
    }
}

pub struct Discovery {
    repository: Arc<dyn DrinkRepository>,
    batch_size: usize,
}

impl Discovery {
    pub fn new(repository: Arc<dyn DrinkRepository>, config: &EngineConfig) -> Self {
        Self {
            repository,
            batch_size: config.random_batch_size,
        }
    }

    /// Start the machine; the first load fires immediately
    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        StateMachine::new(
            self,
            DiscoveryState::default(),
            Some(DiscoveryAction::Load),
            config,
        )
    }
}

impl Feature for Discovery {
    type State = DiscoveryState;
    type Action = DiscoveryAction;
    type Mutation = DiscoveryMutation;
    type SideEffect = DiscoverySideEffect;
    const NAME: &'static str = "discovery";

    fn processor(&self) -> Processor<Self> {
        let repository = Arc::clone(&self.repository);
        let batch_size = self.batch_size;

        Processor::<Self>::new()
            .on_latest(
                |action: &DiscoveryAction| {
                    matches!(action, DiscoveryAction::Load | DiscoveryAction::Retry).then_some(())
                },
                move |_, _ctx| {
                    let drinks = Arc::clone(&repository);
                    let categories = Arc::clone(&repository);

                    let drinks = execute(async move { drinks.random_drinks(batch_size).await })
                        .map(DiscoveryMutation::RandomDrinks);
                    let categories = execute(async move { categories.categories().await })
                        .map(DiscoveryMutation::Categories);

                    stream::select(drinks, categories).boxed()
                },
            )
            .on_effect(
                |action: &DiscoveryAction| match action {
                    DiscoveryAction::HeartClicked => Some(DiscoverySideEffect::NavigateToFavorites),
                    DiscoveryAction::SearchClicked => Some(DiscoverySideEffect::NavigateToSearch),
                    DiscoveryAction::CategoryClicked(category) => {
                        Some(DiscoverySideEffect::NavigateToCategory(category.clone()))
                    }
                    DiscoveryAction::DrinkClicked(drink) => {
                        Some(DiscoverySideEffect::NavigateToDrink(drink.alias.clone()))
                    }
                    DiscoveryAction::Load | DiscoveryAction::Retry => None,
                },
                |effect, ctx| ctx.emit(effect),
            )
    }

    fn reduce(state: DiscoveryState, mutation: DiscoveryMutation) -> DiscoveryState {
        match mutation {
            DiscoveryMutation::RandomDrinks(random_drinks) => DiscoveryState {
                random_drinks,
                ..state
            },
            DiscoveryMutation::Categories(categories) => DiscoveryState { categories, ..state },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::repository::memory::{Catalog, InMemoryDrinkRepository, MockBehavior};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_reduce_replaces_only_its_field() {
        let state = DiscoveryState {
            categories: Async::Success(vec![]),
            ..Default::default()
        };
        let next = Discovery::reduce(
            state,
            DiscoveryMutation::RandomDrinks(Async::Loading(None)),
        );
        assert_eq!(next.random_drinks, Async::Loading(None));
        assert_eq!(next.categories, Async::Success(vec![]));
    }

    #[tokio::test]
    async fn test_initial_load_fills_both_fields() {
        let config = EngineConfig::default();
        let repository = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let machine = Discovery::new(repository, &config).start(&config);

        let state = timeout(
            WAIT,
            machine.await_state(|s| s.random_drinks.is_complete() && s.categories.is_complete()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(state.random_drinks.invoke().map(Vec::len), Some(10));
        assert_eq!(state.categories.invoke().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let config = EngineConfig::default();
        let repository = Arc::new(InMemoryDrinkRepository::failing(
            Catalog::sample(),
            RepositoryError::Network("offline".to_string()),
        ));
        let machine = Discovery::new(repository.clone(), &config).start(&config);

        let failed = timeout(WAIT, machine.await_state(|s| s.random_drinks.is_fail()))
            .await
            .unwrap()
            .unwrap();
        assert!(failed.random_drinks.should_load());

        repository.set_behavior(MockBehavior::default());
        machine.process(DiscoveryAction::Retry);

        let state = timeout(WAIT, machine.await_state(|s| s.random_drinks.is_success()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.random_drinks.invoke().map(Vec::len), Some(10));
    }

    #[tokio::test]
    async fn test_clicks_only_navigate() {
        let config = EngineConfig::default();
        let repository = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let machine = Discovery::new(repository, &config).start(&config);
        let loaded = timeout(
            WAIT,
            machine.await_state(|s| s.random_drinks.is_success() && s.categories.is_success()),
        )
        .await
        .unwrap()
        .unwrap();

        let mut effects = machine.side_effect_stream();
        machine.process(DiscoveryAction::HeartClicked);
        machine.process(DiscoveryAction::CategoryClicked(Category {
            tag: "gin".to_string(),
            name: "Gin".to_string(),
        }));

        assert_eq!(
            timeout(WAIT, effects.next()).await.unwrap(),
            Some(DiscoverySideEffect::NavigateToFavorites)
        );
        let category = timeout(WAIT, effects.next()).await.unwrap().unwrap();
        assert_eq!(
            category.destination(),
            Destination::Category {
                tag: "gin".to_string(),
                name: "Gin".to_string()
            }
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(machine.state(), loaded);
    }
}

//! Drink list screen for a collection or a tag

use futures::future;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;

use crate::async_result::Async;
use crate::config::EngineConfig;
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::{DrinkRepository, FavoritesRepository, RepositoryResult};
use crate::types::Drink;

/// What the list shows. Fixed for the machine's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrinkListSource {
    Collection(String),
    Tag(String),
}

impl fmt::Display for DrinkListSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrinkListSource::Collection(name) => write!(f, "collection:{}", name),
            DrinkListSource::Tag(tag) => write!(f, "tag:{}", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrinkListState {
    pub source: DrinkListSource,
    pub drinks: Async<Vec<Drink>>,
}

#[derive(Debug, Clone)]
pub enum DrinkListAction {
    /// Initial action
    Load,
    Retry,
    ToggleFavorite(Drink),
    DrinkClicked(Drink),
}

#[derive(Debug)]
pub enum DrinkListMutation {
    Drinks(Async<Vec<Drink>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrinkListSideEffect {
    NavigateToDrink(String),
    ShowMessage(String),
}

impl DrinkListSideEffect {
    pub fn destination(&self) -> Option<Destination> {
        match self {
            DrinkListSideEffect::NavigateToDrink(alias) => Some(Destination::DrinkDetail {
                alias: alias.clone(),
            }),
            DrinkListSideEffect::ShowMessage(_) => None,
        }
    }
}

pub struct DrinkList {
    source: DrinkListSource,
    drinks: Arc<dyn DrinkRepository>,
    favorites: FavoritesRepository,
}

impl DrinkList {
    pub fn new(
        source: DrinkListSource,
        drinks: Arc<dyn DrinkRepository>,
        favorites: FavoritesRepository,
    ) -> Self {
        Self {
            source,
            drinks,
            favorites,
        }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        let initial = DrinkListState {
            source: self.source.clone(),
            drinks: Async::Uninitialized,
        };
        StateMachine::new(self, initial, Some(DrinkListAction::Load), config)
    }
}

async fn fetch(
    drinks: Arc<dyn DrinkRepository>,
    source: DrinkListSource,
) -> RepositoryResult<Vec<Drink>> {
    match &source {
        DrinkListSource::Collection(name) => drinks.collection(name).await,
        DrinkListSource::Tag(tag) => drinks.drinks_by_tag(tag).await,
    }
}

impl Feature for DrinkList {
    type State = DrinkListState;
    type Action = DrinkListAction;
    type Mutation = DrinkListMutation;
    type SideEffect = DrinkListSideEffect;
    const NAME: &'static str = "drink_list";

    fn processor(&self) -> Processor<Self> {
        let source = self.source.clone();
        let drinks = Arc::clone(&self.drinks);
        let loader = self.favorites.clone();
        let toggler = self.favorites.clone();

        Processor::<Self>::new()
            .on_latest(
                |action: &DrinkListAction| {
                    matches!(action, DrinkListAction::Load | DrinkListAction::Retry).then_some(())
                },
                move |_, ctx| {
                    tracing::debug!(source = %source, "Loading drink list");
                    let favorites = loader.clone();
                    let loading = ctx.state().drinks.loading_from();

                    stream::once(future::ready(DrinkListMutation::Drinks(loading)))
                        .chain(
                            stream::once(fetch(Arc::clone(&drinks), source.clone())).flat_map(
                                move |result| match result {
                                    // Re-mark the list every time the favorite set changes
                                    Ok(list) => favorites
                                        .observe_favorite_aliases()
                                        .map(move |aliases| {
                                            let marked = list
                                                .iter()
                                                .map(|drink| {
                                                    let favorite = aliases.contains(&drink.alias);
                                                    drink.clone().with_favorite(favorite)
                                                })
                                                .collect();
                                            DrinkListMutation::Drinks(Async::Success(marked))
                                        })
                                        .boxed(),
                                    Err(error) => {
                                        stream::iter([DrinkListMutation::Drinks(Async::fail(error))])
                                            .boxed()
                                    }
                                },
                            ),
                        )
                        .boxed()
                },
            )
            .on_effect(
                |action: &DrinkListAction| match action {
                    DrinkListAction::ToggleFavorite(drink) => Some(drink.clone()),
                    _ => None,
                },
                move |drink, ctx| {
                    let favorites = toggler.clone();
                    let ctx = ctx.clone();
                    ctx.scope().clone().spawn(async move {
                        if let Err(e) = favorites.toggle(&drink).await {
                            tracing::warn!(alias = %drink.alias, error = %e, "Failed to toggle favorite");
                            ctx.emit(DrinkListSideEffect::ShowMessage(e.to_string()));
                        }
                    });
                },
            )
            .on_effect(
                |action: &DrinkListAction| match action {
                    DrinkListAction::DrinkClicked(drink) => Some(drink.alias.clone()),
                    _ => None,
                },
                |alias, ctx| ctx.emit(DrinkListSideEffect::NavigateToDrink(alias)),
            )
    }

    fn reduce(state: DrinkListState, mutation: DrinkListMutation) -> DrinkListState {
        match mutation {
            DrinkListMutation::Drinks(drinks) => DrinkListState { drinks, ..state },
        }
    }
}

//! Drink detail screen
//!
//! After loading, the machine follows the drink's cache entry, so a
//! favorite flipped on any other screen shows up here without a reload.

use futures::future;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::async_result::Async;
use crate::config::EngineConfig;
use crate::error::MixologyError;
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::{DrinkRepository, FavoritesRepository};
use crate::types::{Drink, DrinkDetails};

#[derive(Debug, Clone, PartialEq)]
pub struct DrinkDetailState {
    pub alias: String,
    pub details: Async<DrinkDetails>,
}

#[derive(Debug, Clone)]
pub enum DrinkDetailAction {
    /// Initial action
    Load,
    Retry,
    ToggleFavorite,
    TagClicked(String),
    BackClicked,
}

#[derive(Debug)]
pub enum DrinkDetailMutation {
    Details(Async<DrinkDetails>),
    /// Newer version of the drink seen in the cache
    DrinkUpdated(Drink),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrinkDetailSideEffect {
    NavigateToTag(String),
    NavigateBack,
    ShowMessage(String),
}

impl DrinkDetailSideEffect {
    pub fn destination(&self) -> Option<Destination> {
        match self {
            DrinkDetailSideEffect::NavigateToTag(tag) => Some(Destination::Category {
                tag: tag.clone(),
                name: tag.clone(),
            }),
            DrinkDetailSideEffect::NavigateBack => Some(Destination::Back),
            DrinkDetailSideEffect::ShowMessage(_) => None,
        }
    }
}

pub struct DrinkDetail {
    alias: String,
    drinks: Arc<dyn DrinkRepository>,
    favorites: FavoritesRepository,
}

impl DrinkDetail {
    pub fn new(alias: &str, drinks: Arc<dyn DrinkRepository>, favorites: FavoritesRepository) -> Self {
        Self {
            alias: alias.to_string(),
            drinks,
            favorites,
        }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        let initial = DrinkDetailState {
            alias: self.alias.clone(),
            details: Async::Uninitialized,
        };
        StateMachine::new(self, initial, Some(DrinkDetailAction::Load), config)
    }
}

impl Feature for DrinkDetail {
    type State = DrinkDetailState;
    type Action = DrinkDetailAction;
    type Mutation = DrinkDetailMutation;
    type SideEffect = DrinkDetailSideEffect;
    const NAME: &'static str = "drink_detail";

    fn processor(&self) -> Processor<Self> {
        let alias = self.alias.clone();
        let drinks = Arc::clone(&self.drinks);
        let loader = self.favorites.clone();
        let toggler = self.favorites.clone();

        Processor::<Self>::new()
            .on_latest(
                |action: &DrinkDetailAction| {
                    matches!(action, DrinkDetailAction::Load | DrinkDetailAction::Retry)
                        .then_some(())
                },
                move |_, ctx| {
                    let alias = alias.clone();
                    let drinks = Arc::clone(&drinks);
                    let favorites = loader.clone();
                    let loading = ctx.state().details.loading_from();

                    let fetch = {
                        let alias = alias.clone();
                        let favorites = favorites.clone();
                        async move {
                            let details = drinks.drink(&alias).await?;
                            let is_favorite = favorites.is_favorite(&alias).await?;
                            let drink = details.drink.clone().with_favorite(is_favorite);
                            favorites.remember(drink.clone());
                            Ok::<_, MixologyError>(DrinkDetails { drink, ..details })
                        }
                    };

                    stream::once(future::ready(DrinkDetailMutation::Details(loading)))
                        .chain(stream::once(fetch).flat_map(move |result| match result {
                            Ok(details) => stream::once(future::ready(
                                DrinkDetailMutation::Details(Async::Success(details)),
                            ))
                            .chain(
                                favorites
                                    .observe_drink(&alias)
                                    .map(DrinkDetailMutation::DrinkUpdated),
                            )
                            .boxed(),
                            Err(error) => {
                                stream::iter([DrinkDetailMutation::Details(Async::fail(error))])
                                    .boxed()
                            }
                        }))
                        .boxed()
                },
            )
            .on_effect(
                |action: &DrinkDetailAction| {
                    matches!(action, DrinkDetailAction::ToggleFavorite).then_some(())
                },
                move |_, ctx| {
                    let Some(drink) = ctx.state().details.invoke().map(|d| d.drink.clone()) else {
                        tracing::debug!("Favorite toggled before details loaded, ignored");
                        return;
                    };
                    let favorites = toggler.clone();
                    let ctx = ctx.clone();
                    ctx.scope().clone().spawn(async move {
                        if let Err(e) = favorites.toggle(&drink).await {
                            tracing::warn!(alias = %drink.alias, error = %e, "Failed to toggle favorite");
                            ctx.emit(DrinkDetailSideEffect::ShowMessage(e.to_string()));
                        }
                    });
                },
            )
            .on_effect(
                |action: &DrinkDetailAction| match action {
                    DrinkDetailAction::TagClicked(tag) => {
                        Some(DrinkDetailSideEffect::NavigateToTag(tag.clone()))
                    }
                    DrinkDetailAction::BackClicked => Some(DrinkDetailSideEffect::NavigateBack),
                    _ => None,
                },
                |effect, ctx| ctx.emit(effect),
            )
    }

    fn reduce(state: DrinkDetailState, mutation: DrinkDetailMutation) -> DrinkDetailState {
        match mutation {
            DrinkDetailMutation::Details(details) => DrinkDetailState { details, ..state },
            DrinkDetailMutation::DrinkUpdated(drink) => match state.details {
                Async::Success(details) => DrinkDetailState {
                    details: Async::Success(DrinkDetails { drink, ..details }),
                    ..state
                },
                details => DrinkDetailState { details, ..state },
            },
        }
    }
}

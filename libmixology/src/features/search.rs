//! Search screen
//!
//! Typing is debounced: each `QueryChanged` replaces the pending search in a
//! [`ConflatedJob`]. `ApplyFilters` goes through the same job without delay,
//! so a pending keystroke search never lands after an applied one.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::async_result::{execute, Async};
use crate::config::EngineConfig;
use crate::job::ConflatedJob;
use crate::machine::{Context, Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::DrinkRepository;
use crate::types::{Aggregation, Drink, SearchFilters, SelectedFilter};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchState {
    pub query: String,
    pub aggregation: Async<Aggregation>,
    pub selected: HashSet<SelectedFilter>,
    pub results: Async<Vec<Drink>>,
    pub filters_visible: bool,
}

#[derive(Debug, Clone)]
pub enum SearchAction {
    /// Initial action, loads the available facets
    Load,
    QueryChanged(String),
    ToggleFilter(SelectedFilter),
    ApplyFilters,
    HideFilters,
    ClearFilters,
    Retry,
    DrinkClicked(Drink),
}

#[derive(Debug)]
pub enum SearchMutation {
    Aggregation(Async<Aggregation>),
    Query(String),
    FilterToggled(SelectedFilter),
    FiltersCleared,
    FiltersVisible(bool),
    Results(Async<Vec<Drink>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchSideEffect {
    NavigateToDrink(String),
}

impl SearchSideEffect {
    pub fn destination(&self) -> Destination {
        match self {
            SearchSideEffect::NavigateToDrink(alias) => Destination::DrinkDetail {
                alias: alias.clone(),
            },
        }
    }
}

/// Translate the selection into the filter map the search API expects
///
/// Each selection is named after the group of `aggregation` it was picked
/// from, compared by identity. Selections from an older aggregation are
/// dropped.
pub fn filters_by_name(selected: &HashSet<SelectedFilter>, aggregation: &Aggregation) -> SearchFilters {
    let mut filters = SearchFilters::new();
    for filter in selected {
        match aggregation.name_of(&filter.group) {
            Some(name) => filters
                .entry(name.to_string())
                .or_default()
                .push(filter.facet.id.clone()),
            None => tracing::debug!(facet = %filter.facet.id, "Stale filter group, skipped"),
        }
    }
    for values in filters.values_mut() {
        values.sort();
    }
    filters
}

#[derive(Clone)]
struct Searcher {
    repository: Arc<dyn DrinkRepository>,
    job: Arc<ConflatedJob>,
}

impl Searcher {
    /// Replace any pending search with one that runs after `delay`
    fn launch(&self, ctx: &Context<Search>, delay: Duration) {
        let repository = Arc::clone(&self.repository);
        let ctx_task = ctx.clone();

        self.job.launch(ctx.scope(), async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            ctx_task.settled().await;

            let state = ctx_task.state();
            let filters = state
                .aggregation
                .invoke()
                .map(|aggregation| filters_by_name(&state.selected, aggregation))
                .unwrap_or_default();

            tracing::debug!(query = %state.query, ?filters, "Searching");
            ctx_task.mutate(SearchMutation::Results(state.results.loading_from()));
            let result = repository.search(&state.query, &filters).await;
            ctx_task.mutate(SearchMutation::Results(result.into()));
        });
    }
}

pub struct Search {
    searcher: Searcher,
    debounce: Duration,
}

impl Search {
    pub fn new(repository: Arc<dyn DrinkRepository>, config: &EngineConfig) -> Self {
        Self {
            searcher: Searcher {
                repository,
                job: Arc::new(ConflatedJob::new()),
            },
            debounce: config.search_debounce(),
        }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        StateMachine::new(self, SearchState::default(), Some(SearchAction::Load), config)
    }
}

impl Feature for Search {
    type State = SearchState;
    type Action = SearchAction;
    type Mutation = SearchMutation;
    type SideEffect = SearchSideEffect;
    const NAME: &'static str = "search";

    fn processor(&self) -> Processor<Self> {
        let repository = Arc::clone(&self.searcher.repository);
        let debounced = self.searcher.clone();
        let immediate = self.searcher.clone();
        let debounce = self.debounce;

        Processor::<Self>::new()
            .on_latest(
                |action: &SearchAction| match action {
                    SearchAction::Load => Some(false),
                    SearchAction::Retry => Some(true),
                    _ => None,
                },
                move |retry, ctx| {
                    if retry && ctx.state().aggregation.is_success() {
                        return stream::empty().boxed();
                    }
                    let repository = Arc::clone(&repository);
                    execute(async move { repository.aggregation().await })
                        .map(SearchMutation::Aggregation)
                        .boxed()
                },
            )
            .on_sync(
                |action: &SearchAction| match action {
                    SearchAction::QueryChanged(query) => Some(SearchMutation::Query(query.clone())),
                    SearchAction::ToggleFilter(filter) => {
                        Some(SearchMutation::FilterToggled(filter.clone()))
                    }
                    SearchAction::ClearFilters => Some(SearchMutation::FiltersCleared),
                    SearchAction::ApplyFilters => Some(SearchMutation::FiltersVisible(true)),
                    SearchAction::HideFilters => Some(SearchMutation::FiltersVisible(false)),
                    _ => None,
                },
                |mutation, _ctx| [mutation],
            )
            .on_effect(
                move |action: &SearchAction| match action {
                    SearchAction::QueryChanged(_) => Some(debounce),
                    SearchAction::ApplyFilters => Some(Duration::ZERO),
                    _ => None,
                },
                move |delay, ctx| debounced.launch(ctx, delay),
            )
            .on_effect(
                |action: &SearchAction| matches!(action, SearchAction::Retry).then_some(()),
                move |_, ctx| {
                    if ctx.state().results.is_fail() {
                        immediate.launch(ctx, Duration::ZERO);
                    }
                },
            )
            .on_effect(
                |action: &SearchAction| match action {
                    SearchAction::DrinkClicked(drink) => Some(drink.alias.clone()),
                    _ => None,
                },
                |alias, ctx| ctx.emit(SearchSideEffect::NavigateToDrink(alias)),
            )
    }

    fn reduce(state: SearchState, mutation: SearchMutation) -> SearchState {
        match mutation {
            SearchMutation::Aggregation(aggregation) => SearchState {
                aggregation,
                ..state
            },
            SearchMutation::Query(query) => SearchState { query, ..state },
            SearchMutation::FilterToggled(filter) => {
                let mut selected = state.selected.clone();
                if !selected.remove(&filter) {
                    selected.insert(filter);
                }
                SearchState { selected, ..state }
            }
            SearchMutation::FiltersCleared => SearchState {
                selected: HashSet::new(),
                ..state
            },
            SearchMutation::FiltersVisible(filters_visible) => SearchState {
                filters_visible,
                ..state
            },
            SearchMutation::Results(results) => SearchState { results, ..state },
        }
    }
}

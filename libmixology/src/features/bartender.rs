//! Bartender: generate a drink from a free-text prompt
//!
//! Unlike the other screens this one reports progress as plain
//! `is_loading` / `error` fields instead of an `Async`.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::config::{BartenderConfig, EngineConfig};
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::DrinkRepository;
use crate::types::GeneratedDrink;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BartenderState {
    pub prompt: String,
    pub is_valid: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub generated: Option<GeneratedDrink>,
}

#[derive(Debug, Clone)]
pub enum BartenderAction {
    PromptChanged(String),
    Generate,
    DismissError,
}

#[derive(Debug)]
pub enum BartenderMutation {
    Prompt { prompt: String, is_valid: bool },
    Started,
    Generated(GeneratedDrink),
    Failed(String),
    ErrorDismissed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BartenderSideEffect {
    NavigateToGenerated(String),
}

impl BartenderSideEffect {
    pub fn destination(&self) -> Destination {
        match self {
            BartenderSideEffect::NavigateToGenerated(alias) => Destination::GeneratedDrink {
                alias: alias.clone(),
            },
        }
    }
}

/// A prompt is valid once it has `min_chars` non-whitespace characters
pub fn is_valid_prompt(prompt: &str, min_chars: usize) -> bool {
    prompt.chars().filter(|c| !c.is_whitespace()).count() >= min_chars
}

pub struct Bartender {
    repository: Arc<dyn DrinkRepository>,
    min_prompt_chars: usize,
}

impl Bartender {
    pub fn new(repository: Arc<dyn DrinkRepository>, config: &BartenderConfig) -> Self {
        Self {
            repository,
            min_prompt_chars: config.min_prompt_chars,
        }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        StateMachine::new(self, BartenderState::default(), None, config)
    }
}

impl Feature for Bartender {
    type State = BartenderState;
    type Action = BartenderAction;
    type Mutation = BartenderMutation;
    type SideEffect = BartenderSideEffect;
    const NAME: &'static str = "bartender";

    fn processor(&self) -> Processor<Self> {
        let repository = Arc::clone(&self.repository);
        let min_chars = self.min_prompt_chars;

        Processor::<Self>::new()
            .on_sync(
                |action: &BartenderAction| match action {
                    BartenderAction::PromptChanged(prompt) => Some(prompt.clone()),
                    _ => None,
                },
                move |prompt, _ctx| {
                    let is_valid = is_valid_prompt(&prompt, min_chars);
                    [BartenderMutation::Prompt { prompt, is_valid }]
                },
            )
            .on_sync(
                |action: &BartenderAction| {
                    matches!(action, BartenderAction::DismissError).then_some(())
                },
                |_, _ctx| [BartenderMutation::ErrorDismissed],
            )
            .on_latest(
                |action: &BartenderAction| matches!(action, BartenderAction::Generate).then_some(()),
                move |_, ctx| {
                    let repository = Arc::clone(&repository);
                    stream::once(async move {
                        // The prompt may still be queued behind this action
                        ctx.settled().await;
                        let state = ctx.state();
                        if !state.is_valid {
                            let error = format!("Describe your drink in at least {} characters", min_chars);
                            return stream::iter(vec![BartenderMutation::Failed(error)]).boxed();
                        }

                        stream::once(async { BartenderMutation::Started })
                            .chain(stream::once(async move {
                                match repository.generate(state.prompt.trim()).await {
                                    Ok(drink) => {
                                        ctx.emit(BartenderSideEffect::NavigateToGenerated(
                                            drink.alias.clone(),
                                        ));
                                        BartenderMutation::Generated(drink)
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Drink generation failed");
                                        BartenderMutation::Failed(e.to_string())
                                    }
                                }
                            }))
                            .boxed()
                    })
                    .flatten()
                    .boxed()
                },
            )
    }

    fn reduce(state: BartenderState, mutation: BartenderMutation) -> BartenderState {
        match mutation {
            BartenderMutation::Prompt { prompt, is_valid } => BartenderState {
                prompt,
                is_valid,
                ..state
            },
            BartenderMutation::Started => BartenderState {
                is_loading: true,
                error: None,
                ..state
            },
            BartenderMutation::Generated(drink) => BartenderState {
                is_loading: false,
                generated: Some(drink),
                ..state
            },
            BartenderMutation::Failed(error) => BartenderState {
                is_loading: false,
                error: Some(error),
                ..state
            },
            BartenderMutation::ErrorDismissed => BartenderState { error: None, ..state },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::repository::memory::{Catalog, InMemoryDrinkRepository};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn machine(repository: InMemoryDrinkRepository) -> StateMachine<Bartender> {
        Bartender::new(Arc::new(repository), &BartenderConfig::default())
            .start(&EngineConfig::default())
    }

    #[test]
    fn test_prompt_validity_ignores_whitespace() {
        assert!(!is_valid_prompt("", 3));
        assert!(!is_valid_prompt(" a b ", 3));
        assert!(is_valid_prompt("a b c", 3));
        assert!(is_valid_prompt("gin", 3));
    }

    #[tokio::test]
    async fn test_short_prompt_sets_error() {
        let machine = machine(InMemoryDrinkRepository::new(Catalog::sample()));

        machine.process(BartenderAction::PromptChanged("ok".to_string()));
        machine.process(BartenderAction::Generate);

        let state = timeout(WAIT, machine.await_state(|s| s.error.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(!state.is_valid);
        assert!(!state.is_loading);
        assert!(state.generated.is_none());

        machine.process(BartenderAction::DismissError);
        timeout(WAIT, machine.await_state(|s| s.error.is_none()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_generate_navigates_to_drink() {
        let machine = machine(InMemoryDrinkRepository::new(Catalog::sample()));
        let mut effects = machine.side_effect_stream();

        machine.process(BartenderAction::PromptChanged("smoky gin sour".to_string()));
        machine.process(BartenderAction::Generate);

        let state = timeout(WAIT, machine.await_state(|s| s.generated.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(!state.is_loading);
        assert_eq!(state.generated.unwrap().alias, "smoky-gin-sour");

        let effect = timeout(WAIT, effects.next()).await.unwrap().unwrap();
        assert_eq!(
            effect.destination(),
            Destination::GeneratedDrink {
                alias: "smoky-gin-sour".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_failure_is_plain_error_field() {
        let machine = machine(InMemoryDrinkRepository::failing(
            Catalog::sample(),
            RepositoryError::Generation("model unavailable".to_string()),
        ));

        machine.process(BartenderAction::PromptChanged("tiki".to_string()));
        machine.process(BartenderAction::Generate);

        let state = timeout(WAIT, machine.await_state(|s| s.error.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            state.error.as_deref(),
            Some("Generation failed: model unavailable")
        );
        assert!(!state.is_loading);
    }
}

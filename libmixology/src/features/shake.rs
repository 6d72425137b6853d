//! Shake-to-discover
//!
//! The detector is only started by the initial action. Every shake loads a
//! random drink. A result is surfaced unless it is a success arriving while
//! nothing has been loaded yet; `Retry` always surfaces its result.

use futures::stream::StreamExt;
use std::sync::Arc;

use crate::async_result::{execute, Async};
use crate::config::EngineConfig;
use crate::machine::{Feature, Processor, StateMachine};
use crate::navigation::Destination;
use crate::repository::DrinkRepository;
use crate::shake::{shake_events, ShakeDetector};
use crate::types::Drink;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShakeState {
    pub random_drink: Async<Drink>,
    pub should_show: bool,
}

#[derive(Debug, Clone)]
pub enum ShakeAction {
    /// Initial action, starts listening for shakes
    Start,
    Retry,
    Dismiss,
    DrinkClicked,
}

#[derive(Debug)]
pub enum ShakeMutation {
    /// Result of a detected shake, gated against the drink it replaces
    Shaken(Async<Drink>),
    /// Result of a manual retry, always shown
    Retried(Async<Drink>),
    Dismissed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShakeSideEffect {
    NavigateToDrink(String),
}

impl ShakeSideEffect {
    pub fn destination(&self) -> Destination {
        match self {
            ShakeSideEffect::NavigateToDrink(alias) => Destination::DrinkDetail {
                alias: alias.clone(),
            },
        }
    }
}

/// Whether a shake result is surfaced, given the drink it replaces
pub fn should_show(result: &Async<Drink>, previous: &Async<Drink>) -> bool {
    !(result.is_success() && previous.is_uninitialized())
}

pub struct Shake {
    repository: Arc<dyn DrinkRepository>,
    detector: Arc<dyn ShakeDetector>,
}

impl Shake {
    pub fn new(repository: Arc<dyn DrinkRepository>, detector: Arc<dyn ShakeDetector>) -> Self {
        Self {
            repository,
            detector,
        }
    }

    pub fn start(self, config: &EngineConfig) -> StateMachine<Self> {
        StateMachine::new(self, ShakeState::default(), Some(ShakeAction::Start), config)
    }
}

impl Feature for Shake {
    type State = ShakeState;
    type Action = ShakeAction;
    type Mutation = ShakeMutation;
    type SideEffect = ShakeSideEffect;
    const NAME: &'static str = "shake";

    fn processor(&self) -> Processor<Self> {
        let on_shake = Arc::clone(&self.repository);
        let on_retry = Arc::clone(&self.repository);
        let detector = Arc::clone(&self.detector);

        Processor::<Self>::new()
            .on_latest(
                |action: &ShakeAction| matches!(action, ShakeAction::Start).then_some(()),
                move |_, _ctx| {
                    let repository = Arc::clone(&on_shake);
                    shake_events(Arc::clone(&detector))
                        .then(move |_| {
                            tracing::debug!("Shake detected");
                            let repository = Arc::clone(&repository);
                            async move {
                                ShakeMutation::Shaken(Async::from(repository.random_drink().await))
                            }
                        })
                        .boxed()
                },
            )
            .on_latest(
                |action: &ShakeAction| matches!(action, ShakeAction::Retry).then_some(()),
                move |_, _ctx| {
                    let repository = Arc::clone(&on_retry);
                    execute(async move { repository.random_drink().await })
                        .map(ShakeMutation::Retried)
                        .boxed()
                },
            )
            .on_sync(
                |action: &ShakeAction| matches!(action, ShakeAction::Dismiss).then_some(()),
                |_, _ctx| [ShakeMutation::Dismissed],
            )
            .on_effect(
                |action: &ShakeAction| matches!(action, ShakeAction::DrinkClicked).then_some(()),
                |_, ctx| {
                    if let Async::Success(drink) = ctx.state().random_drink {
                        ctx.emit(ShakeSideEffect::NavigateToDrink(drink.alias));
                    }
                },
            )
    }

    fn reduce(state: ShakeState, mutation: ShakeMutation) -> ShakeState {
        match mutation {
            ShakeMutation::Shaken(drink) => ShakeState {
                should_show: should_show(&drink, &state.random_drink),
                random_drink: drink,
            },
            ShakeMutation::Retried(drink) => ShakeState {
                random_drink: drink,
                should_show: true,
            },
            ShakeMutation::Dismissed => ShakeState {
                random_drink: Async::Uninitialized,
                should_show: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::repository::memory::{Catalog, InMemoryDrinkRepository};
    use crate::shake::ManualShakeDetector;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_gate_truth_table() {
        let drink = Async::Success(Drink::new("paloma", "Paloma"));
        let failed: Async<Drink> = Async::fail(RepositoryError::Network("offline".to_string()));

        assert!(!should_show(&drink, &Async::Uninitialized));
        assert!(should_show(&drink, &drink));
        assert!(should_show(&failed, &Async::Uninitialized));
        assert!(should_show(&drink, &failed));
    }

    #[test]
    fn test_dismiss_resets() {
        let state = ShakeState {
            random_drink: Async::Success(Drink::new("paloma", "Paloma")),
            should_show: true,
        };
        assert_eq!(Shake::reduce(state, ShakeMutation::Dismissed), ShakeState::default());
    }

    #[test]
    fn test_gate_uses_reduced_state() {
        let drink = || Async::Success(Drink::new("paloma", "Paloma"));

        let first = Shake::reduce(ShakeState::default(), ShakeMutation::Shaken(drink()));
        assert!(!first.should_show);

        let second = Shake::reduce(first, ShakeMutation::Shaken(drink()));
        assert!(second.should_show);

        let retried = Shake::reduce(ShakeState::default(), ShakeMutation::Retried(drink()));
        assert!(retried.should_show);
    }

    #[tokio::test]
    async fn test_back_to_back_shakes_show_second_drink() {
        let repository = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let detector = Arc::new(ManualShakeDetector::new());
        let machine = Shake::new(repository, detector.clone()).start(&EngineConfig::default());
        timeout(WAIT, async {
            while !detector.is_started() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        detector.shake();
        detector.shake();

        let state = timeout(WAIT, machine.await_state(|s| s.should_show))
            .await
            .unwrap()
            .unwrap();
        assert!(state.random_drink.is_success());
    }

    #[tokio::test]
    async fn test_detector_waits_for_initial_action() {
        let repository = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let detector = Arc::new(ManualShakeDetector::new());
        let feature = Shake::new(repository, detector.clone());
        assert!(!detector.is_started());

        let machine = feature.start(&EngineConfig::default());
        timeout(WAIT, async {
            while !detector.is_started() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        machine.clear();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!detector.is_started());
    }

    #[tokio::test]
    async fn test_retry_bypasses_gate() {
        let repository = Arc::new(InMemoryDrinkRepository::new(Catalog::sample()));
        let detector = Arc::new(ManualShakeDetector::new());
        let machine = Shake::new(repository, detector).start(&EngineConfig::default());

        machine.process(ShakeAction::Retry);
        let state = timeout(WAIT, machine.await_state(|s| s.random_drink.is_success()))
            .await
            .unwrap()
            .unwrap();
        assert!(state.should_show);

        let mut effects = machine.side_effect_stream();
        machine.process(ShakeAction::DrinkClicked);
        let effect = timeout(WAIT, effects.next()).await.unwrap().unwrap();
        assert_eq!(
            effect,
            ShakeSideEffect::NavigateToDrink(state.random_drink.invoke().unwrap().alias.clone())
        );
    }
}

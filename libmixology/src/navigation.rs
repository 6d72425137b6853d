//! Navigation contract
//!
//! Feature machines never navigate themselves. They emit side effects, and
//! the host bridges those to a [`Router`] with [`forward_effects`].

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::machine::{Feature, StateMachine};

/// Where the host should go next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Discovery,
    Search,
    Favorites,
    Bartender,
    Shake,
    DrinkDetail { alias: String },
    Category { tag: String, name: String },
    Collection { name: String },
    GeneratedDrink { alias: String },
    Back,
}

/// Host navigation, fire and forget
pub trait Router: Send + Sync {
    fn navigate(&self, destination: Destination);
}

/// Forward the machine's side effects to `router`
///
/// Effects that `map` turns into `None` are skipped. The task runs in the
/// machine's scope and stops when the machine is cleared.
pub fn forward_effects<F, M>(
    machine: &StateMachine<F>,
    router: Arc<dyn Router>,
    map: M,
) -> JoinHandle<()>
where
    F: Feature,
    M: Fn(&F::SideEffect) -> Option<Destination> + Send + Sync + 'static,
{
    let mut effects = machine.side_effect_stream();
    machine.scope().spawn(async move {
        while let Some(effect) = effects.next().await {
            if let Some(destination) = map(&effect) {
                tracing::debug!(machine = F::NAME, ?destination, "Navigating");
                router.navigate(destination);
            }
        }
    })
}

/// Router that only remembers where it was sent
#[derive(Debug, Default)]
pub struct RecordingRouter {
    visited: Mutex<Vec<Destination>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Destination> {
        self.destinations().pop()
    }
}

impl Router for RecordingRouter {
    fn navigate(&self, destination: Destination) {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(destination);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::machine::Processor;
    use std::time::Duration;

    struct Clicker;

    #[derive(Debug, Clone)]
    enum ClickAction {
        Open(String),
        Stay,
    }

    #[derive(Debug, Clone)]
    enum ClickEffect {
        Open(String),
        Toast,
    }

    impl Feature for Clicker {
        type State = ();
        type Action = ClickAction;
        type Mutation = ();
        type SideEffect = ClickEffect;
        const NAME: &'static str = "clicker";

        fn processor(&self) -> Processor<Self> {
            Processor::<Self>::new().on_effect(
                |action: &ClickAction| Some(action.clone()),
                |action, ctx| match action {
                    ClickAction::Open(alias) => ctx.emit(ClickEffect::Open(alias)),
                    ClickAction::Stay => ctx.emit(ClickEffect::Toast),
                },
            )
        }

        fn reduce(state: (), _mutation: ()) {
            state
        }
    }

    #[tokio::test]
    async fn test_forward_effects_maps_and_skips() {
        let machine = StateMachine::new(Clicker, (), None, &EngineConfig::default());
        let router = Arc::new(RecordingRouter::new());

        forward_effects(&machine, router.clone(), |effect| match effect {
            ClickEffect::Open(alias) => Some(Destination::DrinkDetail {
                alias: alias.clone(),
            }),
            ClickEffect::Toast => None,
        });

        machine.process(ClickAction::Stay);
        machine.process(ClickAction::Open("negroni".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            router.destinations(),
            vec![Destination::DrinkDetail {
                alias: "negroni".to_string()
            }]
        );
    }

    #[test]
    fn test_destination_serializes_tagged() {
        let json = serde_json::to_string(&Destination::Collection {
            name: "classics".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"collection","name":"classics"}"#);
    }
}

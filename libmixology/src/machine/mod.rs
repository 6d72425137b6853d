//! Generic state machine engine
//!
//! Every feature is a [`Feature`] implementation driven by a
//! [`StateMachine`]:
//!
//! ```text
//! process(action) -> action channel -> Processor -> mutations -> reduce -> state
//!                                          \-> side effects (broadcast)
//! ```
//!
//! # Guarantees
//!
//! - Actions are handled in dispatch order; the initial action (if any) is
//!   handled before anything dispatched by callers.
//! - Mutations are applied in the order the processor emits them, on a single
//!   reducer task. The reducer is synchronous and pure.
//! - State is hot: it is published through a `tokio::sync::watch` cell that
//!   always holds the latest value, whether or not anyone is subscribed.
//! - Side effects go through a `tokio::sync::broadcast` channel. Late
//!   subscribers never see effects emitted before they attached.
//! - [`StateMachine::clear`] (or dropping the machine) cancels every task of
//!   the machine. Subscribers keep the last state.
//! - A panic inside a processor branch or the reducer tears down that machine
//!   only.
//!
//! # Example
//!
//! ```no_run
//! use futures::stream::{self, StreamExt};
//! use libmixology::config::EngineConfig;
//! use libmixology::machine::{Feature, Processor, StateMachine};
//!
//! struct Counter;
//!
//! #[derive(Debug, Clone)]
//! enum CounterAction { Add(i64) }
//!
//! #[derive(Debug)]
//! enum CounterMutation { Added(i64) }
//!
//! impl Feature for Counter {
//!     type State = i64;
//!     type Action = CounterAction;
//!     type Mutation = CounterMutation;
//!     type SideEffect = ();
//!     const NAME: &'static str = "counter";
//!
//!     fn processor(&self) -> Processor<Self> {
//!         Processor::<Self>::new().on_each(
//!             |action: &CounterAction| match action { CounterAction::Add(n) => Some(*n) },
//!             |n, _ctx| stream::iter([CounterMutation::Added(n)]).boxed(),
//!         )
//!     }
//!
//!     fn reduce(state: i64, mutation: CounterMutation) -> i64 {
//!         match mutation { CounterMutation::Added(n) => state + n }
//!     }
//! }
//!
//! # async fn example() {
//! let machine = StateMachine::new(Counter, 0, None, &EngineConfig::default());
//! machine.process(CounterAction::Add(2));
//! let state = machine.await_state(|s| *s == 2).await;
//! assert_eq!(state, Some(2));
//! # }
//! ```

pub mod processor;
pub mod scope;

pub use processor::{Context, MutationStream, Processor};

use processor::Envelope;
pub use scope::Scope;

use futures::stream::{self, BoxStream, StreamExt};
use std::fmt::Debug;
use tokio::sync::broadcast::error::RecvError;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::EngineConfig;
use crate::flow::{watch_stream, Watchable};

/// A feature's state shape, inputs, deltas and processing rules
pub trait Feature: Send + Sync + Sized + 'static {
    type State: Clone + PartialEq + Debug + Send + Sync + 'static;
    type Action: Clone + Debug + Send + Sync + 'static;
    type Mutation: Debug + Send + 'static;
    type SideEffect: Clone + Debug + Send + 'static;

    /// Name used in logs and as the scope name
    const NAME: &'static str;

    /// Build the processor. Called once per machine.
    fn processor(&self) -> Processor<Self>;

    /// Fold one mutation into the state. Must be pure.
    fn reduce(state: Self::State, mutation: Self::Mutation) -> Self::State;
}

pub struct StateMachine<F: Feature> {
    actions: mpsc::UnboundedSender<F::Action>,
    last_action: watch::Receiver<Option<F::Action>>,
    state: watch::Receiver<F::State>,
    effects: broadcast::Sender<F::SideEffect>,
    scope: Scope,
}

impl<F: Feature> StateMachine<F> {
    /// Start a machine
    ///
    /// Must be called from within a tokio runtime: the action and reducer
    /// loops are spawned immediately.
    pub fn new(
        feature: F,
        initial_state: F::State,
        initial_action: Option<F::Action>,
        config: &EngineConfig,
    ) -> Self {
        let scope = Scope::new(F::NAME);
        let (action_tx, mut action_rx) = mpsc::unbounded_channel::<F::Action>();
        let (last_tx, last_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(initial_state);
        let (effects, _) = broadcast::channel(config.side_effect_capacity.max(1));
        let (mutation_tx, mut mutation_rx) = mpsc::unbounded_channel::<Envelope<F::Mutation>>();

        if let Some(action) = initial_action {
            // Queued before the sender is handed out, so it is always first
            let _ = action_tx.send(action);
        }

        let ctx = Context::<F> {
            state: state_rx.clone(),
            effects: effects.clone(),
            mutations: mutation_tx,
            scope: scope.clone(),
        };

        scope.spawn(async move {
            while let Some(envelope) = mutation_rx.recv().await {
                let mutation = match envelope {
                    Envelope::Mutation(mutation) => mutation,
                    Envelope::Barrier(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                tracing::trace!(machine = F::NAME, ?mutation, "Applying mutation");
                let current = state_tx.borrow().clone();
                let next = F::reduce(current, mutation);
                state_tx.send_if_modified(|state| {
                    if *state != next {
                        *state = next;
                        true
                    } else {
                        false
                    }
                });
            }
        });

        let processor = feature.processor();
        let branches = processor.branch_count();
        scope.spawn(async move {
            while let Some(action) = action_rx.recv().await {
                tracing::debug!(machine = F::NAME, ?action, "Processing action");
                last_tx.send_replace(Some(action.clone()));
                if !processor.dispatch(&action, &ctx) {
                    tracing::trace!(machine = F::NAME, "No branch selected action");
                }
            }
        });

        tracing::debug!(machine = F::NAME, branches, "State machine started");

        Self {
            actions: action_tx,
            last_action: last_rx,
            state: state_rx,
            effects,
            scope,
        }
    }

    /// Dispatch an action. Ignored once the machine is cleared.
    pub fn process(&self, action: F::Action) {
        if self.actions.send(action).is_err() {
            tracing::warn!(machine = F::NAME, "Action dropped, machine cleared");
        }
    }

    /// Latest published state
    pub fn state(&self) -> F::State {
        self.state.borrow().clone()
    }

    /// Receiver on the hot state cell
    pub fn subscribe(&self) -> watch::Receiver<F::State> {
        self.state.clone()
    }

    /// Current state followed by every later distinct state
    ///
    /// Slow consumers may skip intermediate states. Ends when the machine is
    /// cleared.
    pub fn state_stream(&self) -> BoxStream<'static, F::State> {
        watch_stream(self.state.clone())
    }

    /// Callback-based view of the state for foreign hosts
    ///
    /// Must be called from within a tokio runtime.
    pub fn watchable(&self) -> Watchable<F::State> {
        Watchable::from_state(self.state.clone(), Handle::current())
    }

    /// Wait until the state satisfies `predicate`
    ///
    /// Returns `None` if the machine is cleared first.
    pub async fn await_state<P>(&self, mut predicate: P) -> Option<F::State>
    where
        P: FnMut(&F::State) -> bool,
    {
        let mut receiver = self.state.clone();
        let result = receiver.wait_for(|state| predicate(state)).await;
        result.ok().map(|state| state.clone())
    }

    /// Receiver for effects emitted from now on
    pub fn side_effects(&self) -> broadcast::Receiver<F::SideEffect> {
        self.effects.subscribe()
    }

    /// Effects emitted from now on, as a stream
    pub fn side_effect_stream(&self) -> BoxStream<'static, F::SideEffect> {
        let receiver = self.effects.subscribe();
        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(effect) => return Some((effect, receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            machine = F::NAME,
                            "Side effect receiver lagged, skipped {} effects",
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    /// Most recently dispatched action
    pub fn last_action(&self) -> Option<F::Action> {
        self.last_action.borrow().clone()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Cancel all in-flight work. Idempotent.
    pub fn clear(&self) {
        if !self.scope.is_cancelled() {
            tracing::debug!(machine = F::NAME, "State machine cleared");
        }
        self.scope.cancel();
    }

    pub fn is_cleared(&self) -> bool {
        self.scope.is_cancelled()
    }
}

impl<F: Feature> Drop for StateMachine<F> {
    fn drop(&mut self) {
        self.clear();
    }
}

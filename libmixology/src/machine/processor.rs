//! Processor: turns actions into mutations and side effects
//!
//! A feature declares its processor as a list of branches. Each branch
//! selects the action variants it cares about and maps them to a stream of
//! mutations. Actions that no branch selects produce no mutation.

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::scope::Scope;
use super::Feature;
use crate::job::ConflatedJob;

/// Mutations produced by one processor branch for one action
pub type MutationStream<M> = BoxStream<'static, M>;

/// Item on the reducer queue
pub(crate) enum Envelope<M> {
    Mutation(M),
    /// Answered once every mutation queued before it has been reduced
    Barrier(oneshot::Sender<()>),
}

/// What a processor branch can see and do while handling an action
pub struct Context<F: Feature> {
    pub(crate) state: watch::Receiver<F::State>,
    pub(crate) effects: broadcast::Sender<F::SideEffect>,
    pub(crate) mutations: mpsc::UnboundedSender<Envelope<F::Mutation>>,
    pub(crate) scope: Scope,
}

impl<F: Feature> Clone for Context<F> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            effects: self.effects.clone(),
            mutations: self.mutations.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<F: Feature> Context<F> {
    /// Snapshot of the latest published state
    pub fn state(&self) -> F::State {
        self.state.borrow().clone()
    }

    /// Fire a one-shot side effect to the currently attached subscribers
    pub fn emit(&self, effect: F::SideEffect) {
        tracing::debug!(machine = F::NAME, ?effect, "Emitting side effect");
        // Nobody listening is fine, effects are never replayed
        let _ = self.effects.send(effect);
    }

    /// Queue a mutation from work running outside the branch's own stream
    pub fn mutate(&self, mutation: F::Mutation) {
        if self.mutations.send(Envelope::Mutation(mutation)).is_err() {
            tracing::debug!(machine = F::NAME, "Mutation dropped, machine cleared");
        }
    }

    /// Wait until every mutation queued so far is reflected in [`state`]
    ///
    /// Returns immediately once the machine is cleared.
    ///
    /// [`state`]: Context::state
    pub async fn settled(&self) {
        let (done, reduced) = oneshot::channel();
        if self.mutations.send(Envelope::Barrier(done)).is_ok() {
            let _ = reduced.await;
        }
    }

    /// Scope of the owning machine, for nested cancellable work
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

type StreamHandler<F> = Box<
    dyn Fn(&<F as Feature>::Action, &Context<F>) -> Option<MutationStream<<F as Feature>::Mutation>>
        + Send
        + Sync,
>;

type EffectHandler<F> = Box<dyn Fn(&<F as Feature>::Action, &Context<F>) -> bool + Send + Sync>;

type SyncHandler<F> = Box<
    dyn Fn(&<F as Feature>::Action, &Context<F>) -> Option<Vec<<F as Feature>::Mutation>>
        + Send
        + Sync,
>;

enum Branch<F: Feature> {
    /// Restart on every matching action
    Latest {
        job: ConflatedJob,
        handler: StreamHandler<F>,
    },
    /// Run every matching action concurrently
    Each { handler: StreamHandler<F> },
    /// Mutations queued on the action loop itself
    Sync { handler: SyncHandler<F> },
    /// No mutation, side effects only
    Effect { handler: EffectHandler<F> },
}

pub struct Processor<F: Feature> {
    branches: Vec<Branch<F>>,
}

impl<F: Feature> Default for Processor<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Feature> Processor<F> {
    pub fn new() -> Self {
        Self {
            branches: Vec::new(),
        }
    }

    /// Latest-action-wins branch
    ///
    /// When a new action matches, the in-flight stream started by the
    /// previous match of this same branch is cancelled before the new one
    /// starts.
    pub fn on_latest<T, S, H>(mut self, select: S, handler: H) -> Self
    where
        T: 'static,
        S: Fn(&F::Action) -> Option<T> + Send + Sync + 'static,
        H: Fn(T, Context<F>) -> MutationStream<F::Mutation> + Send + Sync + 'static,
    {
        self.branches.push(Branch::Latest {
            job: ConflatedJob::new(),
            handler: Box::new(move |action, ctx| select(action).map(|t| handler(t, ctx.clone()))),
        });
        self
    }

    /// Branch whose matches all run to completion concurrently
    pub fn on_each<T, S, H>(mut self, select: S, handler: H) -> Self
    where
        T: 'static,
        S: Fn(&F::Action) -> Option<T> + Send + Sync + 'static,
        H: Fn(T, Context<F>) -> MutationStream<F::Mutation> + Send + Sync + 'static,
    {
        self.branches.push(Branch::Each {
            handler: Box::new(move |action, ctx| select(action).map(|t| handler(t, ctx.clone()))),
        });
        self
    }

    /// Branch for pure state edits
    ///
    /// The mutations are queued before the next action is looked at, so
    /// later branches and actions can rely on them with
    /// [`Context::settled`].
    pub fn on_sync<T, S, H, I>(mut self, select: S, handler: H) -> Self
    where
        T: 'static,
        S: Fn(&F::Action) -> Option<T> + Send + Sync + 'static,
        H: Fn(T, &Context<F>) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = F::Mutation>,
    {
        self.branches.push(Branch::Sync {
            handler: Box::new(move |action, ctx| {
                select(action).map(|t| handler(t, ctx).into_iter().collect())
            }),
        });
        self
    }

    /// Do-not-mutate branch, runs inline on the action loop
    ///
    /// Handlers may launch their own cancellable work; that work reports
    /// back through [`Context::mutate`].
    pub fn on_effect<T, S, H>(mut self, select: S, handler: H) -> Self
    where
        T: 'static,
        S: Fn(&F::Action) -> Option<T> + Send + Sync + 'static,
        H: Fn(T, &Context<F>) + Send + Sync + 'static,
    {
        self.branches.push(Branch::Effect {
            handler: Box::new(move |action, ctx| match select(action) {
                Some(t) => {
                    handler(t, ctx);
                    true
                }
                None => false,
            }),
        });
        self
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Offer `action` to every branch. Returns false when none selected it.
    pub(crate) fn dispatch(&self, action: &F::Action, ctx: &Context<F>) -> bool {
        let mut handled = false;

        for branch in &self.branches {
            match branch {
                Branch::Latest { job, handler } => {
                    if let Some(stream) = handler(action, ctx) {
                        job.launch(&ctx.scope, drain(stream, ctx.mutations.clone()));
                        handled = true;
                    }
                }
                Branch::Each { handler } => {
                    if let Some(stream) = handler(action, ctx) {
                        ctx.scope.spawn(drain(stream, ctx.mutations.clone()));
                        handled = true;
                    }
                }
                Branch::Sync { handler } => {
                    if let Some(mutations) = handler(action, ctx) {
                        for mutation in mutations {
                            ctx.mutate(mutation);
                        }
                        handled = true;
                    }
                }
                Branch::Effect { handler } => {
                    handled |= handler(action, ctx);
                }
            }
        }

        handled
    }
}

async fn drain<M>(mut stream: MutationStream<M>, mutations: mpsc::UnboundedSender<Envelope<M>>) {
    while let Some(mutation) = stream.next().await {
        if mutations.send(Envelope::Mutation(mutation)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::machine::StateMachine;
    use futures::stream;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Tally;

    #[derive(Debug, Clone)]
    enum TallyAction {
        Push(u32),
        Snapshot,
    }

    #[derive(Debug)]
    enum TallyMutation {
        Pushed(u32),
        Seen(usize),
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct TallyState {
        values: Vec<u32>,
        seen: Option<usize>,
    }

    impl Feature for Tally {
        type State = TallyState;
        type Action = TallyAction;
        type Mutation = TallyMutation;
        type SideEffect = ();
        const NAME: &'static str = "tally";

        fn processor(&self) -> Processor<Self> {
            Processor::<Self>::new()
                .on_sync(
                    |action: &TallyAction| match action {
                        TallyAction::Push(n) => Some(*n),
                        _ => None,
                    },
                    |n, _ctx| [TallyMutation::Pushed(n)],
                )
                .on_effect(
                    |action: &TallyAction| matches!(action, TallyAction::Snapshot).then_some(()),
                    |_, ctx| {
                        let ctx = ctx.clone();
                        ctx.scope().clone().spawn(async move {
                            ctx.settled().await;
                            let seen = ctx.state().values.len();
                            ctx.mutate(TallyMutation::Seen(seen));
                        });
                    },
                )
        }

        fn reduce(state: TallyState, mutation: TallyMutation) -> TallyState {
            match mutation {
                TallyMutation::Pushed(n) => {
                    let mut values = state.values.clone();
                    values.push(n);
                    TallyState { values, ..state }
                }
                TallyMutation::Seen(count) => TallyState {
                    seen: Some(count),
                    ..state
                },
            }
        }
    }

    #[tokio::test]
    async fn test_settled_sees_every_earlier_sync_mutation() {
        let machine = StateMachine::new(Tally, TallyState::default(), None, &EngineConfig::default());
        for n in 0..20 {
            machine.process(TallyAction::Push(n));
        }
        machine.process(TallyAction::Snapshot);

        let state = timeout(Duration::from_secs(2), machine.await_state(|s| s.seen.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.seen, Some(20));
    }

    #[test]
    fn test_branch_count() {
        let processor = Processor::<Tally>::new()
            .on_each(|_: &TallyAction| Some(()), |_, _ctx| stream::empty().boxed())
            .on_effect(|_: &TallyAction| None::<()>, |_, _ctx| {});
        assert_eq!(processor.branch_count(), 2);
    }
}

//! Callback bridge for hosts that cannot consume Rust streams
//!
//! Foreign runtimes (mobile UI layers, FFI bindings) attach a callback with
//! [`Watchable::watch`] and later call [`Disposer::dispose`]. Disposing stops
//! the forwarding task; once `dispose` returns the callback is never invoked
//! again. A callback may dispose its own watcher.

use futures::stream::{self, BoxStream, StreamExt};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

thread_local! {
    /// Gate of the watcher whose callback is running on this thread, 0 if none
    static ACTIVE_GATE: Cell<usize> = const { Cell::new(0) };
}

type Gate = Arc<Mutex<bool>>;

fn gate_id(gate: &Gate) -> usize {
    Arc::as_ptr(gate) as *const () as usize
}

/// Marks the current thread as running a watcher's callback until dropped
struct CallbackGuard {
    previous: usize,
}

impl CallbackGuard {
    fn enter(gate: &Gate) -> Self {
        let previous = ACTIVE_GATE.with(|active| active.replace(gate_id(gate)));
        Self { previous }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        ACTIVE_GATE.with(|active| active.set(self.previous));
    }
}

type StreamFactory<T> = Arc<dyn Fn() -> BoxStream<'static, T> + Send + Sync>;

/// Restartable value source that can be watched with callbacks
pub struct Watchable<T> {
    source: StreamFactory<T>,
    runtime: Handle,
}

impl<T> Clone for Watchable<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> Watchable<T>
where
    T: Send + 'static,
{
    /// Watch a stream produced fresh for every watcher
    pub fn from_stream_factory<S>(factory: S, runtime: Handle) -> Self
    where
        S: Fn() -> BoxStream<'static, T> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(factory),
            runtime,
        }
    }

    /// Attach `callback`. It receives every value until disposed.
    pub fn watch<C>(&self, callback: C) -> Disposer
    where
        C: Fn(T) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let gate: Gate = Arc::new(Mutex::new(false));
        let mut values = (self.source)();

        let task_token = token.clone();
        let task_gate = Arc::clone(&gate);
        self.runtime.spawn(async move {
            loop {
                let value = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    value = values.next() => value,
                };
                let Some(value) = value else { break };

                // Held while calling back so dispose() waits for an in-flight call
                let disposed = task_gate.lock().unwrap_or_else(PoisonError::into_inner);
                if *disposed {
                    break;
                }
                let _running = CallbackGuard::enter(&task_gate);
                callback(value);
            }
        });

        Disposer {
            token,
            gate,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<T> Watchable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Watch a hot state cell: current value first, then every change
    pub fn from_state(receiver: watch::Receiver<T>, runtime: Handle) -> Self {
        Self::from_stream_factory(move || watch_stream(receiver.clone()), runtime)
    }
}

/// Current value of a watch cell followed by every later change
///
/// Ends when the sender is dropped. Slow consumers only see the latest value.
pub fn watch_stream<T>(receiver: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((receiver, true), |(mut receiver, first)| async move {
        if !first {
            receiver.changed().await.ok()?;
        }
        let value = receiver.borrow_and_update().clone();
        Some((value, (receiver, false)))
    })
    .boxed()
}

/// Handle returned by [`Watchable::watch`]
#[derive(Clone)]
pub struct Disposer {
    token: CancellationToken,
    gate: Gate,
    disposed: Arc<AtomicBool>,
}

impl Disposer {
    /// Stop watching. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if ACTIVE_GATE.with(Cell::get) == gate_id(&self.gate) {
            // Called from our own callback: the gate is already held by the
            // forwarding task, which sees the cancelled token next iteration
            self.token.cancel();
        } else {
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = true;
            self.token.cancel();
        }
        tracing::trace!("Watcher disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_watch_receives_current_and_updates() {
        let (tx, rx) = watch::channel(1);
        let watchable = Watchable::from_state(rx, Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let disposer = watchable.watch(move |value| sink.lock().unwrap().push(value));
        settle().await;

        tx.send(2).unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        disposer.dispose();
    }

    #[tokio::test]
    async fn test_dispose_stops_callbacks_and_is_idempotent() {
        let (tx, rx) = watch::channel(0);
        let watchable = Watchable::from_state(rx, Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let disposer = watchable.watch(move |value| sink.lock().unwrap().push(value));
        settle().await;

        disposer.dispose();
        disposer.dispose();
        assert!(disposer.is_disposed());

        tx.send(5).unwrap();
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_callback_can_dispose_its_own_watcher() {
        let (tx, rx) = watch::channel(0);
        let watchable = Watchable::from_state(rx, Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Disposer>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let own = Arc::clone(&slot);
        let disposer = watchable.watch(move |value| {
            sink.lock().unwrap().push(value);
            if value >= 1 {
                if let Some(disposer) = own.lock().unwrap().as_ref() {
                    disposer.dispose();
                }
            }
        });
        *slot.lock().unwrap() = Some(disposer.clone());
        settle().await;

        tx.send(1).unwrap();
        settle().await;
        assert!(disposer.is_disposed());

        tx.send(2).unwrap();
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);

        // Disposing again from outside does not block
        tokio::time::timeout(Duration::from_secs(1), async { disposer.dispose() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_each_watcher_restarts_the_source() {
        let watchable = Watchable::from_stream_factory(
            || stream::iter(vec!["a", "b"]).boxed(),
            Handle::current(),
        );
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        let _d1 = watchable.watch(move |value| sink.lock().unwrap().push(value));
        let sink = Arc::clone(&second);
        let _d2 = watchable.watch(move |value| sink.lock().unwrap().push(value));
        settle().await;

        assert_eq!(*first.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(*second.lock().unwrap(), vec!["a", "b"]);
    }
}

//! Cancellation-scoped task group
//!
//! Every state machine owns one [`Scope`]. All of its tasks (the action
//! loop, the reducer loop, processor branches and conflated jobs) are spawned
//! through it, so cancelling the scope tears down everything the machine
//! started. A panic in any task cancels the whole scope.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Scope {
    name: Arc<str>,
    token: CancellationToken,
}

impl Scope {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
        }
    }

    /// A scope that is cancelled with `self` but can also be cancelled alone
    pub fn child(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            token: self.token.child_token(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn a task that stops as soon as the scope is cancelled
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let name = Arc::clone(&self.name);

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                outcome = AssertUnwindSafe(future).catch_unwind() => {
                    if let Err(panic) = outcome {
                        tracing::error!(
                            scope = %name,
                            "Task panicked, tearing down scope: {}",
                            panic_message(panic.as_ref())
                        );
                        token.cancel();
                    }
                }
            }
        })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope has been cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

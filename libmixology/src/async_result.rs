//! Lifecycle of an asynchronously produced value
//!
//! Every load a feature exposes to the UI is an [`Async`]. Absence is
//! structural: asking an empty `Async` for its value returns `None` instead of
//! failing.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Error carried by [`Async::Fail`]
///
/// Two failures are equal when they have the same error type, the same
/// message and the same source chain, so repeated failures of the same kind
/// deduplicate in the UI.
#[derive(Clone)]
pub struct Failure {
    error: Arc<dyn StdError + Send + Sync>,
    kind: &'static str,
    message: String,
    signature: String,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: std::any::type_name::<E>(),
            message: error.to_string(),
            signature: chain.join(" <- "),
            error: Arc::new(error),
        }
    }

    /// Fully qualified type name of the wrapped error
    pub fn kind(&self) -> &str {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the source chain, outermost first
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.signature == other.signature
    }
}

impl Eq for Failure {}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Four-state outcome of an asynchronous load
#[derive(Debug, Clone, PartialEq)]
pub enum Async<T> {
    /// No load attempted yet
    Uninitialized,
    /// Load in flight, optionally carrying stale data
    Loading(Option<T>),
    /// Load finished with a value
    Success(T),
    /// Load failed, optionally keeping the previous value
    Fail { error: Failure, value: Option<T> },
}

impl<T> Default for Async<T> {
    fn default() -> Self {
        Async::Uninitialized
    }
}

impl<T> Async<T> {
    pub fn fail<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Async::Fail {
            error: Failure::new(error),
            value: None,
        }
    }

    /// The held value, if any
    ///
    /// Returns the value of `Success`, the stale value of `Loading`/`Fail`,
    /// and `None` for `Uninitialized`.
    pub fn invoke(&self) -> Option<&T> {
        match self {
            Async::Uninitialized => None,
            Async::Loading(value) => value.as_ref(),
            Async::Success(value) => Some(value),
            Async::Fail { value, .. } => value.as_ref(),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Async::Uninitialized => None,
            Async::Loading(value) => value,
            Async::Success(value) => Some(value),
            Async::Fail { value, .. } => value,
        }
    }

    /// True only for `Success` and `Fail`
    pub fn is_complete(&self) -> bool {
        matches!(self, Async::Success(_) | Async::Fail { .. })
    }

    /// True only for `Uninitialized` and `Fail`
    pub fn should_load(&self) -> bool {
        matches!(self, Async::Uninitialized | Async::Fail { .. })
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Async::Uninitialized)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Async::Loading(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Async::Success(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Async::Fail { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Async::Fail { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> Async<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Async::Uninitialized => Async::Uninitialized,
            Async::Loading(value) => Async::Loading(value.map(f)),
            Async::Success(value) => Async::Success(f(value)),
            Async::Fail { error, value } => Async::Fail {
                error,
                value: value.map(f),
            },
        }
    }
}

impl<T: Clone> Async<T> {
    /// `Loading` that keeps whatever value `self` currently holds
    pub fn loading_from(&self) -> Async<T> {
        Async::Loading(self.invoke().cloned())
    }
}

impl<T, E> From<std::result::Result<T, E>> for Async<T>
where
    E: StdError + Send + Sync + 'static,
{
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Async::Success(value),
            Err(error) => Async::fail(error),
        }
    }
}

/// Run a fallible future as `Loading(None)` followed by its outcome
pub fn execute<T, E, Fut>(future: Fut) -> BoxStream<'static, Async<T>>
where
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    stream::once(future::ready(Async::Loading(None)))
        .chain(stream::once(async move { Async::from(future.await) }))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;

    #[derive(Debug)]
    struct Wrapped(RepositoryError);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_complete_and_should_load_truth_table() {
        let uninitialized: Async<u32> = Async::Uninitialized;
        let loading: Async<u32> = Async::Loading(None);
        let success: Async<u32> = Async::Success(1);
        let fail: Async<u32> = Async::fail(RepositoryError::Network("down".to_string()));

        assert!(!uninitialized.is_complete() && uninitialized.should_load());
        assert!(!loading.is_complete() && !loading.should_load());
        assert!(success.is_complete() && !success.should_load());
        assert!(fail.is_complete() && fail.should_load());
    }

    #[test]
    fn test_invoke() {
        assert_eq!(Async::Success(42).invoke(), Some(&42));
        assert_eq!(Async::<u32>::Uninitialized.invoke(), None);
        assert_eq!(Async::<u32>::Loading(None).invoke(), None);
        assert_eq!(Async::Loading(Some(7)).invoke(), Some(&7));

        let stale = Async::Fail {
            error: Failure::new(RepositoryError::Network("down".to_string())),
            value: Some(3),
        };
        assert_eq!(stale.invoke(), Some(&3));
    }

    #[test]
    fn test_failures_of_same_kind_compare_equal() {
        let a: Async<u32> = Async::fail(RepositoryError::Network("timeout".to_string()));
        let b: Async<u32> = Async::fail(RepositoryError::Network("timeout".to_string()));
        let c: Async<u32> = Async::fail(RepositoryError::Network("refused".to_string()));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_failure_signature_includes_sources() {
        let failure = Failure::new(Wrapped(RepositoryError::NotFound("mojito".to_string())));
        assert_eq!(failure.message(), "wrapped");
        assert_eq!(failure.signature(), "Not found: mojito");
        assert!(failure.kind().ends_with("Wrapped"));

        let other = Failure::new(Wrapped(RepositoryError::NotFound("daiquiri".to_string())));
        assert_ne!(failure, other);
    }

    #[test]
    fn test_failure_downcast() {
        let failure = Failure::new(RepositoryError::Parse("bad json".to_string()));
        assert_eq!(
            failure.downcast_ref::<RepositoryError>(),
            Some(&RepositoryError::Parse("bad json".to_string()))
        );
    }

    #[test]
    fn test_loading_from_keeps_value() {
        let success = Async::Success(vec![1, 2]);
        assert_eq!(success.loading_from(), Async::Loading(Some(vec![1, 2])));
        assert_eq!(Async::<u8>::Uninitialized.loading_from(), Async::Loading(None));
    }

    #[test]
    fn test_map_preserves_variant() {
        let loaded = Async::Success(2).map(|v| v * 10);
        assert_eq!(loaded, Async::Success(20));

        let loading = Async::Loading(Some(2)).map(|v| v + 1);
        assert_eq!(loading, Async::Loading(Some(3)));
    }

    #[tokio::test]
    async fn test_execute_emits_loading_then_outcome() {
        let emitted: Vec<Async<u32>> =
            execute(async { Ok::<_, RepositoryError>(5) }).collect().await;
        assert_eq!(emitted, vec![Async::Loading(None), Async::Success(5)]);

        let failed: Vec<Async<u32>> =
            execute(async { Err(RepositoryError::Network("offline".to_string())) })
                .collect()
                .await;
        assert!(failed[0].is_loading());
        assert!(failed[1].is_fail());
    }
}

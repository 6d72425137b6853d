//! Shake detection contract
//!
//! The detector is an externally owned push source. At most one callback is
//! attached per detector; [`shake_events`] turns it into a stream that
//! detaches when dropped.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

pub type ShakeCallback = Box<dyn Fn() + Send + Sync>;

pub trait ShakeDetector: Send + Sync {
    /// Start reporting shakes to `callback`, replacing any previous one
    fn start(&self, callback: ShakeCallback);

    fn stop(&self);
}

struct StopOnDrop(Arc<dyn ShakeDetector>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// One item per detected shake, until the stream is dropped
pub fn shake_events(detector: Arc<dyn ShakeDetector>) -> BoxStream<'static, ()> {
    let (tx, rx) = mpsc::unbounded_channel();
    detector.start(Box::new(move || {
        let _ = tx.send(());
    }));

    stream::unfold((rx, StopOnDrop(detector)), |(mut rx, guard)| async move {
        rx.recv().await.map(|shake| (shake, (rx, guard)))
    })
    .boxed()
}

/// Detector driven by hand, for tests and the CLI
#[derive(Default)]
pub struct ManualShakeDetector {
    callback: Mutex<Option<ShakeCallback>>,
    starts: AtomicUsize,
}

impl ManualShakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a shake. Returns false when nobody is listening.
    pub fn shake(&self) -> bool {
        let callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        match callback.as_ref() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl ShakeDetector for ManualShakeDetector {
    fn start(&self, callback: ShakeCallback) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let mut current = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            tracing::warn!("Shake detector restarted while active");
        }
        *current = Some(callback);
    }

    fn stop(&self) {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

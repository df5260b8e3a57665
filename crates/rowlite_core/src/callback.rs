//! Async result delivery: callbacks, owner queues and liveness guards.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreResult;

/// Receives the result of one async operation.
///
/// Implemented for any `FnOnce(StoreResult<T>)`, so a closure is enough:
///
/// ```
/// use rowlite_core::{StoreCallback, StoreResult};
///
/// let callback = |result: StoreResult<i64>| {
///     if let Ok(key) = result {
///         println!("stored under {key}");
///     }
/// };
/// Box::new(callback).on_result(Ok(7));
/// ```
pub trait StoreCallback<T>: Send {
    /// Called exactly once with the operation's result.
    fn on_result(self: Box<Self>, result: StoreResult<T>);
}

impl<T, F> StoreCallback<T> for F
where
    F: FnOnce(StoreResult<T>) + Send,
{
    fn on_result(self: Box<Self>, result: StoreResult<T>) {
        self(result);
    }
}

type Thunk = Box<dyn FnOnce() + Send>;

/// Hands completed deliveries to an owning context's thread.
///
/// Worker threads push finished deliveries; the owner calls
/// [`drain`](Self::drain) from its own thread whenever convenient, for
/// example once per event-loop tick. Clones share one queue.
#[derive(Clone, Default)]
pub struct DeliveryQueue {
    pending: Arc<Mutex<VecDeque<Thunk>>>,
}

impl DeliveryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, thunk: Thunk) {
        self.pending.lock().push_back(thunk);
    }

    /// Runs every queued delivery on the calling thread.
    ///
    /// Returns how many deliveries ran. Deliveries queued while draining
    /// (for example by a callback that starts more async work) wait for
    /// the next drain.
    pub fn drain(&self) -> usize {
        let batch: Vec<Thunk> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        let count = batch.len();
        for thunk in batch {
            thunk();
        }
        count
    }

    /// Number of deliveries waiting for a drain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("pending", &self.len())
            .finish()
    }
}

/// Owner-held guard that keeps guarded deliveries flowing.
///
/// Dropping the guard flips every [`LivenessWatch`] taken from it;
/// deliveries guarded by those watches are skipped from then on. Hold the
/// guard in the object that would consume the callbacks, so results stop
/// arriving when it goes away.
#[derive(Debug)]
pub struct LivenessGuard {
    alive: Arc<AtomicBool>,
}

impl LivenessGuard {
    /// Creates a live guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A watch that observes this guard.
    #[must_use]
    pub fn watch(&self) -> LivenessWatch {
        LivenessWatch {
            alive: Arc::clone(&self.alive),
        }
    }
}

impl Default for LivenessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Observes whether a [`LivenessGuard`] is still held.
#[derive(Debug, Clone)]
pub struct LivenessWatch {
    alive: Arc<AtomicBool>,
}

impl LivenessWatch {
    /// Whether the guard is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Where an async result is delivered.
///
/// The default delivers on the worker thread that ran the operation.
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    queue: Option<DeliveryQueue>,
    watch: Option<LivenessWatch>,
}

impl DeliveryOptions {
    /// Deliver on the worker thread.
    #[must_use]
    pub fn inline() -> Self {
        Self::default()
    }

    /// Queue the delivery for the owning context's next drain.
    #[must_use]
    pub fn queued(queue: &DeliveryQueue) -> Self {
        Self {
            queue: Some(queue.clone()),
            ..Self::default()
        }
    }

    /// Skip the delivery once the watched owner is gone.
    ///
    /// Checked both when the operation completes and again when a queued
    /// delivery actually runs.
    #[must_use]
    pub fn guarded(mut self, watch: &LivenessWatch) -> Self {
        self.watch = Some(watch.clone());
        self
    }
}

/// Delivers one result according to the options.
pub(crate) fn deliver<T: Send + 'static>(
    options: DeliveryOptions,
    callback: Box<dyn StoreCallback<T>>,
    result: StoreResult<T>,
) {
    if let Some(watch) = &options.watch {
        if !watch.is_alive() {
            debug!("owner gone, dropping async result");
            return;
        }
    }
    match options.queue {
        Some(queue) => {
            let watch = options.watch;
            queue.push(Box::new(move || {
                // The owner may have gone away while the delivery sat in
                // the queue.
                if let Some(watch) = &watch {
                    if !watch.is_alive() {
                        debug!("owner gone, dropping queued result");
                        return;
                    }
                }
                callback.on_result(result);
            }));
        }
        None => callback.on_result(result),
    }
}

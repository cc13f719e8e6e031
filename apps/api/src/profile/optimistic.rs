//! Optimistic update controller.
//!
//! Holds the publicly observed copy of an aggregate and the last value that
//! was successfully committed (the known-good snapshot). A new value is
//! published immediately, then committed; if the commit fails the observed
//! value rolls back to the known-good snapshot.
//!
//! Overlapping applies are not serialized. Whichever commit completes last
//! defines the known-good snapshot, and a failed commit always rolls back to
//! the snapshot current at the time it fails.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommitError {
    #[error("Failed to save profile: {0}")]
    Store(String),

    #[error("Session closed before the save completed")]
    Closed,
}

/// The remote write behind an optimistic update.
///
/// Returns the canonical value as persisted, which may differ from the input
/// (e.g. server-stamped metadata).
#[async_trait]
pub trait Commit<T>: Send + Sync {
    async fn commit(&self, value: T) -> Result<T, CommitError>;
}

type SuccessHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorHook<T> = Arc<dyn Fn(&CommitError, &T) + Send + Sync>;

pub struct OptimisticController<T> {
    observed: watch::Sender<T>,
    known_good: Mutex<T>,
    committer: Arc<dyn Commit<T>>,
    /// Bumped by every publish; a commit only republishes its result if no
    /// newer value was published meanwhile.
    generation: AtomicU64,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<CommitError>>,
    on_success: Vec<SuccessHook<T>>,
    on_error: Vec<ErrorHook<T>>,
}

/// Decrements the in-flight counter even if the apply future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> OptimisticController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `initial` is treated as already committed.
    pub fn new(initial: T, committer: Arc<dyn Commit<T>>) -> Self {
        let (observed, _) = watch::channel(initial.clone());
        Self {
            observed,
            known_good: Mutex::new(initial),
            committer,
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            on_success: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success.push(Arc::new(hook));
        self
    }

    /// Receives the commit error and the value rolled back to.
    pub fn on_error(mut self, hook: impl Fn(&CommitError, &T) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(hook));
        self
    }

    /// The value callers should currently display.
    pub fn current(&self) -> T {
        self.observed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.observed.subscribe()
    }

    pub fn known_good(&self) -> T {
        self.known_good.lock().clone()
    }

    pub fn last_error(&self) -> Option<CommitError> {
        self.last_error.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_updating(&self) -> bool {
        self.in_flight() > 0
    }

    fn publish(&self, value: T) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.observed.send_replace(value);
        generation
    }

    /// Publishes `value` without committing it.
    pub fn preview(&self, value: T) {
        self.publish(value);
    }

    /// Replaces both the observed value and the known-good snapshot.
    pub fn reset(&self, value: T) {
        *self.known_good.lock() = value.clone();
        *self.last_error.lock() = None;
        self.publish(value);
    }

    /// Publishes `value` immediately, then commits it.
    ///
    /// On failure the observed value is rolled back to the known-good
    /// snapshot and the error is returned.
    pub async fn apply_optimistic(&self, value: T) -> Result<T, CommitError> {
        let generation = self.publish(value.clone());
        *self.last_error.lock() = None;

        let result = {
            let _guard = InFlight::enter(&self.in_flight);
            self.committer.commit(value).await
        };

        match result {
            Ok(committed) => {
                *self.known_good.lock() = committed.clone();
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.observed.send_replace(committed.clone());
                } else {
                    debug!("commit {generation} completed after a newer value was published");
                }
                for hook in &self.on_success {
                    hook(&committed);
                }
                Ok(committed)
            }
            Err(err) => {
                let rollback = self.known_good.lock().clone();
                self.publish(rollback.clone());
                *self.last_error.lock() = Some(err.clone());
                warn!("Optimistic commit {generation} failed, rolled back: {err}");
                for hook in &self.on_error {
                    hook(&err, &rollback);
                }
                Err(err)
            }
        }
    }
}

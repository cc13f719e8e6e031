//! Trailing-edge debouncer used for auto-save.
//!
//! `schedule` (re)starts a single quiet-period timer; when it elapses the
//! action runs once with the most recent payload. Once the action has
//! started it is detached from the timer, so cancelling or rescheduling
//! never aborts a write that is already under way.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Slot<T> {
    generation: u64,
    payload: Option<T>,
    timer: Option<JoinHandle<()>>,
}

impl<T> Slot<T> {
    /// Invalidates the pending timer and hands back its payload.
    fn clear(&mut self) -> Option<T> {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.payload.take()
    }
}

pub struct Debouncer<T> {
    delay: Duration,
    action: Action<T>,
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            action: Arc::new(move |payload| action(payload).boxed()),
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                payload: None,
                timer: None,
            })),
        }
    }

    /// Replaces any pending payload and restarts the countdown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, payload: T) {
        let mut slot = self.slot.lock();
        slot.clear();
        slot.payload = Some(payload);
        let generation = slot.generation;

        let shared = Arc::clone(&self.slot);
        let action = Arc::clone(&self.action);
        let delay = self.delay;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let payload = {
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                // Detach: from here on nothing can abort this task.
                slot.timer = None;
                slot.payload.take()
            };
            if let Some(payload) = payload {
                debug!("Quiet period elapsed, firing debounced action");
                action(payload).await;
            }
        }));
    }

    /// Drops the pending payload, if any, without firing it.
    pub fn cancel(&self) {
        if self.slot.lock().clear().is_some() {
            debug!("Cancelled pending debounced action");
        }
    }

    /// Fires the pending payload now instead of waiting. Returns whether
    /// anything was pending.
    pub async fn flush(&self) -> bool {
        let payload = self.slot.lock().clear();
        match payload {
            Some(payload) => {
                (self.action)(payload).await;
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().payload.is_some()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.slot.lock().clear();
    }
}

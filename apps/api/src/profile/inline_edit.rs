//! Per-field inline edit state machine.
//!
//! ```text
//!   Viewing --start_edit--> Editing --commit--> Saving --ok--> Viewing
//!      ^                     |  ^                  |
//!      +------cancel---------+  +------error-------+
//! ```
//!
//! With auto-save enabled, `update_value` restarts a debounce timer that
//! runs the same validate-then-save path as `commit`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::profile::autosave::Debouncer;

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    Viewing,
    Editing,
    Saving,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EditError {
    #[error("Field is not being edited")]
    NotEditing,

    #[error("A save is already in progress for this field")]
    Busy,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    SaveFailed(String),
}

pub type FieldValidator<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;
pub type SaveFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

pub struct InlineEditOptions<T> {
    pub validate: Option<FieldValidator<T>>,
    pub auto_save: bool,
    pub save_delay: Duration,
}

impl<T> Default for InlineEditOptions<T> {
    fn default() -> Self {
        Self {
            validate: None,
            auto_save: false,
            save_delay: DEFAULT_SAVE_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSnapshot<T> {
    pub state: EditState,
    pub value: T,
    pub error: Option<String>,
    pub is_saving: bool,
}

struct Draft<T> {
    state: EditState,
    value: T,
    /// Restored on cancel.
    original: T,
    error: Option<String>,
}

struct EditorCore<T> {
    draft: Mutex<Draft<T>>,
    validate: Option<FieldValidator<T>>,
    save: SaveFn<T>,
    alive: AtomicBool,
}

impl<T> EditorCore<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Validates the draft and runs the save callback.
    ///
    /// `expected` is the payload an auto-save timer was armed with; if the
    /// draft moved on since, the stale save is skipped.
    async fn save_draft(&self, expected: Option<T>) -> Result<(), EditError> {
        let value = {
            let mut draft = self.draft.lock();
            match draft.state {
                EditState::Editing => {}
                EditState::Saving => return Err(EditError::Busy),
                EditState::Viewing => return Err(EditError::NotEditing),
            }
            if expected.as_ref().is_some_and(|v| *v != draft.value) {
                return Ok(());
            }
            if let Some(message) = self.validate.as_ref().and_then(|rule| rule(&draft.value)) {
                draft.error = Some(message.clone());
                return Err(EditError::Invalid(message));
            }
            draft.state = EditState::Saving;
            draft.error = None;
            draft.value.clone()
        };

        let result = (self.save)(value.clone()).await;

        if !self.alive.load(Ordering::SeqCst) {
            debug!("Editor closed while saving; discarding save result");
            return result.map_err(EditError::SaveFailed);
        }

        let mut draft = self.draft.lock();
        match result {
            Ok(()) => {
                draft.state = EditState::Viewing;
                draft.original = value.clone();
                draft.value = value;
                Ok(())
            }
            Err(message) => {
                // Keep the draft so the user can retry.
                draft.state = EditState::Editing;
                draft.error = Some(message.clone());
                Err(EditError::SaveFailed(message))
            }
        }
    }
}

pub struct InlineEditor<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    core: Arc<EditorCore<T>>,
    auto_save: Option<Debouncer<T>>,
}

impl<T> InlineEditor<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T, save: SaveFn<T>, options: InlineEditOptions<T>) -> Self {
        let core = Arc::new(EditorCore {
            draft: Mutex::new(Draft {
                state: EditState::Viewing,
                value: initial.clone(),
                original: initial,
                error: None,
            }),
            validate: options.validate,
            save,
            alive: AtomicBool::new(true),
        });

        let auto_save = options.auto_save.then(|| {
            let core = Arc::clone(&core);
            Debouncer::new(options.save_delay, move |payload: T| {
                let core = Arc::clone(&core);
                async move {
                    if let Err(err) = core.save_draft(Some(payload)).await {
                        debug!("Auto-save did not complete: {err}");
                    }
                }
            })
        });

        Self { core, auto_save }
    }

    pub fn snapshot(&self) -> EditSnapshot<T> {
        let draft = self.core.draft.lock();
        EditSnapshot {
            state: draft.state,
            value: draft.value.clone(),
            error: draft.error.clone(),
            is_saving: draft.state == EditState::Saving,
        }
    }

    pub fn state(&self) -> EditState {
        self.core.draft.lock().state
    }

    pub fn value(&self) -> T {
        self.core.draft.lock().value.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.core.draft.lock().error.clone()
    }

    /// Enters `Editing`, remembering the current value for cancel.
    pub fn start_edit(&self) -> Result<(), EditError> {
        let mut draft = self.core.draft.lock();
        match draft.state {
            EditState::Saving => Err(EditError::Busy),
            EditState::Editing => Ok(()),
            EditState::Viewing => {
                draft.state = EditState::Editing;
                draft.error = None;
                draft.original = draft.value.clone();
                Ok(())
            }
        }
    }

    /// Replaces the draft; restarts the auto-save timer when enabled.
    pub fn update_value(&self, value: T) -> Result<(), EditError> {
        {
            let mut draft = self.core.draft.lock();
            match draft.state {
                EditState::Editing => {}
                EditState::Saving => return Err(EditError::Busy),
                EditState::Viewing => return Err(EditError::NotEditing),
            }
            draft.value = value.clone();
            draft.error = None;
        }
        if let Some(debouncer) = &self.auto_save {
            debouncer.schedule(value);
        }
        Ok(())
    }

    /// Validates and saves the draft.
    ///
    /// Invalid drafts stay in `Editing` with the message set and the save
    /// callback is never called. A failed save also returns to `Editing`
    /// with the draft intact.
    pub async fn commit(&self) -> Result<(), EditError> {
        if let Some(debouncer) = &self.auto_save {
            debouncer.cancel();
        }
        self.core.save_draft(None).await
    }

    /// Drops the draft and goes back to `Viewing` with the original value.
    pub fn cancel(&self) -> Result<(), EditError> {
        if let Some(debouncer) = &self.auto_save {
            debouncer.cancel();
        }
        let mut draft = self.core.draft.lock();
        match draft.state {
            EditState::Saving => Err(EditError::Busy),
            EditState::Viewing => Ok(()),
            EditState::Editing => {
                draft.value = draft.original.clone();
                draft.state = EditState::Viewing;
                draft.error = None;
                Ok(())
            }
        }
    }

    /// Takes an externally changed value, unless the user is mid-edit.
    pub fn set_external_value(&self, value: T) {
        let mut draft = self.core.draft.lock();
        if draft.state == EditState::Viewing {
            draft.original = value.clone();
            draft.value = value;
        }
    }
}

impl<T> Drop for InlineEditor<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.core.alive.store(false, Ordering::SeqCst);
        if let Some(debouncer) = &self.auto_save {
            debouncer.cancel();
        }
    }
}

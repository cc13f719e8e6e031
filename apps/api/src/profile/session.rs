//! Per-user edit session.
//!
//! Owns the observed profile for one signed-in user and every path that
//! writes to it: debounced auto-save of form edits, immediate optimistic
//! commits, list operations and per-field inline editors. All of them
//! reconcile against the currently observed profile and commit through the
//! same optimistic controller.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::profile::Profile;
use crate::profile::autosave::{Debouncer, DEFAULT_QUIET_PERIOD};
use crate::profile::completeness::{compute_completion_report, CompletionReport};
use crate::profile::inline_edit::{
    EditError, EditSnapshot, EditState, FieldValidator, InlineEditOptions, InlineEditor, SaveFn,
    DEFAULT_SAVE_DELAY,
};
use crate::profile::merge::{
    append_entry, reconcile, remove_entry, update_entry, EntryKey, FieldPath, FieldUpdate,
    ListField, ProfileDelta, ReconcileError,
};
use crate::profile::optimistic::{CommitError, OptimisticController};
use crate::profile::service::ProfileCommitter;
use crate::profile::store::StoreError;
use crate::profile::validation::{
    validate_date_range, validate_field, validate_language_proficiency, validate_skill_level,
    validator_for, Rule,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No profile session for user '{0}'; sign in first")]
    NotInitialized(String),

    #[error("Profile session is closed")]
    Closed,

    #[error("No stored profile for user '{0}'")]
    NotFound(String),

    #[error("{}", describe(.0))]
    Invalid(BTreeMap<String, String>),

    #[error("Field '{0}' cannot be edited inline")]
    NotEditable(FieldPath),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn describe(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub autosave_delay: Duration,
    pub inline_save_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autosave_delay: DEFAULT_QUIET_PERIOD,
            inline_save_delay: DEFAULT_SAVE_DELAY,
        }
    }
}

/// How a batch of field updates reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Shown right away, persisted once edits pause.
    #[default]
    Autosave,
    /// Committed optimistically now.
    Immediate,
}

struct Pipeline {
    user_id: String,
    controller: Arc<OptimisticController<Profile>>,
    committer: Arc<ProfileCommitter>,
    autosave: Debouncer<Profile>,
    alive: AtomicBool,
}

impl Pipeline {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    /// Commits `profile` now, superseding any pending auto-save (whose edits
    /// are already part of the observed profile `profile` was built from).
    async fn commit_now(&self, profile: Profile) -> Result<Profile, SessionError> {
        self.ensure_open()?;
        self.autosave.cancel();

        // Spawned so the commit finishes even if the caller is dropped.
        let controller = Arc::clone(&self.controller);
        let result = tokio::spawn(async move { controller.apply_optimistic(profile).await })
            .await
            .unwrap_or(Err(CommitError::Closed));

        if !self.alive.load(Ordering::SeqCst) {
            debug!("Session for {} closed during commit; result ignored", self.user_id);
            return Err(SessionError::Closed);
        }
        Ok(result?)
    }

    /// Save callback of an inline editor: merge one text field and commit.
    async fn save_field(&self, path: FieldPath, value: String) -> Result<(), String> {
        let delta = ProfileDelta::new().set(path, Value::String(value));
        let next = reconcile(&self.controller.current(), &delta).map_err(|e| e.to_string())?;
        if let Some((list, index, EntryKey::StartDate | EntryKey::EndDate)) = path.entry() {
            check_date_ranges(&next, [(list, index)]).map_err(|e| e.to_string())?;
        }
        self.commit_now(next)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

pub struct EditSession {
    pipeline: Arc<Pipeline>,
    editors: Mutex<HashMap<FieldPath, Arc<InlineEditor<String>>>>,
    inline_save_delay: Duration,
}

impl EditSession {
    /// `profile` must be the copy currently in the store.
    pub fn open(
        profile: Profile,
        committer: Arc<ProfileCommitter>,
        settings: &SessionSettings,
    ) -> Self {
        let user_id = profile.id.clone();
        let controller = Arc::new(
            OptimisticController::new(profile, committer.clone()).on_success(|p: &Profile| {
                debug!(
                    "Known-good profile for {} is now version {}",
                    p.id, p.metadata.version
                )
            }),
        );

        let autosave = {
            let controller = Arc::clone(&controller);
            Debouncer::new(settings.autosave_delay, move |profile: Profile| {
                let controller = Arc::clone(&controller);
                async move {
                    let task =
                        tokio::spawn(async move { controller.apply_optimistic(profile).await });
                    if let Ok(Err(err)) = task.await {
                        debug!("Auto-save did not persist: {err}");
                    }
                }
            })
        };

        info!("Opened edit session for {user_id}");
        Self {
            pipeline: Arc::new(Pipeline {
                user_id,
                controller,
                committer,
                autosave,
                alive: AtomicBool::new(true),
            }),
            editors: Mutex::new(HashMap::new()),
            inline_save_delay: settings.inline_save_delay,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.pipeline.user_id
    }

    /// The profile as the user should currently see it.
    pub fn current(&self) -> Profile {
        self.pipeline.controller.current()
    }

    pub fn known_good(&self) -> Profile {
        self.pipeline.controller.known_good()
    }

    pub fn subscribe(&self) -> watch::Receiver<Profile> {
        self.pipeline.controller.subscribe()
    }

    pub fn is_updating(&self) -> bool {
        self.pipeline.controller.is_updating()
    }

    pub fn is_autosave_pending(&self) -> bool {
        self.pipeline.autosave.is_pending()
    }

    pub fn last_error(&self) -> Option<CommitError> {
        self.pipeline.controller.last_error()
    }

    pub fn completion(&self) -> CompletionReport {
        compute_completion_report(&self.current())
    }

    pub fn is_open(&self) -> bool {
        self.pipeline.alive.load(Ordering::SeqCst)
    }

    // ────────────────────────────────────────────────────────────────────
    // Whole-profile updates
    // ────────────────────────────────────────────────────────────────────

    /// Validates and merges `updates` into the observed profile.
    ///
    /// In `Autosave` mode the merged profile is shown immediately and
    /// committed after the quiet period; in `Immediate` mode it is committed
    /// now. Invalid updates are rejected before anything changes.
    pub async fn update_fields(
        &self,
        updates: Vec<FieldUpdate>,
        mode: SaveMode,
    ) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        check_updates(&updates)?;
        let dated: Vec<_> = updates
            .iter()
            .filter_map(|u| u.path.entry())
            .filter(|(_, _, key)| matches!(key, EntryKey::StartDate | EntryKey::EndDate))
            .map(|(list, index, _)| (list, index))
            .collect();

        let delta = ProfileDelta::from_updates(updates);
        let next = reconcile(&self.current(), &delta)?;
        check_date_ranges(&next, dated)?;

        match mode {
            SaveMode::Autosave => {
                self.pipeline.controller.preview(next.clone());
                self.pipeline.autosave.schedule(next.clone());
                Ok(next)
            }
            SaveMode::Immediate => self.pipeline.commit_now(next).await,
        }
    }

    pub async fn update_field(
        &self,
        path: FieldPath,
        value: Value,
        mode: SaveMode,
    ) -> Result<Profile, SessionError> {
        self.update_fields(vec![FieldUpdate { path, value }], mode)
            .await
    }

    /// Merges `delta` and commits it optimistically.
    pub async fn apply(&self, delta: &ProfileDelta) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        let next = reconcile(&self.current(), delta)?;
        self.pipeline.commit_now(next).await
    }

    /// Commits a pending auto-save now.
    pub async fn flush(&self) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        if self.pipeline.autosave.flush().await {
            if let Some(err) = self.pipeline.controller.last_error() {
                return Err(err.into());
            }
        }
        Ok(self.current())
    }

    // ────────────────────────────────────────────────────────────────────
    // List operations
    // ────────────────────────────────────────────────────────────────────

    /// Adds an entry. Experience and education entries may start out blank
    /// and are filled in field by field afterwards.
    pub async fn append(&self, field: ListField, entry: Value) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        check_levels(field, &entry)?;
        let current = self.current();
        let delta = append_entry(&current, field, entry)?;
        let next = reconcile(&current, &delta)?;
        self.pipeline.commit_now(next).await
    }

    /// Changes the keys present in `partial`; only those keys are validated.

    pub async fn update_at(
        &self,
        field: ListField,
        index: usize,
        partial: Value,
    ) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        check_levels(field, &partial)?;
        let current = self.current();
        let dates_changed = check_partial(field, index, &partial)?;
        let delta = update_entry(&current, field, index, partial)?;
        let next = reconcile(&current, &delta)?;
        if dates_changed {
            check_date_ranges(&next, [(field, index)])?;
        }
        self.pipeline.commit_now(next).await
    }

    pub async fn remove_at(&self, field: ListField, index: usize) -> Result<Profile, SessionError> {
        self.pipeline.ensure_open()?;
        let current = self.current();
        let delta = remove_entry(&current, field, index)?;
        let next = reconcile(&current, &delta)?;
        // Later entries shift down, so their editors would address the wrong one.
        self.editors
            .lock()
            .retain(|path, _| path.entry().map_or(true, |(list, _, _)| list != field));
        self.pipeline.commit_now(next).await
    }

    // ────────────────────────────────────────────────────────────────────
    // Inline field editing
    // ────────────────────────────────────────────────────────────────────

    /// Puts `path` into edit mode, creating its editor on first use.
    pub fn begin_edit(
        &self,
        path: FieldPath,
        auto_save: bool,
    ) -> Result<EditSnapshot<String>, SessionError> {
        self.pipeline.ensure_open()?;
        let current = editable_text(path, &self.current())?;

        let editor = {
            let mut editors = self.editors.lock();
            let active = editors
                .get(&path)
                .filter(|e| e.state() != EditState::Viewing)
                .cloned();
            match active {
                Some(editor) => editor,
                None => {
                    let editor = Arc::new(self.new_editor(path, current.clone(), auto_save));
                    editors.insert(path, Arc::clone(&editor));
                    editor
                }
            }
        };
        editor.start_edit()?;
        Ok(editor.snapshot())
    }

    pub fn edit_draft(
        &self,
        path: FieldPath,
        value: String,
    ) -> Result<EditSnapshot<String>, SessionError> {
        self.pipeline.ensure_open()?;
        let editor = self.active_editor(path)?;
        editor.update_value(value)?;
        Ok(editor.snapshot())
    }

    /// Validates and saves the field's draft.
    pub async fn commit_edit(&self, path: FieldPath) -> Result<EditSnapshot<String>, SessionError> {
        self.pipeline.ensure_open()?;
        let editor = self.active_editor(path)?;

        // Spawned so the editor can never be stranded in `Saving`.
        let task = {
            let editor = Arc::clone(&editor);
            tokio::spawn(async move { editor.commit().await })
        };
        task.await
            .unwrap_or_else(|e| Err(EditError::SaveFailed(e.to_string())))?;
        Ok(editor.snapshot())
    }

    pub fn cancel_edit(&self, path: FieldPath) -> Result<EditSnapshot<String>, SessionError> {
        match self.editors.lock().get(&path).cloned() {
            Some(editor) => {
                editor.cancel()?;
                Ok(editor.snapshot())
            }
            None => self.field_state(path),
        }
    }

    pub fn field_state(&self, path: FieldPath) -> Result<EditSnapshot<String>, SessionError> {
        let current = editable_text(path, &self.current())?;
        match self.editors.lock().get(&path) {
            Some(editor) => {
                editor.set_external_value(current);
                Ok(editor.snapshot())
            }
            None => Ok(EditSnapshot {
                state: EditState::Viewing,
                value: current,
                error: None,
                is_saving: false,
            }),
        }
    }

    fn active_editor(&self, path: FieldPath) -> Result<Arc<InlineEditor<String>>, SessionError> {
        self.editors
            .lock()
            .get(&path)
            .cloned()
            .ok_or(SessionError::Edit(EditError::NotEditing))
    }

    fn new_editor(&self, path: FieldPath, initial: String, auto_save: bool) -> InlineEditor<String> {
        let pipeline = Arc::clone(&self.pipeline);
        let save: SaveFn<String> = Arc::new(move |value: String| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.save_field(path, value).await }.boxed()
        });

        let validate = validator_for(path)
            .map(|rule| Arc::new(move |value: &String| rule(value)) as FieldValidator<String>);

        InlineEditor::new(
            initial,
            save,
            InlineEditOptions {
                validate,
                auto_save,
                save_delay: self.inline_save_delay,
            },
        )
    }

    // ────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Replaces the session state with a freshly loaded profile.
    pub async fn reload(&self, profile: Profile) {
        self.pipeline.autosave.cancel();
        self.pipeline
            .committer
            .rebase(profile.metadata.version)
            .await;
        self.pipeline.controller.reset(profile.clone());
        for (path, editor) in self.editors.lock().iter() {
            if let Ok(text) = path.read_text(&profile) {
                editor.set_external_value(text);
            }
        }
        debug!("Reloaded profile for {}", self.pipeline.user_id);
    }

    /// Tears the session down. Pending timers are cancelled; commits already
    /// in flight finish but nothing observes their result.
    pub fn close(&self) {
        self.pipeline.alive.store(false, Ordering::SeqCst);
        self.pipeline.autosave.cancel();
        self.editors.lock().clear();
        debug!("Closed edit session for {}", self.pipeline.user_id);
    }
}

fn editable_text(path: FieldPath, profile: &Profile) -> Result<String, SessionError> {
    if path.is_list() {
        return Err(SessionError::NotEditable(path));
    }
    if let Some((list, index, _)) = path.entry() {
        let len = list_len(profile, list);
        if index >= len {
            return Err(ReconcileError::IndexOutOfRange {
                field: list,
                index,
                len,
            }
            .into());
        }
    }
    Ok(path.read_text(profile)?)
}

fn check_updates(updates: &[FieldUpdate]) -> Result<(), SessionError> {
    let mut errors = BTreeMap::new();
    for update in updates {
        let key = update.path.dotted();
        match &update.value {
            // Clearing an entry field is checked like empty text.
            Value::Null if update.path.entry().is_some() => {
                if let Some(message) = validate_field(update.path, "") {
                    errors.insert(key, message);
                }
            }
            Value::Null => {}
            Value::Array(_) if update.path.is_list() => {}
            _ if update.path.is_list() => {
                errors.insert(key, format!("{} must be a list", update.path));
            }
            Value::String(text) => {
                if let Some(message) = validate_field(update.path, text) {
                    errors.insert(key, message);
                }
            }
            Value::Number(n) if matches!(update.path.entry(), Some((_, _, EntryKey::Gpa))) => {
                if let Some(message) = validate_field(update.path, &n.to_string()) {
                    errors.insert(key, message);
                }
            }
            _ => {
                errors.insert(key, format!("{} must be text", update.path));
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SessionError::Invalid(errors))
    }
}

/// Skill levels and language proficiencies must come from the fixed sets.
fn check_levels(field: ListField, entry: &Value) -> Result<(), SessionError> {
    let (key, rule): (&str, Rule) = match field {
        ListField::SkillsTechnical | ListField::SkillsSoft => {
            ("level", validate_skill_level as Rule)
        }
        ListField::SkillsLanguages => ("proficiency", validate_language_proficiency as Rule),
        _ => return Ok(()),
    };
    match entry.get(key).and_then(Value::as_str).and_then(rule) {
        Some(message) => Err(SessionError::Invalid(BTreeMap::from([(
            format!("{field}.{key}"),
            message,
        )]))),
        None => Ok(()),
    }
}

/// Runs the single-field rules for the entry keys in `partial`. Returns
/// whether a start or end date changed.
fn check_partial(field: ListField, index: usize, partial: &Value) -> Result<bool, SessionError> {
    let Some(changes) = partial.as_object() else {
        return Ok(false);
    };
    let mut errors = BTreeMap::new();
    let mut dates_changed = false;
    for (name, value) in changes {
        let Ok(key) = name.parse::<EntryKey>() else {
            continue;
        };
        if !key.belongs_to(field) {
            continue;
        }
        let text = match value {
            Value::String(text) => text.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            _ => continue,
        };
        let path = FieldPath::Entry { list: field, index, key };
        if let Some(message) = validate_field(path, &text) {
            errors.insert(path.dotted(), message);
        }
        dates_changed |= matches!(key, EntryKey::StartDate | EntryKey::EndDate);
    }
    if errors.is_empty() {
        Ok(dates_changed)
    } else {
        Err(SessionError::Invalid(errors))
    }
}

fn check_date_ranges(
    profile: &Profile,
    entries: impl IntoIterator<Item = (ListField, usize)>,
) -> Result<(), SessionError> {
    let mut errors = BTreeMap::new();
    for (list, index) in entries {
        let dates = match list {
            ListField::Experience => profile
                .experience
                .get(index)
                .map(|e| (e.start_date.as_str(), e.end_date.as_deref().unwrap_or_default())),
            ListField::Education => profile
                .education
                .get(index)
                .map(|e| (e.start_date.as_str(), e.end_date.as_deref().unwrap_or_default())),
            _ => None,
        };
        if let Some(message) = dates.and_then(|(start, end)| validate_date_range(start, end)) {
            errors.insert(format!("{list}[{index}].endDate"), message);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SessionError::Invalid(errors))
    }
}

fn list_len(profile: &Profile, field: ListField) -> usize {
    match field {
        ListField::Experience => profile.experience.len(),
        ListField::Education => profile.education.len(),
        ListField::SkillsTechnical => profile.skills.technical.len(),
        ListField::SkillsSoft => profile.skills.soft.len(),
        ListField::SkillsLanguages => profile.skills.languages.len(),
    }
}

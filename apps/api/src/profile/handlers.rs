use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::profile::{Education, Profile, WorkExperience};
use crate::models::user::Identity;
use crate::profile::completeness::{compute_completion_report, CompletionReport};
use crate::profile::inline_edit::EditSnapshot;
use crate::profile::merge::{FieldPath, FieldUpdate, ListField};
use crate::profile::session::{EditSession, SaveMode};
use crate::profile::validation::{
    validate_education, validate_field, validate_language_proficiency, validate_skill_level,
    validate_work_experience, FieldErrors,
};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The signed-in user, as asserted by the identity provider in front of us.
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let id = header(USER_ID_HEADER).ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser(Identity {
            id,
            email: header(USER_EMAIL_HEADER),
            display_name: header(USER_NAME_HEADER),
        }))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub profile: Profile,
    pub completion: CompletionReport,
    pub is_updating: bool,
    pub autosave_pending: bool,
    pub last_error: Option<String>,
}

impl ProfileView {
    fn of(session: &EditSession, profile: Profile) -> Self {
        Self {
            completion: compute_completion_report(&profile),
            profile,
            is_updating: session.is_updating(),
            autosave_pending: session.is_autosave_pending(),
            last_error: session.last_error().map(|e| e.to_string()),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub updates: Vec<FieldUpdate>,
    #[serde(default)]
    pub mode: SaveMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginEditRequest {
    #[serde(default)]
    pub auto_save: bool,
}

#[derive(Deserialize)]
pub struct DraftRequest {
    pub value: String,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidateRequest {
    Field { path: FieldPath, value: String },
    Experience { entry: WorkExperience },
    Education { entry: Education },
    SkillLevel { value: String },
    LanguageProficiency { value: String },
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: BTreeMap<String, String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/session
pub async fn handle_sign_in(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let session = state.profiles.sign_in(&identity).await?;
    Ok(Json(ProfileView::of(&session, session.current())))
}

/// DELETE /api/v1/session
pub async fn handle_sign_out(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> StatusCode {
    state.profiles.sign_out(&identity.id);
    StatusCode::NO_CONTENT
}

// ────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(ProfileView::of(&session, session.current())))
}

/// POST /api/v1/profile/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let profile = state.profiles.refresh(&identity.id).await?;
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(ProfileView::of(&session, profile)))
}

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, AppError> {
    if req.updates.is_empty() {
        return Err(AppError::Validation("No updates given".to_string()));
    }
    let session = state.profiles.session(&identity.id)?;
    debug!(
        "{} field update(s) for {} ({:?})",
        req.updates.len(),
        identity.id,
        req.mode
    );
    let profile = session.update_fields(req.updates, req.mode).await?;
    Ok(Json(ProfileView::of(&session, profile)))
}

/// POST /api/v1/profile/flush
pub async fn handle_flush(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    let profile = session.flush().await?;
    Ok(Json(ProfileView::of(&session, profile)))
}

/// GET /api/v1/profile/completion
pub async fn handle_completion(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<CompletionReport>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(session.completion()))
}

// ────────────────────────────────────────────────────────────────────────────
// Lists
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/profile/lists/:field
pub async fn handle_append_entry(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(field): Path<ListField>,
    Json(entry): Json<Value>,
) -> Result<(StatusCode, Json<ProfileView>), AppError> {
    let session = state.profiles.session(&identity.id)?;
    let profile = session.append(field, entry).await?;
    Ok((StatusCode::CREATED, Json(ProfileView::of(&session, profile))))
}

/// PATCH /api/v1/profile/lists/:field/:index
pub async fn handle_update_entry(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path((field, index)): Path<(ListField, usize)>,
    Json(partial): Json<Value>,
) -> Result<Json<ProfileView>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    let profile = session.update_at(field, index, partial).await?;
    Ok(Json(ProfileView::of(&session, profile)))
}

/// DELETE /api/v1/profile/lists/:field/:index
pub async fn handle_remove_entry(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path((field, index)): Path<(ListField, usize)>,
) -> Result<Json<ProfileView>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    let profile = session.remove_at(field, index).await?;
    Ok(Json(ProfileView::of(&session, profile)))
}

// ────────────────────────────────────────────────────────────────────────────
// Inline field editing
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/profile/fields/:path
pub async fn handle_field_state(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(path): Path<FieldPath>,
) -> Result<Json<EditSnapshot<String>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(session.field_state(path)?))
}

/// POST /api/v1/profile/fields/:path/edit
pub async fn handle_begin_edit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(path): Path<FieldPath>,
    req: Option<Json<BeginEditRequest>>,
) -> Result<Json<EditSnapshot<String>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    let auto_save = req.map(|Json(r)| r.auto_save).unwrap_or(false);
    Ok(Json(session.begin_edit(path, auto_save)?))
}

/// PUT /api/v1/profile/fields/:path/draft
pub async fn handle_edit_draft(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(path): Path<FieldPath>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<EditSnapshot<String>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(session.edit_draft(path, req.value)?))
}

/// POST /api/v1/profile/fields/:path/commit
pub async fn handle_commit_edit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(path): Path<FieldPath>,
) -> Result<Json<EditSnapshot<String>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(session.commit_edit(path).await?))
}

/// POST /api/v1/profile/fields/:path/cancel
pub async fn handle_cancel_edit(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(path): Path<FieldPath>,
) -> Result<Json<EditSnapshot<String>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    Ok(Json(session.cancel_edit(path)?))
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/validate
/// Runs a validator without touching any profile.
pub async fn handle_validate(Json(req): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let errors: BTreeMap<String, String> = match req {
        ValidateRequest::Field { path, value } => validate_field(path, &value)
            .map(|msg| (path.dotted(), msg))
            .into_iter()
            .collect(),
        ValidateRequest::Experience { entry } => into_owned(validate_work_experience(&entry)),
        ValidateRequest::Education { entry } => into_owned(validate_education(&entry)),
        ValidateRequest::SkillLevel { value } => validate_skill_level(&value)
            .map(|msg| ("level".to_string(), msg))
            .into_iter()
            .collect(),
        ValidateRequest::LanguageProficiency { value } => validate_language_proficiency(&value)
            .map(|msg| ("proficiency".to_string(), msg))
            .into_iter()
            .collect(),
    };
    Json(ValidateResponse {
        valid: errors.is_empty(),
        errors,
    })
}

fn into_owned(errors: FieldErrors) -> BTreeMap<String, String> {
    errors
        .into_iter()
        .map(|(field, msg)| (field.to_string(), msg))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/profile/events - SSE stream of the user's save events
///
/// Emits `saving` / `saved` / `failed` for each commit and `profile` whenever
/// the observed profile changes (including rollbacks).
pub async fn handle_events(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = state.profiles.session(&identity.id)?;
    let mut events = state.events.subscribe();
    let mut profiles = session.subscribe();
    let user_id = identity.id;
    info!("SSE client connected for {user_id}");

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        if event.user_id() == user_id {
                            match serde_json::to_string(&event) {
                                Ok(json) => yield Ok(Event::default().event(event.event_type()).data(json)),
                                Err(e) => warn!("SSE: failed to serialize save event: {e}"),
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: client for {user_id} lagged, {skipped} event(s) dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = profiles.changed() => {
                    if changed.is_err() {
                        debug!("SSE: session for {user_id} ended");
                        break;
                    }
                    let profile = profiles.borrow_and_update().clone();
                    match serde_json::to_string(&profile) {
                        Ok(json) => yield Ok(Event::default().event("profile").data(json)),
                        Err(e) => warn!("SSE: failed to serialize profile: {e}"),
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::profile::Profile;
use crate::models::user::Identity;
use crate::profile::completeness::completion_percentage;
use crate::profile::events::{NotificationSink, SaveToken};
use crate::profile::optimistic::{Commit, CommitError};
use crate::profile::session::{EditSession, SessionError, SessionSettings};
use crate::profile::store::ProfileStore;

/// Persists one user's profile.
///
/// Writes are serialized per user. Each write is stamped with the owner id,
/// a fresh completion score, the current time and `version = last + 1`; the
/// version only advances once the store accepts the document.
pub struct ProfileCommitter {
    user_id: String,
    store: Arc<dyn ProfileStore>,
    sink: Arc<dyn NotificationSink>,
    persisted_version: Mutex<u64>,
}

impl ProfileCommitter {
    /// `persisted_version` is the version currently in the store (0 if none).
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn ProfileStore>,
        sink: Arc<dyn NotificationSink>,
        persisted_version: u64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            sink,
            persisted_version: Mutex::new(persisted_version),
        }
    }

    pub async fn persisted_version(&self) -> u64 {
        *self.persisted_version.lock().await
    }

    /// Re-bases the version counter after reloading from the store.
    pub async fn rebase(&self, version: u64) {
        *self.persisted_version.lock().await = version;
    }
}

#[async_trait]
impl Commit<Profile> for ProfileCommitter {
    async fn commit(&self, mut profile: Profile) -> Result<Profile, CommitError> {
        let mut persisted = self.persisted_version.lock().await;

        profile.id = self.user_id.clone();
        profile.metadata.version = *persisted + 1;
        profile.metadata.completion_percentage = completion_percentage(&profile);
        profile.metadata.last_updated = Utc::now();

        let token = SaveToken::new(&self.user_id);
        self.sink.saving(&token);

        match self.store.set(&self.user_id, &profile).await {
            Ok(()) => {
                *persisted = profile.metadata.version;
                debug!(
                    "Persisted profile {} version {}",
                    self.user_id, profile.metadata.version
                );
                self.sink.saved(&token);
                Ok(profile)
            }
            Err(e) => {
                let err = CommitError::Store(e.to_string());
                self.sink.failed(&token, &err.to_string());
                Err(err)
            }
        }
    }
}

/// Owns the edit sessions of every signed-in user.
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    sink: Arc<dyn NotificationSink>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, Arc<EditSession>>>,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        sink: Arc<dyn NotificationSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            sink,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Loads (or creates and persists) the user's profile and opens a session.
    ///
    /// Signing in again while a session is open returns the open session.
    pub async fn sign_in(&self, identity: &Identity) -> Result<Arc<EditSession>, SessionError> {
        let open = self.sessions.read().get(&identity.id).cloned();
        if let Some(session) = open {
            return Ok(session);
        }

        let session = match self.store.get(&identity.id).await? {
            Some(profile) => {
                let committer = self.committer(&identity.id, profile.metadata.version);
                EditSession::open(profile, committer, &self.settings)
            }
            None => {
                info!("Creating profile for new user {}", identity.id);
                let committer = self.committer(&identity.id, 0);
                let profile = committer.commit(Profile::initial(identity)).await?;
                EditSession::open(profile, committer, &self.settings)
            }
        };

        // Another sign-in may have raced us here; keep whichever landed first.
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(identity.id.clone())
            .or_insert_with(|| Arc::new(session));
        info!("User {} signed in", identity.id);
        Ok(Arc::clone(session))
    }

    /// Closes the user's session. Pending auto-saves are dropped; saves
    /// already in flight still reach the store.
    pub fn sign_out(&self, user_id: &str) -> bool {
        match self.sessions.write().remove(user_id) {
            Some(session) => {
                session.close();
                info!("User {user_id} signed out");
                true
            }
            None => false,
        }
    }

    pub fn session(&self, user_id: &str) -> Result<Arc<EditSession>, SessionError> {
        self.sessions
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| SessionError::NotInitialized(user_id.to_string()))
    }

    /// Reloads the stored profile into the user's session.
    pub async fn refresh(&self, user_id: &str) -> Result<Profile, SessionError> {
        let session = self.session(user_id)?;
        let profile = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))?;
        session.reload(profile.clone()).await;
        Ok(profile)
    }

    fn committer(&self, user_id: &str, version: u64) -> Arc<ProfileCommitter> {
        Arc::new(ProfileCommitter::new(
            user_id,
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            version,
        ))
    }
}

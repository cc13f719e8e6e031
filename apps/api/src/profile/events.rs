//! Save notifications.
//!
//! Every profile commit emits `saving`, then exactly one of `saved` or
//! `failed`, all carrying the same correlation token.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Correlates the notifications of one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveToken {
    pub user_id: String,
    pub id: Uuid,
}

impl SaveToken {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id: Uuid::new_v4(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn saving(&self, token: &SaveToken);
    fn saved(&self, token: &SaveToken);
    fn failed(&self, token: &SaveToken, message: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SaveEvent {
    #[serde(rename_all = "camelCase")]
    Saving {
        token: SaveToken,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Saved {
        token: SaveToken,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        token: SaveToken,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl SaveEvent {
    pub fn token(&self) -> &SaveToken {
        match self {
            SaveEvent::Saving { token, .. }
            | SaveEvent::Saved { token, .. }
            | SaveEvent::Failed { token, .. } => token,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.token().user_id
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SaveEvent::Saving { .. } => "saving",
            SaveEvent::Saved { .. } => "saved",
            SaveEvent::Failed { .. } => "failed",
        }
    }
}

/// Broadcasts save events to every subscriber (SSE streams, tests).
///
/// Slow subscribers lag and lose the oldest events once `capacity` is
/// exceeded; emitting never blocks.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SaveEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.tx.subscribe()
    }

    /// Sends to whoever is listening; no subscribers is not an error.
    pub fn emit(&self, event: SaveEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!("Save event delivered to {receivers} subscriber(s)"),
            Err(broadcast::error::SendError(event)) => {
                debug!("No subscribers for {} event", event.event_type())
            }
        }
    }
}

impl NotificationSink for EventBus {
    fn saving(&self, token: &SaveToken) {
        self.emit(SaveEvent::Saving {
            token: token.clone(),
            timestamp: Utc::now(),
        });
    }

    fn saved(&self, token: &SaveToken) {
        self.emit(SaveEvent::Saved {
            token: token.clone(),
            timestamp: Utc::now(),
        });
    }

    fn failed(&self, token: &SaveToken, message: &str) {
        self.emit(SaveEvent::Failed {
            token: token.clone(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Writes save notifications to the log.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn saving(&self, token: &SaveToken) {
        debug!(user_id = %token.user_id, token = %token.id, "Saving profile");
    }

    fn saved(&self, token: &SaveToken) {
        info!(user_id = %token.user_id, token = %token.id, "Profile saved");
    }

    fn failed(&self, token: &SaveToken, message: &str) {
        warn!(user_id = %token.user_id, token = %token.id, "Profile save failed: {message}");
    }
}

/// Forwards every notification to each inner sink in order.
pub struct Fanout(pub Vec<Arc<dyn NotificationSink>>);

impl NotificationSink for Fanout {
    fn saving(&self, token: &SaveToken) {
        self.0.iter().for_each(|sink| sink.saving(token));
    }

    fn saved(&self, token: &SaveToken) {
        self.0.iter().for_each(|sink| sink.saved(token));
    }

    fn failed(&self, token: &SaveToken, message: &str) {
        self.0.iter().for_each(|sink| sink.failed(token, message));
    }
}

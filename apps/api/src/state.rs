use std::sync::Arc;

use crate::config::Config;
use crate::profile::events::EventBus;
use crate::profile::service::ProfileService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<ProfileService>,
    /// Save notifications, fanned out to SSE subscribers.
    pub events: EventBus,
    pub config: Config,
}

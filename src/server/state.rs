use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenProvider;
use crate::config::{BackendKind, Settings};
use crate::domain::core::MultiQueue;
use crate::domain::restriction::RestrictionBackend;

use super::access_control::AccessControl;

/// Shared application state: settings, the queue core, the restriction
/// registry, and the access-control filter.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub queue: Arc<MultiQueue>,
    pub restriction: Arc<dyn RestrictionBackend>,
    pub access_control: Arc<AccessControl>,
    pub token_provider: Arc<TokenProvider>,
    pub backend_kind: BackendKind,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        queue: Arc<MultiQueue>,
        restriction: Arc<dyn RestrictionBackend>,
        access_control: Arc<AccessControl>,
        token_provider: Arc<TokenProvider>,
        backend_kind: BackendKind,
    ) -> Self {
        Self {
            settings,
            queue,
            restriction,
            access_control,
            token_provider,
            backend_kind,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

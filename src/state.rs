//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the dispatch service handle (which owns all queue state behind an
//! actor) and the optional indicator service.

use crate::services::dispatch::ServiceHandle;
use crate::services::indicator::Indicator;

/// Clone is required by Axum; all inner fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub service: ServiceHandle,
    /// `None` when escalation is disabled (`AUTHUI_INDICATOR=0`).
    pub indicator: Option<Indicator>,
}

impl AppState {
    #[must_use]
    pub fn new(service: ServiceHandle, indicator: Option<Indicator>) -> Self {
        Self { service, indicator }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

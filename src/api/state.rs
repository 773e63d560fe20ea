//! Application state for the API server

use crate::{Config, MediaRelay};
use std::sync::Arc;

/// Shared state handed to every route handler (cheap Arc clone per request)
#[derive(Clone)]
pub struct AppState {
    /// The service facade
    pub relay: Arc<MediaRelay>,

    /// Configuration, read-only
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(relay: Arc<MediaRelay>, config: Arc<Config>) -> Self {
        Self { relay, config }
    }
}

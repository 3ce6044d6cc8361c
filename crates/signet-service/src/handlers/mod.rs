//! HTTP request handlers.

pub mod config_handler;
pub mod role_handler;
pub mod token_handler;

use crate::backend::Backend;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
}

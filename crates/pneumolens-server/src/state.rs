use std::sync::Arc;

use pneumolens_ai::{ModelState, ResponderState};
use pneumolens_auth::AuthService;

/// Shared state built once at startup and handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub model: ModelState,
    pub responder: ResponderState,
    pub auth: Arc<AuthService>,
    pub require_auth: bool,
}

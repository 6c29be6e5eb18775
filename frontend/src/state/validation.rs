use std::{cell::Cell, rc::Rc};

use reqwest::StatusCode;

use crate::{
    api::ApiClient,
    state::session::{Session, SessionStore},
};

/// Whether the stored token has been confirmed by the backend since the app
/// started. Only a page reload resets it.
#[derive(Debug, Clone, Default)]
pub struct ValidationCache {
    validated: Rc<Cell<bool>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_validated(&self) -> bool {
        self.validated.get()
    }

    fn mark_validated(&self) {
        self.validated.set(true);
    }
}

/// Confirms a persisted token against the backend at most once per page
/// lifetime.
#[derive(Clone)]
pub struct ValidationGate {
    api: Rc<ApiClient>,
    sessions: SessionStore,
    cache: ValidationCache,
}

impl ValidationGate {
    pub fn new(api: Rc<ApiClient>, sessions: SessionStore, cache: ValidationCache) -> Self {
        Self {
            api,
            sessions,
            cache,
        }
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub async fn confirm_token(&self, session: &Session) -> bool {
        if self.cache.is_validated() {
            return true;
        }
        let Some(token) = session.token.as_deref() else {
            return false;
        };
        match self.api.probe_session(token).await {
            Ok(StatusCode::UNAUTHORIZED) => {
                log::info!("stored token rejected by backend; clearing session");
                self.sessions.clear();
                false
            }
            Ok(_) => {
                self.cache.mark_validated();
                true
            }
            Err(err) => {
                // Offline: other calls will surface a 401 if the token is dead.
                log::warn!("token probe did not complete, assuming valid: {}", err);
                true
            }
        }
    }
}

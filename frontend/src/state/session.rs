use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::utils::storage::KeyValueStore;

/// Storage keys for the persisted session.
pub mod keys {
    /// Bearer token issued by `/auth/login` or `/auth/sso`.
    pub const TOKEN: &str = "token";
    /// JSON-serialized [`super::SessionUser`].
    pub const USER: &str = "user";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    God,
    Gm,
    Player,
}

/// Roles admitted to the administrative area.
pub const ADMIN_ROLES: [Role; 2] = [Role::God, Role::Gm];

impl Role {
    pub fn is_privileged(self) -> bool {
        ADMIN_ROLES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::God => "god",
            Role::Gm => "gm",
            Role::Player => "player",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<SessionUser>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Role of the authenticated identity. A stale user record without a
    /// token carries no role.
    pub fn role(&self) -> Option<Role> {
        self.token.as_ref()?;
        self.user.as_ref().map(|user| user.role)
    }

    pub fn is_privileged(&self) -> bool {
        self.role().is_some_and(Role::is_privileged)
    }
}

/// Read/clear access to the persisted credentials.
#[derive(Clone)]
pub struct SessionStore {
    storage: Rc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub(crate) fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    pub fn read(&self) -> Session {
        let token = match self.storage.get(keys::TOKEN) {
            Ok(token) => token.filter(|value| !value.is_empty()),
            Err(err) => {
                log::warn!("session token unreadable: {}", err);
                None
            }
        };
        let user = match self.storage.get(keys::USER) {
            Ok(Some(raw)) => parse_user(&raw),
            Ok(None) => None,
            Err(err) => {
                log::warn!("session user unreadable: {}", err);
                None
            }
        };
        Session { token, user }
    }

    pub fn clear(&self) {
        for key in [keys::TOKEN, keys::USER] {
            if let Err(err) = self.storage.remove(key) {
                log::warn!("failed to clear `{}`: {}", key, err);
            }
        }
    }
}

fn parse_user(raw: &str) -> Option<SessionUser> {
    match serde_json::from_str(raw) {
        Ok(user) => Some(user),
        Err(err) => {
            log::warn!("ignoring malformed session user: {}", err);
            None
        }
    }
}

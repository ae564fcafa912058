use std::sync::RwLock;

use crate::errors::SyncError;

/// Source of the signed-in user's identity.
pub trait AuthProvider {
    fn current_user_id(&self) -> Option<String>;

    /// The signed-in user, or `Unauthorized` when nobody is signed in.
    fn require_user(&self, action: &'static str) -> Result<String, SyncError> {
        self.current_user_id()
            .ok_or_else(|| SyncError::unauthorized("anonymous", action))
    }
}

/// Auth provider holding a fixed (switchable) user id.
#[derive(Debug, Default)]
pub struct StaticAuth {
    user: RwLock<Option<String>>,
}

impl StaticAuth {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn switch_to(&self, user_id: Option<String>) {
        *self.user.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = user_id;
    }
}

impl AuthProvider for StaticAuth {
    fn current_user_id(&self) -> Option<String> {
        self.user.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

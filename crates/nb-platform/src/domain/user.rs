//! User Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::persistence::{Persistable, SaveHooks};

/// Registered account. Only active users can log in or be authenticated.
#[derive(Debug)]
pub struct User {
    pub id: Option<u64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub password_hash: String,
    pub is_first_login: bool,
    pub active: bool,
    pub created_by: Option<u64>,
    pub updated_by: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    hooks: SaveHooks<User>,
}

/// Fields needed to rebuild a stored user.
pub struct StoredUser {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub password_hash: String,
    pub is_first_login: bool,
    pub active: bool,
    pub created_by: Option<u64>,
    pub updated_by: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        contact: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            contact: contact.into(),
            password_hash: password_hash.into(),
            is_first_login: true,
            active: true,
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
            hooks: SaveHooks::new(),
        }
    }

    pub fn from_storage(stored: StoredUser) -> Self {
        Self {
            id: Some(stored.id),
            first_name: stored.first_name,
            last_name: stored.last_name,
            email: stored.email,
            contact: stored.contact,
            password_hash: stored.password_hash,
            is_first_login: stored.is_first_login,
            active: stored.active,
            created_by: stored.created_by,
            updated_by: stored.updated_by,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            hooks: SaveHooks::new(),
        }
    }

    /// The identity attached to authenticated requests. None until stored.
    pub fn identity(&self) -> Option<Identity> {
        self.id.map(|id| Identity {
            id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        })
    }

    /// Queue the audit column stamp for the next save.
    pub fn stamp_on_save(&mut self, actor_id: Option<u64>) {
        self.hooks.before_persist(move |user, _| {
            Box::pin(async move {
                let now = Utc::now();
                if user.is_new_record() {
                    user.created_by = actor_id;
                    user.created_at = Some(now);
                } else {
                    user.updated_by = actor_id;
                    user.updated_at = Some(now);
                }
                Ok(())
            })
        });
    }
}

impl Persistable for User {
    fn hooks(&mut self) -> &mut SaveHooks<Self> {
        &mut self.hooks
    }

    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }
}

/// Authenticated subject attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
}

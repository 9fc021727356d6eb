//! User Service
//!
//! Registration, password login and access refresh from the refresh cookie.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Identity, User};
use crate::error::{PlatformError, Result};
use crate::persistence::{SaveOptions, SavePipeline};
use crate::repository::UserStore;
use crate::service::password::PasswordService;
use crate::service::token::{TokenKind, TokenService};

const INVALID_CREDENTIALS: &str = "Invalid username/password. Please try again.";
pub const EMAIL_TAKEN: &str = "This email is already registered.";
const MAX_CONTACT_LENGTH: usize = 12;

#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
}

impl Registration {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("First name", &self.first_name),
            ("Last name", &self.last_name),
            ("Email", &self.email),
            ("Contact", &self.contact),
        ] {
            if value.trim().is_empty() {
                return Err(PlatformError::validation(format!("{} cannot be empty!", field)));
            }
        }

        if !is_email(&self.email) {
            return Err(PlatformError::validation("Invalid email."));
        }

        if self.contact.chars().count() > MAX_CONTACT_LENGTH {
            return Err(PlatformError::validation(format!(
                "Contact must be at most {} characters.",
                MAX_CONTACT_LENGTH
            )));
        }

        Ok(())
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !value.chars().any(char::is_whitespace)
}

/// A newly registered user and the generated password, shown once.
#[derive(Debug, Clone)]
pub struct Registered {
    pub user_id: u64,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub identity: Identity,
    pub access_token: String,
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    passwords: Arc<PasswordService>,
    pipeline: SavePipeline,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
        passwords: Arc<PasswordService>,
        pipeline: SavePipeline,
    ) -> Self {
        Self { users, tokens, passwords, pipeline }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        if username.is_empty() || password.is_empty() {
            return Err(PlatformError::validation(INVALID_CREDENTIALS));
        }

        let user = self
            .users
            .find_active_by_email(username)
            .await?
            .ok_or_else(|| PlatformError::unauthorized(INVALID_CREDENTIALS))?;

        if !self.passwords.verify_password(password, &user.password_hash)? {
            warn!(user_id = ?user.id, "Login rejected: wrong password");
            return Err(PlatformError::unauthorized(INVALID_CREDENTIALS));
        }

        let id = user
            .id
            .ok_or_else(|| PlatformError::internal("Stored user without id"))?;
        let access_token = self.tokens.issue_access(id)?;
        let refresh_token = self.tokens.issue_refresh(id)?;

        info!(user_id = id, "User logged in");
        Ok(LoginOutcome { user, access_token, refresh_token })
    }

    pub async fn register(&self, registration: Registration, actor: &Identity) -> Result<Registered> {
        registration.validate()?;

        // Fast path; the store's uniqueness check settles concurrent registrations
        if self.users.find_active_by_email(&registration.email).await?.is_some() {
            return Err(PlatformError::conflict(EMAIL_TAKEN));
        }

        let password = self.passwords.generate_password();
        let hash = self.passwords.hash_password(&password)?;

        let mut user = User::new(
            registration.first_name,
            registration.last_name,
            registration.email,
            registration.contact,
            hash,
        );
        user.stamp_on_save(Some(actor.id));
        self.pipeline
            .save(&mut user, &*self.users, SaveOptions::new())
            .await?;

        let user_id = user
            .id
            .ok_or_else(|| PlatformError::internal("Insert did not assign a user id"))?;
        info!(user_id, registered_by = actor.id, "User registered");

        Ok(Registered {
            user_id,
            email: user.email,
            password,
        })
    }

    /// Create the first account on an empty deployment, since registration
    /// itself requires an authenticated caller. Returns the new id, or `None`
    /// when an active user with this email already exists.
    pub async fn ensure_bootstrap_user(&self, email: &str, password: &str) -> Result<Option<u64>> {
        if !is_email(email) {
            return Err(PlatformError::validation("Invalid email."));
        }
        if password.is_empty() {
            return Err(PlatformError::validation("Password cannot be empty!"));
        }
        if self.users.find_active_by_email(email).await?.is_some() {
            return Ok(None);
        }

        let hash = self.passwords.hash_password(password)?;
        let mut user = User::new("System", "Administrator", email, "", hash);
        user.stamp_on_save(None);
        self.pipeline
            .save(&mut user, &*self.users, SaveOptions::new())
            .await?;

        let user_id = user
            .id
            .ok_or_else(|| PlatformError::internal("Insert did not assign a user id"))?;
        info!(user_id, "Bootstrap user created");
        Ok(Some(user_id))
    }

    /// Issue a fresh access token for the refresh cookie's subject.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshOutcome> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PlatformError::forbidden("Refresh token required."))?;

        let claims = self
            .tokens
            .verify(token, TokenKind::Refresh)
            .map_err(|_| PlatformError::RefreshExpired)?;

        let identity = self
            .users
            .find_by_id(claims.subject_id)
            .await?
            .and_then(|user| user.identity())
            .ok_or_else(|| PlatformError::validation("User not found!"))?;

        let access_token = self.tokens.issue_access(identity.id)?;
        Ok(RefreshOutcome { identity, access_token })
    }
}

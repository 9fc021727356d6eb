//! Repository Layer
//!
//! Store traits consumed by the services, and their MySQL implementations.
//! Writes take a `WriteTarget` so they join whatever transaction the save
//! pipeline resolved; reads always go to the pool.

pub mod note;
pub mod user;

use async_trait::async_trait;

use crate::domain::{Note, User};
use crate::error::Result;
use crate::persistence::EntityStore;

pub use note::MySqlNoteRepository;
pub use user::MySqlUserRepository;

#[async_trait]
pub trait UserStore: EntityStore<User> {
    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;

    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait NoteStore: EntityStore<Note> {
    async fn find_by_id(&self, id: u64) -> Result<Option<Note>>;

    /// Active notes of one user, oldest first.
    async fn list_active(&self, users_id: u64, offset: u64, limit: u64) -> Result<Vec<Note>>;
}

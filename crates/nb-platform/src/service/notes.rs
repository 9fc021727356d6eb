//! Note Service
//!
//! Paginated, cached reads and owner-only writes. Every write queues a cache
//! eviction as an after-persist hook and saves atomically, so a failed
//! eviction rolls the write back. The pages are evicted once more after the
//! commit, since a concurrent `list` may re-cache the pre-write page while
//! the transaction is still open.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::cache::{notes_page_key, notes_prefix, NoteCache};
use crate::domain::{Identity, Note, NoteType};
use crate::error::{PlatformError, Result};
use crate::persistence::{Persistable, SaveOptions, SavePipeline};
use crate::repository::NoteStore;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_LENGTH: u64 = 10;

/// Note as returned to clients and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    pub id: u64,
    pub users_id: u64,
    /// 1 = work, 2 = personal
    #[serde(rename = "type")]
    #[schema(value_type = u8)]
    pub note_type: NoteType,
    pub remarks: Option<String>,
    pub active: bool,
    pub created_by: Option<u64>,
    pub updated_by: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteView {
    fn from_note(note: &Note) -> Result<Self> {
        Ok(Self {
            id: note
                .id
                .ok_or_else(|| PlatformError::internal("Note has no id after save"))?,
            users_id: note.users_id,
            note_type: note.note_type,
            remarks: note.remarks.clone(),
            active: note.active,
            created_by: note.created_by,
            updated_by: note.updated_by,
            created_at: note.created_at,
            updated_at: note.updated_at,
        })
    }
}

/// One page of notes. Cached as a whole so `load_more` survives cache hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    pub notes: Vec<NoteView>,
    pub load_more: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// 1-based page number
    pub count: u64,
    /// Page size
    pub length: u64,
    /// Skip the cache read (the fresh page is still cached)
    pub overwrite: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            count: DEFAULT_PAGE,
            length: DEFAULT_PAGE_LENGTH,
            overwrite: false,
        }
    }
}

/// Body of create and update requests, before validation.
#[derive(Debug, Clone)]
pub struct NoteInput {
    pub note_type: Option<u8>,
    pub remarks: Option<String>,
}

impl NoteInput {
    fn validate(self, missing_type: &str) -> Result<(NoteType, String)> {
        let code = self.note_type.ok_or_else(|| PlatformError::validation(missing_type))?;
        let remarks = self
            .remarks
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| PlatformError::validation("Remarks cannot be empty!"))?;
        Ok((NoteType::try_from(code)?, remarks))
    }
}

pub struct NoteService {
    notes: Arc<dyn NoteStore>,
    cache: Arc<dyn NoteCache>,
    pipeline: SavePipeline,
    cache_ttl_secs: u64,
}

impl NoteService {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        cache: Arc<dyn NoteCache>,
        pipeline: SavePipeline,
        cache_ttl_secs: u64,
    ) -> Self {
        Self { notes, cache, pipeline, cache_ttl_secs }
    }

    fn ensure_owner(caller: &Identity, users_id: u64) -> Result<()> {
        if caller.id != users_id {
            return Err(PlatformError::forbidden("Notes belong to another user"));
        }
        Ok(())
    }

    pub async fn list(&self, caller: &Identity, users_id: u64, page: PageRequest) -> Result<NotePage> {
        Self::ensure_owner(caller, users_id)?;
        if page.count == 0 || page.length == 0 {
            return Err(PlatformError::validation("count and length must be positive"));
        }

        let key = notes_page_key(users_id, page.count, page.length);
        if !page.overwrite {
            match self.cache.get(&key).await {
                Ok(Some(cached)) => match serde_json::from_str::<NotePage>(&cached) {
                    Ok(hit) => return Ok(hit),
                    Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cached page"),
                },
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Note cache read failed"),
            }
        }

        // One extra row tells whether another page exists
        let offset = (page.count - 1).saturating_mul(page.length);
        let mut notes = self
            .notes
            .list_active(users_id, offset, page.length.saturating_add(1))
            .await?;
        let load_more = notes.len() as u64 > page.length;
        notes.truncate(page.length as usize);

        let result = NotePage {
            notes: notes.iter().map(NoteView::from_note).collect::<Result<_>>()?,
            load_more,
        };

        let encoded = serde_json::to_string(&result)?;
        if let Err(e) = self.cache.set_with_expiry(&key, self.cache_ttl_secs, &encoded).await {
            warn!(key = %key, error = %e, "Note cache write failed");
        }

        Ok(result)
    }

    pub async fn create(&self, caller: &Identity, users_id: u64, input: NoteInput) -> Result<NoteView> {
        Self::ensure_owner(caller, users_id)?;
        let (note_type, remarks) = input.validate("Note type cannot be empty!")?;

        info!(note_type = note_type.as_str(), users_id, "Note is being created");
        let mut note = Note::new(caller.id, note_type, remarks);
        self.save(&mut note, caller).await?;

        NoteView::from_note(&note)
    }

    pub async fn update(
        &self,
        caller: &Identity,
        users_id: u64,
        note_id: u64,
        input: NoteInput,
    ) -> Result<NoteView> {
        Self::ensure_owner(caller, users_id)?;
        let (note_type, remarks) = input.validate("Type cannot be empty!")?;

        let mut note = self.find_owned(caller, note_id).await?;
        note.revise(note_type, remarks);
        self.save(&mut note, caller).await?;

        NoteView::from_note(&note)
    }

    pub async fn delete(&self, caller: &Identity, users_id: u64, note_id: u64) -> Result<()> {
        Self::ensure_owner(caller, users_id)?;

        let mut note = self.find_owned(caller, note_id).await?;
        note.soft_delete();
        self.save(&mut note, caller).await?;

        info!(note_id, users_id, "Note deleted");
        Ok(())
    }

    /// Active note owned by the caller. Other users' notes look missing.
    async fn find_owned(&self, caller: &Identity, note_id: u64) -> Result<Note> {
        self.notes
            .find_by_id(note_id)
            .await?
            .filter(|note| note.active && note.is_owned_by(caller.id))
            .ok_or_else(|| PlatformError::not_found("Note", note_id))
    }

    async fn save(&self, note: &mut Note, caller: &Identity) -> Result<()> {
        note.stamp_on_save(caller.id);

        let cache = self.cache.clone();
        note.hooks().after_persist(move |note, _| {
            Box::pin(async move {
                cache.evict_prefix(&notes_prefix(note.users_id)).await?;
                Ok(())
            })
        });

        self.pipeline
            .save(note, &*self.notes, SaveOptions::atomic())
            .await?;

        // Already committed; a failure here leaves a stale page until its TTL
        let prefix = notes_prefix(note.users_id);
        if let Err(e) = self.cache.evict_prefix(&prefix).await {
            warn!(prefix = %prefix, error = %e, "Post-commit note cache eviction failed");
        }
        Ok(())
    }
}

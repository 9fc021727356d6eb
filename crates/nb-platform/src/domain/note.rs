//! Note Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::persistence::{Persistable, SaveHooks};

/// Note category. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NoteType {
    Work,
    Personal,
}

impl NoteType {
    pub fn code(self) -> u8 {
        match self {
            Self::Work => 1,
            Self::Personal => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
        }
    }
}

impl TryFrom<u8> for NoteType {
    type Error = PlatformError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Work),
            2 => Ok(Self::Personal),
            _ => Err(PlatformError::validation("Invalid note type!")),
        }
    }
}

impl From<NoteType> for u8 {
    fn from(note_type: NoteType) -> Self {
        note_type.code()
    }
}

/// A user's note. Deleting a note only clears `active`.
#[derive(Debug)]
pub struct Note {
    pub id: Option<u64>,
    pub users_id: u64,
    pub note_type: NoteType,
    pub remarks: Option<String>,
    pub active: bool,
    pub created_by: Option<u64>,
    pub updated_by: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    hooks: SaveHooks<Note>,
}

impl Note {
    pub fn new(users_id: u64, note_type: NoteType, remarks: impl Into<String>) -> Self {
        Self {
            id: None,
            users_id,
            note_type,
            remarks: Some(remarks.into()),
            active: true,
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
            hooks: SaveHooks::new(),
        }
    }

    /// Rebuild a stored note. Loaded notes start with empty hook queues.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: u64,
        users_id: u64,
        note_type: NoteType,
        remarks: Option<String>,
        active: bool,
        created_by: Option<u64>,
        updated_by: Option<u64>,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Some(id),
            users_id,
            note_type,
            remarks,
            active,
            created_by,
            updated_by,
            created_at,
            updated_at,
            hooks: SaveHooks::new(),
        }
    }

    pub fn revise(&mut self, note_type: NoteType, remarks: impl Into<String>) {
        self.note_type = note_type;
        self.remarks = Some(remarks.into());
    }

    pub fn soft_delete(&mut self) {
        self.active = false;
    }

    pub fn is_owned_by(&self, user_id: u64) -> bool {
        self.users_id == user_id
    }

    /// Queue the audit column stamp for the next save.
    pub fn stamp_on_save(&mut self, actor_id: u64) {
        self.hooks.before_persist(move |note, _| {
            Box::pin(async move {
                let now = Utc::now();
                if note.is_new_record() {
                    note.created_by = Some(actor_id);
                    note.created_at = Some(now);
                } else {
                    note.updated_by = Some(actor_id);
                    note.updated_at = Some(now);
                }
                Ok(())
            })
        });
    }
}

impl Persistable for Note {
    fn hooks(&mut self) -> &mut SaveHooks<Self> {
        &mut self.hooks
    }

    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }
}

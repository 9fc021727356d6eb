//! Note Repository

use async_trait::async_trait;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use crate::domain::{Note, NoteType};
use crate::error::{PlatformError, Result};
use crate::persistence::mysql::execute;
use crate::persistence::{EntityStore, WriteTarget};
use crate::repository::NoteStore;

const NOTE_COLUMNS: &str =
    "id, users_id, type, remarks, active, created_by, updated_by, created_at, updated_at";

pub struct MySqlNoteRepository {
    pool: MySqlPool,
}

impl MySqlNoteRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                users_id BIGINT UNSIGNED NOT NULL,
                type TINYINT UNSIGNED NOT NULL,
                remarks TEXT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_by BIGINT UNSIGNED NOT NULL,
                updated_by BIGINT UNSIGNED NULL,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL,
                INDEX idx_notes_user_active (users_id, active, id)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn from_row(row: &MySqlRow) -> Result<Note> {
        let note_type = NoteType::try_from(row.try_get::<u8, _>("type")?)?;
        Ok(Note::from_storage(
            row.try_get("id")?,
            row.try_get("users_id")?,
            note_type,
            row.try_get("remarks")?,
            row.try_get("active")?,
            row.try_get("created_by")?,
            row.try_get("updated_by")?,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

#[async_trait]
impl EntityStore<Note> for MySqlNoteRepository {
    async fn insert(&self, note: &mut Note, target: &WriteTarget) -> Result<()> {
        let created_by = note
            .created_by
            .ok_or_else(|| PlatformError::validation("Note author is required"))?;

        let query = sqlx::query(
            "INSERT INTO notes (users_id, type, remarks, active, created_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(note.users_id)
        .bind(note.note_type.code())
        .bind(note.remarks.as_deref())
        .bind(note.active)
        .bind(created_by)
        .bind(note.created_at);

        let result = execute(&self.pool, target, query).await?;
        note.id = Some(result.last_insert_id());
        Ok(())
    }

    async fn update(&self, note: &mut Note, target: &WriteTarget) -> Result<()> {
        let id = note
            .id
            .ok_or_else(|| PlatformError::internal("Cannot update a note that was never stored"))?;

        let query = sqlx::query(
            "UPDATE notes SET type = ?, remarks = ?, active = ?, updated_by = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(note.note_type.code())
        .bind(note.remarks.as_deref())
        .bind(note.active)
        .bind(note.updated_by)
        .bind(note.updated_at)
        .bind(id);

        let result = execute(&self.pool, target, query).await?;
        if result.rows_affected() == 0 {
            return Err(PlatformError::not_found("Note", id));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MySqlNoteRepository {
    async fn find_by_id(&self, id: u64) -> Result<Option<Note>> {
        let row = sqlx::query(&format!("SELECT {} FROM notes WHERE id = ?", NOTE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_active(&self, users_id: u64, offset: u64, limit: u64) -> Result<Vec<Note>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notes WHERE users_id = ? AND active = TRUE ORDER BY id LIMIT ? OFFSET ?",
            NOTE_COLUMNS
        ))
        .bind(users_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }
}

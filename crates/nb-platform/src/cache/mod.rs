//! Note list cache
//!
//! Pages of a user's notes are cached under `notes:{usersId}:{count}:{length}`.
//! Any write to a user's notes evicts every page under `notes:{usersId}:`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::error::Result;

/// Keys requested per `SCAN` round trip
const SCAN_BATCH: usize = 100;

pub fn notes_page_key(users_id: u64, count: u64, length: u64) -> String {
    format!("notes:{}:{}:{}", users_id, count, length)
}

pub fn notes_prefix(users_id: u64) -> String {
    format!("notes:{}:", users_id)
}

#[async_trait]
pub trait NoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    async fn evict_prefix(&self, prefix: &str) -> Result<u64>;
}

fn scan_command(cursor: u64, pattern: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_BATCH);
    cmd
}

#[derive(Clone)]
pub struct RedisNoteCache {
    connection: ConnectionManager,
}

impl RedisNoteCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl NoteCache for RedisNoteCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    /// Walks the keyspace with `SCAN` and deletes each batch as it arrives,
    /// so Redis is never blocked on a full keyspace pass.
    async fn evict_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) =
                scan_command(cursor, &pattern).query_async(&mut conn).await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix, removed, "Evicted cached note pages");
        Ok(removed)
    }
}

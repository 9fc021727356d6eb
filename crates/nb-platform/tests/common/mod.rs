//! In-memory collaborators and an assembled router for integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tower::ServiceExt;

use nb_platform::api::{self, NotesState, UsersState};
use nb_platform::cache::NoteCache;
use nb_platform::domain::{Identity, Note, NoteType, StoredUser, User};
use nb_platform::error::{PlatformError, Result};
use nb_platform::persistence::{
    EntityStore, OpenTransaction, SavePipeline, TransactionContext, TransactionSource, WriteTarget,
};
use nb_platform::repository::{NoteStore, UserStore};
use nb_platform::service::users::EMAIL_TAKEN;
use nb_platform::service::{
    AuthGate, IdentityLookup, ManualClock, NoteService, PasswordService, TokenService, UserService,
};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

// --- Transactions ---

pub struct MemoryTransaction {
    id: usize,
    journal: Journal,
}

#[async_trait]
impl OpenTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.journal.lock().unwrap().push(format!("commit:{}", self.id));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.journal.lock().unwrap().push(format!("rollback:{}", self.id));
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.journal.lock().unwrap().push(format!("savepoint:{}:{}", self.id, name));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.journal.lock().unwrap().push(format!("rollback_to:{}:{}", self.id, name));
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct MemoryTransactionSource {
    pub journal: Journal,
    begun: Mutex<usize>,
}

impl MemoryTransactionSource {
    pub fn begun(&self) -> usize {
        *self.begun.lock().unwrap()
    }
}

#[async_trait]
impl TransactionSource for MemoryTransactionSource {
    async fn begin(&self) -> Result<Box<dyn OpenTransaction>> {
        let id = {
            let mut begun = self.begun.lock().unwrap();
            *begun += 1;
            *begun
        };
        self.journal.lock().unwrap().push(format!("begin:{}", id));
        Ok(Box::new(MemoryTransaction { id, journal: self.journal.clone() }))
    }
}

fn mode(target: &WriteTarget) -> &'static str {
    match target {
        WriteTarget::Transaction(_) => "tx",
        WriteTarget::Pool => "pool",
    }
}

// --- Users ---

#[derive(Clone)]
struct UserRow {
    first_name: String,
    last_name: String,
    email: String,
    contact: String,
    password_hash: String,
    is_first_login: bool,
    active: bool,
    created_by: Option<u64>,
    updated_by: Option<u64>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserRow {
    fn from_user(user: &User) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            contact: user.contact.clone(),
            password_hash: user.password_hash.clone(),
            is_first_login: user.is_first_login,
            active: user.active,
            created_by: user.created_by,
            updated_by: user.updated_by,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    fn to_user(&self, id: u64) -> User {
        User::from_storage(StoredUser {
            id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            contact: self.contact.clone(),
            password_hash: self.password_hash.clone(),
            is_first_login: self.is_first_login,
            active: self.active,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<BTreeMap<u64, UserRow>>,
    pub journal: Journal,
}

impl MemoryUserStore {
    /// Mirrors the unique key on the email of active users.
    fn check_email(rows: &BTreeMap<u64, UserRow>, user: &User, own_id: Option<u64>) -> Result<()> {
        let taken = user.active
            && rows
                .iter()
                .any(|(id, row)| Some(*id) != own_id && row.active && row.email == user.email);
        if taken {
            return Err(PlatformError::conflict(EMAIL_TAKEN));
        }
        Ok(())
    }

    pub fn set_active(&self, id: u64, active: bool) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            row.active = active;
        }
    }

    pub fn get(&self, id: u64) -> Option<User> {
        self.rows.lock().unwrap().get(&id).map(|row| row.to_user(id))
    }
}

#[async_trait]
impl EntityStore<User> for MemoryUserStore {
    async fn insert(&self, user: &mut User, target: &WriteTarget) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        Self::check_email(&rows, user, None)?;
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        rows.insert(id, UserRow::from_user(user));
        user.id = Some(id);
        self.journal.lock().unwrap().push(format!("insert-user:{}", mode(target)));
        Ok(())
    }

    async fn update(&self, user: &mut User, target: &WriteTarget) -> Result<()> {
        let id = user.id.ok_or_else(|| PlatformError::internal("no id"))?;
        let mut rows = self.rows.lock().unwrap();
        Self::check_email(&rows, user, Some(id))?;
        rows.insert(id, UserRow::from_user(user));
        self.journal.lock().unwrap().push(format!("update-user:{}", mode(target)));
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|(_, row)| row.active && row.email == email)
            .map(|(id, row)| row.to_user(*id)))
    }
}

#[async_trait]
impl IdentityLookup for MemoryUserStore {
    async fn find_active_subject(&self, id: u64) -> Result<Option<Identity>> {
        Ok(self.get(id).filter(|u| u.active).and_then(|u| u.identity()))
    }
}

// --- Notes ---

#[derive(Clone)]
struct NoteRow {
    users_id: u64,
    note_type: NoteType,
    remarks: Option<String>,
    active: bool,
    created_by: Option<u64>,
    updated_by: Option<u64>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl NoteRow {
    fn from_note(note: &Note) -> Self {
        Self {
            users_id: note.users_id,
            note_type: note.note_type,
            remarks: note.remarks.clone(),
            active: note.active,
            created_by: note.created_by,
            updated_by: note.updated_by,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }

    fn to_note(&self, id: u64) -> Note {
        Note::from_storage(
            id,
            self.users_id,
            self.note_type,
            self.remarks.clone(),
            self.active,
            self.created_by,
            self.updated_by,
            self.created_at,
            self.updated_at,
        )
    }
}

#[derive(Default)]
pub struct MemoryNoteStore {
    rows: Mutex<BTreeMap<u64, NoteRow>>,
    pub journal: Journal,
}

impl MemoryNoteStore {
    pub fn get(&self, id: u64) -> Option<Note> {
        self.rows.lock().unwrap().get(&id).map(|row| row.to_note(id))
    }

    pub fn count_list_queries(&self) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("list"))
            .count()
    }
}

#[async_trait]
impl EntityStore<Note> for MemoryNoteStore {
    async fn insert(&self, note: &mut Note, target: &WriteTarget) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
        rows.insert(id, NoteRow::from_note(note));
        note.id = Some(id);
        self.journal.lock().unwrap().push(format!("insert-note:{}", mode(target)));
        Ok(())
    }

    async fn update(&self, note: &mut Note, target: &WriteTarget) -> Result<()> {
        let id = note.id.ok_or_else(|| PlatformError::internal("no id"))?;
        self.rows.lock().unwrap().insert(id, NoteRow::from_note(note));
        self.journal.lock().unwrap().push(format!("update-note:{}", mode(target)));
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<Note>> {
        Ok(self.get(id))
    }

    async fn list_active(&self, users_id: u64, offset: u64, limit: u64) -> Result<Vec<Note>> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("list:{}:{}:{}", users_id, offset, limit));
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, row)| row.users_id == users_id && row.active)
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(id, row)| row.to_note(*id))
            .collect())
    }
}

// --- Cache ---

#[derive(Default)]
pub struct MemoryNoteCache {
    entries: Mutex<HashMap<String, (u64, String)>>,
    pub fail_evictions: AtomicBool,
    /// Successful evictions are recorded as `evict:{prefix}`
    pub journal: Journal,
}

impl MemoryNoteCache {
    /// Record evictions into an existing journal, e.g. the transaction one.
    pub fn recording(journal: Journal) -> Self {
        Self { journal, ..Default::default() }
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.entries.lock().unwrap().get(key).map(|(ttl, _)| *ttl)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn put(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (3600, value.to_string()));
    }
}

#[async_trait]
impl NoteCache for MemoryNoteCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).map(|(_, v)| v.clone()))
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (ttl_secs, value.to_string()));
        Ok(())
    }

    async fn evict_prefix(&self, prefix: &str) -> Result<u64> {
        if self.fail_evictions.load(Ordering::SeqCst) {
            return Err(PlatformError::internal("cache unavailable"));
        }
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        self.journal.lock().unwrap().push(format!("evict:{}", prefix));
        Ok((before - entries.len()) as u64)
    }
}

// --- Assembled app ---

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<PasswordService>,
    pub users: Arc<MemoryUserStore>,
    pub notes: Arc<MemoryNoteStore>,
    pub cache: Arc<MemoryNoteCache>,
    pub transactions: Arc<MemoryTransactionSource>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = Arc::new(
            TokenService::new("test-access-secret", "test-refresh-secret", clock.clone()).unwrap(),
        );
        let passwords = Arc::new(PasswordService::new());
        let users = Arc::new(MemoryUserStore::default());
        let notes = Arc::new(MemoryNoteStore::default());
        let transactions = Arc::new(MemoryTransactionSource::default());
        let cache = Arc::new(MemoryNoteCache::recording(transactions.journal.clone()));

        let pipeline = SavePipeline::new(TransactionContext::new(transactions.clone()));
        let gate = Arc::new(AuthGate::new(tokens.clone(), users.clone()));
        let user_service = Arc::new(UserService::new(
            users.clone(),
            tokens.clone(),
            passwords.clone(),
            pipeline.clone(),
        ));
        let note_service = Arc::new(NoteService::new(notes.clone(), cache.clone(), pipeline, 3600));

        let router = api::router(
            gate,
            UsersState { user_service, cookie_secure: false },
            NotesState { note_service },
        );

        Self { router, clock, tokens, passwords, users, notes, cache, transactions }
    }

    /// Store an active user directly and return its id.
    pub async fn seed_user(&self, email: &str, password: &str) -> u64 {
        let hash = self.passwords.hash_password(password).unwrap();
        let mut user = User::new("Ada", "Lovelace", email, "0917000000", hash);
        self.users.insert(&mut user, &WriteTarget::Pool).await.unwrap();
        user.id.unwrap()
    }

    pub fn bearer(&self, user_id: u64) -> String {
        format!("Bearer {}", self.tokens.issue_access(user_id).unwrap())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn delete(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `refreshToken` Set-Cookie header, if any.
pub fn refresh_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refreshToken="))
        .map(|v| v.to_string())
}

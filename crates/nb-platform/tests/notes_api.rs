mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;

use common::{
    body_json, delete, entries, get, json, MemoryNoteCache, MemoryNoteStore,
    MemoryTransactionSource, TestApp,
};
use nb_platform::cache::{notes_page_key, NoteCache};
use nb_platform::domain::Identity;
use nb_platform::error::Result;
use nb_platform::persistence::{SavePipeline, TransactionContext};
use nb_platform::service::{NoteInput, NoteService};

async fn create(app: &TestApp, user_id: u64, bearer: &str, remarks: &str) -> u64 {
    let response = app
        .send(json(
            "POST",
            &format!("/users/{}/notes", user_id),
            Some(bearer),
            json!({"type": 1, "remarks": remarks}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_u64().unwrap()
}

#[tokio::test]
async fn test_create_note_is_stamped_and_atomic() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);

    let response = app
        .send(json(
            "POST",
            &format!("/users/{}/notes", id),
            Some(&bearer),
            json!({"type": 2, "remarks": "groceries"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["type"], 2);
    assert_eq!(body["usersId"], id);
    assert_eq!(body["createdBy"], id);
    assert!(body["createdAt"].is_string());

    // Pipeline-owned transaction wraps the insert and the eviction hook,
    // and the pages are evicted again once the insert is visible
    let evict = format!("evict:notes:{}:", id);
    assert_eq!(entries(&app.notes.journal), vec!["insert-note:tx"]);
    assert_eq!(
        entries(&app.transactions.journal),
        vec!["begin:1".to_string(), evict.clone(), "commit:1".to_string(), evict]
    );
}

#[tokio::test]
async fn test_create_note_validation() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    let uri = format!("/users/{}/notes", id);

    let cases = [
        (json!({"remarks": "x"}), "Note type cannot be empty!"),
        (json!({"type": 1}), "Remarks cannot be empty!"),
        (json!({"type": 7, "remarks": "x"}), "Invalid note type!"),
    ];
    for (payload, message) in cases {
        let response = app.send(json("POST", &uri, Some(&bearer), payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], message);
    }
    assert!(entries(&app.transactions.journal).is_empty());
}

#[tokio::test]
async fn test_list_pages_and_load_more() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    for n in 0..3 {
        create(&app, id, &bearer, &format!("note {}", n)).await;
    }

    let response = app
        .send(get(&format!("/users/{}/notes?count=1&length=2", id), Some(&bearer)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["notes"].as_array().unwrap().len(), 2);
    assert_eq!(body["loadMore"], true);

    let response = app
        .send(get(&format!("/users/{}/notes?count=2&length=2", id), Some(&bearer)))
        .await;
    let body = body_json(response).await;
    assert_eq!(body["notes"].as_array().unwrap().len(), 1);
    assert_eq!(body["notes"][0]["remarks"], "note 2");
    assert_eq!(body["loadMore"], false);
}

#[tokio::test]
async fn test_list_is_cached_and_overwrite_bypasses_read() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    for n in 0..3 {
        create(&app, id, &bearer, &format!("note {}", n)).await;
    }
    let uri = format!("/users/{}/notes?count=1&length=2", id);

    let first = body_json(app.send(get(&uri, Some(&bearer))).await).await;
    let key = format!("notes:{}:1:2", id);
    assert_eq!(app.cache.ttl(&key), Some(3600));
    assert_eq!(app.notes.count_list_queries(), 1);

    // Served from cache, loadMore preserved
    let second = body_json(app.send(get(&uri, Some(&bearer))).await).await;
    assert_eq!(first, second);
    assert_eq!(app.notes.count_list_queries(), 1);

    let response = app
        .send(get(&format!("{}&overwrite=1", uri), Some(&bearer)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.notes.count_list_queries(), 2);
}

#[tokio::test]
async fn test_writes_evict_cached_pages() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    let note_id = create(&app, id, &bearer, "first").await;

    app.send(get(&format!("/users/{}/notes", id), Some(&bearer))).await;
    let key = format!("notes:{}:1:10", id);
    assert!(app.cache.contains(&key));

    let response = app
        .send(json(
            "PATCH",
            &format!("/users/{}/notes/{}", id, note_id),
            Some(&bearer),
            json!({"type": 2, "remarks": "revised"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["remarks"], "revised");
    assert_eq!(body["updatedBy"], id);
    assert!(!app.cache.contains(&key));
}

#[tokio::test]
async fn test_failed_eviction_rolls_back_the_save() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    app.cache.fail_evictions.store(true, Ordering::SeqCst);

    let response = app
        .send(json(
            "POST",
            &format!("/users/{}/notes", id),
            Some(&bearer),
            json!({"type": 1, "remarks": "lost"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(entries(&app.transactions.journal), vec!["begin:1", "rollback:1"]);
}

#[tokio::test]
async fn test_soft_delete_hides_note() {
    let app = TestApp::new();
    let id = app.seed_user("ada@example.com", "pw").await;
    let bearer = app.bearer(id);
    let note_id = create(&app, id, &bearer, "temporary").await;
    let uri = format!("/users/{}/notes/{}", id, note_id);

    let response = app.send(delete(&uri, Some(&bearer))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.notes.get(note_id).unwrap();
    assert!(!stored.active);
    assert_eq!(stored.updated_by, Some(id));

    let body = body_json(app.send(get(&format!("/users/{}/notes", id), Some(&bearer))).await).await;
    assert!(body["notes"].as_array().unwrap().is_empty());

    let response = app.send(delete(&uri, Some(&bearer))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_users_notes_are_off_limits() {
    let app = TestApp::new();
    let ada = app.seed_user("ada@example.com", "pw").await;
    let eve = app.seed_user("eve@example.com", "pw").await;
    let ada_bearer = app.bearer(ada);
    let eve_bearer = app.bearer(eve);
    let note_id = create(&app, ada, &ada_bearer, "private").await;

    let response = app.send(get(&format!("/users/{}/notes", ada), Some(&eve_bearer))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Eve's own path, Ada's note id
    let response = app
        .send(json(
            "PATCH",
            &format!("/users/{}/notes/{}", eve, note_id),
            Some(&eve_bearer),
            json!({"type": 1, "remarks": "mine now"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.notes.get(note_id).unwrap().remarks.as_deref(), Some("private"));
}

/// Re-caches a pre-write page right after the first eviction, the way a
/// concurrent `list` reading from the pool would before the commit lands.
struct InterleavedReader {
    inner: Arc<MemoryNoteCache>,
    stale_key: String,
    raced: AtomicBool,
}

#[async_trait]
impl NoteCache for InterleavedReader {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        self.inner.set_with_expiry(key, ttl_secs, value).await
    }

    async fn evict_prefix(&self, prefix: &str) -> Result<u64> {
        let removed = self.inner.evict_prefix(prefix).await?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.put(&self.stale_key, r#"{"notes":[],"loadMore":false}"#);
        }
        Ok(removed)
    }
}

#[tokio::test]
async fn test_page_cached_before_commit_is_evicted_after_commit() {
    let transactions = Arc::new(MemoryTransactionSource::default());
    let inner = Arc::new(MemoryNoteCache::recording(transactions.journal.clone()));
    let stale_key = notes_page_key(5, 1, 10);
    let cache = Arc::new(InterleavedReader {
        inner: inner.clone(),
        stale_key: stale_key.clone(),
        raced: AtomicBool::new(false),
    });
    let service = NoteService::new(
        Arc::new(MemoryNoteStore::default()),
        cache,
        SavePipeline::new(TransactionContext::new(transactions.clone())),
        3600,
    );
    let caller = Identity { id: 5, first_name: "Ada".into(), last_name: "Lovelace".into() };

    let created = TransactionContext::scope(service.create(
        &caller,
        5,
        NoteInput { note_type: Some(1), remarks: Some("fresh".into()) },
    ))
    .await;

    assert!(created.is_ok());
    assert!(!inner.contains(&stale_key));

    let journal = entries(&transactions.journal);
    let commit = journal.iter().position(|e| e == "commit:1").unwrap();
    let last_evict = journal.iter().rposition(|e| e == "evict:notes:5:").unwrap();
    assert!(last_evict > commit, "journal = {:?}", journal);
}

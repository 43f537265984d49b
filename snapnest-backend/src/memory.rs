//! An in-process stand-in for the hosted backend.
//!
//! Documents, files, accounts and the session live in memory. Tests can make
//! the next call of an operation fail and count how often each operation ran.

use crate::{
    error::{BackendError, ErrorReason, Result},
    service::{
        AccountRecord, Accounts, CREATED_AT_ATTRIBUTE, Collection, DEFAULT_LIST_LIMIT, Databases,
        Document, DocumentList, FileRecord, ID_ATTRIBUTE, ListQuery, Permission, SessionRecord,
        Storage, UPDATED_AT_ATTRIBUTE,
    },
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use snapnest_common::model::file::NewFile;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use url::Url;

const SESSION_LIFETIME: Duration = Duration::days(365);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Operation {
    CreateDocument(Collection),
    GetDocument(Collection),
    UpdateDocument(Collection),
    DeleteDocument(Collection),
    ListDocuments(Collection),
    CreateFile,
    DeleteFile,
    CreateAccount,
    CreateSession,
    GetAccount,
    DeleteSession,
}

#[derive(Clone, Debug)]
struct StoredDocument {
    sequence: u64,
    document: Document,
}

#[derive(Clone, Debug)]
struct StoredFile {
    record: FileRecord,
    permissions: Vec<Permission>,
    bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
struct StoredAccount {
    record: AccountRecord,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<Collection, Vec<StoredDocument>>,
    files: HashMap<String, StoredFile>,
    accounts: Vec<StoredAccount>,
    session: Option<SessionRecord>,
    next_sequence: u64,
    last_timestamp: Option<OffsetDateTime>,
    faults: Vec<(Operation, ErrorReason)>,
    calls: HashMap<Operation, usize>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    base_url: Url,
    state: Mutex<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: Url::parse("memory://snapnest/v1/").expect("Static URL is valid"),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Makes the next call of `operation` fail with `reason`. Queued faults for
    /// the same operation fire in order.
    pub fn fail_next(&self, operation: Operation, reason: ErrorReason) {
        self.lock().faults.push((operation, reason));
    }

    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn document_count(&self, collection: Collection) -> usize {
        self.lock().collections.get(&collection).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn document(&self, collection: Collection, document_id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(&collection)?
            .iter()
            .find(|stored| stored.document.id == document_id)
            .map(|stored| stored.document.clone())
    }

    #[must_use]
    pub fn has_file(&self, file_id: &str) -> bool {
        self.lock().files.contains_key(file_id)
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    #[must_use]
    pub fn file_bytes(&self, file_id: &str) -> Option<Vec<u8>> {
        self.lock().files.get(file_id).map(|file| file.bytes.clone())
    }

    #[must_use]
    pub fn file_permissions(&self, file_id: &str) -> Option<Vec<Permission>> {
        self.lock()
            .files
            .get(file_id)
            .map(|file| file.permissions.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and fires a queued fault, if any.
    fn enter(&self, operation: Operation) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;

        if let Some(position) = state.faults.iter().position(|(op, _)| *op == operation) {
            let (_, reason) = state.faults.remove(position);
            debug!(?operation, ?reason, "Injected backend fault");
            return Err(simulated_error(reason, operation));
        }
        Ok(state)
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

impl MemoryState {
    /// Strictly increasing, so ordering by timestamp never ties.
    fn tick(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn documents(&mut self, collection: Collection) -> &mut Vec<StoredDocument> {
        self.collections.entry(collection).or_default()
    }
}

fn simulated_error(reason: ErrorReason, operation: Operation) -> BackendError {
    let message = format!("simulated failure of {operation:?}");
    match reason {
        ErrorReason::NotFound => BackendError::NotFound(message),
        ErrorReason::Unauthenticated => BackendError::Unauthenticated(message),
        ErrorReason::PermissionDenied => BackendError::PermissionDenied(message),
        ErrorReason::Conflict => BackendError::Conflict(message),
        ErrorReason::InvalidInput | ErrorReason::InvalidData => BackendError::InvalidInput(message),
        ErrorReason::Unavailable => BackendError::Unavailable(message),
        ErrorReason::MissingIdentifier => BackendError::MissingIdentifier("simulated identifier"),
    }
}

fn not_found(collection: Collection, document_id: &str) -> BackendError {
    BackendError::NotFound(format!("{collection} document {document_id}"))
}

fn attribute(document: &Document, name: &str) -> Option<Value> {
    let format_time = |time: OffsetDateTime| Value::String(time.to_string());
    match name {
        ID_ATTRIBUTE => Some(Value::String(document.id.clone())),
        CREATED_AT_ATTRIBUTE => Some(format_time(document.created_at)),
        UPDATED_AT_ATTRIBUTE => Some(format_time(document.updated_at)),
        _ => document.data.get(name).cloned(),
    }
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(text) => text == expected,
        Value::Number(number) => number.to_string() == expected,
        Value::Bool(flag) => flag.to_string() == expected,
        _ => false,
    }
}

fn matches(document: &Document, query: &ListQuery) -> bool {
    match query {
        ListQuery::Equal { attribute: name, values } => attribute(document, name)
            .is_some_and(|value| values.iter().any(|expected| value_matches(&value, expected))),
        ListQuery::Contains { attribute: name, values } => match attribute(document, name) {
            Some(Value::Array(items)) => values
                .iter()
                .any(|expected| items.iter().any(|item| value_matches(item, expected))),
            Some(Value::String(text)) => values.iter().any(|expected| text.contains(expected)),
            _ => false,
        },
        ListQuery::Search { attribute: name, term } => match attribute(document, name) {
            Some(Value::String(text)) => text.to_lowercase().contains(&term.to_lowercase()),
            _ => false,
        },
        ListQuery::OrderAsc(_)
        | ListQuery::OrderDesc(_)
        | ListQuery::Limit(_)
        | ListQuery::CursorAfter(_) => true,
    }
}

fn compare_attribute(a: &StoredDocument, b: &StoredDocument, name: &str) -> Ordering {
    match name {
        CREATED_AT_ATTRIBUTE => a.document.created_at.cmp(&b.document.created_at),
        UPDATED_AT_ATTRIBUTE => a.document.updated_at.cmp(&b.document.updated_at),
        _ => match (attribute(&a.document, name), attribute(&b.document, name)) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            _ => Ordering::Equal,
        },
    }
}

/// Orders by the list's order queries, then by insertion.
fn compare(a: &StoredDocument, b: &StoredDocument, queries: &[ListQuery]) -> Ordering {
    queries
        .iter()
        .filter_map(|query| match query {
            ListQuery::OrderAsc(name) => Some(compare_attribute(a, b, name)),
            ListQuery::OrderDesc(name) => Some(compare_attribute(a, b, name).reverse()),
            _ => None,
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| a.sequence.cmp(&b.sequence))
}

#[async_trait]
impl Databases for MemoryBackend {
    async fn create_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document> {
        let mut state = self.enter(Operation::CreateDocument(collection))?;

        if state
            .documents(collection)
            .iter()
            .any(|stored| stored.document.id == document_id)
        {
            return Err(BackendError::Conflict(format!(
                "{collection} document {document_id} already exists"
            )));
        }

        let now = state.tick();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let document = Document {
            id: document_id.to_owned(),
            created_at: now,
            updated_at: now,
            data,
        };
        state.documents(collection).push(StoredDocument {
            sequence,
            document: document.clone(),
        });

        Ok(document)
    }

    async fn get_document(&self, collection: Collection, document_id: &str) -> Result<Document> {
        let mut state = self.enter(Operation::GetDocument(collection))?;

        state
            .documents(collection)
            .iter()
            .find(|stored| stored.document.id == document_id)
            .map(|stored| stored.document.clone())
            .ok_or_else(|| not_found(collection, document_id))
    }

    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document> {
        let mut state = self.enter(Operation::UpdateDocument(collection))?;
        let now = state.tick();

        let stored = state
            .documents(collection)
            .iter_mut()
            .find(|stored| stored.document.id == document_id)
            .ok_or_else(|| not_found(collection, document_id))?;

        stored.document.data.extend(data);
        stored.document.updated_at = now;
        Ok(stored.document.clone())
    }

    async fn delete_document(&self, collection: Collection, document_id: &str) -> Result<()> {
        let mut state = self.enter(Operation::DeleteDocument(collection))?;

        let documents = state.documents(collection);
        let position = documents
            .iter()
            .position(|stored| stored.document.id == document_id)
            .ok_or_else(|| not_found(collection, document_id))?;
        documents.remove(position);
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[ListQuery],
    ) -> Result<DocumentList> {
        let mut state = self.enter(Operation::ListDocuments(collection))?;
        let documents = state.documents(collection);

        let mut selected: Vec<&StoredDocument> = documents
            .iter()
            .filter(|stored| queries.iter().all(|query| matches(&stored.document, query)))
            .collect();
        selected.sort_by(|a, b| compare(a, b, queries));
        let total = selected.len() as u64;

        let cursor = queries.iter().rev().find_map(|query| match query {
            ListQuery::CursorAfter(id) => Some(id),
            _ => None,
        });
        if let Some(cursor_id) = cursor {
            let cursor_document = documents
                .iter()
                .find(|stored| &stored.document.id == cursor_id)
                .ok_or_else(|| {
                    BackendError::InvalidInput(format!(
                        "cursor document {cursor_id} not found in {collection}"
                    ))
                })?;
            selected.retain(|stored| compare(stored, cursor_document, queries).is_gt());
        }

        let limit = queries
            .iter()
            .rev()
            .find_map(|query| match query {
                ListQuery::Limit(limit) => Some(*limit),
                _ => None,
            })
            .unwrap_or(DEFAULT_LIST_LIMIT);

        Ok(DocumentList {
            total,
            documents: selected
                .into_iter()
                .take(limit as usize)
                .map(|stored| stored.document.clone())
                .collect(),
        })
    }
}

#[async_trait]
impl Storage for MemoryBackend {
    async fn create_file(
        &self,
        file_id: &str,
        file: NewFile,
        permissions: &[Permission],
    ) -> Result<FileRecord> {
        let mut state = self.enter(Operation::CreateFile)?;

        if state.files.contains_key(file_id) {
            return Err(BackendError::Conflict(format!("file {file_id} already exists")));
        }

        let record = FileRecord {
            id: file_id.to_owned(),
            name: file.name,
            mime_type: file.mime_type,
            size_original: file.bytes.len() as u64,
        };
        state.files.insert(
            file_id.to_owned(),
            StoredFile {
                record: record.clone(),
                permissions: permissions.to_vec(),
                bytes: file.bytes,
            },
        );
        Ok(record)
    }

    fn file_view_url(&self, file_id: &str) -> Result<Url> {
        self.url(&format!("storage/files/{file_id}/view"))
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut state = self.enter(Operation::DeleteFile)?;

        state
            .files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("file {file_id}")))
    }
}

#[async_trait]
impl Accounts for MemoryBackend {
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountRecord> {
        let mut state = self.enter(Operation::CreateAccount)?;

        if state
            .accounts
            .iter()
            .any(|account| account.record.id == account_id || account.record.email == email)
        {
            return Err(BackendError::Conflict(format!(
                "an account for {email} already exists"
            )));
        }

        let record = AccountRecord {
            id: account_id.to_owned(),
            name: name.to_owned(),
            email: email.to_owned(),
        };
        state.accounts.push(StoredAccount {
            record: record.clone(),
            password: password.to_owned(),
        });
        Ok(record)
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord> {
        let mut state = self.enter(Operation::CreateSession)?;

        let account_id = state
            .accounts
            .iter()
            .find(|account| account.record.email == email && account.password == password)
            .map(|account| account.record.id.clone())
            .ok_or_else(|| BackendError::Unauthenticated("invalid credentials".to_owned()))?;

        let now = state.tick();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let session = SessionRecord {
            id: format!("session-{sequence}"),
            user_id: account_id,
            expire: now + SESSION_LIFETIME,
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn get_account(&self) -> Result<AccountRecord> {
        let state = self.enter(Operation::GetAccount)?;

        let session = state
            .session
            .as_ref()
            .ok_or_else(|| BackendError::Unauthenticated("no active session".to_owned()))?;
        state
            .accounts
            .iter()
            .find(|account| account.record.id == session.user_id)
            .map(|account| account.record.clone())
            .ok_or_else(|| BackendError::NotFound(format!("account {}", session.user_id)))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut state = self.enter(Operation::DeleteSession)?;

        let is_current = match &state.session {
            Some(session) => session_id == "current" || session.id == session_id,
            None => return Err(BackendError::Unauthenticated("no active session".to_owned())),
        };
        if !is_current {
            return Err(BackendError::NotFound(format!("session {session_id}")));
        }

        state.session = None;
        Ok(())
    }

    fn avatar_initials_url(&self, name: &str) -> Result<Url> {
        let mut url = self.url("avatars/initials")?;
        url.query_pairs_mut().append_pair("name", name);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ErrorReason,
        memory::{MemoryBackend, Operation},
        service::{Accounts, Collection, Databases, ListQuery, Storage, UPDATED_AT_ATTRIBUTE},
    };
    use serde_json::{Map, Value, json};
    use snapnest_common::model::file::NewFile;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    async fn seed_posts(backend: &MemoryBackend, count: usize) {
        for index in 0..count {
            backend
                .create_document(
                    Collection::Posts,
                    &index.to_string(),
                    data(json!({ "caption": format!("post {index}") })),
                )
                .await
                .unwrap();
        }
    }

    fn ids(list: &crate::service::DocumentList) -> Vec<&str> {
        list.documents.iter().map(|doc| doc.id.as_str()).collect()
    }

    #[tokio::test]
    async fn lists_newest_first_with_cursor() {
        let backend = MemoryBackend::new();
        seed_posts(&backend, 5).await;

        let first = backend
            .list_documents(
                Collection::Posts,
                &[ListQuery::order_desc(UPDATED_AT_ATTRIBUTE), ListQuery::Limit(2)],
            )
            .await
            .unwrap();
        assert_eq!(ids(&first), ["4", "3"]);
        assert_eq!(first.total, 5);

        let second = backend
            .list_documents(
                Collection::Posts,
                &[
                    ListQuery::order_desc(UPDATED_AT_ATTRIBUTE),
                    ListQuery::Limit(2),
                    ListQuery::cursor_after("3"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids(&second), ["2", "1"]);
    }

    #[tokio::test]
    async fn unknown_cursor_is_invalid_input() {
        let backend = MemoryBackend::new();
        seed_posts(&backend, 1).await;

        let err = backend
            .list_documents(Collection::Posts, &[ListQuery::cursor_after("999")])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), ErrorReason::InvalidInput);
    }

    #[tokio::test]
    async fn updates_merge_and_bump_updated_at() {
        let backend = MemoryBackend::new();
        seed_posts(&backend, 2).await;

        let updated = backend
            .update_document(Collection::Posts, "0", data(json!({ "location": "Lisbon" })))
            .await
            .unwrap();
        assert_eq!(updated.data["caption"], "post 0");
        assert_eq!(updated.data["location"], "Lisbon");
        assert!(updated.updated_at > updated.created_at);

        let newest = backend
            .list_documents(
                Collection::Posts,
                &[ListQuery::order_desc(UPDATED_AT_ATTRIBUTE), ListQuery::Limit(1)],
            )
            .await
            .unwrap();
        assert_eq!(ids(&newest), ["0"]);
    }

    #[tokio::test]
    async fn search_and_contains_filters() {
        let backend = MemoryBackend::new();
        backend
            .create_document(
                Collection::Posts,
                "1",
                data(json!({ "caption": "Sunset at the pier", "likes": ["7"] })),
            )
            .await
            .unwrap();
        backend
            .create_document(
                Collection::Posts,
                "2",
                data(json!({ "caption": "Morning fog", "likes": [] })),
            )
            .await
            .unwrap();

        let found = backend
            .list_documents(Collection::Posts, &[ListQuery::search("caption", "sunset")])
            .await
            .unwrap();
        assert_eq!(ids(&found), ["1"]);

        let liked = backend
            .list_documents(Collection::Posts, &[ListQuery::contains("likes", 7)])
            .await
            .unwrap();
        assert_eq!(ids(&liked), ["1"]);
    }

    #[tokio::test]
    async fn faults_fire_once_and_calls_are_counted() {
        let backend = MemoryBackend::new();
        backend.fail_next(Operation::CreateFile, ErrorReason::Unavailable);

        let file = NewFile {
            name: "a.png".to_owned(),
            mime_type: "image/png".to_owned(),
            bytes: vec![1, 2, 3],
        };
        let err = backend.create_file("1", file.clone(), &[]).await.unwrap_err();
        assert_eq!(err.reason(), ErrorReason::Unavailable);
        assert!(!backend.has_file("1"));

        backend.create_file("1", file, &[]).await.unwrap();
        assert!(backend.has_file("1"));
        assert_eq!(backend.calls(Operation::CreateFile), 2);
    }

    #[tokio::test]
    async fn sessions_gate_the_current_account() {
        let backend = MemoryBackend::new();
        backend
            .create_account("1", "mira@example.com", "secret-pass", "Mira")
            .await
            .unwrap();

        assert_eq!(
            backend.get_account().await.unwrap_err().reason(),
            ErrorReason::Unauthenticated
        );
        assert_eq!(
            backend
                .create_email_password_session("mira@example.com", "wrong")
                .await
                .unwrap_err()
                .reason(),
            ErrorReason::Unauthenticated
        );

        let session = backend
            .create_email_password_session("mira@example.com", "secret-pass")
            .await
            .unwrap();
        assert_eq!(session.user_id, "1");
        assert_eq!(backend.get_account().await.unwrap().name, "Mira");

        backend.delete_session("current").await.unwrap();
        assert!(backend.get_account().await.is_err());
    }
}

//! The hosted backend over its REST API.

use crate::{
    config::BackendConfig,
    error::{BackendError, Result},
    service::{
        AccountRecord, Accounts, Collection, Databases, Document, DocumentList, FileRecord,
        ListQuery, Permission, SessionRecord, Storage,
    },
};
use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{HeaderMap, HeaderValue},
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use snapnest_common::model::file::NewFile;
use tracing::{debug, warn};
use url::Url;

const PROJECT_HEADER: &str = "x-appwrite-project";
const USER_UNAUTHORIZED: &str = "user_unauthorized";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// The client keeps the session cookie, so one `HttpBackend` is one
    /// signed-in client.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let project = HeaderValue::from_str(&config.project_id)
            .map_err(|err| BackendError::InvalidInput(format!("project id: {err}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(PROJECT_HEADER, project);

        let client = Client::builder()
            .user_agent(concat!("snapnest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, config })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn collection_id(&self, collection: Collection) -> &str {
        match collection {
            Collection::Users => &self.config.user_collection_id,
            Collection::Posts => &self.config.post_collection_id,
            Collection::Saves => &self.config.saves_collection_id,
        }
    }

    fn documents_url(&self, collection: Collection, document_id: Option<&str>) -> Result<Url> {
        let mut segments = vec![
            "databases",
            self.config.database_id.as_str(),
            "collections",
            self.collection_id(collection),
            "documents",
        ];
        segments.extend(document_id);
        self.url(segments)
    }

    fn files_url(&self, file_id: Option<&str>) -> Result<Url> {
        let mut segments = vec!["storage", "buckets", self.config.storage_id.as_str(), "files"];
        segments.extend(file_id);
        self.url(segments)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(request: RequestBuilder) -> Result<()> {
        check(request.send().await?).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (message, kind) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.message, body.kind),
        Err(_) => (text, String::new()),
    };

    debug!(%status, %kind, %message, "Backend replied with error");
    Err(error_for_status(status, &kind, message))
}

fn error_for_status(status: StatusCode, kind: &str, message: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED if kind == USER_UNAUTHORIZED => {
            BackendError::PermissionDenied(message)
        }
        StatusCode::UNAUTHORIZED => BackendError::Unauthenticated(message),
        StatusCode::FORBIDDEN => BackendError::PermissionDenied(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::CONFLICT => BackendError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::Unavailable(message),
        status if status.is_server_error() => {
            warn!(%status, %message, "Backend unavailable");
            BackendError::Unavailable(message)
        }
        _ => BackendError::InvalidInput(message),
    }
}

#[async_trait]
impl Databases for HttpBackend {
    async fn create_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document> {
        let url = self.documents_url(collection, None)?;
        let body = json!({ "documentId": document_id, "data": data });
        Self::send(self.client.post(url).json(&body)).await
    }

    async fn get_document(&self, collection: Collection, document_id: &str) -> Result<Document> {
        let url = self.documents_url(collection, Some(document_id))?;
        Self::send(self.client.get(url)).await
    }

    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document> {
        let url = self.documents_url(collection, Some(document_id))?;
        Self::send(self.client.patch(url).json(&json!({ "data": data }))).await
    }

    async fn delete_document(&self, collection: Collection, document_id: &str) -> Result<()> {
        let url = self.documents_url(collection, Some(document_id))?;
        Self::send_empty(self.client.delete(url)).await
    }

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[ListQuery],
    ) -> Result<DocumentList> {
        let url = self.documents_url(collection, None)?;
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|query| ("queries[]", query.to_json().to_string()))
            .collect();
        Self::send(self.client.get(url).query(&params)).await
    }
}

#[async_trait]
impl Storage for HttpBackend {
    async fn create_file(
        &self,
        file_id: &str,
        file: NewFile,
        permissions: &[Permission],
    ) -> Result<FileRecord> {
        let url = self.files_url(None)?;
        let part = Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime_type)?;

        let mut form = Form::new()
            .text("fileId", file_id.to_owned())
            .part("file", part);
        for permission in permissions {
            form = form.text("permissions[]", permission.to_string());
        }

        Self::send(self.client.post(url).multipart(form)).await
    }

    fn file_view_url(&self, file_id: &str) -> Result<Url> {
        let mut url = self.url([
            "storage",
            "buckets",
            self.config.storage_id.as_str(),
            "files",
            file_id,
            "view",
        ])?;
        url.query_pairs_mut()
            .append_pair("project", &self.config.project_id);
        Ok(url)
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let url = self.files_url(Some(file_id))?;
        Self::send_empty(self.client.delete(url)).await
    }
}

#[async_trait]
impl Accounts for HttpBackend {
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountRecord> {
        let url = self.url(["account"])?;
        let body = json!({
            "userId": account_id,
            "email": email,
            "password": password,
            "name": name,
        });
        Self::send(self.client.post(url).json(&body)).await
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord> {
        let url = self.url(["account", "sessions", "email"])?;
        let body = json!({ "email": email, "password": password });
        Self::send(self.client.post(url).json(&body)).await
    }

    async fn get_account(&self) -> Result<AccountRecord> {
        let url = self.url(["account"])?;
        Self::send(self.client.get(url)).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.url(["account", "sessions", session_id])?;
        Self::send_empty(self.client.delete(url)).await
    }

    fn avatar_initials_url(&self, name: &str) -> Result<Url> {
        let mut url = self.url(["avatars", "initials"])?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("project", &self.config.project_id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::BackendConfig,
        error::ErrorReason,
        http::HttpBackend,
        service::{Accounts, Collection, Databases, ListQuery, Storage},
    };
    use httpmock::prelude::*;
    use serde_json::json;
    use url::Url;

    fn config(endpoint: &str) -> BackendConfig {
        BackendConfig {
            endpoint: Url::parse(endpoint).unwrap(),
            project_id: "snapnest".to_owned(),
            database_id: "main".to_owned(),
            user_collection_id: "users".to_owned(),
            post_collection_id: "posts".to_owned(),
            saves_collection_id: "saves".to_owned(),
            storage_id: "images".to_owned(),
            request_timeout_secs: 5,
        }
    }

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(config(&server.url("/v1"))).unwrap()
    }

    #[test]
    fn public_urls_carry_the_project() {
        let backend = HttpBackend::new(config("https://backend.test/v1")).unwrap();

        assert_eq!(
            backend.file_view_url("7").unwrap().as_str(),
            "https://backend.test/v1/storage/buckets/images/files/7/view?project=snapnest"
        );
        assert_eq!(
            backend.avatar_initials_url("Mira Kova").unwrap().as_str(),
            "https://backend.test/v1/avatars/initials?name=Mira+Kova&project=snapnest"
        );
    }

    #[tokio::test]
    async fn list_sends_json_queries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/databases/main/collections/posts/documents")
                    .header("x-appwrite-project", "snapnest")
                    .query_param_exists("queries[]");
                then.status(200).json_body(json!({
                    "total": 1,
                    "documents": [{
                        "$id": "12",
                        "$createdAt": "2025-03-01T10:00:00.000+00:00",
                        "$updatedAt": "2025-03-01T10:00:00.000+00:00",
                        "$collectionId": "posts",
                        "caption": "hello",
                    }],
                }));
            })
            .await;

        let list = backend(&server)
            .list_documents(
                Collection::Posts,
                &[ListQuery::order_desc("$createdAt"), ListQuery::Limit(20)],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(list.total, 1);
        assert_eq!(list.documents[0].id, "12");
        assert_eq!(list.documents[0].data["caption"], "hello");
    }

    #[tokio::test]
    async fn create_wraps_data_with_the_document_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/databases/main/collections/saves/documents")
                    .json_body(json!({
                        "documentId": "31",
                        "data": { "user": "1", "post": "2" },
                    }));
                then.status(201).json_body(json!({
                    "$id": "31",
                    "$createdAt": "2025-03-01T10:00:00.000+00:00",
                    "$updatedAt": "2025-03-01T10:00:00.000+00:00",
                    "user": "1",
                    "post": "2",
                }));
            })
            .await;

        let data = json!({ "user": "1", "post": "2" })
            .as_object()
            .unwrap()
            .clone();
        let document = backend(&server)
            .create_document(Collection::Saves, "31", data)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(document.id, "31");
    }

    #[tokio::test]
    async fn deletes_accept_empty_replies() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/v1/storage/buckets/images/files/9");
                then.status(204);
            })
            .await;

        backend(&server).delete_file("9").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_replies_map_to_reasons() {
        let cases = [
            (404, "document_not_found", ErrorReason::NotFound),
            (401, "general_unauthorized_scope", ErrorReason::Unauthenticated),
            (401, "user_unauthorized", ErrorReason::PermissionDenied),
            (409, "document_already_exists", ErrorReason::Conflict),
            (400, "general_query_invalid", ErrorReason::InvalidInput),
            (429, "general_rate_limit_exceeded", ErrorReason::Unavailable),
            (503, "general_server_error", ErrorReason::Unavailable),
        ];

        for (status, kind, reason) in cases {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/v1/account");
                    then.status(status).json_body(json!({
                        "message": "nope",
                        "code": status,
                        "type": kind,
                    }));
                })
                .await;

            let err = backend(&server).get_account().await.unwrap_err();
            assert_eq!(err.reason(), reason, "status {status} type {kind}");
        }
    }

    #[tokio::test]
    async fn unparseable_error_bodies_keep_the_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/account");
                then.status(502).body("Bad Gateway");
            })
            .await;

        let err = backend(&server).get_account().await.unwrap_err();
        assert_eq!(err.reason(), ErrorReason::Unavailable);
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn sign_in_posts_credentials() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/account/sessions/email")
                    .json_body(json!({ "email": "mira@example.com", "password": "secret-pass" }));
                then.status(201).json_body(json!({
                    "$id": "s1",
                    "userId": "100",
                    "expire": "2026-03-01T10:00:00.000+00:00",
                }));
            })
            .await;

        let session = backend(&server)
            .create_email_password_session("mira@example.com", "secret-pass")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(session.user_id, "100");
    }

    #[tokio::test]
    async fn invalid_payloads_are_invalid_data() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/databases/main/collections/users/documents/4");
                then.status(200).json_body(json!({ "unexpected": true }));
            })
            .await;

        let err = backend(&server)
            .get_document(Collection::Users, "4")
            .await
            .unwrap_err();
        assert_eq!(err.reason(), ErrorReason::InvalidData);
    }
}

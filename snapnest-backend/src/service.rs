//! The hosted backend as the client sees it: a document database, a file
//! bucket and an account/session service. `BackendClient` only talks to these
//! traits, so the HTTP backend and the in-memory backend are interchangeable.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use snapnest_common::model::file::NewFile;
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;
use url::Url;

pub const ID_ATTRIBUTE: &str = "$id";
pub const CREATED_AT_ATTRIBUTE: &str = "$createdAt";
pub const UPDATED_AT_ATTRIBUTE: &str = "$updatedAt";

/// The backend's default page size when a list carries no limit.
pub const DEFAULT_LIST_LIMIT: u32 = 25;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Collection {
    Users,
    Posts,
    Saves,
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Collection::Users => "users",
            Collection::Posts => "posts",
            Collection::Saves => "saves",
        };
        f.write_str(name)
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "$updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Decodes the whole document, metadata included, into a record type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct DocumentList {
    pub total: u64,
    pub documents: Vec<Document>,
}

/// List parameters understood by the document database.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum ListQuery {
    Equal { attribute: String, values: Vec<String> },
    Contains { attribute: String, values: Vec<String> },
    Search { attribute: String, term: String },
    OrderAsc(String),
    OrderDesc(String),
    Limit(u32),
    CursorAfter(String),
}

impl ListQuery {
    pub fn equal(attribute: &str, value: impl ToString) -> Self {
        ListQuery::Equal {
            attribute: attribute.to_owned(),
            values: vec![value.to_string()],
        }
    }

    pub fn contains(attribute: &str, value: impl ToString) -> Self {
        ListQuery::Contains {
            attribute: attribute.to_owned(),
            values: vec![value.to_string()],
        }
    }

    pub fn search(attribute: &str, term: &str) -> Self {
        ListQuery::Search {
            attribute: attribute.to_owned(),
            term: term.to_owned(),
        }
    }

    #[must_use]
    pub fn order_asc(attribute: &str) -> Self {
        ListQuery::OrderAsc(attribute.to_owned())
    }

    #[must_use]
    pub fn order_desc(attribute: &str) -> Self {
        ListQuery::OrderDesc(attribute.to_owned())
    }

    pub fn cursor_after(document_id: impl ToString) -> Self {
        ListQuery::CursorAfter(document_id.to_string())
    }

    /// The JSON form the backend expects in `queries[]`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            ListQuery::Equal { attribute, values } => {
                json!({ "method": "equal", "attribute": attribute, "values": values })
            }
            ListQuery::Contains { attribute, values } => {
                json!({ "method": "contains", "attribute": attribute, "values": values })
            }
            ListQuery::Search { attribute, term } => {
                json!({ "method": "search", "attribute": attribute, "values": [term] })
            }
            ListQuery::OrderAsc(attribute) => json!({ "method": "orderAsc", "attribute": attribute }),
            ListQuery::OrderDesc(attribute) => {
                json!({ "method": "orderDesc", "attribute": attribute })
            }
            ListQuery::Limit(limit) => json!({ "method": "limit", "values": [limit] }),
            ListQuery::CursorAfter(id) => json!({ "method": "cursorAfter", "values": [id] }),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Permission {
    ReadAny,
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::ReadAny => f.write_str(r#"read("any")"#),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size_original: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,
}

#[async_trait]
pub trait Databases: Send + Sync {
    async fn create_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document>;

    async fn get_document(&self, collection: Collection, document_id: &str) -> Result<Document>;

    /// Applies a partial update: attributes absent from `data` keep their value.
    async fn update_document(
        &self,
        collection: Collection,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Document>;

    async fn delete_document(&self, collection: Collection, document_id: &str) -> Result<()>;

    async fn list_documents(
        &self,
        collection: Collection,
        queries: &[ListQuery],
    ) -> Result<DocumentList>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_file(
        &self,
        file_id: &str,
        file: NewFile,
        permissions: &[Permission],
    ) -> Result<FileRecord>;

    /// Public URL serving the stored file as is.
    fn file_view_url(&self, file_id: &str) -> Result<Url>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

#[async_trait]
pub trait Accounts: Send + Sync {
    async fn create_account(
        &self,
        account_id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AccountRecord>;

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionRecord>;

    async fn get_account(&self) -> Result<AccountRecord>;

    /// `"current"` names the session of this client.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Generated avatar showing the initials of `name`.
    fn avatar_initials_url(&self, name: &str) -> Result<Url>;
}

#[cfg(test)]
mod tests {
    use crate::service::{Document, ListQuery, Permission};
    use serde_json::json;

    #[test]
    fn queries_serialize_to_backend_json() {
        assert_eq!(
            ListQuery::equal("accountId", 42).to_json(),
            json!({ "method": "equal", "attribute": "accountId", "values": ["42"] })
        );
        assert_eq!(
            ListQuery::order_desc("$updatedAt").to_json(),
            json!({ "method": "orderDesc", "attribute": "$updatedAt" })
        );
        assert_eq!(
            ListQuery::Limit(9).to_json(),
            json!({ "method": "limit", "values": [9] })
        );
        assert_eq!(
            ListQuery::cursor_after(7).to_json(),
            json!({ "method": "cursorAfter", "values": ["7"] })
        );
        assert_eq!(
            ListQuery::search("caption", "sunset").to_json(),
            json!({ "method": "search", "attribute": "caption", "values": ["sunset"] })
        );
    }

    #[test]
    fn permissions_use_role_syntax() {
        assert_eq!(Permission::ReadAny.to_string(), r#"read("any")"#);
    }

    #[test]
    fn documents_keep_metadata_apart_from_data() {
        let document: Document = serde_json::from_value(json!({
            "$id": "12",
            "$createdAt": "2025-03-01T10:00:00.000+00:00",
            "$updatedAt": "2025-03-02T10:00:00.000+00:00",
            "caption": "hello",
        }))
        .unwrap();

        assert_eq!(document.id, "12");
        assert_eq!(document.data.len(), 1);
        assert_eq!(document.data["caption"], "hello");
        assert!(document.created_at < document.updated_at);
    }
}

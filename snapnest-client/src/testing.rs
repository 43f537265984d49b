use crate::query::{QueryClient, QueryConfig};
use snapnest_backend::{BackendClient, MemoryBackend};
use snapnest_common::model::{
    file::NewFile,
    post::{NewPost, Post},
    user::{NewUserDocument, User, Username},
};
use std::sync::Arc;
use url::Url;

pub(crate) fn setup() -> (Arc<MemoryBackend>, Arc<QueryClient>) {
    setup_with(QueryConfig::default())
}

pub(crate) fn setup_with(config: QueryConfig) -> (Arc<MemoryBackend>, Arc<QueryClient>) {
    let backend = Arc::new(MemoryBackend::new());
    let client = BackendClient::from_backend(backend.clone());
    let queries = QueryClient::new(Arc::new(client), config);
    (backend, Arc::new(queries))
}

pub(crate) fn image(name: &str) -> NewFile {
    NewFile {
        name: name.to_owned(),
        mime_type: "image/jpeg".to_owned(),
        bytes: name.as_bytes().to_vec(),
    }
}

pub(crate) async fn user(client: &BackendClient, account: u64, name: &str) -> User {
    client
        .save_user_to_db(NewUserDocument {
            account_id: account.into(),
            name: name.to_owned(),
            username: Username::new(name.to_lowercase()).unwrap(),
            email: format!("{}@example.com", name.to_lowercase()),
            image_url: Url::parse("https://backend.test/v1/avatars/initials?name=x").unwrap(),
        })
        .await
        .unwrap()
}

pub(crate) async fn post(client: &BackendClient, creator: &User, caption: &str) -> Post {
    client
        .create_post(NewPost {
            creator: creator.id,
            caption: caption.to_owned(),
            file: image(caption),
            location: None,
            tags: String::new(),
        })
        .await
        .unwrap()
}

//! The app's reads. Queries that need an id take it as an `Option` and stay
//! disabled until it is known.

use crate::{
    error::Result,
    query::{InfiniteQuery, Query, QueryKey},
};
use snapnest_backend::{BackendClient, BackendError};
use snapnest_common::model::{
    Id,
    post::{Post, PostMarker},
    user::{User, UserMarker},
};

fn require<Marker>(id: Option<Id<Marker>>, what: &'static str) -> Result<Id<Marker>> {
    Ok(id.ok_or(BackendError::MissingIdentifier(what))?)
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct RecentPosts;

impl Query for RecentPosts {
    type Output = Vec<Post>;

    fn key(&self) -> Option<QueryKey> {
        Some(QueryKey::RecentPosts)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<Post>> {
        Ok(backend.get_recent_posts().await?)
    }
}

/// The explore feed, paged by the id of the last post seen.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct InfinitePosts;

impl InfiniteQuery for InfinitePosts {
    type Item = Post;
    type Cursor = Id<PostMarker>;

    fn key(&self) -> Option<QueryKey> {
        Some(QueryKey::InfinitePosts)
    }

    async fn fetch_page(
        &self,
        backend: &BackendClient,
        cursor: Option<Id<PostMarker>>,
    ) -> Result<Vec<Post>> {
        Ok(backend.get_infinite_posts(cursor).await?)
    }

    fn next_cursor(&self, last_page: &[Post]) -> Option<Id<PostMarker>> {
        last_page.last().map(|post| post.id)
    }
}

/// Enabled once the term has something besides whitespace in it.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SearchPosts(pub String);

impl Query for SearchPosts {
    type Output = Vec<Post>;

    fn key(&self) -> Option<QueryKey> {
        let has_term = !self.0.trim().is_empty();
        has_term.then(|| QueryKey::SearchPosts(self.0.clone()))
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<Post>> {
        Ok(backend.search_posts(&self.0).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostById(pub Option<Id<PostMarker>>);

impl Query for PostById {
    type Output = Post;

    fn key(&self) -> Option<QueryKey> {
        self.0.map(QueryKey::PostById)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Post> {
        let post_id = require(self.0, "post id")?;
        Ok(backend.get_post_by_id(post_id).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct CurrentUser;

impl Query for CurrentUser {
    type Output = User;

    fn key(&self) -> Option<QueryKey> {
        Some(QueryKey::CurrentUser)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<User> {
        Ok(backend.get_current_user().await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct Users {
    pub limit: Option<u32>,
}

impl Query for Users {
    type Output = Vec<User>;

    fn key(&self) -> Option<QueryKey> {
        Some(QueryKey::Users(self.limit))
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<User>> {
        Ok(backend.get_users(self.limit).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct UserById(pub Option<Id<UserMarker>>);

impl Query for UserById {
    type Output = User;

    fn key(&self) -> Option<QueryKey> {
        self.0.map(QueryKey::UserById)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<User> {
        let user_id = require(self.0, "user id")?;
        Ok(backend.get_user_by_id(user_id).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct UserPosts(pub Option<Id<UserMarker>>);

impl Query for UserPosts {
    type Output = Vec<Post>;

    fn key(&self) -> Option<QueryKey> {
        self.0.map(QueryKey::UserPosts)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<Post>> {
        let user_id = require(self.0, "user id")?;
        Ok(backend.get_user_posts(user_id).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SavedPosts(pub Option<Id<UserMarker>>);

impl Query for SavedPosts {
    type Output = Vec<Post>;

    fn key(&self) -> Option<QueryKey> {
        self.0.map(QueryKey::SavedPosts)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<Post>> {
        let user_id = require(self.0, "user id")?;
        Ok(backend.get_saved_posts(user_id).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LikedPosts(pub Option<Id<UserMarker>>);

impl Query for LikedPosts {
    type Output = Vec<Post>;

    fn key(&self) -> Option<QueryKey> {
        self.0.map(QueryKey::LikedPosts)
    }

    async fn fetch(&self, backend: &BackendClient) -> Result<Vec<Post>> {
        let user_id = require(self.0, "user id")?;
        Ok(backend.get_liked_posts(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        queries::{
            CurrentUser, LikedPosts, PostById, SavedPosts, SearchPosts, UserById, UserPosts,
            Users,
        },
        query::{Query, QueryKey},
        testing::{post, setup, user},
    };
    use snapnest_backend::ErrorReason;
    use std::collections::BTreeSet;

    #[test]
    fn keys_carry_their_arguments() {
        assert_eq!(
            SearchPosts("sunset".to_owned()).key(),
            Some(QueryKey::SearchPosts("sunset".to_owned()))
        );
        assert_eq!(Users { limit: Some(10) }.key(), Some(QueryKey::Users(Some(10))));
        assert_eq!(
            UserById(Some(3_u64.into())).key(),
            Some(QueryKey::UserById(3_u64.into()))
        );
    }

    #[test]
    fn missing_arguments_disable_queries() {
        assert!(!SearchPosts(String::new()).enabled());
        assert!(!SearchPosts(" \t".to_owned()).enabled());
        assert!(SearchPosts(" fog ".to_owned()).enabled());
        assert!(!PostById(None).enabled());
        assert!(!UserById(None).enabled());
        assert!(!UserPosts(None).enabled());
        assert!(!SavedPosts(None).enabled());
        assert!(!LikedPosts(None).enabled());
    }

    #[tokio::test]
    async fn profile_queries_resolve() {
        let (_backend, queries) = setup();
        let mira = user(queries.backend(), 1, "Mira").await;
        let theo = user(queries.backend(), 2, "Theo").await;
        let shot = post(queries.backend(), &theo, "Tram lines").await;
        let liked = queries
            .backend()
            .like_post(shot.id, &BTreeSet::from([mira.id]))
            .await
            .unwrap();
        queries.backend().save_post(mira.id, shot.id).await.unwrap();

        assert_eq!(
            queries.fetch(&UserById(Some(theo.id))).await.unwrap(),
            Some(theo.clone())
        );
        assert_eq!(
            queries.fetch(&UserPosts(Some(theo.id))).await.unwrap(),
            Some(vec![liked.clone()])
        );
        assert_eq!(
            queries.fetch(&LikedPosts(Some(mira.id))).await.unwrap(),
            Some(vec![liked.clone()])
        );
        assert_eq!(
            queries.fetch(&SavedPosts(Some(mira.id))).await.unwrap(),
            Some(vec![liked.clone()])
        );
        assert_eq!(
            queries.fetch(&PostById(Some(shot.id))).await.unwrap(),
            Some(liked)
        );
    }

    #[tokio::test]
    async fn current_user_needs_a_session() {
        let (_backend, queries) = setup();

        let err = queries.fetch(&CurrentUser).await.unwrap_err();

        assert_eq!(err.reason(), ErrorReason::Unauthenticated);
    }
}

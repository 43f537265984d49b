//! The app's writes and the cached reads each one makes stale.

use crate::{
    error::Result,
    query::{QueryFilter, QueryKey, QueryName},
};
use snapnest_backend::{BackendClient, BackendError, FollowOutcome};
use snapnest_common::model::{
    Id,
    auth::{Credentials, Session},
    file::FileMarker,
    post::{self, NewPost, Post, PostMarker},
    saved::{SavedPost, SavedPostMarker},
    user::{self, NewUser, User, UserMarker},
};
use std::collections::BTreeSet;

pub trait Mutation: Send {
    type Output: Send;

    /// Applied after the mutation succeeded.
    fn invalidates(&self) -> Vec<QueryFilter>;

    fn execute(
        self,
        backend: &BackendClient,
    ) -> impl Future<Output = Result<Self::Output>> + Send;
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUserAccount(pub NewUser);

impl Mutation for CreateUserAccount {
    type Output = User;

    fn invalidates(&self) -> Vec<QueryFilter> {
        Vec::new()
    }

    async fn execute(self, backend: &BackendClient) -> Result<User> {
        Ok(backend.create_user_account(self.0).await?)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SignInAccount(pub Credentials);

impl Mutation for SignInAccount {
    type Output = Session;

    fn invalidates(&self) -> Vec<QueryFilter> {
        Vec::new()
    }

    async fn execute(self, backend: &BackendClient) -> Result<Session> {
        Ok(backend.sign_in_account(&self.0).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SignOutAccount;

impl Mutation for SignOutAccount {
    type Output = ();

    fn invalidates(&self) -> Vec<QueryFilter> {
        Vec::new()
    }

    async fn execute(self, backend: &BackendClient) -> Result<()> {
        Ok(backend.sign_out_account().await?)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost(pub NewPost);

impl Mutation for CreatePost {
    type Output = Post;

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![
            QueryKey::RecentPosts.into(),
            QueryKey::InfinitePosts.into(),
            QueryKey::UserPosts(self.0.creator).into(),
        ]
    }

    async fn execute(self, backend: &BackendClient) -> Result<Post> {
        Ok(backend.create_post(self.0).await?)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatePost(pub post::UpdatePost);

impl Mutation for UpdatePost {
    type Output = Post;

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![QueryKey::PostById(self.0.post_id).into()]
    }

    async fn execute(self, backend: &BackendClient) -> Result<Post> {
        Ok(backend.update_post(self.0).await?)
    }
}

/// Both ids come from the post being viewed and may not be known yet.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct DeletePost {
    pub post_id: Option<Id<PostMarker>>,
    pub image_id: Option<Id<FileMarker>>,
}

impl Mutation for DeletePost {
    type Output = ();

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![
            QueryKey::RecentPosts.into(),
            QueryKey::InfinitePosts.into(),
            QueryName::UserPosts.into(),
        ]
    }

    async fn execute(self, backend: &BackendClient) -> Result<()> {
        let post_id = self
            .post_id
            .ok_or(BackendError::MissingIdentifier("post id"))?;
        let image_id = self
            .image_id
            .ok_or(BackendError::MissingIdentifier("image id"))?;
        Ok(backend.delete_post(post_id, image_id).await?)
    }
}

/// Writes the complete set of likers, as computed by the one liking.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct LikePost {
    pub post_id: Id<PostMarker>,
    pub likes: BTreeSet<Id<UserMarker>>,
    pub actor: Id<UserMarker>,
}

impl Mutation for LikePost {
    type Output = Post;

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![
            QueryKey::PostById(self.post_id).into(),
            QueryKey::RecentPosts.into(),
            QueryKey::InfinitePosts.into(),
            QueryKey::CurrentUser.into(),
            QueryKey::LikedPosts(self.actor).into(),
        ]
    }

    async fn execute(self, backend: &BackendClient) -> Result<Post> {
        Ok(backend.like_post(self.post_id, &self.likes).await?)
    }
}

fn saves_changed(user_id: Id<UserMarker>) -> Vec<QueryFilter> {
    vec![
        QueryKey::RecentPosts.into(),
        QueryKey::InfinitePosts.into(),
        QueryKey::CurrentUser.into(),
        QueryKey::SavedPosts(user_id).into(),
    ]
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SavePost {
    pub user_id: Id<UserMarker>,
    pub post_id: Id<PostMarker>,
}

impl Mutation for SavePost {
    type Output = SavedPost;

    fn invalidates(&self) -> Vec<QueryFilter> {
        saves_changed(self.user_id)
    }

    async fn execute(self, backend: &BackendClient) -> Result<SavedPost> {
        Ok(backend.save_post(self.user_id, self.post_id).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct DeleteSavedPost {
    pub saved_id: Id<SavedPostMarker>,
    pub user_id: Id<UserMarker>,
}

impl Mutation for DeleteSavedPost {
    type Output = ();

    fn invalidates(&self) -> Vec<QueryFilter> {
        saves_changed(self.user_id)
    }

    async fn execute(self, backend: &BackendClient) -> Result<()> {
        Ok(backend.delete_saved_post(self.saved_id).await?)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdateUser(pub user::UpdateUser);

impl Mutation for UpdateUser {
    type Output = User;

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![
            QueryKey::CurrentUser.into(),
            QueryKey::UserById(self.0.user_id).into(),
        ]
    }

    async fn execute(self, backend: &BackendClient) -> Result<User> {
        Ok(backend.update_user(self.0).await?)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct FollowUser {
    pub target: Id<UserMarker>,
    pub acting: Id<UserMarker>,
}

impl Mutation for FollowUser {
    type Output = FollowOutcome;

    fn invalidates(&self) -> Vec<QueryFilter> {
        vec![
            QueryKey::UserById(self.target).into(),
            QueryKey::UserById(self.acting).into(),
        ]
    }

    async fn execute(self, backend: &BackendClient) -> Result<FollowOutcome> {
        Ok(backend.follow_user(self.target, self.acting).await?)
    }
}

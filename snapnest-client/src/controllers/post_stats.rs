use crate::{
    error::Result,
    mutations::{DeleteSavedPost, LikePost, SavePost},
    optimistic::Optimistic,
    query::QueryClient,
};
use serde::Serialize;
use snapnest_common::{
    model::{
        Id,
        post::{Post, PostMarker},
        saved::SavedPostMarker,
        user::UserMarker,
    },
    util::toggle_member,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::warn;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, Serialize)]
pub struct PostStats {
    pub likes: BTreeSet<Id<UserMarker>>,
    pub is_saved: bool,
}

/// The like and save buttons under a post, for one signed-in user.
#[derive(Debug)]
pub struct PostStatsController {
    queries: Arc<QueryClient>,
    post_id: Id<PostMarker>,
    user_id: Id<UserMarker>,
    stats: Optimistic<PostStats>,
    saved_id: Option<Id<SavedPostMarker>>,
}

impl PostStatsController {
    /// Starts out unsaved; see [`Self::load`].
    #[must_use]
    pub fn new(queries: Arc<QueryClient>, post: &Post, user_id: Id<UserMarker>) -> Self {
        Self {
            queries,
            post_id: post.id,
            user_id,
            stats: Optimistic::new(PostStats {
                likes: post.likes.clone(),
                is_saved: false,
            }),
            saved_id: None,
        }
    }

    /// Like [`Self::new`], with the save state looked up.
    pub async fn load(
        queries: Arc<QueryClient>,
        post: &Post,
        user_id: Id<UserMarker>,
    ) -> Result<Self> {
        let saved = queries.backend().find_saved_post(user_id, post.id).await?;

        let mut controller = Self::new(queries, post, user_id);
        controller.saved_id = saved.map(|saved| saved.id);
        controller.stats.set(PostStats {
            likes: post.likes.clone(),
            is_saved: controller.saved_id.is_some(),
        });
        Ok(controller)
    }

    #[must_use]
    pub fn stats(&self) -> &PostStats {
        self.stats.get()
    }

    #[must_use]
    pub fn is_liked(&self) -> bool {
        self.stats.get().likes.contains(&self.user_id)
    }

    pub async fn toggle_like(&mut self) -> Result<Post> {
        let mut likes = self.stats.get().likes.clone();
        toggle_member(&mut likes, self.user_id);

        let mutation = LikePost {
            post_id: self.post_id,
            likes: likes.clone(),
            actor: self.user_id,
        };
        let post = self
            .stats
            .run(|stats| stats.likes = likes, self.queries.mutate(mutation))
            .await
            .inspect_err(|err| {
                warn!(error = %err, post_id = %self.post_id, "Like failed, reverted");
            })?;

        let is_saved = self.stats.get().is_saved;
        self.stats.set(PostStats {
            likes: post.likes.clone(),
            is_saved,
        });
        Ok(post)
    }

    /// Deletes the save record when there is one and creates one otherwise.
    pub async fn toggle_save(&mut self) -> Result<()> {
        match self.saved_id {
            Some(saved_id) => {
                let mutation = DeleteSavedPost {
                    saved_id,
                    user_id: self.user_id,
                };
                self.stats
                    .run(|stats| stats.is_saved = false, self.queries.mutate(mutation))
                    .await?;
                self.saved_id = None;
            }
            None => {
                let mutation = SavePost {
                    user_id: self.user_id,
                    post_id: self.post_id,
                };
                let saved = self
                    .stats
                    .run(|stats| stats.is_saved = true, self.queries.mutate(mutation))
                    .await?;
                self.saved_id = Some(saved.id);
            }
        }
        Ok(())
    }
}

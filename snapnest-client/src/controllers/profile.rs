use crate::{
    error::Result,
    mutations::FollowUser,
    optimistic::Optimistic,
    queries::UserById,
    query::QueryClient,
};
use serde::Serialize;
use snapnest_backend::{BackendError, FollowOutcome};
use snapnest_common::model::{
    Id,
    user::{User, UserMarker},
};
use std::sync::Arc;
use tracing::warn;

/// What the profile header shows about the viewed user.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default, Serialize)]
pub struct FollowState {
    /// Whether the viewer follows the viewed user.
    pub is_following: bool,
    pub follower_count: usize,
    pub following_count: usize,
}

impl FollowState {
    #[must_use]
    pub fn of(viewed: &User, viewer: Id<UserMarker>) -> Self {
        Self {
            is_following: viewed.is_followed_by(viewer),
            follower_count: viewed.followers.len(),
            following_count: viewed.following.len(),
        }
    }

    /// The click: flips the button and moves the follower count with it.
    fn toggle(&mut self) {
        if self.is_following {
            self.follower_count = self.follower_count.saturating_sub(1);
        } else {
            self.follower_count += 1;
        }
        self.is_following = !self.is_following;
    }
}

/// The follow button of a profile page.
#[derive(Debug)]
pub struct FollowController {
    queries: Arc<QueryClient>,
    target: Id<UserMarker>,
    viewer: Id<UserMarker>,
    state: Optimistic<FollowState>,
}

impl FollowController {
    #[must_use]
    pub fn new(queries: Arc<QueryClient>, viewed: &User, viewer: Id<UserMarker>) -> Self {
        Self {
            queries,
            target: viewed.id,
            viewer,
            state: Optimistic::new(FollowState::of(viewed, viewer)),
        }
    }

    /// Your own profile has no follow button.
    #[must_use]
    pub fn can_follow(&self) -> bool {
        self.target != self.viewer
    }

    #[must_use]
    pub fn state(&self) -> FollowState {
        *self.state.get()
    }

    /// Shows the toggled state right away and reverts to exactly the state
    /// before the click if the follow fails.
    pub async fn toggle(&mut self) -> Result<FollowOutcome> {
        if !self.can_follow() {
            let err = BackendError::InvalidInput("users cannot follow themselves".to_owned());
            return Err(err.into());
        }

        let mutation = FollowUser {
            target: self.target,
            acting: self.viewer,
        };
        let outcome = self
            .state
            .run(FollowState::toggle, self.queries.mutate(mutation))
            .await
            .inspect_err(|err| {
                warn!(
                    error = %err,
                    target_id = %self.target,
                    message = err.user_message(),
                    "Follow failed, reverted"
                );
            })?;

        self.state.set(FollowState::of(&outcome.target, self.viewer));
        Ok(outcome)
    }

    /// Reloads the viewed user and shows its stored state.
    pub async fn refresh(&mut self) -> Result<FollowState> {
        if let Some(viewed) = self.queries.fetch(&UserById(Some(self.target))).await? {
            self.state.set(FollowState::of(&viewed, self.viewer));
        }
        Ok(self.state())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        controllers::profile::{FollowController, FollowState},
        testing::{setup, user},
    };
    use snapnest_backend::{ErrorReason, memory::Operation, service::Collection};

    #[tokio::test]
    async fn toggle_follows_then_unfollows() {
        let (_backend, queries) = setup();
        let mira = user(queries.backend(), 1, "Mira").await;
        let theo = user(queries.backend(), 2, "Theo").await;
        let mut button = FollowController::new(queries.clone(), &theo, mira.id);
        assert_eq!(button.state(), FollowState::default());

        let outcome = button.toggle().await.unwrap();
        assert!(outcome.following);
        assert_eq!(
            button.state(),
            FollowState {
                is_following: true,
                follower_count: 1,
                following_count: 0,
            }
        );

        button.toggle().await.unwrap();
        assert_eq!(button.state(), FollowState::default());
    }

    #[tokio::test]
    async fn failed_follow_reverts_exactly() {
        let (backend, queries) = setup();
        let mira = user(queries.backend(), 1, "Mira").await;
        let theo = user(queries.backend(), 2, "Theo").await;
        let carla = user(queries.backend(), 3, "Carla").await;
        queries.backend().follow_user(theo.id, carla.id).await.unwrap();
        queries.backend().follow_user(carla.id, theo.id).await.unwrap();
        let theo = queries.backend().get_user_by_id(theo.id).await.unwrap();

        let mut button = FollowController::new(queries.clone(), &theo, mira.id);
        let before = button.state();
        assert_eq!(
            before,
            FollowState {
                is_following: false,
                follower_count: 1,
                following_count: 1,
            }
        );

        backend.fail_next(
            Operation::UpdateDocument(Collection::Users),
            ErrorReason::Unavailable,
        );
        let err = button.toggle().await.unwrap_err();

        assert_eq!(err.reason(), ErrorReason::Unavailable);
        assert_eq!(button.state(), before);
    }

    #[tokio::test]
    async fn own_profile_cannot_be_followed() {
        let (backend, queries) = setup();
        let mira = user(queries.backend(), 1, "Mira").await;
        let mut button = FollowController::new(queries, &mira, mira.id);

        assert!(!button.can_follow());
        assert_eq!(
            button.toggle().await.unwrap_err().reason(),
            ErrorReason::InvalidInput
        );
        assert_eq!(backend.calls(Operation::GetDocument(Collection::Users)), 0);
    }

    #[tokio::test]
    async fn refresh_picks_up_remote_changes() {
        let (_backend, queries) = setup();
        let mira = user(queries.backend(), 1, "Mira").await;
        let theo = user(queries.backend(), 2, "Theo").await;
        let mut button = FollowController::new(queries.clone(), &theo, mira.id);

        queries.backend().follow_user(theo.id, mira.id).await.unwrap();

        assert!(button.refresh().await.unwrap().is_following);
    }
}

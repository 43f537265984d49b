use crate::model::{Id, post::PostMarker, user::UserMarker};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SavedPostMarker;

/// A bookmark of a post by a user.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct SavedPost {
    pub id: Id<SavedPostMarker>,
    pub user: Id<UserMarker>,
    pub post: Id<PostMarker>,
}

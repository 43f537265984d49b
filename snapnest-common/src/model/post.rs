use crate::model::{
    Id,
    file::{ImageRef, NewFile},
    user::UserMarker,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub creator: Id<UserMarker>,
    pub caption: String,
    pub image: ImageRef,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub likes: BTreeSet<Id<UserMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Post {
    #[must_use]
    pub fn is_liked_by(&self, user: Id<UserMarker>) -> bool {
        self.likes.contains(&user)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub creator: Id<UserMarker>,
    pub caption: String,
    pub file: NewFile,
    pub location: Option<String>,
    /// Comma separated, as typed into the form.
    pub tags: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatePost {
    pub post_id: Id<PostMarker>,
    pub caption: String,
    /// Replaces the image when present.
    pub file: Option<NewFile>,
    pub image: ImageRef,
    pub location: Option<String>,
    pub tags: String,
}

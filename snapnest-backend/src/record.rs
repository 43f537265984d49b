//! Documents as the backend stores them, and their conversion into model types.

use serde::{Deserialize, Serialize};
use snapnest_common::model::{
    Id, ModelValidationError,
    auth::{Account, Session},
    file::{ImageRef, StoredFile},
    post::Post,
    saved::SavedPost,
    user::{User, Username},
};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use url::Url;

use crate::service::{AccountRecord, FileRecord, SessionRecord};

pub(crate) const ACCOUNT_ID_ATTRIBUTE: &str = "accountId";
pub(crate) const CAPTION_ATTRIBUTE: &str = "caption";
pub(crate) const CREATOR_ATTRIBUTE: &str = "creator";
pub(crate) const LIKES_ATTRIBUTE: &str = "likes";
pub(crate) const FOLLOWERS_ATTRIBUTE: &str = "followers";
pub(crate) const FOLLOWING_ATTRIBUTE: &str = "following";
pub(crate) const SAVED_USER_ATTRIBUTE: &str = "user";
pub(crate) const SAVED_POST_ATTRIBUTE: &str = "post";

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub image_url: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "$updatedAt", with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub creator: String,
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub(crate) struct SavedPostRecord {
    #[serde(rename = "$id")]
    pub id: String,
    pub user: String,
    pub post: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserData<'a> {
    pub account_id: String,
    pub name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub image_url: &'a str,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserPatch<'a> {
    pub name: &'a str,
    pub bio: Option<&'a str>,
    pub image_url: &'a str,
    pub image_id: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostData<'a> {
    pub creator: String,
    pub caption: &'a str,
    pub image_url: &'a str,
    pub image_id: String,
    pub location: Option<&'a str>,
    pub tags: &'a [String],
    pub likes: Vec<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostPatch<'a> {
    pub caption: &'a str,
    pub image_url: &'a str,
    pub image_id: String,
    pub location: Option<&'a str>,
    pub tags: &'a [String],
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub(crate) struct SavedPostData {
    pub user: String,
    pub post: String,
}

fn parse_url(value: String) -> Result<Url, ModelValidationError> {
    Url::parse(&value).map_err(|err| ModelValidationError::Url(value, err))
}

fn parse_ids<Marker>(values: &[String]) -> Result<BTreeSet<Id<Marker>>, ModelValidationError>
where
    Id<Marker>: Ord,
{
    values
        .iter()
        .map(|value| value.parse().map_err(ModelValidationError::from))
        .collect()
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            account_id: value.account_id.parse()?,
            name: value.name,
            username: Username::new(value.username)?,
            email: value.email,
            image_url: parse_url(value.image_url)?,
            image_id: value.image_id.map(|id| id.parse()).transpose()?,
            bio: value.bio,
            followers: parse_ids(&value.followers)?,
            following: parse_ids(&value.following)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            creator: value.creator.parse()?,
            caption: value.caption,
            image: ImageRef {
                url: parse_url(value.image_url)?,
                file_id: value.image_id.parse()?,
            },
            location: value.location,
            tags: value.tags,
            likes: parse_ids(&value.likes)?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TryFrom<SavedPostRecord> for SavedPost {
    type Error = ModelValidationError;

    fn try_from(value: SavedPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            user: value.user.parse()?,
            post: value.post.parse()?,
        })
    }
}

impl TryFrom<FileRecord> for StoredFile {
    type Error = ModelValidationError;

    fn try_from(value: FileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            name: value.name,
            mime_type: value.mime_type,
            size: value.size_original,
        })
    }
}

impl TryFrom<AccountRecord> for Account {
    type Error = ModelValidationError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            name: value.name,
            email: value.email,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            account_id: value.user_id.parse()?,
            expires_at: value.expire,
        })
    }
}

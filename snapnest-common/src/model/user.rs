use crate::model::{Id, auth::AccountMarker, file::FileMarker, file::NewFile};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    collections::BTreeSet,
    fmt::{Debug, Formatter},
};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

pub const USERNAME_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub account_id: Id<AccountMarker>,
    pub name: String,
    pub username: Username,
    pub email: String,
    pub image_url: Url,
    pub image_id: Option<Id<FileMarker>>,
    pub bio: Option<String>,
    pub followers: BTreeSet<Id<UserMarker>>,
    pub following: BTreeSet<Id<UserMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    #[must_use]
    pub fn is_followed_by(&self, user: Id<UserMarker>) -> bool {
        self.followers.contains(&user)
    }
}

/// Sign-up form input.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct NewUser {
    pub name: String,
    pub username: Username,
    pub email: String,
    pub password: String,
}

/// The user document written right after the auth account exists.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewUserDocument {
    pub account_id: Id<AccountMarker>,
    pub name: String,
    pub username: Username,
    pub email: String,
    pub image_url: Url,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdateUser {
    pub user_id: Id<UserMarker>,
    pub name: String,
    pub bio: Option<String>,
    /// Replaces the profile image when present.
    pub file: Option<NewFile>,
    pub image_url: Url,
    pub image_id: Option<Id<FileMarker>>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0:?}")]
pub struct InvalidUsernameError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let len = username.chars().count();
        if len > 0 && len <= USERNAME_MAX_LEN && !username.chars().any(char::is_whitespace) {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

impl Debug for NewUser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{NewUser, USERNAME_MAX_LEN, Username};

    #[test]
    fn username_validation() {
        assert!(Username::new("mira".to_owned()).is_ok());
        assert!(Username::new("x".repeat(USERNAME_MAX_LEN)).is_ok());

        assert!(Username::new(String::new()).is_err());
        assert!(Username::new("x".repeat(USERNAME_MAX_LEN + 1)).is_err());
        assert!(Username::new("two words".to_owned()).is_err());
    }

    #[test]
    fn new_user_debug_hides_password() {
        let user = NewUser {
            name: "Mira".to_owned(),
            username: Username::new("mira".to_owned()).unwrap(),
            email: "mira@example.com".to_owned(),
            password: "hunter22".to_owned(),
        };

        let debug = format!("{user:?}");
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("[redacted]"));
    }
}

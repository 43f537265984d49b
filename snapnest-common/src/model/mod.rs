pub mod auth;
pub mod file;
pub mod post;
pub mod saved;
pub mod user;

use crate::{
    model::user::InvalidUsernameError,
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
};
use std::{fmt::Display, marker::PhantomData, num::ParseIntError, str::FromStr};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    Id(#[from] InvalidIdError),
    #[error("Invalid URL {0:?}: {1}")]
    Url(String, url::ParseError),
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Invalid id {value:?}: {source}")]
pub struct InvalidIdError {
    value: String,
    source: ParseIntError,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnapnestEpoch;
impl Epoch for SnapnestEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type SnapnestSnowflake = Snowflake<SnapnestEpoch>;
pub type SnapnestSnowflakeGenerator = SnowflakeGenerator<SnapnestEpoch>;

/// A document, account or file id. The backend stores ids as strings, so the
/// snowflake travels as its decimal representation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(SnapnestSnowflake, PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: SnapnestSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> SnapnestSnowflake {
        self.0
    }

    /// Reinterprets the id under another marker, e.g. an account id as the
    /// owning user's lookup key.
    #[must_use]
    pub fn cast<Other>(self) -> Id<Other> {
        Id::new(self.0)
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = u64::from_str(s).map_err(|source| InvalidIdError {
            value: s.to_owned(),
            source,
        })?;
        Ok(inner.into())
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        inner
            .parse()
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"a decimal id"))
    }
}

impl<Marker> From<SnapnestSnowflake> for Id<Marker> {
    fn from(value: SnapnestSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for SnapnestSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(SnapnestSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

//! Snowflake ids for documents, accounts and stored files.
//!
//! The hosted backend accepts caller-chosen ids, so every id is minted on the
//! client. Layout, most significant bit first: 42 bits of milliseconds since
//! the epoch, 5 bits worker id, 5 bits process id, 12 bits increment.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_OFFSET: u64 = 22;
pub const TIMESTAMP_LENGTH: u64 = 42;
pub const WORKER_ID_OFFSET: u64 = 17;
pub const PROCESS_ID_OFFSET: u64 = 12;
pub const ORIGIN_ID_LENGTH: u64 = 5;
pub const INCREMENT_LENGTH: u64 = 12;

const ORIGIN_ID_MASK: u64 = (1 << ORIGIN_ID_LENGTH) - 1;
const INCREMENT_MASK: u64 = (1 << INCREMENT_LENGTH) - 1;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

/// Identifies the client minting ids. Worker and process ids share this shape.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct OriginId(u8);

impl OriginId {
    #[must_use]
    pub fn new(id: u8) -> Option<Self> {
        (u64::from(id) <= ORIGIN_ID_MASK).then_some(Self(id))
    }

    #[must_use]
    pub fn new_unchecked(id: u8) -> Self {
        Self::new(id).expect("OriginId out of range.")
    }

    #[must_use]
    pub fn random() -> Self {
        Self(rand::random::<u8>() & 0x1F)
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: u64,
        worker_id: OriginId,
        process_id: OriginId,
        increment: u16,
    ) -> Self {
        let snowflake = (timestamp << TIMESTAMP_OFFSET)
            | (u64::from(worker_id.get()) << WORKER_ID_OFFSET)
            | (u64::from(process_id.get()) << PROCESS_ID_OFFSET)
            | (u64::from(increment) & INCREMENT_MASK);

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since the epoch.
    #[must_use]
    pub fn timestamp(self) -> u64 {
        self.0 >> TIMESTAMP_OFFSET
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn worker_id(self) -> OriginId {
        OriginId(((self.0 >> WORKER_ID_OFFSET) & ORIGIN_ID_MASK) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn process_id(self) -> OriginId {
        OriginId(((self.0 >> PROCESS_ID_OFFSET) & ORIGIN_ID_MASK) as u8)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn increment(self) -> u16 {
        (self.0 & INCREMENT_MASK) as u16
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        let millis = i64::try_from(self.timestamp()).expect("Timestamp has at most 42 bits");
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

pub fn timestamp_since<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeTimestampError::TimeBeforeEpoch);
    }
    let millis = u64::try_from(millis).map_err(|_| SnowflakeTimestampError::TimestampTooLarge)?;
    if millis >= 1 << TIMESTAMP_LENGTH {
        return Err(SnowflakeTimestampError::TimestampTooLarge);
    }
    Ok(millis)
}

#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: OriginId,
    process_id: OriginId,
    next_increment: u16,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: OriginId, process_id: OriginId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: 0,
            phantom_data: PhantomData,
        }
    }

    /// Many clients mint ids against the same backend, so each one picks a
    /// random origin.
    #[must_use]
    pub fn with_random_origin() -> Self {
        Self::new(OriginId::random(), OriginId::random())
    }

    #[must_use]
    pub fn worker_id(&self) -> OriginId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> OriginId {
        self.process_id
    }

    /// The increment wraps after 4096 ids without waiting for the next
    /// millisecond, so a burst beyond that within one millisecond repeats
    /// ids. Origins are only 10 random bits, so two clients can also collide;
    /// the backend reports either case as a conflict on create.
    pub fn generate_at(&mut self, time: UtcDateTime) -> Snowflake<SnowflakeEpoch>
    where
        SnowflakeEpoch: Epoch,
    {
        let increment = self.next_increment;
        self.next_increment = (self.next_increment + 1) & 0x0FFF;

        let timestamp =
            timestamp_since::<SnowflakeEpoch>(time).expect("Cannot create snowflake timestamp.");
        Snowflake::from_parts(timestamp, self.worker_id, self.process_id, increment)
    }

    pub fn generate(&mut self) -> Snowflake<SnowflakeEpoch>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, OriginId, Snowflake, SnowflakeGenerator, SnowflakeTimestampError, timestamp_since,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn origin_id_range() {
        for legal_id in [0, 0xD, 0x1F] {
            assert!(OriginId::new(legal_id).is_some());
        }
        for illegal_id in [0x20, 0xF0, u8::MAX] {
            assert!(OriginId::new(illegal_id).is_none());
        }
        for _ in 0..64 {
            assert!(OriginId::random().get() <= 0x1F);
        }
    }

    #[test]
    fn timestamps_relative_to_epoch() {
        assert_eq!(
            timestamp_since::<MillennialEpoch>(MillennialEpoch::EPOCH_TIME),
            Ok(0)
        );
        assert_eq!(
            timestamp_since::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(1500)
            ),
            Ok(1500)
        );
        assert_eq!(
            timestamp_since::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            timestamp_since::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn snowflake_from_into_parts() {
        let worker_id = OriginId::new_unchecked(0b10101);
        let process_id = OriginId::new_unchecked(0b10001);

        let snowflake = Snowflake::<MillennialEpoch>::from_parts(12_345, worker_id, process_id, 100);

        assert_eq!(snowflake.timestamp(), 12_345);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), 100);
        assert_eq!(
            snowflake.created_at(),
            MillennialEpoch::EPOCH_TIME + Duration::milliseconds(12_345)
        );
    }

    #[test]
    fn generator_increments_and_wraps() {
        let time = utc_datetime!(2025-10-24 10:55);
        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(
            OriginId::new_unchecked(10),
            OriginId::new_unchecked(0),
        );

        let first = generator.generate_at(time);
        let second = generator.generate_at(time);
        assert_eq!(first.increment(), 0);
        assert_eq!(second.increment(), 1);
        assert_ne!(first, second);
        assert!(first < second);

        for _ in 2..0x1000 {
            generator.generate_at(time);
        }
        let wrapped = generator.generate_at(time);
        assert_eq!(wrapped.increment(), 0);
        assert_eq!(wrapped, first);
    }
}

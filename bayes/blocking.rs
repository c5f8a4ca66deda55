// ========================================================================================
//                               Temporal Blocking
// ========================================================================================

// Records are joined on a coarse time bucket rather than on exact timestamps, so
// an attribute and an outcome observed on the same day end up with the same key.

use crate::dataflow::{Element, PTable};
use thiserror::Error;

/// Milliseconds in one day, the default block width.
pub const ONE_DAY_MILLIS: i64 = 1000 * 60 * 60 * 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockingError {
    #[error("Block width must be a positive number of milliseconds, but {0} was given.")]
    NonPositiveWidth(i64),
}

/// Truncates timestamps down to the start of their block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blocker {
    width: i64,
}

impl Default for Blocker {
    fn default() -> Self {
        Self::daily()
    }
}

impl Blocker {
    pub fn daily() -> Self {
        Self {
            width: ONE_DAY_MILLIS,
        }
    }

    pub fn new(width: i64) -> Result<Self, BlockingError> {
        if width <= 0 {
            return Err(BlockingError::NonPositiveWidth(width));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    /// The largest multiple of the width that is not greater than `timestamp`,
    /// except below the lowest representable multiple: timestamps there have no
    /// block start in `i64` and map to `i64::MIN`, which is not a multiple of
    /// the width.
    ///
    /// Floor division keeps `block_key(t) <= t` for negative timestamps too.
    pub fn block_key(&self, timestamp: i64) -> i64 {
        timestamp.saturating_sub(timestamp.rem_euclid(self.width))
    }

    /// Replaces every key of `table` with its block start. Values are untouched.
    pub fn block<T: Element>(&self, table: &PTable<i64, T>) -> PTable<i64, T> {
        let blocker = *self;
        let label = format!("block {} by {}ms", table.stage().label(), self.width);
        PTable::from(
            table
                .as_collection()
                .map(&label, move |(timestamp, value)| {
                    (blocker.block_key(*timestamp), value.clone())
                }),
        )
    }
}

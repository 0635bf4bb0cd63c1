//! Distributed identifier generation
//!
//! Ids are 64-bit snowflakes: milliseconds since an epoch, the generator's
//! node number and a per-millisecond sequence. Any number of writer instances
//! can mint ids without coordinating, as long as their node numbers differ.

pub mod clock;
pub mod snowflake;

pub use clock::{Clock, ManualClock, SystemClock};
pub use snowflake::{IdParts, Snowflake, DEFAULT_EPOCH_MS, MAX_NODE, MAX_SEQUENCE};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Identifier generator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The wall clock moved backwards past the configured tolerance
    #[error("Clock moved backwards: last issued at {last_ms}ms, clock now reads {now_ms}ms")]
    ClockBackwards { last_ms: i64, now_ms: i64 },

    /// The clock did not advance while waiting for a fresh millisecond
    #[error("Clock stalled at {0}ms while the sequence space was exhausted")]
    ClockStalled(i64),

    /// Node number does not fit in the node bits
    #[error("Node number {0} out of range (max 1023)")]
    NodeOutOfRange(u16),

    /// Clock reads earlier than the configured epoch
    #[error("Clock reads {now_ms}ms, before epoch {epoch_ms}ms")]
    BeforeEpoch { now_ms: i64, epoch_ms: i64 },
}

pub type IdResult<T> = Result<T, IdError>;

/// A minted 64-bit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    pub fn from_raw(raw: u64) -> Self {
        Id(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Id)
    }
}

/// Source of unique identifiers
///
/// The relationship service only ever sees this trait, so tests can swap the
/// clock-driven [`Snowflake`] for a [`SequenceGenerator`].
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> IdResult<Id>;
}

/// Deterministic generator handing out consecutive integers
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Value the next call to `generate` will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequenceGenerator {
    fn generate(&self) -> IdResult<Id> {
        Ok(Id(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

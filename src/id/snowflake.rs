//! Snowflake id generator
//!
//! Layout, high to low bits: 1 unused sign bit, 41 bits of milliseconds since
//! the epoch, 10 bits of node number, 12 bits of sequence.

use super::clock::{Clock, SystemClock};
use super::{Id, IdError, IdGenerator, IdResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default epoch (2010-11-04T01:42:54.657Z), shared with other snowflake minters
pub const DEFAULT_EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const NODE_SHIFT: u32 = SEQUENCE_BITS;
const TIME_SHIFT: u32 = NODE_BITS + SEQUENCE_BITS;

/// Largest node number
pub const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
/// Largest per-millisecond sequence value
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Decoded components of an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Unix milliseconds
    pub timestamp_ms: i64,
    pub node: u16,
    pub sequence: u16,
}

#[derive(Debug)]
struct State {
    last_ms: i64,
    sequence: u16,
}

/// Clock-driven generator for one node
pub struct Snowflake<C: Clock = SystemClock> {
    node: u16,
    epoch_ms: i64,
    tolerance_ms: i64,
    clock: C,
    state: Mutex<State>,
}

impl Snowflake<SystemClock> {
    /// Generator on the system clock with the default epoch and 5ms skew tolerance
    pub fn new(node: u16) -> IdResult<Self> {
        Self::with_clock(node, DEFAULT_EPOCH_MS, 5, SystemClock)
    }
}

impl<C: Clock> Snowflake<C> {
    pub fn with_clock(node: u16, epoch_ms: i64, tolerance_ms: i64, clock: C) -> IdResult<Self> {
        if node > MAX_NODE {
            return Err(IdError::NodeOutOfRange(node));
        }

        let now_ms = clock.now_millis();
        if now_ms < epoch_ms {
            return Err(IdError::BeforeEpoch { now_ms, epoch_ms });
        }

        debug!("Snowflake generator ready: node {}, epoch {}ms", node, epoch_ms);

        Ok(Self {
            node,
            epoch_ms,
            tolerance_ms: tolerance_ms.max(0),
            clock,
            state: Mutex::new(State {
                last_ms: i64::MIN,
                sequence: 0,
            }),
        })
    }

    pub fn node(&self) -> u16 {
        self.node
    }

    /// Split an id minted with this generator's epoch into its components
    pub fn decompose(&self, id: Id) -> IdParts {
        let raw = id.as_u64();
        IdParts {
            timestamp_ms: (raw >> TIME_SHIFT) as i64 + self.epoch_ms,
            node: ((raw >> NODE_SHIFT) & MAX_NODE as u64) as u16,
            sequence: (raw & MAX_SEQUENCE as u64) as u16,
        }
    }

    fn compose(&self, now_ms: i64, sequence: u16) -> Id {
        let elapsed = (now_ms - self.epoch_ms) as u64;
        Id::from_raw((elapsed << TIME_SHIFT) | ((self.node as u64) << NODE_SHIFT) | sequence as u64)
    }

    /// Spin until the clock passes `last_ms`, bounded by the skew tolerance
    fn wait_next_millis(&self, last_ms: i64) -> IdResult<i64> {
        let budget = Duration::from_millis(self.tolerance_ms as u64 + 2);
        let started = Instant::now();

        loop {
            let now_ms = self.clock.now_millis();
            if now_ms > last_ms {
                return Ok(now_ms);
            }
            if started.elapsed() > budget {
                return Err(IdError::ClockStalled(last_ms));
            }
            std::thread::yield_now();
        }
    }
}

impl<C: Clock> IdGenerator for Snowflake<C> {
    fn generate(&self) -> IdResult<Id> {
        let mut state = self.state.lock();
        let mut now_ms = self.clock.now_millis();

        if now_ms < state.last_ms {
            let skew = state.last_ms - now_ms;
            if skew > self.tolerance_ms {
                return Err(IdError::ClockBackwards {
                    last_ms: state.last_ms,
                    now_ms,
                });
            }
            warn!("Clock moved backwards by {}ms, minting from last issued millisecond", skew);
            now_ms = state.last_ms;
        }

        let sequence = if now_ms == state.last_ms {
            let next = (state.sequence + 1) & MAX_SEQUENCE;
            if next == 0 {
                // State is untouched on failure, so the next call re-enters this branch
                now_ms = self.wait_next_millis(state.last_ms)?;
            }
            next
        } else {
            0
        };

        if now_ms < self.epoch_ms {
            return Err(IdError::BeforeEpoch {
                now_ms,
                epoch_ms: self.epoch_ms,
            });
        }

        state.last_ms = now_ms;
        state.sequence = sequence;

        Ok(self.compose(now_ms, sequence))
    }
}

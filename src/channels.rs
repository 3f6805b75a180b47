//! Playback channel allocation.
//!
//! A fixed pool of output channels, each busy until a known tick after it
//! is handed out. Acquisition scans round-robin from a rotating cursor so
//! load spreads across the pool, and never blocks: when every slot is busy
//! the caller gets `None` and decides whether to drop or retry.

use crate::clock::Tick;
use crate::{Error, Result};

/// Identifier of one playback channel, `0..pool_size`.
pub type ChannelId = usize;

#[derive(Debug)]
struct ChannelSlot {
    busy_until: Tick,
}

/// Fixed pool of playback channels with implicit expiry.
#[derive(Debug)]
pub struct ChannelPool {
    slots: Vec<ChannelSlot>,
    cursor: usize,
}

impl ChannelPool {
    /// Allocate a pool of `size` channels, all initially free.
    ///
    /// A zero-sized pool is a construction-time error, the one fatal
    /// condition in the engine.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("channel pool size must be nonzero".into()));
        }
        let slots = (0..size)
            .map(|_| ChannelSlot { busy_until: Tick::MIN })
            .collect();
        Ok(Self { slots, cursor: 0 })
    }

    /// Hand out the first free channel at `now`, marking it busy for
    /// `hold_ticks`, or `None` if the whole pool is busy.
    ///
    /// A slot is free once `now` has passed its `busy_until`; release is
    /// implicit. The cursor advances past the returned slot so consecutive
    /// acquisitions rotate through the pool.
    pub fn acquire(&mut self, now: Tick, hold_ticks: i64) -> Option<ChannelId> {
        for step in 0..self.slots.len() {
            let id = (self.cursor + step) % self.slots.len();
            if self.slots[id].busy_until <= now {
                self.slots[id].busy_until = now + hold_ticks.max(1);
                self.cursor = (id + 1) % self.slots.len();
                return Some(id);
            }
        }
        None
    }

    /// Channels still busy at `now`.
    pub fn busy_count(&self, now: Tick) -> usize {
        self.slots.iter().filter(|s| s.busy_until > now).count()
    }

    /// Total pool size.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

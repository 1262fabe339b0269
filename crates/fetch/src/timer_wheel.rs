//! Single-level timing wheel for many short-lived timers.
//!
//! The wheel has `2^b` slots, each covering one fixed `interval` of clock
//! ticks. Timers live in an arena and are addressed by [`TimerId`]; every
//! armed timer is a node of an index-linked list hanging off its slot, so
//! arming, cancelling and expiring a timer are all O(1) and never touch a
//! heap.
//!
//! ```text
//!   slots:  [0] [1] [2] [3] ... [N-1]
//!                 ▲
//!             last_slot          next_time = when slot last_slot+1 fires
//! ```
//!
//! A timer armed with `delay` goes `delay / interval + 1` slots ahead of
//! `last_slot`. Two slots are reserved as wrap-around slack, which gives a
//! representable range of [`TimerWheel::max_delay`].

use crate::error::{ConfigError, TimerError};

const NIL: usize = usize::MAX;

/// Smallest and largest supported slot-count exponents.
pub(crate) const MIN_SLOT_BITS: u32 = 2;
pub(crate) const MAX_SLOT_BITS: u32 = 24;

/// Handle of a timer registered with a [`TimerWheel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(usize);

#[derive(Debug)]
struct TimerNode<T> {
    payload: T,
    /// Slot the timer is linked into, `None` while unarmed.
    slot: Option<usize>,
    prev: usize,
    next: usize,
}

/// O(1) timing wheel carrying an opaque `T` payload per timer.
#[derive(Debug)]
pub struct TimerWheel<T> {
    nodes: Vec<TimerNode<T>>,
    heads: Vec<usize>,
    slot_mask: usize,
    interval: u64,
    last_slot: usize,
    next_time: u64,
    n_armed: usize,
}

impl<T: Copy> TimerWheel<T> {
    /// Creates a wheel with `2^slot_bits` slots of `interval` ticks each,
    /// whose clock starts at `now`.
    pub fn new(slot_bits: u32, interval: u64, now: u64) -> Result<Self, ConfigError> {
        if !(MIN_SLOT_BITS..=MAX_SLOT_BITS).contains(&slot_bits) {
            return Err(ConfigError::TimerSlots(slot_bits));
        }
        if interval == 0 {
            return Err(ConfigError::TimerInterval);
        }
        let n_slots = 1usize << slot_bits;
        Ok(Self {
            nodes: Vec::new(),
            heads: vec![NIL; n_slots],
            slot_mask: n_slots - 1,
            interval,
            last_slot: 0,
            next_time: now.saturating_add(interval),
            n_armed: 0,
        })
    }

    /// Largest delay, in ticks, that [`TimerWheel::arm`] is guaranteed to accept.
    ///
    /// `arm` rounds delays down to whole slots, so it also accepts every delay
    /// below `interval * (n_slots - 1)`. Callers should still stay within
    /// `max_delay`.
    pub fn max_delay(&self) -> u64 {
        self.interval * (self.heads.len() as u64 - 2)
    }

    /// Width of one slot in ticks.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Number of slots.
    pub fn n_slots(&self) -> usize {
        self.heads.len()
    }

    /// Number of currently armed timers.
    pub fn n_armed(&self) -> usize {
        self.n_armed
    }

    /// Registers a new, unarmed timer.
    pub fn insert(&mut self, payload: T) -> TimerId {
        self.nodes.push(TimerNode {
            payload,
            slot: None,
            prev: NIL,
            next: NIL,
        });
        TimerId(self.nodes.len() - 1)
    }

    pub fn payload(&self, timer: TimerId) -> Option<T> {
        self.nodes.get(timer.0).map(|node| node.payload)
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.nodes
            .get(timer.0)
            .is_some_and(|node| node.slot.is_some())
    }

    /// Schedules `timer` to fire `delay` ticks from the wheel's current slot.
    ///
    /// Any previous scheduling of the same timer is cancelled first. Delays
    /// up to `interval * (n_slots - 1) - 1` fit, a little past
    /// [`TimerWheel::max_delay`]. When the delay does not fit the timer is
    /// left unarmed.
    pub fn arm(&mut self, timer: TimerId, delay: u64) -> Result<(), TimerError> {
        if timer.0 >= self.nodes.len() {
            return Err(TimerError::UnknownTimer(timer.0));
        }
        self.cancel(timer);

        let n_slots_away = delay / self.interval + 1;
        if n_slots_away >= self.heads.len() as u64 {
            return Err(TimerError::DelayOutOfRange {
                delay,
                max_delay: self.max_delay(),
            });
        }

        let slot = (self.last_slot + n_slots_away as usize) & self.slot_mask;
        let head = self.heads[slot];
        if head != NIL {
            self.nodes[head].prev = timer.0;
        }
        let node = &mut self.nodes[timer.0];
        node.slot = Some(slot);
        node.prev = NIL;
        node.next = head;
        self.heads[slot] = timer.0;
        self.n_armed += 1;
        Ok(())
    }

    /// Unschedules `timer`. Cancelling an unarmed timer does nothing.
    pub fn cancel(&mut self, timer: TimerId) {
        let Some(node) = self.nodes.get_mut(timer.0) else {
            return;
        };
        let Some(slot) = node.slot.take() else {
            return;
        };
        let (prev, next) = (node.prev, node.next);
        node.prev = NIL;
        node.next = NIL;

        if prev == NIL {
            self.heads[slot] = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        }
        self.n_armed -= 1;
    }

    /// Steps the wheel up to `now`, calling `on_expire` for every timer whose
    /// slot comes due. Timers within one slot fire in no particular order.
    ///
    /// Returns the number of timers fired.
    pub fn advance(&mut self, now: u64, mut on_expire: impl FnMut(TimerId, T)) -> usize {
        let mut fired = 0;
        while self.next_time <= now {
            if self.n_armed == 0 {
                // Nothing to fire: jump straight to the slot covering `now`.
                let steps = (now - self.next_time) / self.interval + 1;
                self.last_slot = (self.last_slot + steps as usize) & self.slot_mask;
                self.next_time = self.next_time.saturating_add(steps * self.interval);
                break;
            }

            self.last_slot = (self.last_slot + 1) & self.slot_mask;
            self.next_time = self.next_time.saturating_add(self.interval);

            let mut cursor = std::mem::replace(&mut self.heads[self.last_slot], NIL);
            while cursor != NIL {
                let node = &mut self.nodes[cursor];
                let next = node.next;
                node.slot = None;
                node.prev = NIL;
                node.next = NIL;
                self.n_armed -= 1;
                fired += 1;
                on_expire(TimerId(cursor), node.payload);
                cursor = next;
            }
        }
        fired
    }
}

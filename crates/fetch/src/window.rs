//! Sliding window of in-progress segments.
//!
//! Segment numbers grow without bound while the window keeps a fixed,
//! power-of-two ring of per-segment state indexed by `seg_num & mask`. The
//! window spans `[lo, hi)`; segments inside the span are either live or
//! tombstoned. Deleting the lowest segment slides `lo` past every contiguous
//! tombstone, so slots are reclaimed lazily and in amortised O(1).

use crate::error::ConfigError;

/// Per-segment fetch state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub(crate) seg_num: u64,
    /// Time of the most recent transmission, in ticks.
    pub(crate) tx_time: u64,
    pub(crate) n_retx: u32,
    pub(crate) in_retx_queue: bool,
    pub(crate) deleted: bool,
}

impl Segment {
    fn reset(&mut self, seg_num: u64) {
        *self = Segment {
            seg_num,
            ..Segment::default()
        };
    }

    pub fn seg_num(&self) -> u64 {
        self.seg_num
    }

    pub fn tx_time(&self) -> u64 {
        self.tx_time
    }

    /// How many times this segment was retransmitted.
    pub fn n_retx(&self) -> u32 {
        self.n_retx
    }

    /// Whether the segment is waiting in the retransmission queue.
    pub fn is_retx_queued(&self) -> bool {
        self.in_retx_queue
    }
}

#[derive(Debug, Clone)]
pub struct SegmentWindow {
    segments: Vec<Segment>,
    mask: u64,
    lo: u64,
    hi: u64,
}

impl SegmentWindow {
    /// Creates an empty window starting at segment 0.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        Self::starting_at(capacity, 0)
    }

    /// Creates an empty window whose first appended segment is `first`.
    pub fn starting_at(capacity: usize, first: u64) -> Result<Self, ConfigError> {
        if !capacity.is_power_of_two() {
            return Err(ConfigError::WindowCapacity(capacity));
        }
        let tombstone = Segment {
            deleted: true,
            ..Segment::default()
        };
        Ok(Self {
            segments: vec![tombstone; capacity],
            mask: capacity as u64 - 1,
            lo: first,
            hi: first,
        })
    }

    pub fn capacity(&self) -> usize {
        self.segments.len()
    }

    /// Lowest segment number still tracked (inclusive).
    pub fn lo(&self) -> u64 {
        self.lo
    }

    /// Next segment number to be appended (exclusive upper bound).
    pub fn hi(&self) -> u64 {
        self.hi
    }

    /// Width of the span `[lo, hi)`, tombstones included.
    pub fn span(&self) -> usize {
        (self.hi - self.lo) as usize
    }

    pub fn is_full(&self) -> bool {
        self.span() == self.capacity()
    }

    /// Ring slot holding `seg_num`. Stable for the segment's whole lifetime.
    pub fn slot_of(&self, seg_num: u64) -> usize {
        (seg_num & self.mask) as usize
    }

    pub fn contains(&self, seg_num: u64) -> bool {
        self.get(seg_num).is_some()
    }

    pub fn get(&self, seg_num: u64) -> Option<&Segment> {
        if seg_num < self.lo || seg_num >= self.hi {
            return None;
        }
        let seg = &self.segments[self.slot_of(seg_num)];
        (!seg.deleted).then_some(seg)
    }

    pub fn get_mut(&mut self, seg_num: u64) -> Option<&mut Segment> {
        if seg_num < self.lo || seg_num >= self.hi {
            return None;
        }
        let slot = self.slot_of(seg_num);
        let seg = &mut self.segments[slot];
        (!seg.deleted).then_some(seg)
    }

    /// Live segment stored in `slot`, if any.
    pub fn at_slot(&self, slot: usize) -> Option<&Segment> {
        self.segments.get(slot).filter(|seg| !seg.deleted)
    }

    /// Starts tracking segment `hi`. Returns `None` when the window is full.
    pub fn append(&mut self) -> Option<&mut Segment> {
        if self.is_full() {
            return None;
        }
        let seg_num = self.hi;
        self.hi += 1;
        let slot = self.slot_of(seg_num);
        let seg = &mut self.segments[slot];
        seg.reset(seg_num);
        Some(seg)
    }

    /// Tombstones `seg_num`. Returns `false` if it was not in the window.
    pub fn delete(&mut self, seg_num: u64) -> bool {
        let Some(seg) = self.get_mut(seg_num) else {
            return false;
        };
        seg.deleted = true;

        if seg_num == self.lo {
            while self.lo < self.hi && self.segments[self.slot_of(self.lo)].deleted {
                self.lo += 1;
            }
        }
        true
    }

    /// Live segments in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> + '_ {
        (self.lo..self.hi).filter_map(|seg_num| self.get(seg_num))
    }
}

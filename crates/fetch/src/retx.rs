//! FIFO of segments whose RTO expired and that wait to be requested again.
//!
//! The queue stores segment numbers; membership itself is the
//! `in_retx_queue` flag on the [`Segment`](crate::window::Segment). Removing
//! a segment only clears its flag and the stale entry is skipped when it
//! reaches the front, which keeps removal O(1).

use std::collections::VecDeque;

use crate::window::SegmentWindow;

/// Compact once stale entries outnumber live ones by this much.
const COMPACT_SLACK: usize = 64;

#[derive(Debug, Default)]
pub struct RetxQueue {
    entries: VecDeque<u64>,
    n_live: usize,
}

impl RetxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments waiting for retransmission.
    pub fn len(&self) -> usize {
        self.n_live
    }

    pub fn is_empty(&self) -> bool {
        self.n_live == 0
    }

    /// Appends `seg_num` at the tail. Returns `false` if the segment is not
    /// in the window or already queued.
    pub fn push_back(&mut self, window: &mut SegmentWindow, seg_num: u64) -> bool {
        let Some(seg) = window.get_mut(seg_num) else {
            return false;
        };
        if seg.in_retx_queue {
            return false;
        }
        seg.in_retx_queue = true;
        self.entries.push_back(seg_num);
        self.n_live += 1;
        true
    }

    /// Takes `seg_num` out of the queue, wherever it is.
    pub fn remove(&mut self, window: &mut SegmentWindow, seg_num: u64) -> bool {
        let Some(seg) = window.get_mut(seg_num) else {
            return false;
        };
        if !seg.in_retx_queue {
            return false;
        }
        seg.in_retx_queue = false;
        self.n_live -= 1;

        if self.entries.len() > 2 * self.n_live + COMPACT_SLACK {
            self.entries.retain(|&n| is_queued(window, n));
        }
        true
    }

    /// Pops the oldest queued segment.
    pub fn pop_front(&mut self, window: &mut SegmentWindow) -> Option<u64> {
        while let Some(seg_num) = self.entries.pop_front() {
            if let Some(seg) = window.get_mut(seg_num).filter(|seg| seg.in_retx_queue) {
                seg.in_retx_queue = false;
                self.n_live -= 1;
                return Some(seg_num);
            }
        }
        None
    }
}

fn is_queued(window: &SegmentWindow, seg_num: u64) -> bool {
    window.get(seg_num).is_some_and(|seg| seg.in_retx_queue)
}

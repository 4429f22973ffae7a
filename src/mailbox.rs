//! Single-slot, latest-wins mailbox for frames from many concurrent
//! producers. No ordering is preserved across producers; the slot holds at
//! most one frame, discarding any unconsumed prior value on overwrite.

use std::sync::Mutex;

use crate::frame::PixelFrame;

/// Why a `submit` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DimensionMismatch { expected: (usize, usize), got: (usize, usize) },
}

/// A monotonically increasing tag assigned to each accepted frame, so
/// consumers can tell two `take()` results apart even if the pixels match.
pub type Tag = u64;

struct Slot {
    frame: Option<(PixelFrame, Tag)>,
    next_tag: Tag,
}

/// The mailbox. Cheap to share behind an `Arc` — its critical section
/// covers only the pointer/ownership swap.
pub struct Mailbox {
    slot: Mutex<Slot>,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox {
            slot: Mutex::new(Slot { frame: None, next_tag: 0 }),
        }
    }

    /// Submit a frame for display. Rejected only on a dimension mismatch
    /// against `expected_dimensions` (the active layout's canvas size);
    /// otherwise overwrites whatever was pending.
    pub fn submit(
        &self,
        frame: PixelFrame,
        expected_dimensions: (usize, usize),
    ) -> Result<(), RejectReason> {
        let got = frame.dimensions();
        if got != expected_dimensions {
            return Err(RejectReason::DimensionMismatch {
                expected: expected_dimensions,
                got,
            });
        }

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let tag = slot.next_tag;
        slot.next_tag = slot.next_tag.wrapping_add(1);
        slot.frame = Some((frame, tag));
        Ok(())
    }

    /// Take the pending frame, if any, emptying the slot. Non-blocking.
    pub fn take(&self) -> Option<(PixelFrame, Tag)> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.frame.take()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: usize, h: usize, fill: (u8, u8, u8)) -> PixelFrame {
        PixelFrame::new(w, h, vec![fill; w * h])
    }

    #[test]
    fn latest_wins_across_two_submits() {
        let mailbox = Mailbox::new();
        mailbox.submit(frame(2, 2, (1, 0, 0)), (2, 2)).unwrap();
        mailbox.submit(frame(2, 2, (2, 0, 0)), (2, 2)).unwrap();

        let (taken, _) = mailbox.take().unwrap();
        assert_eq!(taken.pixel(0), (2, 0, 0));
    }

    #[test]
    fn take_empties_the_slot() {
        let mailbox = Mailbox::new();
        mailbox.submit(frame(1, 1, (5, 5, 5)), (1, 1)).unwrap();
        assert!(mailbox.take().is_some());
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn dimension_mismatch_is_rejected_without_overwriting() {
        let mailbox = Mailbox::new();
        mailbox.submit(frame(2, 2, (9, 9, 9)), (2, 2)).unwrap();
        let err = mailbox.submit(frame(3, 3, (1, 1, 1)), (2, 2)).unwrap_err();
        assert_eq!(
            err,
            RejectReason::DimensionMismatch { expected: (2, 2), got: (3, 3) }
        );
        // Prior accepted frame is untouched.
        let (taken, _) = mailbox.take().unwrap();
        assert_eq!(taken.pixel(0), (9, 9, 9));
    }

    #[test]
    fn tags_increase_monotonically() {
        let mailbox = Mailbox::new();
        mailbox.submit(frame(1, 1, (0, 0, 0)), (1, 1)).unwrap();
        let (_, tag1) = mailbox.take().unwrap();
        mailbox.submit(frame(1, 1, (0, 0, 0)), (1, 1)).unwrap();
        let (_, tag2) = mailbox.take().unwrap();
        assert!(tag2 > tag1);
    }
}

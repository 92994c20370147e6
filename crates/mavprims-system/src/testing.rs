use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mavprims_frame::Frame;

use crate::clock::ManualClock;
use crate::sender::FrameSender;

/// Captures outbound frames with the manual-clock time they were sent.
pub(crate) struct RecordingSender {
    clock: Arc<ManualClock>,
    frames: Mutex<Vec<(Duration, Frame)>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn frames(&self) -> Vec<(Duration, Frame)> {
        self.frames.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, message_id: u32) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, frame)| frame.message_id == message_id)
            .count()
    }

    /// Make every later send report failure without recording.
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl FrameSender for RecordingSender {
    fn send_frame(&self, frame: Frame) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.frames
            .lock()
            .unwrap()
            .push((self.clock.elapsed(), frame));
        true
    }
}

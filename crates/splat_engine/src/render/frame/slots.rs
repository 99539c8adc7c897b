//! Host-side view of the frame slots

use super::FRAMES_IN_FLIGHT;

/// Lifecycle of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Fence observed; host may write the slot's buffers
    Idle,
    /// Command recording in progress
    Recording,
    /// Work handed to the queue; fence not yet observed
    Submitted,
}

/// Round-robin slot cursor plus per-slot state
#[derive(Debug, Clone)]
pub struct FrameSlots {
    states: [SlotState; FRAMES_IN_FLIGHT],
    waited: [bool; FRAMES_IN_FLIGHT],
    current: usize,
    frame_number: u64,
}

impl Default for FrameSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlots {
    /// All slots idle, none waited yet
    pub fn new() -> Self {
        Self {
            states: [SlotState::Idle; FRAMES_IN_FLIGHT],
            waited: [false; FRAMES_IN_FLIGHT],
            current: 0,
            frame_number: 0,
        }
    }

    /// Slot the next frame uses
    pub fn current(&self) -> usize {
        self.current
    }

    /// Frames started so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// State of `slot`
    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    /// True when the host may overwrite the slot's per-frame buffers
    pub fn is_writable(&self, slot: usize) -> bool {
        self.waited[slot] && self.states[slot] == SlotState::Idle
    }

    /// The slot's fence has signaled
    pub fn mark_waited(&mut self, slot: usize) {
        self.waited[slot] = true;
        self.states[slot] = SlotState::Idle;
    }

    /// Recording starts; the slot must be writable
    pub fn begin_recording(&mut self, slot: usize) {
        debug_assert!(self.is_writable(slot), "slot {slot} recorded before its fence wait");
        self.states[slot] = SlotState::Recording;
    }

    /// Recording handed to the queue
    pub fn mark_submitted(&mut self, slot: usize) {
        debug_assert_eq!(self.states[slot], SlotState::Recording);
        self.states[slot] = SlotState::Submitted;
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % FRAMES_IN_FLIGHT;
        self.frame_number += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let mut slots = FrameSlots::new();
        let sequence: Vec<usize> = (0..5)
            .map(|_| {
                let slot = slots.current();
                slots.advance();
                slot
            })
            .collect();
        assert_eq!(sequence, vec![0, 1, 0, 1, 0]);
        assert_eq!(slots.frame_number(), 5);
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slots = FrameSlots::new();
        assert!(!slots.is_writable(0));

        slots.mark_waited(0);
        assert!(slots.is_writable(0));
        slots.begin_recording(0);
        assert_eq!(slots.state(0), SlotState::Recording);
        slots.mark_submitted(0);
        assert_eq!(slots.state(0), SlotState::Submitted);
        assert!(!slots.is_writable(0));

        slots.mark_waited(0);
        assert_eq!(slots.state(0), SlotState::Idle);
        assert!(!slots.is_writable(1));
    }
}

//! Input handling for the TI-99/4A.
//!
//! Provides a timed input queue for scripted key sequences. Events are
//! matrix coordinates, not scancodes; mapping host keys onto the matrix
//! is the shell's job.

use std::collections::VecDeque;

/// A timed key event addressed by matrix position.
#[derive(Debug, Clone)]
pub struct InputEvent {
    /// Frame number at which this event fires.
    pub frame: u64,
    /// Matrix column (0-7).
    pub column: u8,
    /// Matrix row (0-7).
    pub row: u8,
    /// True = key-down, false = key-up.
    pub pressed: bool,
}

/// Timed input queue for scripted key sequences.
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    /// Enqueue a raw input event.
    pub fn push(&mut self, event: InputEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.frame > event.frame)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Enqueue a key press and release.
    pub fn enqueue_key(&mut self, column: u8, row: u8, at_frame: u64, hold_frames: u64) {
        self.push(InputEvent {
            frame: at_frame,
            column,
            row,
            pressed: true,
        });
        self.push(InputEvent {
            frame: at_frame + hold_frames,
            column,
            row,
            pressed: false,
        });
    }

    /// Process all events for the given frame.
    pub fn process<F: FnMut(u8, u8, bool)>(&mut self, frame: u64, mut emit: F) {
        while let Some(event) = self.events.front() {
            if event.frame > frame {
                break;
            }
            let event = self.events.pop_front().expect("front was Some");
            emit(event.column, event.row, event.pressed);
        }
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_in_frame_order() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent {
            frame: 10,
            column: 1,
            row: 2,
            pressed: true,
        });
        queue.push(InputEvent {
            frame: 5,
            column: 3,
            row: 4,
            pressed: true,
        });

        let mut fired = Vec::new();
        queue.process(5, |column, row, pressed| fired.push((column, row, pressed)));
        assert_eq!(fired, vec![(3, 4, true)]);

        queue.process(10, |column, row, pressed| fired.push((column, row, pressed)));
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1], (1, 2, true));
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_key_adds_press_and_release() {
        let mut queue = InputQueue::new();
        queue.enqueue_key(2, 5, 100, 3);
        assert_eq!(queue.len(), 2);

        let mut fired = Vec::new();
        queue.process(103, |column, row, pressed| fired.push((column, row, pressed)));
        assert_eq!(fired, vec![(2, 5, true), (2, 5, false)]);
    }

    #[test]
    fn future_events_stay_queued() {
        let mut queue = InputQueue::new();
        queue.enqueue_key(0, 0, 50, 2);
        let mut fired = Vec::new();
        queue.process(49, |_, _, _| fired.push(()));
        assert!(fired.is_empty());
        assert_eq!(queue.len(), 2);
    }
}

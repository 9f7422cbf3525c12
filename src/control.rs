//! Control state shared between the tracking updates and the frame loop.
//!
//! The tracking side publishes a complete [`ControlState`] per update; the
//! frame loop takes one copy per frame. A field's position and activity are
//! therefore always observed together.

use std::sync::Arc;

use cgmath::prelude::*;
use parking_lot::Mutex;

/// One-shot outward impulse source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepelField {
    pub position: cgmath::Vector3<f32>,
    /// Marker visibility; does not gate the kernel.
    pub visible: bool,
    /// Number of times the field has fired. A change between two polls is
    /// one repel event.
    pub pulse: u64,
}

/// Continuous pull towards a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttractField {
    pub position: cgmath::Vector3<f32>,
    pub active: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub repel: RepelField,
    pub attract: AttractField,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            repel: RepelField {
                position: cgmath::Vector3::zero(),
                visible: false,
                pulse: 0,
            },
            attract: AttractField {
                position: cgmath::Vector3::zero(),
                active: false,
                visible: false,
            },
        }
    }
}

impl ControlState {
    /// Deactivate and hide both fields. The pulse counter is kept so a stale
    /// event is never replayed.
    pub fn clear(&mut self) {
        self.repel.visible = false;
        self.attract.active = false;
        self.attract.visible = false;
    }
}

/// Create a connected publisher / reader pair.
pub fn channel() -> (ControlPublisher, ControlReader) {
    let shared = Arc::new(Mutex::new(ControlState::default()));
    (
        ControlPublisher {
            shared: Arc::clone(&shared),
        },
        ControlReader {
            shared,
            last_pulse: 0,
        },
    )
}

/// Writing half, owned by the tracking side.
#[derive(Debug)]
pub struct ControlPublisher {
    shared: Arc<Mutex<ControlState>>,
}

impl ControlPublisher {
    pub fn publish(&self, state: ControlState) {
        *self.shared.lock() = state;
    }
}

/// What the frame loop should do this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameControl {
    pub state: ControlState,
    /// The repel field fired since the previous poll.
    pub repel_fired: bool,
}

/// Reading half, owned by the frame loop.
#[derive(Debug)]
pub struct ControlReader {
    shared: Arc<Mutex<ControlState>>,
    last_pulse: u64,
}

impl ControlReader {
    /// Take the latest snapshot. Any number of repel events published since
    /// the previous poll collapse into one.
    pub fn poll(&mut self) -> FrameControl {
        let state = *self.shared.lock();
        let repel_fired = state.repel.pulse != self.last_pulse;
        self.last_pulse = state.repel.pulse;
        FrameControl { state, repel_fired }
    }

    /// Latest snapshot without consuming a pending repel event.
    pub fn peek(&self) -> ControlState {
        *self.shared.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn fresh_channel_is_idle() {
        let (_publisher, mut reader) = channel();
        let frame = reader.poll();
        assert!(!frame.repel_fired);
        assert!(!frame.state.attract.active);
    }

    #[test]
    fn repel_event_is_seen_once() {
        let (publisher, mut reader) = channel();
        let mut state = ControlState::default();
        state.repel.pulse = 1;
        state.repel.position = cgmath::vec3(1.0, -1.0, 2.0);
        publisher.publish(state);

        let frame = reader.poll();
        assert!(frame.repel_fired);
        assert_eq!(frame.state.repel.position, cgmath::vec3(1.0, -1.0, 2.0));
        assert!(!reader.poll().repel_fired);
    }

    #[test]
    fn bursts_collapse_into_one_event() {
        let (publisher, mut reader) = channel();
        let mut state = ControlState::default();
        for pulse in 1..=3 {
            state.repel.pulse = pulse;
            publisher.publish(state);
        }
        assert!(reader.poll().repel_fired);
        assert!(!reader.poll().repel_fired);
        assert_eq!(reader.peek().repel.pulse, 3);
    }

    #[test]
    fn clear_keeps_pulse() {
        let mut state = ControlState::default();
        state.repel.pulse = 7;
        state.repel.visible = true;
        state.attract.active = true;
        state.attract.visible = true;
        state.clear();
        assert_eq!(state.repel.pulse, 7);
        assert!(!state.repel.visible);
        assert!(!state.attract.active);
        assert!(!state.attract.visible);
    }

    #[test]
    fn snapshots_are_never_torn() {
        let (publisher, mut reader) = channel();
        let writer = thread::spawn(move || {
            for i in 0..10_000u32 {
                let value = i as f32;
                publisher.publish(ControlState {
                    repel: RepelField {
                        position: cgmath::vec3(value, value, value),
                        visible: true,
                        pulse: u64::from(i),
                    },
                    attract: AttractField {
                        position: cgmath::vec3(value, value, value),
                        active: i % 2 == 0,
                        visible: i % 2 == 0,
                    },
                });
            }
        });

        for _ in 0..10_000 {
            let state = reader.poll().state;
            assert_eq!(state.repel.position, state.attract.position);
            assert_eq!(state.attract.active, state.attract.visible);
            if state.repel.visible {
                assert_eq!(state.repel.position.x as u64, state.repel.pulse);
            }
        }
        writer.join().unwrap();
    }
}

//! Visual feedback for the two force fields: a pulsing orb at each field's
//! position while it is visible.

use crate::control::ControlState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub color: [u8; 3],
    /// Animation phase advance per second.
    pub rate: f32,
    pub scale_swing: f32,
    pub opacity_base: f32,
    pub opacity_rate: f32,
}

pub const REPEL_MARKER: MarkerStyle = MarkerStyle {
    color: [0x00, 0xaa, 0xff],
    rate: 5.0,
    scale_swing: 0.3,
    opacity_base: 0.5,
    opacity_rate: 0.5,
};

pub const ATTRACT_MARKER: MarkerStyle = MarkerStyle {
    color: [0x00, 0xff, 0x66],
    rate: 8.0,
    scale_swing: 0.4,
    opacity_base: 0.6,
    opacity_rate: 0.6,
};

/// Base orb radius in world units.
pub const MARKER_RADIUS: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub position: cgmath::Vector3<f32>,
    pub style: MarkerStyle,
    pub scale: f32,
    pub opacity: f32,
}

impl MarkerStyle {
    fn animate(&self, position: cgmath::Vector3<f32>, seconds: f32) -> Marker {
        let phase = seconds * self.rate;
        Marker {
            position,
            style: *self,
            scale: 1.0 + phase.sin() * self.scale_swing,
            opacity: self.opacity_base + (1.0 - self.opacity_base) * (phase * self.opacity_rate).sin().abs(),
        }
    }
}

/// Markers for the currently visible fields at time `seconds`.
pub fn markers(state: &ControlState, seconds: f32) -> Vec<Marker> {
    let mut markers = Vec::with_capacity(2);
    if state.repel.visible {
        markers.push(REPEL_MARKER.animate(state.repel.position, seconds));
    }
    if state.attract.visible {
        markers.push(ATTRACT_MARKER.animate(state.attract.position, seconds));
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_fields_have_no_marker() {
        assert!(markers(&ControlState::default(), 1.0).is_empty());
    }

    #[test]
    fn markers_pulse_within_bounds() {
        let mut state = ControlState::default();
        state.repel.visible = true;
        state.attract.visible = true;

        for step in 0..200 {
            let seconds = step as f32 * 0.05;
            let visible = markers(&state, seconds);
            assert_eq!(visible.len(), 2);

            let repel = visible[0];
            assert!((0.69..=1.31).contains(&repel.scale));
            assert!((0.49..=1.01).contains(&repel.opacity));

            let attract = visible[1];
            assert!((0.59..=1.41).contains(&attract.scale));
            assert!((0.59..=1.01).contains(&attract.opacity));
        }
    }
}

//! Hand observations and the open-hand classifier.

use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// HAND LANDMARK INDICES (21-point hand model)
// ============================================================================

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// (tip, lower joint) per digit, thumb first.
pub const DIGITS: [(usize, usize); 5] = [
    (THUMB_TIP, THUMB_MCP),
    (INDEX_TIP, INDEX_PIP),
    (MIDDLE_TIP, MIDDLE_PIP),
    (RING_TIP, RING_PIP),
    (PINKY_TIP, PINKY_PIP),
];

const PALM_WRIST_WEIGHT: f32 = 0.4;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Normalized image coordinates: `x`, `y` in `[0, 1]` with `y` pointing down,
/// `z` relative depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec3(self) -> cgmath::Vector3<f32> {
        cgmath::vec3(self.x, self.y, self.z)
    }
}

/// Handedness label as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One tracked hand from one tracking update.
#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub handedness: Handedness,
    /// Detector confidence for this hand.
    pub score: f32,
}

impl HandObservation {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT], handedness: Handedness) -> Self {
        Self {
            landmarks,
            handedness,
            score: 1.0,
        }
    }

    /// Build an observation from a landmark list of unchecked length.
    pub fn from_slice(landmarks: &[Landmark], handedness: Handedness, score: f32) -> Result<Self> {
        let landmarks: [Landmark; LANDMARK_COUNT] = landmarks
            .try_into()
            .map_err(|_| Error::LandmarkCount {
                found: landmarks.len(),
            })?;
        Ok(Self {
            landmarks,
            handedness,
            score,
        })
    }

    pub fn wrist(&self) -> Landmark {
        self.landmarks[WRIST]
    }
}

/// Gesture derived from a single observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    pub is_open: bool,
    pub palm_center: cgmath::Vector3<f32>,
    /// Screen-normalized wrist position.
    pub wrist: cgmath::Vector2<f32>,
}

impl GestureState {
    pub fn palm_anchor(&self) -> cgmath::Vector2<f32> {
        self.palm_center.truncate()
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// A digit counts as extended when its tip is above its lower joint on screen.
///
/// Only meaningful for a roughly upright hand facing the camera; a sideways
/// or inverted hand is misclassified.
pub fn is_extended(landmarks: &[Landmark; LANDMARK_COUNT], tip: usize, joint: usize) -> bool {
    landmarks[tip].y < landmarks[joint].y
}

pub fn is_open(landmarks: &[Landmark; LANDMARK_COUNT]) -> bool {
    DIGITS
        .iter()
        .all(|&(tip, joint)| is_extended(landmarks, tip, joint))
}

/// Palm centre, weighted towards the base of the middle finger.
pub fn palm_center(landmarks: &[Landmark; LANDMARK_COUNT]) -> cgmath::Vector3<f32> {
    let wrist = landmarks[WRIST].to_vec3();
    let middle_base = landmarks[MIDDLE_MCP].to_vec3();
    wrist.lerp(middle_base, 1.0 - PALM_WRIST_WEIGHT)
}

pub fn classify(observation: &HandObservation) -> GestureState {
    let landmarks = &observation.landmarks;
    let wrist = observation.wrist();
    GestureState {
        is_open: is_open(landmarks),
        palm_center: palm_center(landmarks),
        wrist: cgmath::vec2(wrist.x, wrist.y),
    }
}

// ============================================================================
// SYNTHETIC POSES
// ============================================================================

/// Landmarks of an upright hand with every digit extended, wrist at `(x, y)`.
pub fn open_hand(x: f32, y: f32) -> [Landmark; LANDMARK_COUNT] {
    let mut landmarks = [Landmark::new(x, y, 0.0); LANDMARK_COUNT];
    for (digit, &(tip, joint)) in DIGITS.iter().enumerate() {
        let dx = (digit as f32 - 2.0) * 0.02;
        // Joints on the way up the digit: base, joint, next, tip.
        let base = tip - 3;
        for (step, index) in (base..=tip).enumerate() {
            landmarks[index] = Landmark::new(x + dx, y - 0.03 * (step as f32 + 1.0), 0.0);
        }
        debug_assert!(landmarks[tip].y < landmarks[joint].y);
    }
    landmarks
}

/// Landmarks of a fist: every fingertip folded back below its joint.
pub fn closed_hand(x: f32, y: f32) -> [Landmark; LANDMARK_COUNT] {
    let mut landmarks = open_hand(x, y);
    for &(tip, joint) in DIGITS.iter() {
        landmarks[tip].y = landmarks[joint].y + 0.01;
    }
    landmarks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_digits_up_is_open() {
        let landmarks = open_hand(0.5, 0.7);
        assert!(is_open(&landmarks));
        for &(tip, joint) in DIGITS.iter() {
            assert!(is_extended(&landmarks, tip, joint));
        }
    }

    #[test]
    fn any_folded_digit_is_closed() {
        for &(tip, joint) in DIGITS.iter() {
            let mut landmarks = open_hand(0.5, 0.7);
            landmarks[tip].y = landmarks[joint].y + 0.05;
            assert!(!is_open(&landmarks), "digit tip {tip} folded");
        }
        assert!(!is_open(&closed_hand(0.5, 0.7)));
    }

    #[test]
    fn tip_level_with_joint_is_not_extended() {
        let mut landmarks = open_hand(0.5, 0.7);
        landmarks[INDEX_TIP].y = landmarks[INDEX_PIP].y;
        assert!(!is_extended(&landmarks, INDEX_TIP, INDEX_PIP));
    }

    #[test]
    fn palm_center_weights_middle_base() {
        let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
        landmarks[WRIST] = Landmark::new(0.0, 1.0, 0.0);
        landmarks[MIDDLE_MCP] = Landmark::new(1.0, 0.0, 0.5);

        let center = palm_center(&landmarks);
        assert!((center.x - 0.6).abs() < 1e-6);
        assert!((center.y - 0.4).abs() < 1e-6);
        assert!((center.z - 0.3).abs() < 1e-6);
    }

    #[test]
    fn classify_reports_wrist_and_palm() {
        let observation = HandObservation::new(open_hand(0.3, 0.4), Handedness::Left);
        let gesture = classify(&observation);
        assert!(gesture.is_open);
        assert_eq!(gesture.wrist, cgmath::vec2(0.3, 0.4));
        assert!(gesture.palm_anchor().y < 0.4);
    }

    #[test]
    fn wrong_landmark_count_is_rejected() {
        let landmarks = vec![Landmark::default(); 20];
        assert!(matches!(
            HandObservation::from_slice(&landmarks, Handedness::Right, 0.9),
            Err(Error::LandmarkCount { found: 20 })
        ));

        let landmarks = open_hand(0.5, 0.5);
        let observation = HandObservation::from_slice(&landmarks, Handedness::Right, 0.9).unwrap();
        assert_eq!(observation.score, 0.9);
    }
}

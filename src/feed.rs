//! Tracking input sources.
//!
//! Hand tracking itself happens outside this crate. Frames arrive either as
//! JSON lines recorded from a tracker or from a scripted synthetic hand used
//! for demos and soak runs.

use std::{collections::HashSet, io::BufRead};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::TrackerOptions,
    error::Result,
    hand::{HandObservation, Handedness, LANDMARK_COUNT, Landmark, closed_hand, open_hand},
};

/// One tracking update as serialized by a tracker bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub hands: Vec<HandRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandRecord {
    pub handedness: Handedness,
    #[serde(default = "full_confidence")]
    pub score: f32,
    pub landmarks: Vec<Landmark>,
}

fn full_confidence() -> f32 {
    1.0
}

impl From<&HandObservation> for HandRecord {
    fn from(observation: &HandObservation) -> Self {
        Self {
            handedness: observation.handedness,
            score: observation.score,
            landmarks: observation.landmarks.to_vec(),
        }
    }
}

/// Parse one JSON line into observations.
pub fn parse_frame(line: &str) -> Result<Vec<HandObservation>> {
    let record: FrameRecord = serde_json::from_str(line)?;
    record
        .hands
        .iter()
        .map(|hand| HandObservation::from_slice(&hand.landmarks, hand.handedness, hand.score))
        .collect()
}

/// Serialize observations as one JSON line (without the newline).
pub fn format_frame(observations: &[HandObservation]) -> Result<String> {
    let record = FrameRecord {
        hands: observations.iter().map(HandRecord::from).collect(),
    };
    Ok(serde_json::to_string(&record)?)
}

/// Iterate over the frames of a JSON-lines stream.
///
/// Blank lines are skipped; malformed lines are logged and skipped, so a
/// damaged recording never stops the caller.
pub fn read_frames<R: BufRead>(reader: R) -> impl Iterator<Item = Vec<HandObservation>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => match parse_frame(&line) {
                Ok(observations) => Some(observations),
                Err(e) => {
                    log::warn!("Skipping tracking frame on line {}: {}", index + 1, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read tracking line {}: {}", index + 1, e);
                None
            }
        })
}

/// Drops hands below the tracker's confidence thresholds.
///
/// A hand seen in the previous update is judged against the tracking
/// threshold, a newly appearing one against the detection threshold.
pub struct ConfidenceGate {
    options: TrackerOptions,
    tracked: HashSet<Handedness>,
}

impl ConfidenceGate {
    pub fn new(options: TrackerOptions) -> Self {
        Self {
            options,
            tracked: HashSet::new(),
        }
    }

    pub fn set_options(&mut self, options: TrackerOptions) {
        self.options = options;
    }

    pub fn filter(&mut self, observations: Vec<HandObservation>) -> Vec<HandObservation> {
        let accepted: Vec<HandObservation> = observations
            .into_iter()
            .filter(|hand| {
                let threshold = if self.tracked.contains(&hand.handedness) {
                    self.options.min_tracking_confidence
                } else {
                    self.options.min_detection_confidence
                };
                hand.score >= threshold
            })
            .take(self.options.max_num_hands)
            .collect();

        self.tracked = accepted.iter().map(|hand| hand.handedness).collect();
        accepted
    }
}

// ============================================================================
// SYNTHETIC HANDS
// ============================================================================

/// Length of the scripted demo loop, in tracking updates.
pub const SCRIPT_LENGTH: u64 = 360;

/// Scripted two-hand performance with a little landmark noise.
///
/// Per loop: no hands, then the attract hand circles open, then the repel
/// hand opens twice with a fist in between, then both hands rest closed.
pub struct SyntheticHands {
    rng: StdRng,
    frame: u64,
    noise: f32,
}

impl SyntheticHands {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            frame: 0,
            noise: 0.003,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.abs();
        self
    }

    fn hand(&mut self, landmarks: [Landmark; LANDMARK_COUNT], handedness: Handedness) -> HandObservation {
        let mut landmarks = landmarks;
        if self.noise > 0.0 {
            for landmark in landmarks.iter_mut() {
                landmark.x += self.rng.gen_range(-self.noise..=self.noise);
                landmark.y += self.rng.gen_range(-self.noise..=self.noise);
            }
        }
        let mut observation = HandObservation::new(landmarks, handedness);
        observation.score = self.rng.gen_range(0.6..=1.0);
        observation
    }
}

impl Iterator for SyntheticHands {
    type Item = Vec<HandObservation>;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.frame % SCRIPT_LENGTH;
        self.frame += 1;

        let frame = match t {
            0..60 => Vec::new(),
            60..180 => {
                let angle = (t - 60) as f32 / 120.0 * std::f32::consts::TAU;
                let (x, y) = (0.5 + 0.2 * angle.cos(), 0.6 + 0.1 * angle.sin());
                vec![self.hand(open_hand(x, y), Handedness::Right)]
            }
            180..200 | 240..260 => vec![self.hand(open_hand(0.3, 0.4), Handedness::Left)],
            200..240 => vec![self.hand(closed_hand(0.3, 0.4), Handedness::Left)],
            _ => vec![
                self.hand(closed_hand(0.3, 0.5), Handedness::Left),
                self.hand(closed_hand(0.7, 0.5), Handedness::Right),
            ],
        };
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::hand::is_open;

    #[test]
    fn frames_round_trip_through_json() {
        let hands = vec![
            HandObservation::new(open_hand(0.3, 0.4), Handedness::Left),
            HandObservation::new(closed_hand(0.6, 0.5), Handedness::Right),
        ];
        let line = format_frame(&hands).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(parse_frame(&line).unwrap(), hands);
    }

    #[test]
    fn reader_skips_bad_lines() {
        let good = format_frame(&[HandObservation::new(open_hand(0.5, 0.5), Handedness::Right)]).unwrap();
        let short = r#"{"hands":[{"handedness":"Left","landmarks":[{"x":0.1,"y":0.2}]}]}"#;
        let input = format!("{good}\n\nnot json\n{short}\n{{}}\n{good}\n");

        let frames: Vec<_> = read_frames(Cursor::new(input)).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 1);
        assert!(frames[1].is_empty());
        assert_eq!(frames[2][0].handedness, Handedness::Right);
    }

    #[test]
    fn missing_score_defaults_to_full_confidence() {
        let mut landmarks = String::from("[");
        for i in 0..LANDMARK_COUNT {
            if i > 0 {
                landmarks.push(',');
            }
            landmarks.push_str(r#"{"x":0.5,"y":0.5}"#);
        }
        landmarks.push(']');
        let line = format!(r#"{{"hands":[{{"handedness":"Left","landmarks":{landmarks}}}]}}"#);

        let frame = parse_frame(&line).unwrap();
        assert_eq!(frame[0].score, 1.0);
        assert_eq!(frame[0].landmarks[0].z, 0.0);
    }

    #[test]
    fn gate_uses_detection_then_tracking_threshold() {
        let options = TrackerOptions {
            min_detection_confidence: 0.8,
            min_tracking_confidence: 0.3,
            ..TrackerOptions::default()
        };
        let mut gate = ConfidenceGate::new(options);
        let hand = |score: f32| {
            let mut observation = HandObservation::new(open_hand(0.5, 0.5), Handedness::Left);
            observation.score = score;
            observation
        };

        assert!(gate.filter(vec![hand(0.5)]).is_empty());
        assert_eq!(gate.filter(vec![hand(0.9)]).len(), 1);
        // Now tracked: the lower threshold applies.
        assert_eq!(gate.filter(vec![hand(0.5)]).len(), 1);
        assert!(gate.filter(vec![hand(0.2)]).is_empty());
        assert!(gate.filter(vec![hand(0.5)]).is_empty());
    }

    #[test]
    fn gate_caps_hand_count() {
        let mut gate = ConfidenceGate::new(TrackerOptions {
            max_num_hands: 1,
            ..TrackerOptions::default()
        });
        let hands = vec![
            HandObservation::new(open_hand(0.3, 0.5), Handedness::Left),
            HandObservation::new(open_hand(0.7, 0.5), Handedness::Right),
        ];
        assert_eq!(gate.filter(hands).len(), 1);
    }

    #[test]
    fn synthetic_script_keeps_poses_readable() {
        let frames: Vec<_> = SyntheticHands::new(3).take(SCRIPT_LENGTH as usize).collect();
        assert!(frames[..60].iter().all(Vec::is_empty));
        assert!(frames[60..180].iter().all(|f| f.len() == 1
            && f[0].handedness == Handedness::Right
            && is_open(&f[0].landmarks)));
        assert!(frames[180..200].iter().all(|f| is_open(&f[0].landmarks)));
        assert!(frames[200..240].iter().all(|f| !is_open(&f[0].landmarks)));
        assert!(frames[260..].iter().all(|f| f.len() == 2));

        let again: Vec<_> = SyntheticHands::new(3).take(SCRIPT_LENGTH as usize).collect();
        assert_eq!(frames, again);
    }
}

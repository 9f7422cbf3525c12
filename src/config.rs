//! Runtime-adjustable simulation parameters.
//!
//! Every numeric constant of the engine lives here with its default value.
//! Values coming from the outside (files, UI sliders) go through
//! [`SimulationConfig::sanitized`], which rejects non-finite values and clamps
//! everything else into its valid range.

use std::{fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Upper bound for the multiplicative damping factors. Keeping them strictly
/// below one guarantees the integrator dissipates energy.
pub const MAX_DAMPING: f32 = 0.9999;
pub const MIN_SENSITIVITY: f32 = 0.01;
pub const MAX_SENSITIVITY: f32 = 10.0;
pub const MAX_PARTICLES: usize = 1 << 24;

/// Parameters of the integration kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationParams {
    /// Vertical acceleration in units per step squared. Must not be positive.
    pub gravity: f32,
    /// Per-step velocity damping.
    pub friction: f32,
    /// Restitution applied to the vertical velocity on ground contact.
    pub bounce: f32,
    /// Horizontal velocity damping applied on ground contact.
    pub ground_friction: f32,
}

impl Default for IntegrationParams {
    fn default() -> Self {
        Self {
            gravity: -0.00198,
            friction: 0.99,
            bounce: 0.8,
            ground_friction: 0.9,
        }
    }
}

/// Shape of one radial force field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldParams {
    pub radius: f32,
    pub strength: f32,
    /// Width of the per-particle magnitude jitter; the factor is drawn from
    /// `[0.5, 0.5 + jitter)`.
    pub jitter: f32,
}

impl FieldParams {
    pub fn repel() -> Self {
        Self {
            radius: 10.0,
            strength: 0.015,
            jitter: 1.5,
        }
    }

    pub fn attract() -> Self {
        Self {
            radius: 15.0,
            strength: 0.003,
            jitter: 1.3,
        }
    }
}

/// A field entry in a configuration file; missing keys keep the field's own
/// defaults, which differ between repel and attract.
#[derive(Deserialize)]
struct FieldOverrides {
    radius: Option<f32>,
    strength: Option<f32>,
    jitter: Option<f32>,
}

impl FieldOverrides {
    fn apply(self, base: FieldParams) -> FieldParams {
        FieldParams {
            radius: self.radius.unwrap_or(base.radius),
            strength: self.strength.unwrap_or(base.strength),
            jitter: self.jitter.unwrap_or(base.jitter),
        }
    }
}

fn repel_field<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<FieldParams, D::Error> {
    FieldOverrides::deserialize(deserializer).map(|overrides| overrides.apply(FieldParams::repel()))
}

fn attract_field<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<FieldParams, D::Error> {
    FieldOverrides::deserialize(deserializer).map(|overrides| overrides.apply(FieldParams::attract()))
}

/// Which hand landmark is projected onto the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    PalmCenter,
    Wrist,
}

/// What a hand controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Repel,
    Attract,
    Ignore,
}

/// Assignment of detector handedness labels to fields.
///
/// The detector reports handedness for an un-mirrored image, so on a selfie
/// camera the physical right hand arrives labelled `Left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandRouting {
    pub left: FieldRole,
    pub right: FieldRole,
}

impl Default for HandRouting {
    fn default() -> Self {
        Self {
            left: FieldRole::Repel,
            right: FieldRole::Attract,
        }
    }
}

/// When the repel field fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepelTrigger {
    /// Once per closed-to-open transition of the controlling hand.
    #[default]
    OnOpen,
    /// On every tracking update that sees the controlling hand open.
    EveryObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureParams {
    /// Scale applied to the anchor's offset from the frame centre.
    pub sensitivity: f32,
    pub anchor: Anchor,
    /// Height at which mapped fields are placed; slightly below the ground so
    /// the force radius reaches particles resting on it.
    pub field_height: f32,
    pub routing: HandRouting,
    pub repel_trigger: RepelTrigger,
}

impl Default for GestureParams {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            anchor: Anchor::default(),
            field_height: -1.0,
            routing: HandRouting::default(),
            repel_trigger: RepelTrigger::default(),
        }
    }
}

/// Options forwarded to the hand tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    pub max_num_hands: usize,
    pub model_complexity: u8,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            max_num_hands: 2,
            model_complexity: 0,
            min_detection_confidence: 0.2,
            min_tracking_confidence: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub particle_count: usize,
    /// Grid spacing of the initial layout.
    pub separation: f32,
    /// Rendered sprite size.
    pub particle_size: f32,
    pub integration: IntegrationParams,
    #[serde(deserialize_with = "repel_field")]
    pub repel: FieldParams,
    #[serde(deserialize_with = "attract_field")]
    pub attract: FieldParams,
    pub gesture: GestureParams,
    pub tracker: TrackerOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: 500_000,
            separation: 0.2,
            particle_size: 0.25,
            integration: IntegrationParams::default(),
            repel: FieldParams::repel(),
            attract: FieldParams::attract(),
            gesture: GestureParams::default(),
            tracker: TrackerOptions::default(),
        }
    }
}

impl SimulationConfig {
    /// Default configuration with a different particle count.
    pub fn with_particle_count(particle_count: usize) -> Self {
        Self {
            particle_count,
            ..Self::default()
        }
    }

    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        config.sanitized()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate the configuration, clamping out-of-range values to the nearest
    /// valid one.
    ///
    /// Non-finite numbers and an empty particle population cannot be clamped
    /// meaningfully and are rejected.
    pub fn sanitized(mut self) -> Result<Self> {
        self.check_finite()?;

        if self.particle_count == 0 {
            return Err(Error::InvalidConfig {
                field: "particle_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.particle_count > MAX_PARTICLES {
            log::warn!(
                "particle_count {} exceeds {}, clamping",
                self.particle_count,
                MAX_PARTICLES
            );
            self.particle_count = MAX_PARTICLES;
        }

        clamp("separation", &mut self.separation, 1e-4, f32::MAX);
        clamp("particle_size", &mut self.particle_size, 0.0, f32::MAX);

        let integration = &mut self.integration;
        clamp("integration.gravity", &mut integration.gravity, -1.0, 0.0);
        clamp("integration.friction", &mut integration.friction, 0.0, MAX_DAMPING);
        clamp("integration.bounce", &mut integration.bounce, 0.0, MAX_DAMPING);
        clamp(
            "integration.ground_friction",
            &mut integration.ground_friction,
            0.0,
            1.0,
        );

        for (name, field) in [("repel", &mut self.repel), ("attract", &mut self.attract)] {
            clamp_named(name, "radius", &mut field.radius);
            clamp_named(name, "strength", &mut field.strength);
            clamp_named(name, "jitter", &mut field.jitter);
        }

        clamp(
            "gesture.sensitivity",
            &mut self.gesture.sensitivity,
            MIN_SENSITIVITY,
            MAX_SENSITIVITY,
        );

        let tracker = &mut self.tracker;
        if tracker.max_num_hands == 0 {
            log::warn!("tracker.max_num_hands 0 out of range, using 1");
            tracker.max_num_hands = 1;
        }
        clamp(
            "tracker.min_detection_confidence",
            &mut tracker.min_detection_confidence,
            0.0,
            1.0,
        );
        clamp(
            "tracker.min_tracking_confidence",
            &mut tracker.min_tracking_confidence,
            0.0,
            1.0,
        );

        Ok(self)
    }

    fn check_finite(&self) -> Result<()> {
        let values = [
            ("separation", self.separation),
            ("particle_size", self.particle_size),
            ("integration.gravity", self.integration.gravity),
            ("integration.friction", self.integration.friction),
            ("integration.bounce", self.integration.bounce),
            ("integration.ground_friction", self.integration.ground_friction),
            ("repel.radius", self.repel.radius),
            ("repel.strength", self.repel.strength),
            ("repel.jitter", self.repel.jitter),
            ("attract.radius", self.attract.radius),
            ("attract.strength", self.attract.strength),
            ("attract.jitter", self.attract.jitter),
            ("gesture.sensitivity", self.gesture.sensitivity),
            ("gesture.field_height", self.gesture.field_height),
            ("tracker.min_detection_confidence", self.tracker.min_detection_confidence),
            ("tracker.min_tracking_confidence", self.tracker.min_tracking_confidence),
        ];

        match values.into_iter().find(|(_, value)| !value.is_finite()) {
            Some((field, value)) => Err(Error::InvalidConfig {
                field,
                reason: format!("{value} is not a finite number"),
            }),
            None => Ok(()),
        }
    }
}

fn clamp(field: &str, value: &mut f32, min: f32, max: f32) {
    let clamped = value.clamp(min, max);
    if clamped != *value {
        log::warn!("{field} {} out of range, clamped to {clamped}", *value);
        *value = clamped;
    }
}

fn clamp_named(field: &str, param: &str, value: &mut f32) {
    clamp(&format!("{field}.{param}"), value, 0.0, f32::MAX);
}

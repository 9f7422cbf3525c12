//! # Hand Particles
//!
//! A large particle population under gravity, damping and ground bounce,
//! perturbed by two hand-driven force fields: a one-shot repel impulse and a
//! continuous attract pull.
//!
//! Two timing domains meet here. Tracking updates arrive whenever the hand
//! tracker produces them and go through [`GestureRouter`], which publishes a
//! [`ControlState`] snapshot. The frame loop ([`Simulation::step`]) polls that
//! snapshot once per frame and runs the data-parallel kernels of
//! [`Particles`].

pub mod camera;
pub mod config;
pub mod control;
pub mod error;
pub mod feed;
pub mod gesture;
pub mod gpu;
pub mod hand;
pub mod hash;
pub mod mapping;
pub mod markers;
pub mod particles;
pub mod simulation;

pub use camera::{CameraSnapshot, CameraView};
pub use config::SimulationConfig;
pub use control::{ControlState, ControlPublisher, ControlReader};
pub use error::{Error, Result};
pub use gesture::GestureRouter;
pub use hand::{GestureState, HandObservation, Handedness, Landmark};
pub use particles::{Particle, Particles};
pub use simulation::{FrameReport, Simulation};

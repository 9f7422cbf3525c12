use cgmath::prelude::*;
use encase::ShaderType;
use rayon::prelude::*;

use crate::{
    config::{FieldParams, IntegrationParams},
    hash::hash01,
};

/// Base of the per-particle jitter factor; the span comes from [`FieldParams::jitter`].
const JITTER_BASE: f32 = 0.5;
/// Below this distance a particle is treated as sitting on the field centre.
const DEGENERATE_DISTANCE: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, ShaderType)]
pub struct Particle {
    pub position: cgmath::Vector3<f32>,
    pub velocity: cgmath::Vector3<f32>,
}

/// Particle state store: one slot per id in `[0, len)`.
///
/// Slots are only ever addressed by index; the population is allocated once
/// and never reordered.
pub struct Particles {
    pub particles: Vec<Particle>,
    pub colors: Vec<cgmath::Vector3<f32>>,
}

impl Particles {
    /// Lay `count` particles out on a square grid in the XZ plane, centred on
    /// the origin.
    ///
    /// The grid side is `ceil(sqrt(count))`; when `count` is not a perfect
    /// square the last row is only partially filled.
    pub fn new(count: usize, separation: f32) -> Self {
        let side = grid_side(count);
        let offset = side as f32 / 2.0;

        let particles = (0..count)
            .into_par_iter()
            .map(|id| {
                let x = (id % side) as f32;
                let z = (id / side) as f32;
                Particle {
                    position: cgmath::vec3((offset - x) * separation, 0.0, (offset - z) * separation),
                    velocity: cgmath::Vector3::zero(),
                }
            })
            .collect();

        let colors = (0..count as u32)
            .into_par_iter()
            .map(|id| {
                cgmath::vec3(
                    hash01(id),
                    hash01(id.wrapping_add(2)) * 0.5,
                    hash01(id.wrapping_add(3)),
                )
            })
            .collect();

        Self { particles, colors }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = cgmath::Vector3<f32>> + '_ {
        self.particles.iter().map(|particle| particle.position)
    }

    /// Advance every particle by one step of gravity, damping and ground
    /// collision.
    pub fn update(&mut self, params: &IntegrationParams) {
        self.particles
            .par_iter_mut()
            .for_each(|particle| *particle = integrate(*particle, params));
    }

    /// One-shot outward impulse centred on `center`.
    pub fn repel(&mut self, center: cgmath::Vector3<f32>, field: &FieldParams) {
        self.particles
            .par_iter_mut()
            .enumerate()
            .for_each(|(id, particle)| {
                particle.velocity += radial_impulse(id as u32, particle.position, center, field);
            });
    }

    /// Inward pull towards `center`; meant to be applied on every frame the
    /// attract field is active.
    pub fn attract(&mut self, center: cgmath::Vector3<f32>, field: &FieldParams) {
        self.particles
            .par_iter_mut()
            .enumerate()
            .for_each(|(id, particle)| {
                particle.velocity -= radial_impulse(id as u32, particle.position, center, field);
            });
    }
}

/// Side length of the initial grid.
pub fn grid_side(count: usize) -> usize {
    ((count as f64).sqrt().ceil() as usize).max(1)
}

fn integrate(previous: Particle, params: &IntegrationParams) -> Particle {
    let mut particle = previous;

    particle.velocity.y += params.gravity;
    particle.position += particle.velocity;
    particle.velocity *= params.friction;

    if particle.position.y < 0.0 {
        particle.position.y = 0.0;
        particle.velocity.y = -particle.velocity.y * params.bounce;
        particle.velocity.x *= params.ground_friction;
        particle.velocity.z *= params.ground_friction;
    }

    if is_finite(particle.position) && is_finite(particle.velocity) {
        particle
    } else {
        // Park the particle where it last was; `previous` may itself be
        // corrupt if state was written from outside the kernels.
        let mut position = if is_finite(previous.position) {
            previous.position
        } else {
            cgmath::Vector3::zero()
        };
        position.y = position.y.max(0.0);
        Particle {
            position,
            velocity: cgmath::Vector3::zero(),
        }
    }
}

/// Outward impulse a field at `center` gives particle `id`.
///
/// Falls off linearly to zero at `field.radius`. A particle on the centre
/// itself is pushed straight up.
fn radial_impulse(
    id: u32,
    position: cgmath::Vector3<f32>,
    center: cgmath::Vector3<f32>,
    field: &FieldParams,
) -> cgmath::Vector3<f32> {
    let offset = position - center;
    let distance = offset.magnitude();

    let falloff = (field.radius - distance).max(0.0);
    if falloff == 0.0 || !falloff.is_finite() {
        return cgmath::Vector3::zero();
    }

    let direction = if distance > DEGENERATE_DISTANCE {
        offset / distance
    } else {
        cgmath::Vector3::unit_y()
    };

    let power = falloff * field.strength;
    direction * power * (hash01(id) * field.jitter + JITTER_BASE)
}

fn is_finite(v: cgmath::Vector3<f32>) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

//! GPU buffer layouts of the render boundary.
//!
//! The renderer only reads; these helpers encode the current state into
//! WGSL-compatible byte buffers.

use encase::{ArrayLength, ShaderType, StorageBuffer, UniformBuffer};

use crate::{
    error::{Error, Result},
    particles::{Particle, Particles},
};

#[derive(ShaderType)]
pub struct GpuCamera {
    pub view_matrix: cgmath::Matrix4<f32>,
    pub projection_matrix: cgmath::Matrix4<f32>,
    pub particle_size: f32,
}

#[derive(ShaderType)]
pub struct GpuParticles<'a> {
    pub length: ArrayLength,
    #[size(runtime)]
    pub particles: &'a [Particle],
}

#[derive(ShaderType)]
pub struct GpuColors<'a> {
    pub length: ArrayLength,
    #[size(runtime)]
    pub colors: &'a [cgmath::Vector3<f32>],
}

pub fn camera_bytes(camera: &GpuCamera) -> Result<Vec<u8>> {
    let mut buffer = UniformBuffer::new(Vec::new());
    buffer.write(camera).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

pub fn particle_bytes(particles: &Particles) -> Result<Vec<u8>> {
    let mut buffer = StorageBuffer::new(Vec::new());
    buffer
        .write(&GpuParticles {
            length: ArrayLength,
            particles: &particles.particles,
        })
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

pub fn color_bytes(particles: &Particles) -> Result<Vec<u8>> {
    let mut buffer = StorageBuffer::new(Vec::new());
    buffer
        .write(&GpuColors {
            length: ArrayLength,
            colors: &particles.colors,
        })
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

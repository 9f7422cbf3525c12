use std::time::{Duration, Instant};

use crate::{
    config::SimulationConfig,
    control::{self, ControlReader, ControlState, FrameControl},
    error::Result,
    gesture::{GestureParamsHandle, GestureRouter},
    particles::Particles,
};

/// What happened during one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub attract_dispatched: bool,
    pub repel_dispatched: bool,
    pub update_time: Duration,
}

/// Frame loop: owns the particle store and the configuration and applies the
/// latest control snapshot once per frame.
pub struct Simulation {
    config: SimulationConfig,
    particles: Particles,
    control: ControlReader,
    last_control: ControlState,
    gesture: Option<GestureParamsHandle>,
    frame: u64,
}

impl Simulation {
    pub fn new(config: SimulationConfig, control: ControlReader) -> Result<Self> {
        let config = config.sanitized()?;
        let particles = Particles::new(config.particle_count, config.separation);
        log::info!("Initialized {} particles", particles.len());

        Ok(Self {
            config,
            particles,
            control,
            last_control: ControlState::default(),
            gesture: None,
            frame: 0,
        })
    }

    /// A simulation together with the router that drives its fields.
    pub fn with_router(config: SimulationConfig) -> Result<(Self, GestureRouter)> {
        let (publisher, reader) = control::channel();
        let mut simulation = Self::new(config, reader)?;
        let router = GestureRouter::new(simulation.config.gesture, publisher);
        simulation.gesture = Some(router.params_handle());
        Ok((simulation, router))
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the configuration. Physics parameters take effect on the next
    /// frame; a new particle count or spacing rebuilds the population.
    ///
    /// Gesture parameters reach the router created by [`Simulation::with_router`]
    /// on its next tracking update. A simulation built with [`Simulation::new`]
    /// has no router to forward them to.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        let config = config.sanitized()?;
        if let Some(gesture) = &self.gesture {
            gesture.set(config.gesture);
        }
        let relayout = config.particle_count != self.config.particle_count
            || config.separation != self.config.separation;
        self.config = config;
        if relayout {
            self.reset();
        }
        Ok(())
    }

    /// Put every particle back on the initial grid.
    pub fn reset(&mut self) {
        self.particles = Particles::new(self.config.particle_count, self.config.separation);
        log::info!("Reset simulation with {} particles", self.particles.len());
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }

    /// Control snapshot applied during the last frame.
    pub fn control(&self) -> &ControlState {
        &self.last_control
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Advance one frame: integrate, then pull towards an active attract
    /// field, then apply a pending repel impulse.
    pub fn step(&mut self) -> FrameReport {
        let start = Instant::now();
        let FrameControl { state, repel_fired } = self.control.poll();

        self.particles.update(&self.config.integration);

        let attract_dispatched = state.attract.active;
        if attract_dispatched {
            self.particles
                .attract(state.attract.position, &self.config.attract);
        }
        if repel_fired {
            self.particles.repel(state.repel.position, &self.config.repel);
            log::trace!("Frame {}: repel dispatched", self.frame);
        }

        self.last_control = state;
        self.frame += 1;

        FrameReport {
            frame: self.frame,
            attract_dispatched,
            repel_dispatched: repel_fired,
            update_time: start.elapsed(),
        }
    }
}

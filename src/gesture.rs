//! Turns tracking updates into control state.
//!
//! Runs on the tracking side: every update is classified, routed to a field
//! by handedness, mapped onto the ground and published as one snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    camera::CameraView,
    config::{Anchor, FieldRole, GestureParams, RepelTrigger},
    control::{ControlPublisher, ControlState},
    hand::{GestureState, HandObservation, Handedness, classify},
    mapping::map_to_ground,
};

/// Open-hand memory per field, used for edge detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Latch {
    repel: bool,
    attract: bool,
}

/// Writable view of a router's parameters from another thread. The router
/// picks up changes at the start of its next tracking update.
#[derive(Debug, Clone)]
pub struct GestureParamsHandle {
    shared: Arc<RwLock<GestureParams>>,
}

impl GestureParamsHandle {
    pub fn get(&self) -> GestureParams {
        *self.shared.read()
    }

    pub fn set(&self, params: GestureParams) {
        *self.shared.write() = params;
    }
}

pub struct GestureRouter {
    params: GestureParams,
    shared: GestureParamsHandle,
    publisher: ControlPublisher,
    state: ControlState,
    latch: Latch,
}

impl GestureRouter {
    pub fn new(params: GestureParams, publisher: ControlPublisher) -> Self {
        Self {
            params,
            shared: GestureParamsHandle {
                shared: Arc::new(RwLock::new(params)),
            },
            publisher,
            state: ControlState::default(),
            latch: Latch::default(),
        }
    }

    pub fn params(&self) -> &GestureParams {
        &self.params
    }

    pub fn set_params(&mut self, params: GestureParams) {
        self.params = params;
        self.shared.set(params);
    }

    pub fn params_handle(&self) -> GestureParamsHandle {
        self.shared.clone()
    }

    /// Last published snapshot.
    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn role_of(&self, handedness: Handedness) -> FieldRole {
        match handedness {
            Handedness::Left => self.params.routing.left,
            Handedness::Right => self.params.routing.right,
        }
    }

    /// Process one tracking update and publish the resulting control state.
    ///
    /// An empty update clears both fields. A field whose hand is missing from
    /// a non-empty update is released as well. When several hands share a
    /// field, the last one in `observations` decides.
    pub fn on_tracking_update<C: CameraView + ?Sized>(
        &mut self,
        observations: &[HandObservation],
        camera: &C,
    ) -> ControlState {
        self.params = self.shared.get();

        if observations.is_empty() {
            if self.state.attract.active || self.state.repel.visible {
                log::debug!("No hands observed, clearing fields");
            }
            self.state.clear();
            self.latch = Latch::default();
            self.publisher.publish(self.state);
            return self.state;
        }

        // Last observation per field; earlier hands with the same role are dropped.
        let mut repel = None;
        let mut attract = None;
        for observation in observations {
            match self.role_of(observation.handedness) {
                FieldRole::Repel => repel = Some(observation),
                FieldRole::Attract => attract = Some(observation),
                FieldRole::Ignore => {}
            }
        }

        let navigating = camera.is_navigating();
        for (role, observation) in [(FieldRole::Repel, repel), (FieldRole::Attract, attract)] {
            let Some(observation) = observation else {
                self.release(role);
                continue;
            };

            let gesture = classify(observation);
            if !gesture.is_open {
                self.release(role);
            } else if navigating {
                log::trace!("Camera navigation in progress, ignoring {:?} hand", observation.handedness);
            } else {
                self.engage(role, &gesture, camera);
            }
        }

        self.publisher.publish(self.state);
        self.state
    }

    fn engage<C: CameraView + ?Sized>(&mut self, role: FieldRole, gesture: &GestureState, camera: &C) {
        if role == FieldRole::Repel
            && self.latch.repel
            && self.params.repel_trigger == RepelTrigger::OnOpen
        {
            return;
        }

        let anchor = match self.params.anchor {
            Anchor::PalmCenter => gesture.palm_anchor(),
            Anchor::Wrist => gesture.wrist,
        };
        let Some(ground) = map_to_ground(anchor, self.params.sensitivity, camera) else {
            log::debug!("Hand anchor {anchor:?} does not map onto the ground, field unchanged");
            return;
        };
        let position = cgmath::vec3(ground.x, self.params.field_height, ground.z);

        match role {
            FieldRole::Repel => {
                let repel = &mut self.state.repel;
                repel.position = position;
                repel.visible = true;
                repel.pulse = repel.pulse.wrapping_add(1);
                self.latch.repel = true;
                log::debug!("Repel fired at {position:?}");
            }
            FieldRole::Attract => {
                let attract = &mut self.state.attract;
                if !attract.active {
                    log::debug!("Attract field engaged at {position:?}");
                }
                attract.position = position;
                attract.active = true;
                attract.visible = true;
                self.latch.attract = true;
            }
            FieldRole::Ignore => {}
        }
    }

    fn release(&mut self, role: FieldRole) {
        match role {
            FieldRole::Repel => {
                self.state.repel.visible = false;
                self.latch.repel = false;
            }
            FieldRole::Attract => {
                if self.state.attract.active {
                    log::debug!("Attract field released");
                }
                self.state.attract.active = false;
                self.state.attract.visible = false;
                self.latch.attract = false;
            }
            FieldRole::Ignore => {}
        }
    }
}

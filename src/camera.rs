use cgmath::prelude::*;

pub const DEFAULT_EYE: [f32; 3] = [0.0, 4.0, 30.0];
pub const DEFAULT_TARGET: [f32; 3] = [0.0, -8.0, 0.0];
pub const DEFAULT_FOVY: f32 = 50.0;

/// What the gesture mapper needs to know about the active camera.
pub trait CameraView {
    /// Camera position in world space.
    fn eye(&self) -> cgmath::Point3<f32>;

    /// Inverse of `projection * view`.
    fn inverse_view_projection(&self) -> cgmath::Matrix4<f32>;

    /// True while the user is dragging the camera around.
    fn is_navigating(&self) -> bool {
        false
    }
}

/// Immutable copy of the camera state, cheap to hand to the tracking thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub eye: cgmath::Point3<f32>,
    pub view_projection: cgmath::Matrix4<f32>,
    pub inverse_view_projection: cgmath::Matrix4<f32>,
    pub navigating: bool,
}

impl CameraSnapshot {
    /// Build a snapshot from view and projection matrices. Returns `None` for
    /// a singular transform.
    pub fn new(
        eye: cgmath::Point3<f32>,
        view: cgmath::Matrix4<f32>,
        projection: cgmath::Matrix4<f32>,
    ) -> Option<Self> {
        let view_projection = projection * view;
        let inverse_view_projection = view_projection.invert()?;
        Some(Self {
            eye,
            view_projection,
            inverse_view_projection,
            navigating: false,
        })
    }

    /// Right-handed perspective camera at `eye` looking at `target`.
    pub fn look_at(
        eye: cgmath::Point3<f32>,
        target: cgmath::Point3<f32>,
        up: cgmath::Vector3<f32>,
        fovy: cgmath::Deg<f32>,
        aspect: f32,
    ) -> Option<Self> {
        let view = cgmath::Matrix4::look_at_rh(eye, target, up);
        let projection = cgmath::perspective(fovy, aspect, 0.1, 1000.0);
        Self::new(eye, view, projection)
    }

    /// The start-up view: slightly above the ground, looking down over the
    /// particle grid.
    pub fn default_view(aspect: f32) -> Option<Self> {
        Self::look_at(
            DEFAULT_EYE.into(),
            DEFAULT_TARGET.into(),
            cgmath::Vector3::unit_y(),
            cgmath::Deg(DEFAULT_FOVY),
            aspect,
        )
    }

    pub fn with_navigating(mut self, navigating: bool) -> Self {
        self.navigating = navigating;
        self
    }

    /// Project a world point to normalized device coordinates. Points behind
    /// the camera yield `None`.
    pub fn project(&self, point: cgmath::Point3<f32>) -> Option<cgmath::Vector2<f32>> {
        let clip = self.view_projection * point.to_homogeneous();
        if clip.w <= f32::EPSILON {
            return None;
        }
        Some(cgmath::vec2(clip.x / clip.w, clip.y / clip.w))
    }
}

impl CameraView for CameraSnapshot {
    fn eye(&self) -> cgmath::Point3<f32> {
        self.eye
    }

    fn inverse_view_projection(&self) -> cgmath::Matrix4<f32> {
        self.inverse_view_projection
    }

    fn is_navigating(&self) -> bool {
        self.navigating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_projection_is_rejected() {
        let eye = cgmath::point3(0.0, 0.0, 5.0);
        let view = cgmath::Matrix4::look_at_rh(eye, cgmath::point3(0.0, 0.0, 0.0), cgmath::Vector3::unit_y());
        assert!(CameraSnapshot::new(eye, view, cgmath::Matrix4::zero()).is_none());
    }

    #[test]
    fn target_projects_to_screen_centre() {
        let camera = CameraSnapshot::look_at(
            cgmath::point3(0.0, 4.0, 30.0),
            cgmath::point3(0.0, -8.0, 0.0),
            cgmath::Vector3::unit_y(),
            cgmath::Deg(50.0),
            16.0 / 9.0,
        )
        .unwrap();

        let ndc = camera.project(cgmath::point3(0.0, -8.0, 0.0)).unwrap();
        assert!(ndc.x.abs() < 1e-4);
        assert!(ndc.y.abs() < 1e-4);
        assert!(camera.project(cgmath::point3(0.0, 4.0, 60.0)).is_none());
        assert!(!camera.is_navigating());
        assert!(camera.with_navigating(true).is_navigating());
    }
}

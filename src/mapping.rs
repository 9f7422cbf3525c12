//! Gesture-to-world mapping: from a normalized image position to a point on
//! the ground plane `y = 0`.

use cgmath::prelude::*;

use crate::camera::CameraView;

/// Largest offset from the frame centre an anchor may take after scaling.
pub const MAX_OFFSET: f32 = 0.5;
/// Rays flatter than this never reach the ground in a useful place.
const MIN_RAY_SLOPE: f32 = 1e-6;
/// Depth of the unprojected point in normalized device coordinates.
const UNPROJECT_DEPTH: f32 = 0.5;

/// Scaled, clamped offset of `anchor` from the centre of the frame.
pub fn screen_offset(anchor: cgmath::Vector2<f32>, sensitivity: f32) -> cgmath::Vector2<f32> {
    cgmath::vec2(
        ((anchor.x - 0.5) * sensitivity).clamp(-MAX_OFFSET, MAX_OFFSET),
        ((anchor.y - 0.5) * sensitivity).clamp(-MAX_OFFSET, MAX_OFFSET),
    )
}

/// Normalized device coordinates of a screen offset.
///
/// The horizontal axis is mirrored so the field follows the hand like a
/// mirror image; the vertical axis flips from image-down to NDC-up.
pub fn offset_to_ndc(offset: cgmath::Vector2<f32>) -> cgmath::Vector2<f32> {
    cgmath::vec2(-2.0 * offset.x, -2.0 * offset.y)
}

/// World-space ray through `ndc`, as `(origin, unit direction)`.
pub fn camera_ray<C: CameraView + ?Sized>(
    ndc: cgmath::Vector2<f32>,
    camera: &C,
) -> Option<(cgmath::Point3<f32>, cgmath::Vector3<f32>)> {
    let eye = camera.eye();
    let clip = cgmath::vec4(ndc.x, ndc.y, UNPROJECT_DEPTH, 1.0);
    let world = camera.inverse_view_projection() * clip;
    if world.w.abs() <= f32::EPSILON {
        return None;
    }

    let point = cgmath::Point3::from_vec(world.truncate() / world.w);
    let towards = point - eye;
    let length = towards.magnitude();
    if !(length.is_finite() && length > f32::EPSILON) {
        return None;
    }
    Some((eye, towards / length))
}

/// Intersection of a ray with the plane `y = 0`.
///
/// `None` when the ray runs parallel to the ground, points away from it, or
/// the numbers stop being finite.
pub fn intersect_ground(
    origin: cgmath::Point3<f32>,
    direction: cgmath::Vector3<f32>,
) -> Option<cgmath::Point3<f32>> {
    if direction.y.abs() < MIN_RAY_SLOPE {
        return None;
    }

    let t = (0.0 - origin.y) / direction.y;
    if !(t.is_finite() && t > 0.0) {
        return None;
    }

    let point = origin + direction * t;
    (point.x.is_finite() && point.z.is_finite()).then(|| cgmath::point3(point.x, 0.0, point.z))
}

/// Map a normalized image anchor onto the ground plane as seen through
/// `camera`.
pub fn map_to_ground<C: CameraView + ?Sized>(
    anchor: cgmath::Vector2<f32>,
    sensitivity: f32,
    camera: &C,
) -> Option<cgmath::Point3<f32>> {
    let ndc = offset_to_ndc(screen_offset(anchor, sensitivity));
    let (origin, direction) = camera_ray(ndc, camera)?;
    intersect_ground(origin, direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSnapshot;

    fn top_down(height: f32) -> CameraSnapshot {
        CameraSnapshot::look_at(
            cgmath::point3(3.0, height, -2.0),
            cgmath::point3(3.0, 0.0, -2.0),
            -cgmath::Vector3::unit_z(),
            cgmath::Deg(50.0),
            1.0,
        )
        .unwrap()
    }

    fn default_view() -> CameraSnapshot {
        CameraSnapshot::look_at(
            cgmath::point3(0.0, 4.0, 30.0),
            cgmath::point3(0.0, -8.0, 0.0),
            cgmath::Vector3::unit_y(),
            cgmath::Deg(50.0),
            16.0 / 9.0,
        )
        .unwrap()
    }

    #[test]
    fn offset_is_scaled_and_clamped() {
        let offset = screen_offset(cgmath::vec2(0.7, 0.1), 1.0);
        assert!((offset.x - 0.2).abs() < 1e-6);
        assert!((offset.y + 0.4).abs() < 1e-6);

        let offset = screen_offset(cgmath::vec2(1.0, 0.0), 3.0);
        assert_eq!(offset, cgmath::vec2(MAX_OFFSET, -MAX_OFFSET));
    }

    #[test]
    fn ndc_is_mirrored() {
        let ndc = offset_to_ndc(cgmath::vec2(0.25, -0.5));
        assert_eq!(ndc, cgmath::vec2(-0.5, 1.0));
    }

    #[test]
    fn centre_maps_directly_below_top_down_camera() {
        let camera = top_down(20.0);
        let point = map_to_ground(cgmath::vec2(0.5, 0.5), 1.0, &camera).unwrap();
        assert!((point.x - 3.0).abs() < 1e-3, "{point:?}");
        assert!((point.z + 2.0).abs() < 1e-3, "{point:?}");
        assert_eq!(point.y, 0.0);
    }

    #[test]
    fn centre_maps_to_view_axis_hit() {
        // eye (0, 4, 30) towards (0, -8, 0) crosses y = 0 a third of the way.
        let point = map_to_ground(cgmath::vec2(0.5, 0.5), 1.0, &default_view()).unwrap();
        assert!(point.x.abs() < 1e-3);
        assert!((point.z - 20.0).abs() < 1e-2, "{point:?}");
    }

    #[test]
    fn hand_on_image_left_lands_on_world_right() {
        let camera = top_down(20.0);
        let left = map_to_ground(cgmath::vec2(0.3, 0.5), 1.0, &camera).unwrap();
        let right = map_to_ground(cgmath::vec2(0.7, 0.5), 1.0, &camera).unwrap();
        // Looking down with -Z as up, screen right is world +X.
        assert!(left.x > 3.0);
        assert!(right.x < 3.0);
    }

    #[test]
    fn parallel_ray_has_no_intersection() {
        let origin = cgmath::point3(0.0, 4.0, 0.0);
        assert!(intersect_ground(origin, cgmath::vec3(1.0, 0.0, 0.0)).is_none());
        assert!(intersect_ground(origin, cgmath::vec3(0.0, 1.0, 0.0)).is_none());
        assert!(intersect_ground(origin, cgmath::vec3(0.0, -1.0, 0.0)).is_some());
    }

    #[test]
    fn rays_above_the_horizon_never_hit_ground() {
        let camera = CameraSnapshot::look_at(
            cgmath::point3(0.0, 4.0, 30.0),
            cgmath::point3(0.0, 4.0, 0.0),
            cgmath::Vector3::unit_y(),
            cgmath::Deg(50.0),
            1.0,
        )
        .unwrap();
        assert!(map_to_ground(cgmath::vec2(0.5, 0.2), 1.0, &camera).is_none());
        // Lower half of the image looks down and finds the ground.
        assert!(map_to_ground(cgmath::vec2(0.5, 0.9), 1.0, &camera).is_some());
    }
}

//! Core types: math re-exports, Transform, Camera, scene graph, pose animator.

pub use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4, vec3};

pub mod animator;
pub mod camera;
pub mod config;
pub mod error;
pub mod light;
pub mod scene;
pub mod transform;

pub use animator::{AnimatorState, PointerSample, PoseAnimator, RotationTarget};
pub use config::{AssetPolicy, BloomConfig, PoseConfig, SceneConfig};
pub use error::{SceneError, SceneResult};
pub use scene::{NodeId, SceneGraph};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_identity_matrix() {
        let t = transform::Transform::identity();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn translate_then_scale_matrix() {
        let t = transform::Transform::from_trs(
            vec3(1.0, 2.0, 3.0),
            vec3(0.0, 0.0, 0.0),
            vec3(2.0, 2.0, 2.0),
        );
        // Last column = translation, diagonal = scale (no rotation).
        let m = t.matrix().to_cols_array();
        assert!((m[12] - 1.0).abs() < 1e-6);
        assert!((m[13] - 2.0).abs() < 1e-6);
        assert!((m[14] - 3.0).abs() < 1e-6);
        assert!((m[0] - 2.0).abs() < 1e-6);
        assert!((m[5] - 2.0).abs() < 1e-6);
        assert!((m[10] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quat_round_trips_through_euler() {
        let q = Quat::from_euler(EulerRot::XYZ, 0.3, -0.2, 0.1);
        let t = transform::Transform::from_translation_quat_scale(Vec3::ZERO, q, Vec3::ONE);
        assert!((t.rotation_euler - vec3(0.3, -0.2, 0.1)).length() < 1e-5);
        assert!(t.rotation().angle_between(q) < 1e-4);
    }

    #[test]
    fn camera_pv_is_finite() {
        let cam = camera::Camera::new_perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0)
            .looking_at(vec3(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y);
        let pv = cam.proj_view();
        let a = pv.to_cols_array();
        assert!(a.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn camera_looking_at_origin_sees_origin_ahead() {
        let cam = camera::Camera::new_perspective(75f32.to_radians(), 1.0, 0.1, 100.0)
            .looking_at(vec3(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let p = cam.view().transform_point3(Vec3::ZERO);
        assert!((p - vec3(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn camera_ignores_degenerate_viewport() {
        let mut cam = camera::Camera::new_perspective(1.0, 2.0, 0.1, 10.0);
        cam.set_viewport(0, 600);
        assert_eq!(cam.aspect, 2.0);
        cam.set_viewport(800, 600);
        assert!((cam.aspect - 4.0 / 3.0).abs() < 1e-6);
    }
}

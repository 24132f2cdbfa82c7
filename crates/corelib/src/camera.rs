use crate::{Mat4, Quat, Vec3};

/// Perspective camera (right-handed, looks down its local -Z).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    pub fn new_perspective(fov_y_rad: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y_rad,
            z_near,
            z_far,
            aspect,
        }
    }

    /// Place the camera at `eye` facing `target`.
    pub fn looking_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.position = eye;
        // look_at_rh is world->view; its inverse rotation is the camera orientation.
        let view = Mat4::look_at_rh(eye, target, up);
        let (_, rot, _) = view.inverse().to_scale_rotation_translation();
        self.rotation = rot;
        self
    }

    #[inline]
    pub fn world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.world().inverse()
    }

    /// Depth maps into [0,1] (wgpu convention).
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    /// Update aspect from a viewport size. Degenerate sizes keep the old aspect.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

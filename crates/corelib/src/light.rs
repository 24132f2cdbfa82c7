//! Light sources consumed by the mesh pass.

use crate::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    #[inline]
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Omni light with a finite range. `distance == 0` means no cutoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub distance: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, distance: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            distance,
        }
    }

    /// Smooth range falloff, 1 at the light and 0 at `distance`.
    pub fn attenuation(&self, d: f32) -> f32 {
        if self.distance <= 0.0 {
            return 1.0;
        }
        let ratio = (d / self.distance).clamp(0.0, 1.0);
        let window = 1.0 - ratio.powi(4);
        window * window
    }
}

/// Lights present in the scene. Fixed layout: one ambient, one point.
#[derive(Clone, Copy, Debug)]
pub struct Lighting {
    pub ambient: AmbientLight,
    pub point: PointLight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attenuation_reaches_zero_at_range() {
        let light = PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0, 10.0);
        assert!((light.attenuation(0.0) - 1.0).abs() < 1e-6);
        assert!(light.attenuation(5.0) > 0.0);
        assert_eq!(light.attenuation(10.0), 0.0);
        assert_eq!(light.attenuation(25.0), 0.0);
    }

    #[test]
    fn zero_distance_never_cuts_off() {
        let light = PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0, 0.0);
        assert_eq!(light.attenuation(1000.0), 1.0);
    }
}

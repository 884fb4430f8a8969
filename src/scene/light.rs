//! Light types and their constant buffer layout

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Lights of one kind a pixel shader can receive
pub const MAX_LIGHTS: usize = 32;

/// Light kind tag stored in [`GpuLight::kind`]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

/// Light shining from infinitely far away along `direction`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Light radiating from a point, fading out at `range`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub range: f32,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            range: 10.0,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// Point light restricted to a cone around `direction`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub range: f32,
    pub color: Vec3,
    pub intensity: f32,
    /// Falloff exponent of the cone
    pub spot_angle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Light::Directional(DirectionalLight {
            direction: direction.normalize(),
            color,
            intensity,
        })
    }

    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Light::Point(PointLight {
            position,
            range,
            color,
            intensity,
        })
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        color: Vec3,
        intensity: f32,
        spot_angle: f32,
    ) -> Self {
        Light::Spot(SpotLight {
            position,
            direction: direction.normalize(),
            range,
            color,
            intensity,
            spot_angle,
        })
    }

    pub fn kind(&self) -> LightKind {
        match self {
            Light::Directional(_) => LightKind::Directional,
            Light::Point(_) => LightKind::Point,
            Light::Spot(_) => LightKind::Spot,
        }
    }

    /// Convert to GPU data format
    pub fn to_gpu(&self) -> GpuLight {
        let mut gpu = GpuLight {
            kind: self.kind() as u32,
            ..Default::default()
        };
        match *self {
            Light::Directional(light) => {
                gpu.direction = light.direction.to_array();
                gpu.intensity = light.intensity;
                gpu.color = light.color.to_array();
            }
            Light::Point(light) => {
                gpu.position = light.position.to_array();
                gpu.range = light.range;
                gpu.intensity = light.intensity;
                gpu.color = light.color.to_array();
            }
            Light::Spot(light) => {
                gpu.position = light.position.to_array();
                gpu.range = light.range;
                gpu.direction = light.direction.to_array();
                gpu.intensity = light.intensity;
                gpu.color = light.color.to_array();
                gpu.spot_angle = light.spot_angle;
            }
        }
        gpu
    }
}

/// One light as laid out in a shader constant array, 64 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub spot_angle: f32,
    pub kind: u32,
    pub _padding: [u32; 3],
}

/// Lights split by kind, ready for upload
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    pub directional: Vec<GpuLight>,
    pub point: Vec<GpuLight>,
}

impl LightSet {
    /// Split lights into directional and point lists.
    ///
    /// Spot lights are not part of either list. Lists longer than [`MAX_LIGHTS`]
    /// are cut to fit the shader arrays.
    pub fn partition(lights: &[Light]) -> Self {
        let mut set = Self::default();
        for light in lights {
            match light.kind() {
                LightKind::Directional => set.directional.push(light.to_gpu()),
                LightKind::Point => set.point.push(light.to_gpu()),
                LightKind::Spot => {}
            }
        }
        for (name, list) in [("directional", &mut set.directional), ("point", &mut set.point)] {
            if list.len() > MAX_LIGHTS {
                log::warn!("{} {} lights, only {} are uploaded", list.len(), name, MAX_LIGHTS);
                list.truncate(MAX_LIGHTS);
            }
        }
        set
    }

    pub fn directional_count(&self) -> i32 {
        self.directional.len() as i32
    }

    pub fn point_count(&self) -> i32 {
        self.point.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_light_is_64_bytes() {
        assert_eq!(std::mem::size_of::<GpuLight>(), 64);
    }

    #[test]
    fn test_partition_counts_only_point_lights() {
        let lights = [
            Light::directional(Vec3::NEG_Y, Vec3::ONE, 1.0),
            Light::point(Vec3::ZERO, 5.0, Vec3::X, 2.0),
            Light::spot(Vec3::ZERO, Vec3::NEG_Y, 5.0, Vec3::ONE, 1.0, 8.0),
            Light::point(Vec3::ONE, 5.0, Vec3::Y, 2.0),
        ];
        let set = LightSet::partition(&lights);
        assert_eq!(set.directional_count(), 1);
        assert_eq!(set.point_count(), 2);
        assert!(set.point.iter().all(|light| light.kind == LightKind::Point as u32));
    }

    #[test]
    fn test_packing() {
        let gpu = Light::point(Vec3::new(1.0, 2.0, 3.0), 7.0, Vec3::new(0.5, 0.25, 1.0), 4.0).to_gpu();
        assert_eq!(gpu.position, [1.0, 2.0, 3.0]);
        assert_eq!(gpu.range, 7.0);
        assert_eq!(gpu.intensity, 4.0);
        assert_eq!(gpu.color, [0.5, 0.25, 1.0]);
        assert_eq!(gpu.kind, 1);
    }

    #[test]
    fn test_partition_caps_list_length() {
        let lights: Vec<Light> = (0..40)
            .map(|i| Light::point(Vec3::splat(i as f32), 1.0, Vec3::ONE, 1.0))
            .collect();
        assert_eq!(LightSet::partition(&lights).point.len(), MAX_LIGHTS);
    }
}

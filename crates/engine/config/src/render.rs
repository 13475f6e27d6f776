//! Typed render settings

use crate::scene::{check_scene_size, Material};
use crate::{ConfigError, Result};
use glam::{UVec2, UVec3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Everything a render run needs apart from the voxel data itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub output_file: String,
    pub settings: RenderSettings,
    pub scene: SceneSettings,
    pub camera: CameraSettings,
}

/// Shader and dispatch settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Path of the path tracing compute shader
    pub renderer_code: String,
    /// Path of the output (tone mapping) compute shader
    pub output_code: String,
    pub workgroup_size: UVec2,
    pub image_size: UVec2,
    /// Samples accumulated per pixel
    pub iterations: u32,
    /// Maximum ray bounces
    pub max_depth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    /// Voxel grid dimensions
    pub size: UVec3,
    pub background: Material,
}

/// Pinhole camera; sensor size and focal length share a unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub sensor_size: Vec2,
    pub focal_length: f32,
    pub position: Vec3,
    /// Euler angles in radians
    pub rotation: Vec3,
}

impl RenderConfig {
    /// Reject values no renderer can work with: empty images or workgroups,
    /// and empty or oversized voxel grids
    pub fn validate(&self) -> Result<()> {
        if self.settings.image_size.min_element() == 0 {
            return Err(ConfigError::invalid(
                "settings.image_size",
                format!("dimensions must be non-zero, got {}", self.settings.image_size),
            ));
        }
        if self.settings.workgroup_size.min_element() == 0 {
            return Err(ConfigError::invalid(
                "settings.workgroup_size",
                format!(
                    "dimensions must be non-zero, got {}",
                    self.settings.workgroup_size
                ),
            ));
        }
        check_scene_size(self.scene.size)?;
        Ok(())
    }

    /// Number of workgroups needed to cover the image
    pub fn dispatch_size(&self) -> UVec2 {
        let wg = self.settings.workgroup_size.max(UVec2::ONE);
        (self.settings.image_size + wg - UVec2::ONE) / wg
    }
}

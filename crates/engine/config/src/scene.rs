//! Scene storage filled by the configuration's data function

use crate::{ConfigError, Result};
use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Largest voxel grid a scene may declare
pub const MAX_SCENE_VOXELS: u64 = 1 << 28;

/// Voxel count of a grid, `None` when the product does not fit in `u64`
pub fn voxel_count(size: UVec3) -> Option<u64> {
    (size.x as u64)
        .checked_mul(size.y as u64)?
        .checked_mul(size.z as u64)
}

/// Check that a grid is non-empty and within [`MAX_SCENE_VOXELS`]
pub(crate) fn check_scene_size(size: UVec3) -> Result<usize> {
    if size.min_element() == 0 {
        return Err(ConfigError::invalid(
            "scene.size",
            format!("dimensions must be non-zero, got {}", size),
        ));
    }
    voxel_count(size)
        .filter(|&count| count <= MAX_SCENE_VOXELS)
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| {
            ConfigError::invalid(
                "scene.size",
                format!("{} exceeds the limit of {} voxels", size, MAX_SCENE_VOXELS),
            )
        })
}

/// Surface description referenced by voxels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Vec3,
    pub emission: f32,
}

impl Material {
    pub fn new(color: Vec3, emission: f32) -> Self {
        Self { color, emission }
    }
}

/// Receives scene content from Lua
pub trait SceneSink {
    /// Store a material and return its id. Id 0 is the background.
    fn register_material(&mut self, material: Material) -> u32;

    /// Place a voxel. Positions outside the grid are ignored.
    fn set(&mut self, position: UVec3, material: u32);
}

/// In-memory scene: a material table plus a dense voxel grid of material ids
#[derive(Debug, Clone)]
pub struct SceneRecorder {
    size: UVec3,
    materials: Vec<Material>,
    voxels: Vec<u32>,
}

impl SceneRecorder {
    /// Empty grid of `size` voxels, all set to the background.
    ///
    /// Fails for empty grids and for grids beyond [`MAX_SCENE_VOXELS`].
    pub fn new(size: UVec3, background: Material) -> Result<Self> {
        let count = check_scene_size(size)?;
        Ok(Self {
            size,
            materials: vec![background],
            voxels: vec![0; count],
        })
    }

    /// Grid dimensions
    pub fn size(&self) -> UVec3 {
        self.size
    }

    pub fn background(&self) -> Material {
        self.materials[0]
    }

    /// All materials, background first
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Material registered under `id`
    pub fn material(&self, id: u32) -> Option<Material> {
        self.materials.get(id as usize).copied()
    }

    /// Material id at `position`, `None` outside the grid
    pub fn get(&self, position: UVec3) -> Option<u32> {
        self.index(position).map(|i| self.voxels[i])
    }

    /// Dense voxel grid, x fastest then y then z
    pub fn voxels(&self) -> &[u32] {
        &self.voxels
    }

    /// Voxels holding anything other than the background
    pub fn filled(&self) -> usize {
        self.voxels.iter().filter(|&&id| id != 0).count()
    }

    fn index(&self, p: UVec3) -> Option<usize> {
        if p.cmplt(self.size).all() {
            let (sx, sy) = (self.size.x as usize, self.size.y as usize);
            Some(p.z as usize * sx * sy + p.y as usize * sx + p.x as usize)
        } else {
            None
        }
    }
}

impl SceneSink for SceneRecorder {
    fn register_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        let id = (self.materials.len() - 1) as u32;
        tracing::debug!("registered material {}", id);
        id
    }

    fn set(&mut self, position: UVec3, material: u32) {
        match self.index(position) {
            Some(i) => self.voxels[i] = material,
            None => tracing::debug!("ignoring voxel outside scene at {}", position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_ids_start_after_background() {
        let bg = Material::new(Vec3::splat(0.1), 1.0);
        let mut scene = SceneRecorder::new(UVec3::new(2, 2, 2), bg).unwrap();
        assert_eq!(scene.background(), bg);

        let red = Material::new(Vec3::X, 0.0);
        assert_eq!(scene.register_material(red), 1);
        assert_eq!(scene.register_material(red), 2);
        assert_eq!(scene.material(1), Some(red));
        assert_eq!(scene.material(3), None);
    }

    #[test]
    fn test_set_and_bounds() {
        let mut scene = SceneRecorder::new(UVec3::new(4, 3, 2), Material::default()).unwrap();
        assert_eq!(scene.voxels().len(), 24);

        scene.set(UVec3::new(3, 2, 1), 5);
        scene.set(UVec3::new(4, 0, 0), 7);
        assert_eq!(scene.get(UVec3::new(3, 2, 1)), Some(5));
        assert_eq!(scene.voxels()[23], 5);
        assert_eq!(scene.get(UVec3::new(4, 0, 0)), None);
        assert_eq!(scene.filled(), 1);
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        assert_eq!(voxel_count(UVec3::splat(u32::MAX)), None);
        assert_eq!(voxel_count(UVec3::new(4, 3, 2)), Some(24));

        for size in [
            UVec3::splat(u32::MAX),
            UVec3::splat(100_000),
            UVec3::new(0, 4, 4),
        ] {
            assert!(matches!(
                SceneRecorder::new(size, Material::default()),
                Err(ConfigError::InvalidSetting { field: "scene.size", .. })
            ));
        }
    }
}

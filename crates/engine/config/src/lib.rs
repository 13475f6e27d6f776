//! Render configuration for the voxel path tracer
//!
//! A configuration is a Lua script returning a single table:
//!
//! ```lua
//! return {
//!     output_file = "out.ppm",
//!     settings = {
//!         renderer_code = "renderer.comp", output_code = "output.comp",
//!         workgroup_size = {8, 8}, image_size = {640, 480},
//!         iterations = 64, max_depth = 4,
//!     },
//!     scene = {
//!         size = {16, 16, 16},
//!         bg = {color = {0.1, 0.1, 0.2}, emission = 0.5},
//!         data = function(scene)
//!             local white = scene:register_material{color = {1, 1, 1}, emission = 0}
//!             scene:set({0, 0, 0}, white)
//!         end,
//!     },
//!     camera = {
//!         sensor_size = {0.036, 0.024}, focal_length = 0.05,
//!         position = {8, 8, -20}, rotation = {0, 0, 0},
//!     },
//! }
//! ```
//!
//! [`ConfigReader`] pops the table into a [`RenderConfig`], then runs
//! `scene.data` against a [`SceneSink`].

mod error;
mod reader;
mod render;
mod scene;

pub use error::{ConfigError, Result};
pub use reader::{ConfigReader, LoadedConfig, CONFIG_SCHEMA, SCENE_SCHEMA};
pub use render::{CameraSettings, RenderConfig, RenderSettings, SceneSettings};
pub use scene::{voxel_count, Material, SceneRecorder, SceneSink, MAX_SCENE_VOXELS};

//! Lua configuration reader

use crate::render::{CameraSettings, RenderConfig, RenderSettings, SceneSettings};
use crate::scene::{Material, SceneSink};
use crate::{ConfigError, Result};
use glam::Vec3;
use scripting::{inputs, slots, Callable, Handle, Logger, LuaRuntime, MarshalContext, Policy, Value};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Shape of the table returned by a configuration script
pub const CONFIG_SCHEMA: &str = "{
    output_file: s,
    settings: {
        renderer_code: s,
        output_code: s,
        workgroup_size: {1: i, 2: i},
        image_size: {1: i, 2: i},
        iterations: i,
        max_depth: i
    },
    scene: {
        size: {1: i, 2: i, 3: i},
        bg: {color: {1: f, 2: f, 3: f}, emission: f},
        data: l
    },
    camera: {
        sensor_size: {1: f, 2: f},
        focal_length: f,
        position: {1: f, 2: f, 3: f},
        rotation: {1: f, 2: f, 3: f}
    }
}";

/// Shape of the table passed to `scene.data`
pub const SCENE_SCHEMA: &str = "{size: {x: i, y: i, z: i}, register_material: l, set: l}";

const MATERIAL_SCHEMA: &str = "{color: {1: f, 2: f, 3: f}, emission: f}";
const SET_SCHEMA: &str = "{1: f, 2: f, 3: f}; i";

/// A popped configuration plus the still-registered scene data function
#[derive(Debug)]
pub struct LoadedConfig {
    /// Popped and validated settings
    pub config: RenderConfig,
    data: Option<Handle>,
}

impl LoadedConfig {
    /// Handle of `scene.data`, until [`ConfigReader::build_scene`] consumes it
    pub fn scene_data(&self) -> Option<Handle> {
        self.data
    }
}

/// Reads render configurations from Lua scripts.
///
/// Each reader owns its own Lua state; handles in a [`LoadedConfig`] are only
/// valid with the reader that produced them.
#[derive(Debug)]
pub struct ConfigReader {
    runtime: LuaRuntime,
}

impl ConfigReader {
    /// Strict reader: any schema mismatch aborts the load
    pub fn new() -> Result<Self> {
        Ok(Self {
            runtime: LuaRuntime::new()?,
        })
    }

    /// Default mismatched fields instead of failing with [`Policy::Lenient`]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.runtime = self.runtime.with_policy(policy);
        self
    }

    /// Receives diagnostics from the config pop and the scene callbacks
    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.runtime = self.runtime.with_logger(logger);
        self
    }

    pub fn runtime(&self) -> &LuaRuntime {
        &self.runtime
    }

    /// Run a configuration file and pop its returned table
    pub fn read_file(&self, path: &Path) -> Result<LoadedConfig> {
        tracing::info!("reading config file {}", path.display());
        let values = self.runtime.eval_file(path)?;
        self.read_values(&values)
    }

    /// Run configuration source held in memory
    pub fn read_string(&self, source: &str, name: &str) -> Result<LoadedConfig> {
        tracing::info!("reading config {}", name);
        let values = self.runtime.eval(source, name)?;
        self.read_values(&values)
    }

    fn read_values(&self, values: &[Value]) -> Result<LoadedConfig> {
        let mut output_file = String::new();
        let mut settings = RenderSettings::default();
        let mut scene = SceneSettings::default();
        let mut camera = CameraSettings::default();
        let mut data: Option<Handle> = None;

        let RenderSettings {
            renderer_code,
            output_code,
            workgroup_size,
            image_size,
            iterations,
            max_depth,
        } = &mut settings;
        let bg = &mut scene.background;
        let CameraSettings {
            sensor_size,
            focal_length,
            position,
            rotation,
        } = &mut camera;

        let popped = self.runtime.marshaller().pop_sequence(
            values,
            CONFIG_SCHEMA,
            &mut slots![
                &mut output_file,
                renderer_code,
                output_code,
                &mut workgroup_size.x,
                &mut workgroup_size.y,
                &mut image_size.x,
                &mut image_size.y,
                iterations,
                max_depth,
                &mut scene.size.x,
                &mut scene.size.y,
                &mut scene.size.z,
                &mut bg.color.x,
                &mut bg.color.y,
                &mut bg.color.z,
                &mut bg.emission,
                &mut data,
                &mut sensor_size.x,
                &mut sensor_size.y,
                focal_length,
                &mut position.x,
                &mut position.y,
                &mut position.z,
                &mut rotation.x,
                &mut rotation.y,
                &mut rotation.z,
            ],
        );

        let config = RenderConfig {
            output_file,
            settings,
            scene,
            camera,
        };
        let checked = popped.map_err(ConfigError::from).and_then(|()| config.validate());
        if let Err(err) = checked {
            // The data function may be bound even when a later field failed
            if let Some(handle) = data {
                self.runtime.release(handle)?;
            }
            return Err(err);
        }

        Ok(LoadedConfig { config, data })
    }

    /// Run `scene.data` once against `sink`, then release it
    pub fn build_scene<S>(&self, loaded: &mut LoadedConfig, sink: &Rc<RefCell<S>>) -> Result<()>
    where
        S: SceneSink + 'static,
    {
        let handle = loaded.data.take().ok_or(ConfigError::MissingSceneData)?;
        let size = loaded.config.scene.size;

        let scene = self.runtime.marshaller().push(
            SCENE_SCHEMA,
            inputs![
                size.x,
                size.y,
                size.z,
                register_material(self.runtime.context(), sink.clone()),
                set_voxel(self.runtime.context(), sink.clone()),
            ],
        )?;

        tracing::info!("running Lua scene data function");
        let result = self.runtime.invoke(handle, &scene);
        self.runtime.release(handle)?;
        result?;
        Ok(())
    }
}

/// Arguments after the `self` table of a method call
fn method_args(args: &[Value]) -> &[Value] {
    args.get(1..).unwrap_or_default()
}

fn register_material<S: SceneSink + 'static>(
    context: MarshalContext,
    sink: Rc<RefCell<S>>,
) -> Callable {
    Callable::new(move |args| {
        let mut material = Material::default();
        let Material { color, emission } = &mut material;
        context
            .marshaller()
            .pop_sequence(
                method_args(args),
                MATERIAL_SCHEMA,
                &mut slots![&mut color.x, &mut color.y, &mut color.z, emission],
            )
            .map_err(|err| scripting::Error::runtime(format!("invalid material: {err}")))?;

        let id = sink.borrow_mut().register_material(material);
        Ok(vec![Value::from(id)])
    })
}

fn set_voxel<S: SceneSink + 'static>(context: MarshalContext, sink: Rc<RefCell<S>>) -> Callable {
    Callable::new(move |args| {
        let mut position = Vec3::ZERO;
        let mut material = 0u32;
        context
            .marshaller()
            .pop_sequence(
                method_args(args),
                SET_SCHEMA,
                &mut slots![&mut position.x, &mut position.y, &mut position.z, &mut material],
            )
            .map_err(|err| {
                scripting::Error::runtime(format!("invalid position or material: {err}"))
            })?;

        if !position.is_finite() || position.min_element() < 0.0 {
            return Err(scripting::Error::runtime(format!(
                "invalid position or material: position {position} is not a voxel coordinate"
            )));
        }

        sink.borrow_mut().set(position.as_uvec3(), material);
        Ok(vec![])
    })
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scripting::{Policy, RecordingLogger, Schema};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;
use voxel_config::{ConfigReader, Material, RenderConfig, SceneRecorder};

#[derive(Parser)]
#[command(name = "voxcfg")]
#[command(about = "Voxel render configuration inspector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a Lua render configuration and print what it describes
    Inspect {
        /// Configuration script returning the settings table
        file: PathBuf,

        /// Replace mismatched or missing fields with defaults instead of failing
        #[arg(long)]
        lenient: bool,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Skip running the scene data function
        #[arg(long)]
        no_scene: bool,
    },
    /// Parse a schema and print its canonical form and binding order
    Schema {
        /// Schema text, e.g. "{name: s, size: {1: i, 2: i}}; l"
        text: String,
    },
}

#[derive(Serialize)]
struct SceneSummary {
    materials: Vec<Material>,
    voxels: usize,
    filled: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    config: &'a RenderConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    scene: Option<SceneSummary>,
    defaulted: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            file,
            lenient,
            json,
            no_scene,
        } => inspect(&file, lenient, json, no_scene),
        Commands::Schema { text } => schema(&text),
    }
}

fn inspect(file: &Path, lenient: bool, json: bool, no_scene: bool) -> Result<()> {
    let policy = if lenient {
        Policy::Lenient
    } else {
        Policy::Strict
    };
    let logger = Rc::new(RecordingLogger::new());
    let reader = ConfigReader::new()?
        .with_policy(policy)
        .with_logger(logger.clone());

    let mut loaded = reader
        .read_file(file)
        .with_context(|| format!("failed to load config {}", file.display()))?;

    let scene = if no_scene || loaded.scene_data().is_none() {
        None
    } else {
        let settings = &loaded.config.scene;
        let recorder = Rc::new(RefCell::new(SceneRecorder::new(
            settings.size,
            settings.background,
        )?));
        reader
            .build_scene(&mut loaded, &recorder)
            .context("scene data function failed")?;

        let recorder = recorder.borrow();
        let summary = SceneSummary {
            materials: recorder.materials().to_vec(),
            voxels: recorder.voxels().len(),
            filled: recorder.filled(),
        };
        Some(summary)
    };

    let defaulted: Vec<String> = logger
        .warnings()
        .into_iter()
        .map(|record| record.path)
        .collect();
    tracing::debug!("{} fields defaulted", defaulted.len());

    let report = Report {
        config: &loaded.config,
        scene,
        defaulted,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &Report<'_>) {
    let config = report.config;
    let settings = &config.settings;
    let camera = &config.camera;

    println!("output:     {}", config.output_file);
    println!(
        "shaders:    {} then {}",
        settings.renderer_code, settings.output_code
    );
    println!(
        "image:      {}x{} (workgroups {}x{}, dispatch {})",
        settings.image_size.x,
        settings.image_size.y,
        settings.workgroup_size.x,
        settings.workgroup_size.y,
        config.dispatch_size()
    );
    println!(
        "sampling:   {} iterations, max depth {}",
        settings.iterations, settings.max_depth
    );
    println!(
        "scene:      {} voxels, background {} emission {}",
        config.scene.size, config.scene.background.color, config.scene.background.emission
    );
    println!(
        "camera:     at {} rotated {} (sensor {}, focal length {})",
        camera.position, camera.rotation, camera.sensor_size, camera.focal_length
    );

    if let Some(scene) = &report.scene {
        println!(
            "voxels:     {} of {} filled, {} materials",
            scene.filled,
            scene.voxels,
            scene.materials.len() - 1
        );
    }

    if !report.defaulted.is_empty() {
        println!("defaulted:  {}", report.defaulted.join(", "));
    }
}

fn schema(text: &str) -> Result<()> {
    let schema: Schema = text.parse().context("invalid schema")?;
    println!("{}", schema);
    for (i, tag) in schema.leaves().iter().enumerate() {
        println!("  {:>2}: {} ({})", i + 1, tag.as_char(), tag.name());
    }
    Ok(())
}

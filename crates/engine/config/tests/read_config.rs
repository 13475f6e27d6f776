use glam::{UVec2, UVec3, Vec3};
use scripting::{Policy, RecordingLogger};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use voxel_config::{ConfigError, ConfigReader, Material, SceneRecorder};

const BOX_SCENE: &str = r#"
local function box(scene, lo, hi, mat)
    for x = lo, hi do
        for y = lo, hi do
            for z = lo, hi do
                scene:set({x, y, z}, mat)
            end
        end
    end
end

return {
    output_file = "box.ppm",
    settings = {
        renderer_code = "shaders/renderer.comp",
        output_code = "shaders/output.comp",
        workgroup_size = {8, 8},
        image_size = {320, 240},
        iterations = 128,
        max_depth = 5,
    },
    scene = {
        size = {4, 4, 4},
        bg = {color = {0.2, 0.3, 0.5}, emission = 1},
        data = function(scene)
            local light = scene:register_material{color = {1, 1, 1}, emission = 4}
            local wall = scene:register_material{color = {0.5, 0.5, 0.5}, emission = 0}
            box(scene, 1, 2, wall)
            scene:set({0, 3, 0}, light)
            scene:set({scene.size.x, 0, 0}, light)
        end,
    },
    camera = {
        sensor_size = {0.036, 0.024},
        focal_length = 0.05,
        position = {2, 2, -10},
        rotation = {0, 0.5, 0},
    },
}
"#;

fn with_scene_data(body: &str) -> String {
    BOX_SCENE.replace(
        "data = function(scene)",
        &format!("data = function(scene) {body}\n"),
    )
}

#[test]
fn test_reads_file_and_builds_scene() {
    let mut file = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
    file.write_all(BOX_SCENE.as_bytes()).unwrap();

    let reader = ConfigReader::new().unwrap();
    let mut loaded = reader.read_file(file.path()).unwrap();
    let config = &loaded.config;

    assert_eq!(config.output_file, "box.ppm");
    assert_eq!(config.settings.renderer_code, "shaders/renderer.comp");
    assert_eq!(config.settings.workgroup_size, UVec2::new(8, 8));
    assert_eq!(config.settings.image_size, UVec2::new(320, 240));
    assert_eq!(config.settings.iterations, 128);
    assert_eq!(config.settings.max_depth, 5);
    assert_eq!(config.scene.size, UVec3::splat(4));
    assert_eq!(
        config.scene.background,
        Material::new(Vec3::new(0.2, 0.3, 0.5), 1.0)
    );
    assert_eq!(config.camera.focal_length, 0.05);
    assert_eq!(config.camera.position, Vec3::new(2.0, 2.0, -10.0));
    assert_eq!(config.camera.rotation.y, 0.5);
    assert!(loaded.scene_data().is_some());

    let scene = Rc::new(RefCell::new(SceneRecorder::new(
        config.scene.size,
        config.scene.background,
    ).unwrap()));
    reader.build_scene(&mut loaded, &scene).unwrap();

    let scene = scene.borrow();
    assert_eq!(scene.materials().len(), 3);
    assert_eq!(scene.material(1).unwrap().emission, 4.0);
    assert_eq!(scene.get(UVec3::new(1, 2, 1)), Some(2));
    assert_eq!(scene.get(UVec3::new(0, 3, 0)), Some(1));
    assert_eq!(scene.get(UVec3::new(3, 3, 3)), Some(0));
    assert_eq!(scene.filled(), 9);

    // The data function runs once and is released afterwards
    assert!(loaded.scene_data().is_none());
    assert!(reader.runtime().registry().is_empty());
}

#[test]
fn test_scene_data_can_only_run_once() {
    let reader = ConfigReader::new().unwrap();
    let mut loaded = reader.read_string(BOX_SCENE, "box").unwrap();
    let scene = Rc::new(RefCell::new(SceneRecorder::new(
        UVec3::splat(4),
        Material::default(),
    ).unwrap()));

    reader.build_scene(&mut loaded, &scene).unwrap();
    assert!(matches!(
        reader.build_scene(&mut loaded, &scene),
        Err(ConfigError::MissingSceneData)
    ));
}

#[test]
fn test_strict_mismatch_names_the_field() {
    let source = BOX_SCENE.replace("iterations = 128", "iterations = \"lots\"");
    let err = ConfigReader::new()
        .unwrap()
        .read_string(&source, "bad")
        .unwrap_err();

    match err {
        ConfigError::Script(scripting::Error::TypeMismatch { path, .. }) => {
            assert_eq!(path, "settings.iterations")
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_lenient_reader_defaults_bad_fields() {
    let source = BOX_SCENE
        .replace("iterations = 128", "iterations = \"lots\"")
        .replace("focal_length = 0.05,", "");
    let logger = Rc::new(RecordingLogger::new());
    let reader = ConfigReader::new()
        .unwrap()
        .with_policy(Policy::Lenient)
        .with_logger(logger.clone());

    let loaded = reader.read_string(&source, "lenient").unwrap();
    assert_eq!(loaded.config.settings.iterations, 0);
    assert_eq!(loaded.config.camera.focal_length, 0.0);
    assert_eq!(loaded.config.settings.max_depth, 5);

    let paths: Vec<String> = logger.warnings().into_iter().map(|w| w.path).collect();
    assert_eq!(paths, vec!["settings.iterations", "camera.focal_length"]);
}

#[test]
fn test_rejects_zero_image_size() {
    let source = BOX_SCENE.replace("image_size = {320, 240}", "image_size = {320, 0}");
    let reader = ConfigReader::new().unwrap();
    assert!(matches!(
        reader.read_string(&source, "zero"),
        Err(ConfigError::InvalidSetting {
            field: "settings.image_size",
            ..
        })
    ));
    assert!(reader.runtime().registry().is_empty());
}

#[test]
fn test_rejects_oversized_scene() {
    let reader = ConfigReader::new().unwrap();
    for size in ["{4294967295, 4294967295, 4294967295}", "{100000, 100000, 100000}", "{4, 0, 4}"] {
        let source = BOX_SCENE.replace("size = {4, 4, 4}", &format!("size = {size}"));
        assert!(matches!(
            reader.read_string(&source, "huge"),
            Err(ConfigError::InvalidSetting {
                field: "scene.size",
                ..
            })
        ));
    }
    assert!(reader.runtime().registry().is_empty());
}

#[test]
fn test_negative_size_is_out_of_range() {
    let source = BOX_SCENE.replace("size = {4, 4, 4}", "size = {4, -4, 4}");
    let err = ConfigReader::new()
        .unwrap()
        .read_string(&source, "negative")
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Script(scripting::Error::OutOfRange { ref path, .. }) if path == "scene.size[2]"
    ));
}

#[test]
fn test_bad_material_raises_into_lua() {
    let source = with_scene_data(
        r#"
        local ok, err = pcall(scene.register_material, scene, {color = "red", emission = 1})
        assert(not ok)
        assert(string.find(tostring(err), "invalid material"))
        "#,
    );
    let reader = ConfigReader::new().unwrap();
    let mut loaded = reader.read_string(&source, "material").unwrap();
    let scene = Rc::new(RefCell::new(SceneRecorder::new(
        UVec3::splat(4),
        Material::default(),
    ).unwrap()));
    reader.build_scene(&mut loaded, &scene).unwrap();
    assert_eq!(scene.borrow().materials().len(), 3);
}

#[test]
fn test_host_callback_failures_reach_the_reader_logger() {
    let source = with_scene_data(
        r#"
        pcall(scene.register_material, scene, {color = {1, 1, 1}, emission = "bright"})
        "#,
    );
    let logger = Rc::new(RecordingLogger::new());
    let reader = ConfigReader::new()
        .unwrap()
        .with_logger(logger.clone());
    let mut loaded = reader.read_string(&source, "logged").unwrap();
    assert!(logger.records().is_empty());

    let scene = Rc::new(RefCell::new(SceneRecorder::new(
        UVec3::splat(4),
        Material::default(),
    ).unwrap()));
    reader.build_scene(&mut loaded, &scene).unwrap();

    let errors = logger.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "emission");
}

#[test]
fn test_uncaught_host_error_fails_the_build() {
    let source = with_scene_data("scene:set({-1, 0, 0}, 1)");
    let reader = ConfigReader::new().unwrap();
    let mut loaded = reader.read_string(&source, "set").unwrap();
    let scene = Rc::new(RefCell::new(SceneRecorder::new(
        UVec3::splat(4),
        Material::default(),
    ).unwrap()));

    let err = reader.build_scene(&mut loaded, &scene).unwrap_err();
    assert!(err.to_string().contains("invalid position or material"));
    assert!(reader.runtime().registry().is_empty());
}

#[test]
fn test_config_serializes_to_json() {
    let reader = ConfigReader::new().unwrap();
    let loaded = reader.read_string(BOX_SCENE, "json").unwrap();

    let json = serde_json::to_value(&loaded.config).unwrap();
    assert_eq!(json["output_file"], "box.ppm");
    assert_eq!(json["settings"]["image_size"], serde_json::json!([320, 240]));
    assert_eq!(json["scene"]["size"], serde_json::json!([4, 4, 4]));
}

mod common;

use std::{fs, path::Path};

use serde_json::json;
use vrm_opt::prelude::*;

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn run(dir: &Path, name: &str, bytes: &[u8], mode: Mode) -> vrm_opt::Result<Report> {
    let input = dir.join(name);
    fs::write(&input, bytes).unwrap();
    let config = PipelineConfig::new(input, None, mode, PassSettings::default());
    Pipeline::new().run(&config)
}

fn seed(agent: &str, personality: &str, message: &str) -> Mode {
    Mode::Tag(PersonalitySeed {
        agent: Some(agent.into()),
        personality: Some(personality.into()),
        default_message: Some(message.into()),
    })
}

#[test]
fn seeds_end_up_in_the_output() {
    let dir = tempfile::tempdir().unwrap();
    let vrm = json!({ "VRM": { "meta": { "title": "Alicia" }, "humanoid": { "humanBones": [{ "bone": "hips", "node": 0 }] } } });

    let report = run(
        dir.path(),
        "avatar.vrm",
        &common::avatar(Some(vrm)),
        seed("Rex", "#agent is grumpy", "grr"),
    )
    .unwrap();

    assert_eq!(report.output, dir.path().join("avatar_output.vrm"));
    let out = common::json_of(&fs::read(&report.output).unwrap());
    assert_eq!(
        out["extensions"]["OMI_personality"],
        json!({ "agent": "Rex", "personality": "#agent is grumpy", "defaultMessage": "grr" })
    );
    assert_eq!(out["extensions"]["VRM"]["humanoid"]["humanBones"][0]["node"], 0);
    assert_eq!(out["nodes"][0]["name"], "Body");
    let used = out["extensionsUsed"].as_array().unwrap();
    assert!(used.contains(&json!("VRM")));
    assert!(used.contains(&json!("OMI_personality")));
}

#[test]
fn tag_without_seeds_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(
        dir.path(),
        "avatar.vrm",
        &common::avatar(None),
        Mode::Tag(PersonalitySeed::default()),
    )
    .unwrap();

    let out = common::json_of(&fs::read(&report.output).unwrap());
    assert_eq!(
        out["extensions"]["OMI_personality"],
        json!({ "agent": "tubby", "personality": "#agent is cheery", "defaultMessage": "nya nya!" })
    );
}

#[test]
fn absent_vrm_block_stays_absent() {
    let dir = tempfile::tempdir().unwrap();
    let report = run(dir.path(), "plain.glb", &common::avatar(None), Mode::Optimize).unwrap();

    let out = common::json_of(&fs::read(&report.output).unwrap());
    assert!(out.get("extensions").is_none());
    assert!(out.get("extensionsUsed").is_none());
}

#[test]
fn scratch_files_are_gone_after_success() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), "avatar.vrm", &common::avatar(None), Mode::Optimize).unwrap();

    assert_eq!(file_names(dir.path()), ["avatar.vrm", "avatar_output.vrm"]);
}

#[test]
fn scratch_files_are_gone_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(dir.path(), "broken.vrm", b"not a model at all", Mode::Optimize);

    assert!(result.is_err());
    assert_eq!(file_names(dir.path()), ["broken.vrm"]);
}

#[test]
fn distinct_inputs_get_distinct_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = run(dir.path(), "a.vrm", &common::avatar(None), seed("A", "a", "a")).unwrap();
    let b = run(dir.path(), "b.vrm", &common::avatar(None), seed("B", "b", "b")).unwrap();

    assert_ne!(a.output, b.output);
    let a = common::json_of(&fs::read(&a.output).unwrap());
    let b = common::json_of(&fs::read(&b.output).unwrap());
    assert_eq!(a["extensions"]["OMI_personality"]["agent"], "A");
    assert_eq!(b["extensions"]["OMI_personality"]["agent"], "B");
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::new(
        dir.path().join("nowhere.vrm"),
        None,
        Mode::Optimize,
        PassSettings::default(),
    );
    assert!(matches!(Pipeline::new().run(&config), Err(Error::Io { .. })));
}

#[test]
fn missing_output_directory_leaves_no_scratch_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("avatar.vrm");
    fs::write(&input, common::avatar(None)).unwrap();
    let config = PipelineConfig::new(
        input,
        Some(dir.path().join("missing").join("out.vrm")),
        Mode::Optimize,
        PassSettings::default(),
    );

    assert!(matches!(Pipeline::new().run(&config), Err(Error::Io { .. })));
    assert_eq!(file_names(dir.path()), ["avatar.vrm"]);
}

#[test]
fn quantization_declaration_survives() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::avatar_with(None, |root, _| {
        root["extensionsUsed"] = json!(["KHR_mesh_quantization"]);
        root["extensionsRequired"] = json!(["KHR_mesh_quantization"]);
    });
    let report = run(dir.path(), "avatar.vrm", &bytes, Mode::Optimize).unwrap();

    let out = common::json_of(&fs::read(&report.output).unwrap());
    assert_eq!(out["extensionsUsed"], json!(["KHR_mesh_quantization"]));
    assert_eq!(out["extensionsRequired"], json!(["KHR_mesh_quantization"]));
}

#[test]
fn texture_transform_on_a_material_survives() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::avatar_with(None, |root, _| {
        root["meshes"][0]["primitives"][0]["material"] = json!(0);
        root["images"] = json!([{ "uri": "skin.png" }]);
        root["textures"] = json!([{ "source": 0 }]);
        root["materials"] = json!([{
            "pbrMetallicRoughness": {
                "baseColorTexture": {
                    "index": 0,
                    "extensions": { "KHR_texture_transform": { "offset": [0.5, 0.0], "scale": [0.5, 1.0] } }
                }
            }
        }]);
        root["extensionsUsed"] = json!(["KHR_texture_transform"]);
    });
    let report = run(dir.path(), "avatar.vrm", &bytes, Mode::Optimize).unwrap();

    let out = common::json_of(&fs::read(&report.output).unwrap());
    let info = &out["materials"][0]["pbrMetallicRoughness"]["baseColorTexture"];
    assert_eq!(info["index"], 0);
    assert_eq!(
        info["extensions"]["KHR_texture_transform"],
        json!({ "offset": [0.5, 0.0], "scale": [0.5, 1.0] })
    );
    assert_eq!(out["extensionsUsed"], json!(["KHR_texture_transform"]));
}

#[test]
fn morph_weight_animation_keeps_scalar_output() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = common::avatar_with(None, |root, bin| {
        root["meshes"][0]["primitives"][0]["targets"] = json!([{ "POSITION": 0 }, { "POSITION": 0 }]);
        root["meshes"][0]["weights"] = json!([0.0, 0.0]);
        let input = common::push_floats(root, bin, &[0.0, 1.0, 2.0], "SCALAR", 1);
        let output = common::push_floats(root, bin, &[0.0, 1.0, 0.5, 0.5, 1.0, 0.0], "SCALAR", 1);
        root["accessors"][input]["min"] = json!([0.0]);
        root["accessors"][input]["max"] = json!([2.0]);
        root["animations"] = json!([{
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "weights" } }],
            "samplers": [{ "input": input, "output": output, "interpolation": "LINEAR" }]
        }]);
    });
    let report = run(dir.path(), "avatar.vrm", &bytes, Mode::Optimize).unwrap();

    let out = common::json_of(&fs::read(&report.output).unwrap());
    let sampler = &out["animations"][0]["samplers"][0];
    let input = &out["accessors"][sampler["input"].as_u64().unwrap() as usize];
    let output = &out["accessors"][sampler["output"].as_u64().unwrap() as usize];
    assert_eq!(input["count"], 2);
    assert_eq!(output["type"], "SCALAR");
    assert_eq!(output["count"], 4);
}

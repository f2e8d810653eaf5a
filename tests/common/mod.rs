//! GLB fixtures built in memory.

use std::borrow::Cow;

use serde_json::{Value, json};

/// A one-triangle avatar with `extensions` as its root extension map.
pub fn avatar(extensions: Option<Value>) -> Vec<u8> {
    avatar_with(extensions, |_, _| {})
}

/// Like [`avatar`], with `edit` applied to the JSON and binary chunk first.
pub fn avatar_with(extensions: Option<Value>, edit: impl FnOnce(&mut Value, &mut Vec<u8>)) -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let indices: [u16; 3] = [0, 1, 2];

    let mut bin: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
    bin.extend(indices.iter().flat_map(|i| i.to_le_bytes()));
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let mut root = json!({
        "asset": { "version": "2.0", "generator": "fixture" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Body", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ],
        "bufferViews": [
            { "buffer": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
        ],
        "buffers": [{ "byteLength": bin.len() }]
    });
    edit(&mut root, &mut bin);
    root["buffers"][0]["byteLength"] = json!(bin.len());
    if let Some(extensions) = extensions {
        let names: Vec<String> = extensions
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        root["extensionsUsed"] = json!(names);
        root["extensions"] = extensions;
    }

    glb(&root, bin)
}

/// Appends `values` as a new float accessor of `ty`, returning its index.
pub fn push_floats(root: &mut Value, bin: &mut Vec<u8>, values: &[f32], ty: &str, width: usize) -> usize {
    let offset = bin.len();
    bin.extend(values.iter().flat_map(|v| v.to_le_bytes()));

    let views = root["bufferViews"].as_array_mut().unwrap();
    views.push(json!({ "buffer": 0, "byteOffset": offset, "byteLength": values.len() * 4 }));
    let view = views.len() - 1;
    let accessors = root["accessors"].as_array_mut().unwrap();
    accessors.push(json!({
        "bufferView": view,
        "componentType": 5126,
        "count": values.len() / width,
        "type": ty
    }));
    accessors.len() - 1
}

pub fn glb(root: &Value, bin: Vec<u8>) -> Vec<u8> {
    let json = serde_json::to_vec(root).unwrap();
    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: (json.len() + bin.len()) as u32,
        },
        json: Cow::Owned(json),
        bin: Some(Cow::Owned(bin)),
    };
    let mut out = Vec::new();
    glb.to_writer(&mut out).unwrap();
    out
}

/// The JSON chunk of a GLB file.
pub fn json_of(glb: &[u8]) -> Value {
    let glb = gltf::binary::Glb::from_slice(glb).unwrap();
    serde_json::from_slice(&glb.json).unwrap()
}

//! In-memory glTF fixtures for unit tests.

use std::borrow::Cow;

use gltf::json::{Accessor, Index, Mesh, Node, Root, accessor::ComponentType, accessor::Type};
use serde_json::{Value, json};

use crate::buffer::{f32_bytes, pad_to_4bytes};
use crate::document::Document;
use crate::extension::Registry;

pub(crate) struct GlbBuilder {
    json: Value,
    blob: Vec<u8>,
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self {
            json: json!({ "asset": { "version": "2.0" } }),
            blob: Vec::new(),
        }
    }

    /// Appends `value` to the top-level array `key`, returning its index.
    pub fn push(&mut self, key: &str, value: Value) -> u32 {
        if !self.json[key].is_array() {
            self.json[key] = json!([]);
        }
        let list = self.json[key].as_array_mut().unwrap();
        list.push(value);
        (list.len() - 1) as u32
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.json[key] = value;
        self
    }

    pub fn raw_accessor(
        &mut self,
        bytes: &[u8],
        stride: Option<usize>,
        component: ComponentType,
        ty: Type,
        count: usize,
    ) -> Index<Accessor> {
        pad_to_4bytes(&mut self.blob);
        let offset = self.blob.len();
        self.blob.extend_from_slice(bytes);

        let mut view = json!({ "buffer": 0, "byteOffset": offset, "byteLength": bytes.len() });
        if let Some(stride) = stride {
            view["byteStride"] = json!(stride);
        }
        let view = self.push("bufferViews", view);
        let acc = self.push(
            "accessors",
            json!({
                "bufferView": view,
                "componentType": component.as_gl_enum(),
                "count": count,
                "type": type_name(ty),
            }),
        );
        Index::new(acc)
    }

    pub fn floats(&mut self, values: &[f32], ty: Type) -> Index<Accessor> {
        let count = values.len() / ty.multiplicity();
        self.raw_accessor(&f32_bytes(values), None, ComponentType::F32, ty, count)
    }

    pub fn indices(&mut self, indices: &[u32]) -> Index<Accessor> {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.raw_accessor(&bytes, None, ComponentType::U32, Type::Scalar, indices.len())
    }

    pub fn mesh(&mut self, positions: &[[f32; 3]], indices: &[u32]) -> Index<Mesh> {
        let flat: Vec<f32> = positions.iter().flatten().copied().collect();
        let pos = self.floats(&flat, Type::Vec3);
        let idx = self.indices(indices);
        let mesh = self.push(
            "meshes",
            json!({ "primitives": [{ "attributes": { "POSITION": pos.value() }, "indices": idx.value() }] }),
        );
        Index::new(mesh)
    }

    /// Embeds encoded image bytes and adds a texture sampling them.
    pub fn image(&mut self, bytes: &[u8], mime: &str) -> u32 {
        pad_to_4bytes(&mut self.blob);
        let offset = self.blob.len();
        self.blob.extend_from_slice(bytes);

        let view = self.push(
            "bufferViews",
            json!({ "buffer": 0, "byteOffset": offset, "byteLength": bytes.len() }),
        );
        let image = self.push("images", json!({ "bufferView": view, "mimeType": mime }));
        self.push("textures", json!({ "source": image }));
        image
    }

    /// Adds a node and lists it in scene 0.
    pub fn node(&mut self, node: Value) -> Index<Node> {
        let index = self.push("nodes", node);
        if self.json["scenes"].is_null() {
            self.json["scenes"] = json!([{ "nodes": [] }]);
            self.json["scene"] = json!(0);
        }
        if let Some(nodes) = self.json["scenes"][0]["nodes"].as_array_mut() {
            nodes.push(json!(index));
        }
        Index::new(index)
    }

    pub fn finish(self) -> (Root, Vec<u8>) {
        let (json, blob) = self.into_parts();
        let bytes = serde_json::to_vec(&json).unwrap();
        (serde_json::from_slice(&bytes).unwrap(), blob)
    }

    pub fn glb(self) -> Vec<u8> {
        let (json, blob) = self.into_parts();
        let json = serde_json::to_vec(&json).unwrap();
        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: (json.len() + blob.len()) as u32,
            },
            json: Cow::Owned(json),
            bin: if blob.is_empty() {
                None
            } else {
                Some(Cow::Owned(blob))
            },
        };
        let mut out = Vec::new();
        glb.to_writer(&mut out).unwrap();
        out
    }

    pub fn document(self) -> Document {
        Document::from_slice(&self.glb(), None, &Registry::builtin()).unwrap()
    }

    fn into_parts(mut self) -> (Value, Vec<u8>) {
        pad_to_4bytes(&mut self.blob);
        if !self.blob.is_empty() {
            self.json["buffers"] = json!([{ "byteLength": self.blob.len() }]);
        }
        (self.json, self.blob)
    }
}

fn type_name(ty: Type) -> &'static str {
    match ty {
        Type::Scalar => "SCALAR",
        Type::Vec2 => "VEC2",
        Type::Vec3 => "VEC3",
        Type::Vec4 => "VEC4",
        Type::Mat2 => "MAT2",
        Type::Mat3 => "MAT3",
        Type::Mat4 => "MAT4",
    }
}

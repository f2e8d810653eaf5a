//! In-memory glTF document: typed JSON, one binary blob, and the extension
//! blocks the typed model does not know about.

use std::{
    borrow::Cow,
    collections::BTreeSet,
    fs,
    io::Cursor,
    path::Path,
};

use gltf::json::{self, Root};
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::{
    buffer,
    error::{Error, Result},
    extension::{Descriptor, Registry, State},
};

/// A registered extension block and its current contents.
#[derive(Debug, Clone)]
pub struct Extension {
    pub descriptor: Descriptor,
    pub state: State,
}

/// Raw `extensions` objects of nodes, materials and textures, by index,
/// plus those nested in a material's texture references.
///
/// Any entry being present locks indices (see [`Document::indices_locked`]),
/// so passes that renumber those entities never run while this table holds
/// data and it does not need remapping.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntityExtensions {
    pub nodes: Vec<Option<Map<String, Value>>>,
    pub materials: Vec<Option<Map<String, Value>>>,
    pub textures: Vec<Option<Map<String, Value>>>,
    /// Per material, one entry per [`TEXTURE_SLOTS`] pointer.
    pub material_textures: Vec<Vec<Option<Map<String, Value>>>>,
}

const ENTITY_KEYS: [&str; 3] = ["nodes", "materials", "textures"];

/// Texture references inside a material, as JSON pointers.
const TEXTURE_SLOTS: [&str; 5] = [
    "/pbrMetallicRoughness/baseColorTexture",
    "/pbrMetallicRoughness/metallicRoughnessTexture",
    "/normalTexture",
    "/occlusionTexture",
    "/emissiveTexture",
];

fn take_extensions(obj: Option<&mut Value>) -> Option<Map<String, Value>> {
    match obj?.as_object_mut()?.remove("extensions")? {
        Value::Object(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn restore_extensions(obj: Option<&mut Value>, extensions: &Option<Map<String, Value>>) {
    if let (Some(obj), Some(ext)) = (obj.and_then(Value::as_object_mut), extensions) {
        obj.insert("extensions".into(), Value::Object(ext.clone()));
    }
}

impl EntityExtensions {
    /// Moves every entity `extensions` object out of `raw`.
    fn take(raw: &mut Value) -> Self {
        let mut table = Self::default();
        for key in ENTITY_KEYS {
            let Some(list) = raw.get_mut(key).and_then(Value::as_array_mut) else {
                continue;
            };
            let taken = list.iter_mut().map(|entity| take_extensions(Some(entity))).collect();
            *table.list_mut(key) = taken;
        }
        if let Some(materials) = raw.get_mut("materials").and_then(Value::as_array_mut) {
            table.material_textures = materials
                .iter_mut()
                .map(|material| {
                    TEXTURE_SLOTS
                        .iter()
                        .map(|slot| take_extensions(material.pointer_mut(slot)))
                        .collect()
                })
                .collect();
        }
        table
    }

    fn restore(&self, value: &mut Value) {
        for key in ENTITY_KEYS {
            let Some(list) = value.get_mut(key).and_then(Value::as_array_mut) else {
                continue;
            };
            for (entity, extensions) in list.iter_mut().zip(self.list(key)) {
                restore_extensions(Some(entity), extensions);
            }
        }
        if let Some(materials) = value.get_mut("materials").and_then(Value::as_array_mut) {
            for (material, slots) in materials.iter_mut().zip(&self.material_textures) {
                for (slot, extensions) in TEXTURE_SLOTS.iter().zip(slots) {
                    restore_extensions(material.pointer_mut(slot), extensions);
                }
            }
        }
    }

    fn list(&self, key: &str) -> &[Option<Map<String, Value>>] {
        match key {
            "nodes" => &self.nodes,
            "materials" => &self.materials,
            _ => &self.textures,
        }
    }

    fn list_mut(&mut self, key: &str) -> &mut Vec<Option<Map<String, Value>>> {
        match key {
            "nodes" => &mut self.nodes,
            "materials" => &mut self.materials,
            _ => &mut self.textures,
        }
    }

    fn is_empty(&self) -> bool {
        ENTITY_KEYS
            .iter()
            .all(|key| self.list(key).iter().all(Option::is_none))
            && self.material_textures.iter().flatten().all(Option::is_none)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub root: Root,
    pub blob: Vec<u8>,
    pub(crate) entities: EntityExtensions,
    extensions: Vec<Extension>,
    /// Names listed in `extensionsUsed` that have no `extensions` object in
    /// the input, such as `KHR_mesh_quantization`. They stay declared.
    declared: BTreeSet<String>,
}

impl Document {
    /// Reads a `.glb` or `.gltf` file. Buffers referenced by relative URI are
    /// resolved against the file's directory.
    pub fn read(path: &Path, registry: &Registry) -> Result<Document> {
        let bytes = fs::read(path).map_err(|e| Error::io("read", path, e))?;
        Document::from_slice(&bytes, path.parent(), registry)
    }

    pub fn from_slice(bytes: &[u8], base: Option<&Path>, registry: &Registry) -> Result<Document> {
        let (json_bytes, bin) = if bytes.starts_with(b"glTF") {
            let glb = gltf::binary::Glb::from_slice(bytes)?;
            (glb.json.into_owned(), glb.bin.map(Cow::into_owned))
        } else {
            (bytes.to_vec(), None)
        };

        let mut raw: Value = serde_json::from_slice(&json_bytes)?;
        let mut present = BTreeSet::new();
        collect_extension_names(&raw, &mut present);
        let declared = string_list(raw.get("extensionsUsed"))
            .into_iter()
            .filter(|name| !present.contains(name))
            .collect();
        let entities = EntityExtensions::take(&mut raw);
        let root_extensions = match raw.as_object_mut().and_then(|o| o.remove("extensions")) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mut root: Root = serde_json::from_slice(&serde_json::to_vec(&raw)?)?;

        let data = gltf::import_buffers(
            &gltf::Document::from_json_without_validation(root.clone()),
            base,
            bin,
        )?;
        let buffers: Vec<Vec<u8>> = data.into_iter().map(|d| d.0).collect();
        let blob = buffer::merge_buffers(&mut root, &buffers);

        for name in root_extensions.keys().filter(|k| !registry.contains(k)) {
            warn!("dropping unregistered extension {name}");
        }
        let extensions = registry
            .iter()
            .map(|descriptor| Extension {
                descriptor: *descriptor,
                state: descriptor.decode(&root_extensions),
            })
            .collect();

        Ok(Document {
            root,
            blob,
            entities,
            extensions,
            declared,
        })
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn extension(&self, name: &str) -> Option<&State> {
        self.extensions
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| &e.state)
    }

    /// Locates the block for `descriptor`, attaching an empty one if the
    /// document was read without it.
    pub fn create_extension(&mut self, descriptor: Descriptor) -> &mut State {
        let pos = match self
            .extensions
            .iter()
            .position(|e| e.descriptor.name == descriptor.name)
        {
            Some(pos) => pos,
            None => {
                self.extensions.push(Extension {
                    descriptor,
                    state: State::new(),
                });
                self.extensions.len() - 1
            }
        };
        &mut self.extensions[pos].state
    }

    /// True while a loaded block may refer to nodes, meshes, materials or
    /// textures by index. Passes must not renumber those entities then.
    pub fn indices_locked(&self) -> bool {
        self.extensions
            .iter()
            .any(|e| e.descriptor.references_indices && !e.state.is_empty())
            || !self.entities.is_empty()
    }

    pub(crate) fn texture_extensions_mut(&mut self, texture: usize) -> &mut Map<String, Value> {
        let table = &mut self.entities.textures;
        if table.len() <= texture {
            table.resize(texture + 1, None);
        }
        table[texture].get_or_insert_with(Map::new)
    }

    /// Serializes the document as GLB. Unreferenced binary data is dropped.
    pub fn to_glb(&self) -> Result<Vec<u8>> {
        let mut root = self.root.clone();
        let blob = buffer::compact(&mut root, &self.blob)?;

        let mut value: Value = serde_json::from_slice(&json::serialize::to_vec(&root)?)?;
        self.entities.restore(&mut value);

        let mut emitted = Map::new();
        for ext in &self.extensions {
            if let Some(block) = ext.descriptor.encode(&ext.state) {
                emitted.insert(ext.descriptor.name.to_string(), block);
            } else {
                debug!("{} is empty, not writing it", ext.descriptor.name);
            }
        }
        if let Some(obj) = value.as_object_mut() {
            if emitted.is_empty() {
                obj.remove("extensions");
            } else {
                obj.insert("extensions".into(), Value::Object(emitted));
            }
        }
        update_extension_lists(&mut value, &self.declared);

        let json_bytes = serde_json::to_vec(&value)?;

        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: (json_bytes.len() + blob.len()) as u32,
            },
            json: Cow::Owned(json_bytes),
            bin: if blob.is_empty() {
                None
            } else {
                Some(Cow::Owned(blob))
            },
        };

        let mut result: Vec<u8> = Vec::new();
        let writer = Cursor::new(&mut result);

        glb.to_writer(writer)?;

        Ok(result)
    }
}

/// Names of every extension object present anywhere in `value`.
fn collect_extension_names(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                if key == "extensions" {
                    if let Value::Object(ext) = child {
                        names.extend(ext.keys().cloned());
                    }
                }
                collect_extension_names(child, names);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_extension_names(item, names);
            }
        }
        _ => {}
    }
}

/// Keeps `extensionsUsed`/`extensionsRequired` in line with what is written:
/// names that no longer appear are removed, new ones are appended to
/// `extensionsUsed`. `declared` names have no object form and always stay.
fn update_extension_lists(value: &mut Value, declared: &BTreeSet<String>) {
    let mut present = declared.clone();
    collect_extension_names(value, &mut present);

    let Some(obj) = value.as_object_mut() else {
        return;
    };

    let mut used = string_list(obj.get("extensionsUsed"));
    used.retain(|name| present.contains(name));
    for name in &present {
        if !used.contains(name) {
            used.push(name.clone());
        }
    }
    let mut required = string_list(obj.get("extensionsRequired"));
    required.retain(|name| present.contains(name));

    for (key, list) in [("extensionsUsed", used), ("extensionsRequired", required)] {
        if list.is_empty() {
            obj.remove(key);
        } else {
            obj.insert(key.into(), list.into());
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

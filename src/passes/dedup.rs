use std::collections::HashMap;
use std::hash::Hash;

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use super::Transform;
use crate::{
    buffer,
    document::Document,
    error::Result,
    remap::{self, Remap},
};

/// Merges entries with identical content.
///
/// Accessors are compared by layout and bytes. Images, textures, materials
/// and meshes are compared by content ignoring their names, and only merged
/// when indices are not locked.
pub struct Dedup;

impl Transform for Dedup {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let mut merged = vec![("accessors", dedup_accessors(doc))];

        if doc.indices_locked() {
            debug!("dedup: indices locked by vendor extensions, merging accessors only");
        } else {
            merged.push(("images", dedup_images(doc)));

            let root = &mut doc.root;
            let canonical = canonical_by(&root.textures, content_key);
            let remap = Remap::merge(&mut root.textures, &canonical);
            remap::textures(root, &remap);
            merged.push(("textures", remap.removed()));

            let canonical = canonical_by(&root.materials, content_key);
            let remap = Remap::merge(&mut root.materials, &canonical);
            remap::materials(root, &remap);
            merged.push(("materials", remap.removed()));

            let canonical = canonical_by(&root.meshes, content_key);
            let remap = Remap::merge(&mut root.meshes, &canonical);
            remap::meshes(root, &remap);
            merged.push(("meshes", remap.removed()));
        }

        let summary: Vec<String> = merged
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(what, n)| format!("{n} {what}"))
            .collect();
        if !summary.is_empty() {
            info!("dedup: merged {}", summary.join(", "));
        }
        Ok(())
    }
}

/// For every item, the index of the first item with the same key. Items
/// without a key are never merged.
fn canonical_by<T, K, F>(items: &[T], key: F) -> Vec<usize>
where
    K: Eq + Hash,
    F: Fn(usize, &T) -> Option<K>,
{
    let mut seen: HashMap<K, usize> = HashMap::new();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match key(i, item) {
            Some(k) => *seen.entry(k).or_insert(i),
            None => i,
        })
        .collect()
}

/// Serialized form with the name left out.
fn content_key<T: Serialize>(_: usize, item: &T) -> Option<String> {
    let mut value: Value = serde_json::from_slice(&serde_json::to_vec(item).ok()?).ok()?;
    if let Value::Object(obj) = &mut value {
        obj.remove("name");
    }
    Some(value.to_string())
}

fn dedup_accessors(doc: &mut Document) -> usize {
    let root = &doc.root;
    let blob = &doc.blob;
    let canonical = canonical_by(&root.accessors, |i, acc| {
        let bytes = buffer::accessor_bytes(root, blob, gltf::json::Index::new(i as u32)).ok()?;
        let target = acc
            .buffer_view
            .and_then(|v| root.buffer_views.get(v.value()))
            .and_then(|v| v.target);
        // POSITION needs bounds, so an accessor with them never maps to one without
        let header = format!(
            "{:?}/{:?}/{}/{:?}/{:?}/{:?}",
            acc.component_type, acc.type_, acc.normalized, target, acc.min, acc.max
        );
        Some((header, bytes))
    });

    let root = &mut doc.root;
    let remap = Remap::merge(&mut root.accessors, &canonical);
    remap::accessors(root, &remap);
    remap.removed()
}

fn dedup_images(doc: &mut Document) -> usize {
    let root = &doc.root;
    let blob = &doc.blob;
    let canonical = canonical_by(&root.images, |_, img| {
        let mime = img.mime_type.as_ref().map(|m| m.0.clone());
        match (&img.uri, img.buffer_view) {
            (Some(uri), _) => Some((mime, uri.clone().into_bytes())),
            (None, Some(view)) => Some((mime, buffer::view_bytes(root, blob, view)?.to_vec())),
            (None, None) => None,
        }
    });

    let root = &mut doc.root;
    let remap = Remap::merge(&mut root.images, &canonical);
    remap::images(root, &remap);
    remap.removed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::GlbBuilder;
    use gltf::json::{accessor::Type, mesh::Semantic, validation::Checked};
    use serde_json::json;

    const TRI: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    #[test]
    fn identical_meshes_collapse_into_one() {
        let mut b = GlbBuilder::new();
        let a = b.mesh(&TRI, &[0, 1, 2]);
        let c = b.mesh(&TRI, &[0, 1, 2]);
        b.node(json!({ "mesh": a.value() }));
        b.node(json!({ "mesh": c.value() }));
        let mut doc = b.document();

        Dedup.apply(&mut doc).unwrap();
        assert_eq!(doc.root.accessors.len(), 2);
        assert_eq!(doc.root.meshes.len(), 1);
        assert_eq!(doc.root.nodes[1].mesh.map(|m| m.value()), Some(0));
    }

    #[test]
    fn locked_document_merges_accessors_only() {
        let mut b = GlbBuilder::new();
        let a = b.mesh(&TRI, &[0, 1, 2]);
        let c = b.mesh(&TRI, &[0, 1, 2]);
        b.node(json!({ "mesh": a.value() }));
        b.node(json!({ "mesh": c.value() }));
        b.set("extensions", json!({ "VRMC_vrm": { "specVersion": "1.0" } }));
        let mut doc = b.document();

        Dedup.apply(&mut doc).unwrap();
        assert_eq!(doc.root.accessors.len(), 2);
        assert_eq!(doc.root.meshes.len(), 2);
        let p = &doc.root.meshes[1].primitives[0];
        assert_eq!(p.indices.map(|i| i.value()), Some(1));
    }

    #[test]
    fn different_bytes_are_not_merged() {
        let mut b = GlbBuilder::new();
        let a = b.mesh(&TRI, &[0, 1, 2]);
        let c = b.mesh(&TRI, &[0, 2, 1]);
        b.node(json!({ "mesh": a.value() }));
        b.node(json!({ "mesh": c.value() }));
        let mut doc = b.document();

        Dedup.apply(&mut doc).unwrap();
        assert_eq!(doc.root.accessors.len(), 3);
        assert_eq!(doc.root.meshes.len(), 2);
    }

    #[test]
    fn accessors_with_bounds_are_not_merged_into_ones_without() {
        let mut b = GlbBuilder::new();
        let flat: Vec<f32> = TRI.iter().flatten().copied().collect();
        let normal = b.floats(&flat, Type::Vec3);
        let position = b.floats(&flat, Type::Vec3);
        b.push(
            "meshes",
            json!({ "primitives": [{ "attributes": {
                "NORMAL": normal.value(),
                "POSITION": position.value()
            } }] }),
        );
        b.node(json!({ "mesh": 0 }));
        let mut doc = b.document();
        doc.root.accessors[position.value()].min = Some(json!([0.0, 0.0, 0.0]));
        doc.root.accessors[position.value()].max = Some(json!([1.0, 1.0, 0.0]));

        Dedup.apply(&mut doc).unwrap();
        assert_eq!(doc.root.accessors.len(), 2);
        let prim = &doc.root.meshes[0].primitives[0];
        let pos = prim.attributes[&Checked::Valid(Semantic::Positions)];
        assert!(doc.root.accessors[pos.value()].min.is_some());
    }

    #[test]
    fn materials_differing_only_by_name_merge() {
        let mut b = GlbBuilder::new();
        b.push("materials", json!({ "name": "A", "doubleSided": true }));
        b.push("materials", json!({ "name": "B", "doubleSided": true }));
        b.push("materials", json!({ "name": "C" }));
        let mut doc = b.document();

        Dedup.apply(&mut doc).unwrap();
        assert_eq!(doc.root.materials.len(), 2);
    }
}

use log::{debug, info};

use super::Transform;
use crate::{document::Document, error::Result, remap::{self, Remap}};

/// Removes data nothing refers to.
///
/// Accessors and empty animations always go. Nodes, meshes, skins, cameras,
/// materials, textures, images and samplers are only pruned when the
/// document's indices are not locked by vendor blocks.
pub struct Prune;

impl Transform for Prune {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let root = &mut doc.root;
        let mut removed = Vec::new();

        let animations = root.animations.len();
        for anim in root.animations.iter_mut() {
            prune_samplers(anim);
        }
        root.animations.retain(|a| !a.channels.is_empty());
        removed.push(("animations", animations - root.animations.len()));

        if doc.indices_locked() {
            debug!("prune: indices locked by vendor extensions, keeping scene structure");
        } else {
            let root = &mut doc.root;
            removed.push(("nodes", prune_nodes(root)));
            removed.push(("meshes", prune_meshes(root)));
            removed.push(("skins", prune_skins(root)));
            removed.push(("cameras", prune_cameras(root)));
            removed.push(("materials", prune_materials(root)));
            removed.push(("textures", prune_textures(root)));
            removed.push(("images", prune_images(root)));
            removed.push(("samplers", prune_samplers_tex(root)));
        }
        removed.push(("accessors", prune_accessors(&mut doc.root)));

        let summary: Vec<String> = removed
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(what, n)| format!("{n} {what}"))
            .collect();
        if !summary.is_empty() {
            info!("prune: removed {}", summary.join(", "));
        }
        Ok(())
    }
}

fn mark<T>(used: &mut [bool], index: Option<gltf::json::Index<T>>) {
    if let Some(i) = index {
        if let Some(u) = used.get_mut(i.value()) {
            *u = true;
        }
    }
}

fn prune_samplers(anim: &mut gltf::json::Animation) {
    let mut used = vec![false; anim.samplers.len()];
    for channel in &anim.channels {
        if let Some(u) = used.get_mut(channel.sampler.value()) {
            *u = true;
        }
    }
    let remap = Remap::retain(&mut anim.samplers, &used);
    for channel in anim.channels.iter_mut() {
        remap.apply(&mut channel.sampler);
    }
}

/// Removes leaf nodes that carry nothing, repeating until none are left.
fn prune_nodes(root: &mut gltf::json::Root) -> usize {
    let mut total = 0;
    loop {
        let mut needed = vec![false; root.nodes.len()];
        let mut need = |i: usize| {
            if let Some(n) = needed.get_mut(i) {
                *n = true;
            }
        };
        for skin in &root.skins {
            skin.joints.iter().for_each(|j| need(j.value()));
            if let Some(s) = skin.skeleton {
                need(s.value());
            }
        }
        for anim in &root.animations {
            anim.channels.iter().for_each(|c| need(c.target.node.value()));
        }
        for (i, node) in root.nodes.iter().enumerate() {
            let has_children = node.children.as_ref().is_some_and(|c| !c.is_empty());
            if has_children
                || node.mesh.is_some()
                || node.camera.is_some()
                || node.skin.is_some()
                || node.weights.is_some()
            {
                need(i);
            }
        }

        let remap = Remap::retain(&mut root.nodes, &needed);
        if remap.is_identity() {
            return total;
        }
        total += remap.removed();
        remap::nodes(root, &remap);
    }
}

fn prune_meshes(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.meshes.len()];
    for node in &root.nodes {
        mark(&mut used, node.mesh);
    }
    let remap = Remap::retain(&mut root.meshes, &used);
    remap::meshes(root, &remap);
    remap.removed()
}

fn prune_skins(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.skins.len()];
    for node in &root.nodes {
        mark(&mut used, node.skin);
    }
    let remap = Remap::retain(&mut root.skins, &used);
    remap::skins(root, &remap);
    remap.removed()
}

fn prune_cameras(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.cameras.len()];
    for node in &root.nodes {
        mark(&mut used, node.camera);
    }
    let remap = Remap::retain(&mut root.cameras, &used);
    remap::cameras(root, &remap);
    remap.removed()
}

fn prune_materials(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.materials.len()];
    for mesh in &root.meshes {
        for p in &mesh.primitives {
            mark(&mut used, p.material);
        }
    }
    let remap = Remap::retain(&mut root.materials, &used);
    remap::materials(root, &remap);
    remap.removed()
}

fn prune_textures(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.textures.len()];
    remap::for_each_texture_ref(root, |t| {
        if let Some(u) = used.get_mut(t.value()) {
            *u = true;
        }
    });
    let remap = Remap::retain(&mut root.textures, &used);
    remap::textures(root, &remap);
    remap.removed()
}

fn prune_images(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.images.len()];
    for tex in &root.textures {
        if let Some(u) = used.get_mut(tex.source.value()) {
            *u = true;
        }
    }
    let remap = Remap::retain(&mut root.images, &used);
    remap::images(root, &remap);
    remap.removed()
}

fn prune_samplers_tex(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.samplers.len()];
    for tex in &root.textures {
        mark(&mut used, tex.sampler);
    }
    let remap = Remap::retain(&mut root.samplers, &used);
    remap::samplers(root, &remap);
    remap.removed()
}

fn prune_accessors(root: &mut gltf::json::Root) -> usize {
    let mut used = vec![false; root.accessors.len()];
    remap::for_each_accessor_ref(root, |a| {
        if let Some(u) = used.get_mut(a.value()) {
            *u = true;
        }
    });
    let remap = Remap::retain(&mut root.accessors, &used);
    remap::accessors(root, &remap);
    remap.removed()
}

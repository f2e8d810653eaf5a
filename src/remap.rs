//! Removing entries from top-level glTF arrays and repointing every
//! reference to them.

use gltf::json::{Accessor, Index, Root, Texture};

/// Old index → new index after entries were removed or merged.
#[derive(Debug, Clone)]
pub(crate) struct Remap {
    map: Vec<Option<u32>>,
    kept: usize,
}

impl Remap {
    /// Keeps the entries for which `keep` holds.
    pub fn retain<T>(items: &mut Vec<T>, keep: &[bool]) -> Remap {
        let mut kept = 0usize;
        let mut map = vec![None; items.len()];
        for (i, slot) in map.iter_mut().enumerate() {
            if keep.get(i).copied().unwrap_or(true) {
                *slot = Some(kept as u32);
                kept += 1;
            }
        }
        let mut i = 0;
        items.retain(|_| {
            let survives = map[i].is_some();
            i += 1;
            survives
        });
        Remap { map, kept }
    }

    /// `canonical[i]` names the entry that replaces entry `i`; entries that
    /// are their own canonical survive.
    pub fn merge<T>(items: &mut Vec<T>, canonical: &[usize]) -> Remap {
        let keep: Vec<bool> = canonical.iter().enumerate().map(|(i, &c)| c == i).collect();
        let mut remap = Remap::retain(items, &keep);
        for (i, &c) in canonical.iter().enumerate() {
            if c != i {
                remap.map[i] = remap.map[c];
            }
        }
        remap
    }

    pub fn get<T>(&self, index: Index<T>) -> Option<Index<T>> {
        self.map.get(index.value()).copied().flatten().map(Index::new)
    }

    /// Rewrites `index` in place; an index without a mapping is left alone.
    pub fn apply<T>(&self, index: &mut Index<T>) {
        if let Some(n) = self.get(*index) {
            *index = n;
        }
    }

    pub fn is_identity(&self) -> bool {
        self.map
            .iter()
            .enumerate()
            .all(|(i, n)| *n == Some(i as u32))
    }

    pub fn removed(&self) -> usize {
        self.map.len() - self.kept
    }
}

/// Calls `f` for every accessor reference in the document.
pub(crate) fn for_each_accessor_ref(root: &mut Root, mut f: impl FnMut(&mut Index<Accessor>)) {
    for mesh in root.meshes.iter_mut() {
        for p in mesh.primitives.iter_mut() {
            p.attributes.values_mut().for_each(&mut f);
            if let Some(indices) = p.indices.as_mut() {
                f(indices);
            }
            for target in p.targets.iter_mut().flatten() {
                for acc in [&mut target.positions, &mut target.normals, &mut target.tangents]
                    .into_iter()
                    .flatten()
                {
                    f(acc);
                }
            }
        }
    }
    for skin in root.skins.iter_mut() {
        if let Some(ibm) = skin.inverse_bind_matrices.as_mut() {
            f(ibm);
        }
    }
    for anim in root.animations.iter_mut() {
        for sampler in anim.samplers.iter_mut() {
            f(&mut sampler.input);
            f(&mut sampler.output);
        }
    }
}

/// Calls `f` for every texture reference held by a material.
pub(crate) fn for_each_texture_ref(root: &mut Root, mut f: impl FnMut(&mut Index<Texture>)) {
    for mat in root.materials.iter_mut() {
        let pbr = &mut mat.pbr_metallic_roughness;
        if let Some(info) = pbr.base_color_texture.as_mut() {
            f(&mut info.index);
        }
        if let Some(info) = pbr.metallic_roughness_texture.as_mut() {
            f(&mut info.index);
        }
        if let Some(normal) = mat.normal_texture.as_mut() {
            f(&mut normal.index);
        }
        if let Some(occlusion) = mat.occlusion_texture.as_mut() {
            f(&mut occlusion.index);
        }
        if let Some(info) = mat.emissive_texture.as_mut() {
            f(&mut info.index);
        }
    }
}

pub(crate) fn accessors(root: &mut Root, remap: &Remap) {
    for_each_accessor_ref(root, |i| remap.apply(i));
}

pub(crate) fn textures(root: &mut Root, remap: &Remap) {
    for_each_texture_ref(root, |i| remap.apply(i));
}

pub(crate) fn nodes(root: &mut Root, remap: &Remap) {
    for scene in root.scenes.iter_mut() {
        scene.nodes.retain_mut(|n| keep_mapped(remap, n));
    }
    for node in root.nodes.iter_mut() {
        if let Some(children) = node.children.as_mut() {
            children.retain_mut(|n| keep_mapped(remap, n));
        }
    }
    for skin in root.skins.iter_mut() {
        skin.joints.iter_mut().for_each(|j| remap.apply(j));
        if let Some(skeleton) = skin.skeleton.as_mut() {
            remap.apply(skeleton);
        }
    }
    for anim in root.animations.iter_mut() {
        for channel in anim.channels.iter_mut() {
            remap.apply(&mut channel.target.node);
        }
    }
}

pub(crate) fn meshes(root: &mut Root, remap: &Remap) {
    for node in root.nodes.iter_mut() {
        if let Some(mesh) = node.mesh.as_mut() {
            remap.apply(mesh);
        }
    }
}

pub(crate) fn skins(root: &mut Root, remap: &Remap) {
    for node in root.nodes.iter_mut() {
        if let Some(skin) = node.skin.as_mut() {
            remap.apply(skin);
        }
    }
}

pub(crate) fn cameras(root: &mut Root, remap: &Remap) {
    for node in root.nodes.iter_mut() {
        if let Some(camera) = node.camera.as_mut() {
            remap.apply(camera);
        }
    }
}

pub(crate) fn materials(root: &mut Root, remap: &Remap) {
    for mesh in root.meshes.iter_mut() {
        for p in mesh.primitives.iter_mut() {
            if let Some(material) = p.material.as_mut() {
                remap.apply(material);
            }
        }
    }
}

pub(crate) fn images(root: &mut Root, remap: &Remap) {
    for tex in root.textures.iter_mut() {
        remap.apply(&mut tex.source);
    }
}

pub(crate) fn samplers(root: &mut Root, remap: &Remap) {
    for tex in root.textures.iter_mut() {
        if let Some(sampler) = tex.sampler.as_mut() {
            remap.apply(sampler);
        }
    }
}

fn keep_mapped<T>(remap: &Remap, index: &mut Index<T>) -> bool {
    match remap.get(*index) {
        Some(n) => {
            *index = n;
            true
        }
        None => false,
    }
}

use std::collections::HashMap;

use gltf::json::{
    Accessor, Index,
    accessor::Type,
    buffer::Target,
    mesh::{Mode, Semantic},
    validation::Checked,
};
use log::{debug, info, warn};

use super::Transform;
use crate::{
    buffer,
    document::Document,
    error::{Error, Result},
};

/// Mesh simplification engine used by [`Simplify`].
pub trait Simplifier {
    /// Returns a triangle list of at most roughly `target_count` indices
    /// into `positions`, deviating from the input by at most `target_error`
    /// relative to the mesh extents.
    fn simplify(
        &self,
        indices: &[u32],
        positions: &[[f32; 3]],
        target_count: usize,
        target_error: f32,
    ) -> Result<Vec<u32>>;
}

/// [`Simplifier`] backed by meshoptimizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeshoptSimplifier;

struct Position([f32; 3]);

impl meshopt::DecodePosition for Position {
    fn decode_position(&self) -> [f32; 3] {
        self.0
    }
}

impl Simplifier for MeshoptSimplifier {
    fn simplify(
        &self,
        indices: &[u32],
        positions: &[[f32; 3]],
        target_count: usize,
        target_error: f32,
    ) -> Result<Vec<u32>> {
        if indices.len() % 3 != 0 {
            return Err(Error::Simplifier(format!(
                "{} indices do not form a triangle list",
                indices.len()
            )));
        }
        if let Some(&i) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(Error::Simplifier(format!(
                "index {i} out of range for {} vertices",
                positions.len()
            )));
        }
        let vertices: Vec<Position> = positions.iter().copied().map(Position).collect();
        Ok(meshopt::simplify_decoder(
            indices,
            &vertices,
            target_count,
            target_error,
            meshopt::SimplifyOptions::empty(),
            None,
        ))
    }
}

/// Reduces triangle-list primitives to `ratio` of their indices, never
/// exceeding `error`. Vertex data is left as is; only index buffers change.
pub struct Simplify<'a> {
    pub simplifier: &'a dyn Simplifier,
    pub ratio: f32,
    pub error: f32,
}

impl Transform for Simplify<'_> {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let mut before = 0;
        let mut after = 0;
        // (indices, positions) -> simplified index accessor
        let mut done: HashMap<(Option<usize>, usize), Index<Accessor>> = HashMap::new();

        for m in 0..doc.root.meshes.len() {
            for p in 0..doc.root.meshes[m].primitives.len() {
                let prim = &doc.root.meshes[m].primitives[p];
                if !matches!(prim.mode, Checked::Valid(Mode::Triangles)) {
                    continue;
                }
                let Some(&pos_idx) = prim.attributes.get(&Checked::Valid(Semantic::Positions)) else {
                    continue;
                };
                let idx_idx = prim.indices;

                if let Some(&n) = done.get(&(idx_idx.map(|i| i.value()), pos_idx.value())) {
                    doc.root.meshes[m].primitives[p].indices = Some(n);
                    continue;
                }

                let positions = match buffer::read_f32(&doc.root, &doc.blob, pos_idx) {
                    Ok(flat) => flat
                        .chunks_exact(3)
                        .map(|c| [c[0], c[1], c[2]])
                        .collect::<Vec<_>>(),
                    Err(e) => {
                        debug!("mesh {m} primitive {p}: {e}, skipping");
                        continue;
                    }
                };
                let indices = match idx_idx {
                    Some(i) => match buffer::read_indices(&doc.root, &doc.blob, i) {
                        Ok(indices) => indices,
                        Err(e) => {
                            debug!("mesh {m} primitive {p}: {e}, skipping");
                            continue;
                        }
                    },
                    None => (0..positions.len() as u32).collect(),
                };
                if indices.len() < 3 || indices.len() % 3 != 0 {
                    continue;
                }
                if indices.iter().any(|&i| i as usize >= positions.len()) {
                    warn!("mesh {m} primitive {p}: index out of range, skipping");
                    continue;
                }

                let target = ((indices.len() as f32 * self.ratio) as usize / 3) * 3;
                let simplified = self.simplifier.simplify(&indices, &positions, target, self.error)?;

                before += indices.len();
                if simplified.is_empty() || simplified.len() >= indices.len() {
                    after += indices.len();
                    continue;
                }
                after += simplified.len();

                let (component, bytes) = buffer::index_bytes(&simplified, positions.len());
                let n_idx = buffer::push_accessor(
                    &mut doc.root,
                    &mut doc.blob,
                    idx_idx.unwrap_or(pos_idx),
                    &bytes,
                    component,
                    Type::Scalar,
                    false,
                    Some(Target::ElementArrayBuffer),
                )?;
                done.insert((idx_idx.map(|i| i.value()), pos_idx.value()), n_idx);
                doc.root.meshes[m].primitives[p].indices = Some(n_idx);
            }
        }

        if before > 0 {
            info!("simplify: {} triangles -> {}", before / 3, after / 3);
        }
        Ok(())
    }
}

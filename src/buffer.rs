//! Binary data access for a document holding exactly one buffer.
//!
//! Every buffer view points at buffer 0 once [`merge_buffers`] has run.
//! Passes never edit bytes in place: they append new data with
//! [`push_view`]/[`push_accessor`] and repoint references, and [`compact`]
//! drops whatever nothing refers to when the document is written.

use gltf::json::{
    self, Accessor, Index, Root,
    accessor::{ComponentType, GenericComponentType, Type},
    buffer::{Target, View},
    validation::Checked,
};

use crate::error::{Error, Result};

pub(crate) fn pad_to_4bytes(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn view_range(view: &View) -> (usize, usize) {
    let offset = match view.byte_offset {
        Some(o) => o.0 as usize,
        None => 0,
    };
    (offset, view.byte_length.0 as usize)
}

pub(crate) fn view_bytes<'a>(root: &Root, blob: &'a [u8], view: Index<View>) -> Option<&'a [u8]> {
    let view = root.buffer_views.get(view.value())?;
    let (offset, length) = view_range(view);
    blob.get(offset..offset + length)
}

/// Component and element type of an accessor, if both are known.
pub(crate) fn layout(accessor: &Accessor) -> Option<(ComponentType, Type)> {
    match (&accessor.component_type, &accessor.type_) {
        (Checked::Valid(GenericComponentType(c)), Checked::Valid(t)) => Some((*c, *t)),
        _ => None,
    }
}

/// Tightly packed element bytes of an accessor, with any stride removed.
pub(crate) fn accessor_bytes(root: &Root, blob: &[u8], index: Index<Accessor>) -> Result<Vec<u8>> {
    let i = index.value();
    let acc = root
        .accessors
        .get(i)
        .ok_or_else(|| Error::accessor(i, "does not exist"))?;
    if acc.sparse.is_some() {
        return Err(Error::accessor(i, "sparse storage is not supported"));
    }
    let (component, ty) = layout(acc).ok_or_else(|| Error::accessor(i, "unknown layout"))?;

    let element = component.size() * ty.multiplicity();
    let count = acc.count.0 as usize;

    let Some(view_idx) = acc.buffer_view else {
        return Ok(vec![0; element * count]);
    };
    let view = root
        .buffer_views
        .get(view_idx.value())
        .ok_or_else(|| Error::accessor(i, "buffer view does not exist"))?;
    let data = view_bytes(root, blob, view_idx)
        .ok_or_else(|| Error::accessor(i, "buffer view lies outside the buffer"))?;

    let stride = view.byte_stride.as_ref().map(|s| s.0).unwrap_or(element);
    let start = acc.byte_offset.map(|o| o.0 as usize).unwrap_or(0);

    let mut out = Vec::with_capacity(element * count);
    for n in 0..count {
        let offset = start + n * stride;
        let chunk = data
            .get(offset..offset + element)
            .ok_or_else(|| Error::accessor(i, "element lies outside its buffer view"))?;
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

/// Float accessor contents, flattened. Normalized integers are rejected.
pub(crate) fn read_f32(root: &Root, blob: &[u8], index: Index<Accessor>) -> Result<Vec<f32>> {
    let i = index.value();
    match root.accessors.get(i).and_then(layout) {
        Some((ComponentType::F32, _)) => {}
        _ => return Err(Error::accessor(i, "not a float accessor")),
    }
    let bytes = accessor_bytes(root, blob, index)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub(crate) fn read_indices(root: &Root, blob: &[u8], index: Index<Accessor>) -> Result<Vec<u32>> {
    let i = index.value();
    let component = match root.accessors.get(i).and_then(layout) {
        Some((c, Type::Scalar)) => c,
        _ => return Err(Error::accessor(i, "not a scalar accessor")),
    };
    let bytes = accessor_bytes(root, blob, index)?;
    let indices = match component {
        ComponentType::U8 => bytes.iter().map(|&b| b as u32).collect(),
        ComponentType::U16 => bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect(),
        ComponentType::U32 => bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        _ => return Err(Error::accessor(i, "index component must be unsigned")),
    };
    Ok(indices)
}

/// Appends `bytes` as a new buffer view at a 4-byte aligned offset.
pub(crate) fn push_view(
    root: &mut Root,
    blob: &mut Vec<u8>,
    bytes: &[u8],
    target: Option<Target>,
) -> Index<View> {
    pad_to_4bytes(blob);
    let offset = blob.len();
    blob.extend_from_slice(bytes);

    let view = View {
        buffer: Index::<json::buffer::Buffer>::new(0),
        byte_length: bytes.len().into(),
        byte_offset: if offset == 0 {
            None
        } else {
            Some(offset.into())
        },
        byte_stride: None,
        name: None,
        target: target.map(Checked::Valid),
        extensions: None,
        extras: Default::default(),
    };
    root.push(view)
}

/// Appends packed element data as a new accessor, copying everything but the
/// data layout from `template`. Bounds are cleared; callers that need them
/// set `min`/`max` afterwards.
#[allow(clippy::too_many_arguments)]
pub(crate) fn push_accessor(
    root: &mut Root,
    blob: &mut Vec<u8>,
    template: Index<Accessor>,
    bytes: &[u8],
    component: ComponentType,
    ty: Type,
    normalized: bool,
    target: Option<Target>,
) -> Result<Index<Accessor>> {
    let element = component.size() * ty.multiplicity();
    let mut acc = root
        .accessors
        .get(template.value())
        .cloned()
        .ok_or_else(|| Error::accessor(template.value(), "does not exist"))?;

    let view_idx = push_view(root, blob, bytes, target);

    acc.buffer_view = Some(view_idx);
    acc.byte_offset = None;
    acc.count = (bytes.len() / element).into();
    acc.component_type = Checked::Valid(GenericComponentType(component));
    acc.type_ = Checked::Valid(ty);
    acc.normalized = normalized;
    acc.sparse = None;
    acc.min = None;
    acc.max = None;

    Ok(root.push(acc))
}

pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Index data in the narrowest component that can address `vertex_count`
/// vertices without touching the primitive restart value.
pub(crate) fn index_bytes(indices: &[u32], vertex_count: usize) -> (ComponentType, Vec<u8>) {
    if vertex_count < u16::MAX as usize {
        let bytes = indices
            .iter()
            .flat_map(|&i| (i as u16).to_le_bytes())
            .collect();
        (ComponentType::U16, bytes)
    } else {
        let bytes = indices.iter().flat_map(|&i| i.to_le_bytes()).collect();
        (ComponentType::U32, bytes)
    }
}

/// Concatenates every buffer into one blob and points all views at it.
pub(crate) fn merge_buffers<B: AsRef<[u8]>>(root: &mut Root, buffers: &[B]) -> Vec<u8> {
    let mut blob = Vec::new();
    let mut offsets = Vec::with_capacity(buffers.len());
    for data in buffers {
        pad_to_4bytes(&mut blob);
        offsets.push(blob.len());
        blob.extend_from_slice(data.as_ref());
    }

    for view in root.buffer_views.iter_mut() {
        let base = offsets.get(view.buffer.value()).copied().unwrap_or(0);
        let (offset, _) = view_range(view);
        let rebased = base + offset;
        view.buffer = Index::new(0);
        view.byte_offset = if rebased == 0 { None } else { Some(rebased.into()) };
    }

    set_single_buffer(root, blob.len());
    blob
}

fn set_single_buffer(root: &mut Root, length: usize) {
    root.buffers.clear();
    if length > 0 || !root.buffer_views.is_empty() {
        root.buffers.push(json::Buffer {
            byte_length: length.into(),
            name: None,
            uri: None,
            extensions: None,
            extras: Default::default(),
        });
    }
}

/// Rebuilds the blob from the buffer views still referenced by accessors,
/// sparse storage and images, dropping the rest and renumbering views.
pub(crate) fn compact(root: &mut Root, blob: &[u8]) -> Result<Vec<u8>> {
    let mut used = vec![false; root.buffer_views.len()];
    let mut mark = |view: Index<View>| {
        if let Some(u) = used.get_mut(view.value()) {
            *u = true;
        }
    };
    for acc in &root.accessors {
        if let Some(view) = acc.buffer_view {
            mark(view);
        }
        if let Some(sparse) = &acc.sparse {
            mark(sparse.indices.buffer_view);
            mark(sparse.values.buffer_view);
        }
    }
    for img in &root.images {
        if let Some(view) = img.buffer_view {
            mark(view);
        }
    }

    let mut n_blob: Vec<u8> = Vec::new();
    let mut remap: Vec<Option<u32>> = vec![None; root.buffer_views.len()];
    let mut n_views = Vec::new();

    for (i, view) in root.buffer_views.iter().enumerate() {
        if !used[i] {
            continue;
        }
        let (offset, length) = view_range(view);
        let data = blob
            .get(offset..offset + length)
            .ok_or(Error::BufferView { index: i })?;

        pad_to_4bytes(&mut n_blob);
        let n_offset = n_blob.len();
        n_blob.extend_from_slice(data);

        let mut n_view = view.clone();
        n_view.buffer = Index::new(0);
        n_view.byte_offset = if n_offset == 0 {
            None
        } else {
            Some(n_offset.into())
        };
        n_view.byte_length = data.len().into();

        remap[i] = Some(n_views.len() as u32);
        n_views.push(n_view);
    }

    let fix = |view: &mut Index<View>| {
        if let Some(Some(n)) = remap.get(view.value()) {
            *view = Index::new(*n);
        }
    };
    for acc in root.accessors.iter_mut() {
        if let Some(view) = acc.buffer_view.as_mut() {
            fix(view);
        }
        if let Some(sparse) = acc.sparse.as_mut() {
            fix(&mut sparse.indices.buffer_view);
            fix(&mut sparse.values.buffer_view);
        }
    }
    for img in root.images.iter_mut() {
        if let Some(view) = img.buffer_view.as_mut() {
            fix(view);
        }
    }

    root.buffer_views = n_views;
    pad_to_4bytes(&mut n_blob);
    set_single_buffer(root, n_blob.len());
    Ok(n_blob)
}

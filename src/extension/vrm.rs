//! VRM 0.x and VRM 1.0 blocks. All are carried opaquely.

use serde_json::Value;

use super::{Attachment, Codec, Descriptor, State};

pub const VRM: Descriptor = Descriptor {
    name: "VRM",
    attachment: Attachment::Node,
    defaults: &[],
    references_indices: true,
    codec: Codec::OPAQUE,
};

pub const VRMC_VRM: Descriptor = VRM.renamed("VRMC_vrm");
pub const VRMC_SPRING_BONE: Descriptor = VRM.renamed("VRMC_springBone");
pub const VRMC_NODE_CONSTRAINT: Descriptor = VRM.renamed("VRMC_node_constraint");
pub const VRMC_MATERIALS_MTOON: Descriptor = VRM.renamed("VRMC_materials_mtoon");

/// One-line description of a VRM block for logs, e.g. `"Alicia (VRM 0.0)"`.
pub fn summary(state: &State) -> Option<String> {
    let meta = state.get("meta")?;
    let title = str_field(meta, "title").or_else(|| str_field(meta, "name"))?;
    let version = state
        .get("specVersion")
        .and_then(Value::as_str)
        .or_else(|| str_field(meta, "version"));
    Some(match version {
        Some(v) => format!("{title} (VRM {v})"),
        None => title.to_string(),
    })
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

//! Khronos extensions that keep data in the root `extensions` map. Their
//! per-entity parts travel with the entity and need no descriptor.

use super::{Attachment, Codec, Descriptor};

pub const LIGHTS_PUNCTUAL: Descriptor = Descriptor {
    name: "KHR_lights_punctual",
    attachment: Attachment::Node,
    defaults: &[],
    references_indices: false,
    codec: Codec::OPAQUE,
};

pub const XMP_JSON_LD: Descriptor = LIGHTS_PUNCTUAL.renamed("KHR_xmp_json_ld");

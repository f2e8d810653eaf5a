//! `OMI_personality`: agent name, personality prompt and default message.

use serde::{Deserialize, Serialize};

use super::{Attachment, Codec, Descriptor, State};

pub const NAME: &str = "OMI_personality";

pub const PERSONALITY: Descriptor = Descriptor {
    name: NAME,
    attachment: Attachment::Node,
    defaults: &[
        ("agent", "tubby"),
        ("personality", "#agent is cheery"),
        ("defaultMessage", "nya nya!"),
    ],
    references_indices: false,
    codec: Codec::OPAQUE,
};

/// Values supplied on the command line; unset fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonalitySeed {
    pub agent: Option<String>,
    pub personality: Option<String>,
    pub default_message: Option<String>,
}

impl PersonalitySeed {
    pub fn is_empty(&self) -> bool {
        self.agent.is_none() && self.personality.is_none() && self.default_message.is_none()
    }

    fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            ("agent", self.agent.as_deref()),
            ("personality", self.personality.as_deref()),
            ("defaultMessage", self.default_message.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

/// Block state for `seed`, with defaults filling the gaps.
pub fn create(seed: &PersonalitySeed) -> State {
    PERSONALITY.create_with_defaults(seed.fields())
}

/// Typed view of a decoded block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub agent: String,
    pub personality: String,
    pub default_message: String,
}

impl Personality {
    /// `None` when the block is missing a field or holds a non-string.
    pub fn from_state(state: &State) -> Option<Personality> {
        serde_json::from_value(serde_json::Value::Object(state.clone())).ok()
    }
}

//! Descriptors for the vendor extension blocks carried through a conversion.
//!
//! A [`Descriptor`] is plain data: the key the block lives under in the
//! document's top-level `extensions` map, where it may attach, its defaults,
//! and a [`Codec`] that moves it between JSON and in-memory [`State`].
//! Vendor formats that share plumbing reuse a codec under another name
//! (see [`Descriptor::renamed`]) instead of inheriting from each other.

pub mod khronos;
pub mod personality;
pub mod vrm;

use log::warn;
use serde_json::{Map, Value};

/// In-memory contents of one extension block.
pub type State = Map<String, Value>;

/// Graph entity kind that may host an extension instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Node,
}

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    pub decode: fn(name: &str, extensions: &Map<String, Value>) -> State,
    /// `None` means no key is written for this state.
    pub encode: fn(state: &State) -> Option<Value>,
}

impl Codec {
    /// Keeps the block exactly as found and writes it back unchanged.
    pub const OPAQUE: Codec = Codec {
        decode: decode_opaque,
        encode: encode_opaque,
    };
}

fn decode_opaque(name: &str, extensions: &Map<String, Value>) -> State {
    match extensions.get(name) {
        None => State::new(),
        Some(Value::Object(block)) => block.clone(),
        Some(other) => {
            warn!("extension {name} is not a JSON object ({other}), ignoring it");
            State::new()
        }
    }
}

fn encode_opaque(state: &State) -> Option<Value> {
    if state.is_empty() {
        None
    } else {
        Some(Value::Object(state.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub name: &'static str,
    pub attachment: Attachment,
    pub defaults: &'static [(&'static str, &'static str)],
    /// Whether the block may hold node, mesh, material or texture indices.
    /// Passes keep those indices stable while such a block is loaded.
    pub references_indices: bool,
    pub codec: Codec,
}

impl Descriptor {
    /// Same codec, defaults and attachment under another extension name.
    pub const fn renamed(self, name: &'static str) -> Descriptor {
        Descriptor { name, ..self }
    }

    pub fn decode(&self, extensions: &Map<String, Value>) -> State {
        (self.codec.decode)(self.name, extensions)
    }

    pub fn encode(&self, state: &State) -> Option<Value> {
        (self.codec.encode)(state)
    }

    pub fn default_state(&self) -> State {
        self.defaults
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    /// Defaults with caller supplied string fields merged over them.
    pub fn create_with_defaults<'a, I>(&self, seed: I) -> State
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut state = self.default_state();
        for (k, v) in seed {
            state.insert(k.to_string(), Value::String(v.to_string()));
        }
        state
    }
}

/// Descriptors registered for one read/write session, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: Vec<Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every vendor block this tool knows about, plus the Khronos blocks
    /// that live at the root.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register(khronos::LIGHTS_PUNCTUAL)
            .register(khronos::XMP_JSON_LD)
            .register(vrm::VRMC_VRM)
            .register(vrm::VRMC_SPRING_BONE)
            .register(vrm::VRMC_NODE_CONSTRAINT)
            .register(vrm::VRM)
            .register(vrm::VRMC_MATERIALS_MTOON)
            .register(personality::PERSONALITY);
        registry
    }

    /// Registers `descriptor`, replacing any earlier one with the same name.
    pub fn register(&mut self, descriptor: Descriptor) -> &mut Self {
        if let Some(pos) = self.position(descriptor.name) {
            warn!("extension {} registered twice, keeping the last one", descriptor.name);
            self.descriptors.remove(pos);
        }
        self.descriptors.push(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.position(name).map(|pos| &self.descriptors[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }
}

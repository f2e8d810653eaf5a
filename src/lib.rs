mod buffer;
pub mod config;
pub mod document;
pub mod error;
pub mod extension;
pub mod passes;
pub mod pipeline;
mod remap;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::config::{Mode, PassSettings, PipelineConfig, TextureFormat};
    pub use crate::document::Document;
    pub use crate::error::{Error, Result};
    pub use crate::extension::{Descriptor, Registry, personality::PersonalitySeed};
    pub use crate::passes::{MeshoptSimplifier, Simplifier};
    pub use crate::pipeline::{Pipeline, Report, optimize};
}

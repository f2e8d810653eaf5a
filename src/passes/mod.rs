//! The fixed optimization sequence applied to every document.

mod dedup;
mod prune;
mod resample;
mod simplify;
mod texture;

pub use dedup::Dedup;
pub use prune::Prune;
pub use resample::Resample;
pub use simplify::{MeshoptSimplifier, Simplifier, Simplify};
pub use texture::TextureResize;

use log::info;

use crate::{config::PassSettings, document::Document, error::Result};

/// One step of the optimization sequence. A pass either completes or
/// returns an error; a document that saw a failed pass must be discarded.
pub trait Transform {
    fn name(&self) -> &'static str;

    fn apply(&self, doc: &mut Document) -> Result<()>;
}

/// Runs `passes` in order, stopping at the first failure.
pub fn transform(doc: &mut Document, passes: &[&dyn Transform]) -> Result<()> {
    for pass in passes {
        info!("{}", pass.name());
        pass.apply(doc)?;
    }
    Ok(())
}

/// resample, prune, dedup, simplify, textureResize.
pub fn standard<'a>(
    settings: &PassSettings,
    simplifier: &'a dyn Simplifier,
) -> Vec<Box<dyn Transform + 'a>> {
    vec![
        Box::new(Resample {
            tolerance: settings.resample.tolerance,
        }),
        Box::new(Prune),
        Box::new(Dedup),
        Box::new(Simplify {
            simplifier,
            ratio: settings.simplify.ratio,
            error: settings.simplify.error,
        }),
        Box::new(TextureResize {
            max_size: settings.texture.max_size,
            format: settings.texture.format,
        }),
    ]
}

/// Runs the [`standard`] sequence.
pub fn optimize(doc: &mut Document, settings: &PassSettings, simplifier: &dyn Simplifier) -> Result<()> {
    let passes = standard(settings, simplifier);
    let passes: Vec<&dyn Transform> = passes.iter().map(|p| p.as_ref()).collect();
    transform(doc, &passes)
}

//! One conversion run: stage the input, read it, optionally tag it, run the
//! passes, write the result under a scratch name and move it into place.

use std::{
    fmt,
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use log::{info, warn};
use tempfile::{NamedTempFile, PersistError};

use crate::{
    config::{Mode, PassSettings, PipelineConfig},
    document::Document,
    error::{Error, Result},
    extension::{Registry, personality, vrm},
    passes::{self, MeshoptSimplifier, Simplifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StageInput,
    Read,
    SeedMetadata,
    Transform,
    Write,
    FinalizeNaming,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::StageInput => "STAGE_INPUT",
            Stage::Read => "READ",
            Stage::SeedMetadata => "SEED_METADATA",
            Stage::Transform => "TRANSFORM",
            Stage::Write => "WRITE",
            Stage::FinalizeNaming => "FINALIZE_NAMING",
        })
    }
}

/// Container formats the reader accepts directly. Anything else is staged
/// under a `.glb` name first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Glb,
    Gltf,
}

impl ContainerKind {
    pub fn from_path(path: &Path) -> Option<ContainerKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "glb" => Some(ContainerKind::Glb),
            "gltf" => Some(ContainerKind::Gltf),
            _ => None,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Report {
    pub output: PathBuf,
    /// Scratch copy the input was read from, if one was needed.
    pub staged: Option<PathBuf>,
    /// Cleanup problems that did not fail the run.
    pub warnings: Vec<String>,
}

pub struct Pipeline<'a> {
    registry: Registry,
    simplifier: &'a dyn Simplifier,
}

impl Default for Pipeline<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline<'static> {
    /// Built-in extension registry and the meshoptimizer simplifier.
    pub fn new() -> Self {
        Pipeline {
            registry: Registry::builtin(),
            simplifier: &MeshoptSimplifier,
        }
    }
}

impl<'a> Pipeline<'a> {
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_simplifier<'b>(self, simplifier: &'b dyn Simplifier) -> Pipeline<'b> {
        Pipeline {
            registry: self.registry,
            simplifier,
        }
    }

    pub fn run(&self, config: &PipelineConfig) -> Result<Report> {
        let input = config.input();
        let stem = file_stem(input);

        info!("[{}] {}", Stage::StageInput, input.display());
        let staged = stage_input(input, &stem)?;
        let read_from = staged.as_ref().map_or(input, |s| s.path());

        info!("[{}] {}", Stage::Read, read_from.display());
        let mut doc = Document::read(read_from, &self.registry)?;
        for ext in doc.extensions() {
            if let Some(summary) = vrm::summary(&ext.state) {
                info!("{}: {summary}", ext.descriptor.name);
            }
        }

        if let Mode::Tag(seed) = config.mode() {
            info!("[{}] {}", Stage::SeedMetadata, personality::NAME);
            *doc.create_extension(personality::PERSONALITY) = personality::create(seed);
        }

        info!("[{}]", Stage::Transform);
        passes::optimize(&mut doc, config.passes(), self.simplifier)?;

        info!("[{}]", Stage::Write);
        let bytes = doc.to_glb()?;
        let written = write_scratch(config.output(), &stem, &bytes)?;

        info!("[{}] {}", Stage::FinalizeNaming, config.output().display());
        let output = config.output().to_path_buf();
        written.persist(&output).map_err(|e| finalize_error(e, &output))?;

        let mut report = Report {
            output,
            staged: staged.as_ref().map(|s| s.path().to_path_buf()),
            warnings: Vec::new(),
        };
        if let Some(staged) = staged {
            let path = staged.path().to_path_buf();
            if let Err(e) = staged.close() {
                let msg = format!("could not remove {}: {e}", path.display());
                warn!("{msg}");
                report.warnings.push(msg);
            }
        }

        info!("wrote {}", report.output.display());
        Ok(report)
    }
}

/// Optimizes a GLB or glTF stream with the built-in registry and returns the
/// GLB bytes. Relative buffer URIs cannot be resolved from a stream.
pub fn optimize<R: Read>(reader: &mut R, settings: &PassSettings) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::io("read", "<stream>", e))?;

    let mut doc = Document::from_slice(&bytes, None, &Registry::builtin())?;
    passes::optimize(&mut doc, settings, &MeshoptSimplifier)?;
    doc.to_glb()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "optimize".to_string())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Copies inputs the reader would not recognize to `<stem>_temp*.glb` next to
/// them. The copy is removed when the returned handle drops.
fn stage_input(input: &Path, stem: &str) -> Result<Option<NamedTempFile>> {
    if ContainerKind::from_path(input).is_some() {
        return Ok(None);
    }
    let dir = parent_dir(input);
    let staged = tempfile::Builder::new()
        .prefix(&format!("{stem}_temp"))
        .suffix(".glb")
        .tempfile_in(dir)
        .map_err(|e| Error::io("create staging file in", dir, e))?;
    fs::copy(input, staged.path()).map_err(|e| Error::io("stage", input, e))?;
    Ok(Some(staged))
}

fn write_scratch(output: &Path, stem: &str, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = parent_dir(output);
    let mut written = tempfile::Builder::new()
        .prefix(&format!("{stem}_output"))
        .suffix(".glb")
        .tempfile_in(dir)
        .map_err(|e| Error::io("create output file in", dir, e))?;
    let path = written.path().to_path_buf();
    written
        .write_all(bytes)
        .and_then(|_| written.flush())
        .map_err(|e| Error::io("write", path, e))?;
    Ok(written)
}

/// Keeps the scratch output on disk so the converted data is not lost.
fn finalize_error(e: PersistError, target: &Path) -> Error {
    let PersistError { error, file } = e;
    let written = file.path().to_path_buf();
    if let Err(keep) = file.keep() {
        warn!("could not keep {}: {}", written.display(), keep.error);
    }
    Error::Finalize {
        written,
        target: target.to_path_buf(),
        source: error,
    }
}

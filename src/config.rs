//! Pass settings and the per-run pipeline configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    extension::personality::PersonalitySeed,
};

/// Tunables for the optimization passes, read from TOML. Every key is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PassSettings {
    pub resample: ResampleSettings,
    pub simplify: SimplifySettings,
    pub texture: TextureSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResampleSettings {
    /// Largest per-component deviation a dropped keyframe may introduce.
    pub tolerance: f32,
}

impl Default for ResampleSettings {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimplifySettings {
    /// Target share of indices to keep. 0 simplifies as far as `error` allows.
    pub ratio: f32,
    /// Error bound relative to the mesh extents.
    pub error: f32,
}

impl Default for SimplifySettings {
    fn default() -> Self {
        Self {
            ratio: default_ratio(),
            error: default_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    /// Longest allowed image edge in pixels.
    pub max_size: u32,
    pub format: TextureFormat,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            format: TextureFormat::default(),
        }
    }
}

/// Encoding of resized images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    /// Same encoding as the source image.
    #[default]
    Keep,
    /// KTX2 with Basis Universal compression.
    Ktx2,
}

fn default_tolerance() -> f32 {
    1e-4
}

fn default_ratio() -> f32 {
    0.0
}

fn default_error() -> f32 {
    1e-4
}

fn default_max_size() -> u32 {
    2048
}

impl PassSettings {
    pub fn load(path: &Path) -> Result<PassSettings> {
        let text = fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
        toml::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// What the run does besides optimizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Optimize,
    /// Attach `OMI_personality` built from the seed.
    Tag(PersonalitySeed),
}

/// Everything one conversion needs, fixed before it starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    input: PathBuf,
    output: PathBuf,
    mode: Mode,
    passes: PassSettings,
}

impl PipelineConfig {
    /// Writes to `<input dir>/<input stem>_output.vrm` unless `output` is
    /// given.
    pub fn new(input: PathBuf, output: Option<PathBuf>, mode: Mode, passes: PassSettings) -> Self {
        let output = output.unwrap_or_else(|| default_output(&input));
        Self {
            input,
            output,
            mode,
            passes,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn passes(&self) -> &PassSettings {
        &self.passes
    }
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "optimize".to_string());
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{stem}_output.vrm"))
}

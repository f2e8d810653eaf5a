use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use vrm_opt::prelude::*;

/// Optimize a VRM/glTF avatar and optionally tag it with OMI_personality.
#[derive(Debug, Parser)]
#[command(name = "vrm-opt", version, about)]
struct Args {
    /// Input .vrm, .glb or .gltf file
    input: PathBuf,

    /// Agent name (implies --tag)
    agent: Option<String>,

    /// Personality prompt (implies --tag)
    personality: Option<String>,

    /// Default message (implies --tag)
    default_message: Option<String>,

    /// Output path [default: <input stem>_output.vrm next to the input]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Attach OMI_personality even without seed values
    #[arg(long)]
    tag: bool,

    /// TOML file with pass settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Longest texture edge in pixels
    #[arg(long)]
    texture_size: Option<u32>,

    /// Share of indices simplify aims to keep
    #[arg(long)]
    ratio: Option<f32>,

    /// Simplify error bound, relative to mesh size
    #[arg(long)]
    error: Option<f32>,

    /// Resample tolerance
    #[arg(long)]
    tolerance: Option<f32>,

    /// Re-encode textures as KTX2/Basis
    #[arg(long)]
    ktx2: bool,
}

impl Args {
    fn settings(&self) -> anyhow::Result<PassSettings> {
        let mut settings = match &self.config {
            Some(path) => PassSettings::load(path)?,
            None => PassSettings::default(),
        };
        if let Some(size) = self.texture_size {
            settings.texture.max_size = size;
        }
        if let Some(ratio) = self.ratio {
            settings.simplify.ratio = ratio;
        }
        if let Some(error) = self.error {
            settings.simplify.error = error;
        }
        if let Some(tolerance) = self.tolerance {
            settings.resample.tolerance = tolerance;
        }
        if self.ktx2 {
            settings.texture.format = TextureFormat::Ktx2;
        }
        Ok(settings)
    }

    fn mode(&self) -> Mode {
        let seed = PersonalitySeed {
            agent: self.agent.clone(),
            personality: self.personality.clone(),
            default_message: self.default_message.clone(),
        };
        if self.tag || !seed.is_empty() {
            Mode::Tag(seed)
        } else {
            Mode::Optimize
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = args.settings()?;
    let config = PipelineConfig::new(args.input.clone(), args.output.clone(), args.mode(), settings);

    let report = Pipeline::new()
        .run(&config)
        .with_context(|| format!("converting {}", config.input().display()))?;

    println!("{}", report.output.display());
    Ok(())
}

// edgescale.rs — Command-line front end: PNG in, processed PNG out.
//
//   edgescale in.png out.png --pipeline nis --scale 1.5 --sharpness 0.8
//
// Settings come from `--settings file.json` when given, with any flag on the
// command line taking precedence. The image is treated as one eye buffer.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgescale::convert::{from_rgba_image, rgba8_to_rgba, rgba_to_rgba8, to_rgba_image};
use edgescale::postprocess::{Submission, TextureBounds, TextureId};
use edgescale::{Eye, HdrMode, PipelineKind, PostProcessor, Settings};

/// Upscale and sharpen an image with the VR post-processing kernels.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Input PNG
    input: PathBuf,

    /// Output PNG
    output: PathBuf,

    /// Kernel family: nis (directional) or cas (bilinear + radial sharpen)
    #[arg(long, short)]
    pipeline: Option<PipelineKind>,

    /// Render scale: values below 1 divide, 1 and above multiply
    #[arg(long, short)]
    scale: Option<f32>,

    /// Sharpness in [0, 1]
    #[arg(long)]
    sharpness: Option<f32>,

    /// Transfer function of the input: none, linear or pq
    #[arg(long)]
    hdr: Option<HdrMode>,

    /// Foveated sharpening radius as a fraction of the output height (cas only)
    #[arg(long, short)]
    radius: Option<f32>,

    /// JSON settings file with an "fsr" section
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.enabled = true;
    if let Some(kind) = args.pipeline {
        settings.use_nis = kind == PipelineKind::Nis;
    }
    if let Some(scale) = args.scale {
        settings.render_scale = scale;
    }
    if let Some(sharpness) = args.sharpness {
        settings.sharpness = sharpness;
    }
    if let Some(hdr) = args.hdr {
        settings.hdr_mode = hdr;
    }
    if let Some(radius) = args.radius {
        settings.radius = radius;
    }
    settings.validate()?;

    let decoded = ::image::open(&args.input)?.to_rgba8();
    let input = rgba8_to_rgba(&from_rgba_image(&decoded));
    info!(path = %args.input.display(), w = input.width(), h = input.height(), "loaded");

    let mut pp = PostProcessor::new(settings);
    let start = Instant::now();
    let output = match pp.submit(Eye::Left, TextureId(0), &input, &TextureBounds::default()) {
        Submission::Processed(img) => rgba_to_rgba8(img),
        Submission::Passthrough => {
            return Err("post-processing could not be set up for this input (see log)".into());
        }
    };
    info!(
        elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
        w = output.width(),
        h = output.height(),
        mip_bias = ?pp.mip_lod_bias(),
        "processed"
    );

    to_rgba_image(&output).save(&args.output)?;
    info!(path = %args.output.display(), "saved");
    Ok(())
}

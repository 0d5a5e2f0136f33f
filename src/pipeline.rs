// pipeline.rs — The two interchangeable processing pipelines.
//
//   Nis   directional scaler (which already sharpens), or the directional
//         sharpener alone when there is nothing to scale
//   Cas   bilinear resample, then the radial min/max sharpener
//
// Both are exposed through the same pair of object-safe traits so the
// post-processor can hold either without caring which. The HDR mode is
// resolved to a concrete `ColorSpace` here, once, when a stage is built; the
// per-pixel loops inside each stage are monomorphized and never branch on it.
//
// NEW RUST CONCEPTS:
// - `Box<dyn Trait>` for a small closed set of strategies chosen at runtime,
//   wrapping generic implementations chosen at compile time.
// - `par_chunks_mut` to fill image rows in parallel.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cas::RadialSharpen;
use crate::config::{scaler_config, NisConfig, ViewportSpec};
use crate::dispatch::DispatchOptions;
use crate::error::{Error, Result};
use crate::image::{sample_bilinear, Image, Rgba};
use crate::luma::{ColorSpace, HdrMode, LinearHdr, PqHdr, Sdr};
use crate::scaler::NisScaler;
use crate::sharpen::NisSharpen;

/// Which family of kernels to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Nis,
    #[default]
    Cas,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineKind::Nis => "nis",
            PipelineKind::Cas => "cas",
        })
    }
}

impl FromStr for PipelineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nis" => Ok(PipelineKind::Nis),
            "cas" | "fsr" => Ok(PipelineKind::Cas),
            other => Err(Error::Settings(format!("unknown pipeline '{other}'"))),
        }
    }
}

/// Resamples an image to the size of `dst`.
pub trait Upscaler: Send + Sync {
    fn name(&self) -> &'static str;

    fn upscale(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, opts: &DispatchOptions) -> Result<()>;
}

/// Sharpens an image into a same-sized `dst`.
pub trait Sharpener: Send + Sync {
    fn name(&self) -> &'static str;

    fn sharpen(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, opts: &DispatchOptions) -> Result<()>;
}

impl<C: ColorSpace> Upscaler for NisScaler<C> {
    fn name(&self) -> &'static str {
        "nis-scaler"
    }

    fn upscale(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, opts: &DispatchOptions) -> Result<()> {
        NisScaler::upscale(self, src, dst, opts)
    }
}

impl<C: ColorSpace> Sharpener for NisSharpen<C> {
    fn name(&self) -> &'static str {
        "nis-sharpen"
    }

    fn sharpen(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, opts: &DispatchOptions) -> Result<()> {
        NisSharpen::sharpen(self, src, dst, opts)
    }
}

impl<C: ColorSpace> Sharpener for RadialSharpen<C> {
    fn name(&self) -> &'static str {
        "radial-sharpen"
    }

    fn sharpen(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, opts: &DispatchOptions) -> Result<()> {
        RadialSharpen::sharpen(self, src, dst, opts)
    }
}

/// Plain bilinear resample with clamp-to-edge addressing.
///
/// Any ratio works, in either direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearUpscaler;

impl Upscaler for BilinearUpscaler {
    fn name(&self) -> &'static str {
        "bilinear"
    }

    fn upscale(&self, src: &Image<Rgba>, dst: &mut Image<Rgba>, _opts: &DispatchOptions) -> Result<()> {
        let (w, h) = (dst.width(), dst.height());
        if w == 0 || h == 0 {
            return Ok(());
        }
        if src.width() == 0 || src.height() == 0 {
            return Err(Error::ZeroViewport { which: "input" });
        }
        let (norm_x, norm_y) = (1.0 / w as f32, 1.0 / h as f32);
        let stride = dst.stride();
        dst.as_mut_slice()
            .par_chunks_mut(stride)
            .take(h)
            .enumerate()
            .for_each(|(y, row)| {
                let v = (y as f32 + 0.5) * norm_y;
                for (x, px) in row[..w].iter_mut().enumerate() {
                    *px = sample_bilinear(src, (x as f32 + 0.5) * norm_x, v);
                }
            });
        Ok(())
    }
}

/// The upscaling stage of `kind` for the geometry in `spec`.
///
/// `Nis` derives its config here and so inherits its [0.5, 1] ratio limit;
/// `Cas` resamples at any ratio.
pub fn build_upscaler(kind: PipelineKind, hdr: HdrMode, sharpness: f32, spec: &ViewportSpec) -> Result<Box<dyn Upscaler>> {
    match kind {
        PipelineKind::Nis => {
            let config = scaler_config(sharpness, spec, hdr)?;
            Ok(match hdr {
                HdrMode::None => Box::new(NisScaler::<Sdr>::new(config)),
                HdrMode::Linear => Box::new(NisScaler::<LinearHdr>::new(config)),
                HdrMode::Pq => Box::new(NisScaler::<PqHdr>::new(config)),
            })
        }
        PipelineKind::Cas => {
            if spec.input_texture.0 == 0 || spec.input_texture.1 == 0 {
                return Err(Error::ZeroViewport { which: "input" });
            }
            if spec.output_texture.0 == 0 || spec.output_texture.1 == 0 {
                return Err(Error::ZeroViewport { which: "output" });
            }
            Ok(Box::new(BilinearUpscaler))
        }
    }
}

/// The sharpening stage of `kind`, for a config from
/// [`sharpen_config`](crate::config::sharpen_config). For `Cas` the config's
/// foveation block decides where sharpening applies.
pub fn build_sharpener(kind: PipelineKind, hdr: HdrMode, config: NisConfig) -> Box<dyn Sharpener> {
    match (kind, hdr) {
        (PipelineKind::Nis, HdrMode::None) => Box::new(NisSharpen::<Sdr>::new(config)),
        (PipelineKind::Nis, HdrMode::Linear) => Box::new(NisSharpen::<LinearHdr>::new(config)),
        (PipelineKind::Nis, HdrMode::Pq) => Box::new(NisSharpen::<PqHdr>::new(config)),
        (PipelineKind::Cas, HdrMode::None) => Box::new(RadialSharpen::<Sdr>::new(config)),
        (PipelineKind::Cas, HdrMode::Linear) => Box::new(RadialSharpen::<LinearHdr>::new(config)),
        (PipelineKind::Cas, HdrMode::Pq) => Box::new(RadialSharpen::<PqHdr>::new(config)),
    }
}

// postprocess.rs — Per-eye post-processing of submitted VR frames.
//
// The compositor hands over one texture per eye per frame. Some engines
// render both eyes into a single side-by-side texture and submit it twice
// with different bounds; others submit two separate textures.
//
//   submit(eye, texture, image, bounds)
//     │
//     ├─ disabled / previous failure ─────────────────────► Passthrough
//     ├─ input size changed → drop resources
//     ├─ no resources → build stages for this size
//     │      └─ build failed → disable, warn ─────────────► Passthrough
//     ├─ first eye of the pair, single-eye texture, or a
//     │  different texture than last time → run stages
//     └───────────────────────────────────────────────────► Processed(&output)
//
// Stages, by settings:
//
//   render scale ≠ 1   upscale (bilinear for Cas, directional for Nis)
//   Cas                radial sharpen inside the foveated circle, always
//   Nis, scale = 1     directional sharpen
//
// The directional scaler already sharpens, so Nis never runs both stages.
//
// Each eye buffer of a single-eye layout has its own sharpener config
// (its own projection centre); a side-by-side texture carries both centres
// in one config.

use std::time::{Duration, Instant};

use tracing::{info, warn};

pub use crate::cas::Eye;

use crate::cas::write_foveation;
use crate::config::{sharpen_config, DispatchTuning, GpuArchitecture, ViewportSpec};
use crate::dispatch::DispatchOptions;
use crate::error::{Error, Result};
use crate::image::{Image, Rgba};
use crate::pipeline::{build_sharpener, build_upscaler, PipelineKind, Sharpener, Upscaler};
use crate::settings::Settings;

/// Normalised sub-rectangle of a texture an eye was rendered into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBounds {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl Default for TextureBounds {
    fn default() -> Self {
        TextureBounds { u_min: 0.0, v_min: 0.0, u_max: 1.0, v_max: 1.0 }
    }
}

/// How eyes are packed into submitted textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoLayout {
    /// Each texture holds one eye.
    SingleEye,
    /// One texture holds both eyes, left half and right half.
    SideBySide,
}

impl StereoLayout {
    /// A texture whose bounds span more than half its width holds one eye.
    pub fn from_bounds(bounds: &TextureBounds) -> Self {
        if (bounds.u_max - bounds.u_min).abs() > 0.5 {
            StereoLayout::SingleEye
        } else {
            StereoLayout::SideBySide
        }
    }
}

/// Identity of a submitted texture, used to spot a shared texture being
/// submitted for the second eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Result of a submit.
#[derive(Debug)]
pub enum Submission<'a> {
    /// Hand this image to the compositor instead of the submitted one.
    Processed(&'a Image<Rgba>),
    /// Submit the original texture unchanged.
    Passthrough,
}

/// Largest texture side the post-processor will allocate.
pub const MAX_TEXTURE_SIDE: u32 = 16384;

/// Output size for a render scale.
///
/// Scales below 1 describe how much smaller the game renders, so the output
/// is `input / scale`; scales of 1 and above multiply. Both sides must land
/// in `1..=MAX_TEXTURE_SIDE`, otherwise the frame is refused before anything
/// is allocated.
pub fn output_size(input: (usize, usize), render_scale: f32) -> Result<(u32, u32)> {
    let (w, h) = (input.0 as f32, input.1 as f32);
    let (w, h) = if render_scale < 1.0 { (w / render_scale, h / render_scale) } else { (w * render_scale, h * render_scale) };
    let fits = |v: f32| v.is_finite() && v >= 1.0 && v.trunc() <= MAX_TEXTURE_SIDE as f32;
    if !(fits(w) && fits(h)) {
        return Err(Error::OutputSize { width: w as f64, height: h as f64, max: MAX_TEXTURE_SIDE });
    }
    Ok((w as u32, h as u32))
}

/// Texture LOD bias that keeps the game sampling at output-resolution
/// detail: `-log2(output / input)`.
pub fn mip_lod_bias(input_width: usize, output_width: usize) -> f32 {
    -(output_width as f32 / input_width as f32).log2()
}

// ---------------------------------------------------------------------------
// FrameTimer
// ---------------------------------------------------------------------------

/// Running average of processing time, reported once per window of frames.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    window: u32,
    summed: Duration,
    count: u32,
}

impl FrameTimer {
    pub fn new(window: u32) -> Self {
        FrameTimer { window: window.max(1), summed: Duration::ZERO, count: 0 }
    }

    /// Add one measurement. Returns the average in milliseconds when the
    /// window fills, then starts over.
    ///
    /// `per_eye` doubles the average: one measurement covered one eye, and
    /// the report is per frame.
    pub fn record(&mut self, elapsed: Duration, per_eye: bool) -> Option<f32> {
        self.summed += elapsed;
        self.count += 1;
        if self.count < self.window {
            return None;
        }
        let mut avg_ms = self.summed.as_secs_f32() * 1000.0 / self.count as f32;
        if per_eye {
            avg_ms *= 2.0;
        }
        self.summed = Duration::ZERO;
        self.count = 0;
        Some(avg_ms)
    }

    pub fn reset(&mut self) {
        self.summed = Duration::ZERO;
        self.count = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(500)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Stages and options built for one input size.
struct Stages {
    upscaler: Option<Box<dyn Upscaler>>,
    /// Indexed by output slot.
    sharpeners: Option<[Box<dyn Sharpener>; 2]>,
    upscale_opts: DispatchOptions,
    sharpen_opts: DispatchOptions,
}

struct Resources {
    input: (usize, usize),
    output: (usize, usize),
    layout: StereoLayout,
    mip_bias: Option<f32>,
    stages: Stages,
    /// Upscaled, not yet sharpened; only allocated when both stages run.
    upscaled: [Image<Rgba>; 2],
    outputs: [Image<Rgba>; 2],
}

/// Run the stages for one eye buffer.
fn run_eye(
    stages: &Stages,
    slot: usize,
    input: &Image<Rgba>,
    upscaled: &mut Image<Rgba>,
    output: &mut Image<Rgba>,
) -> Result<()> {
    match (&stages.upscaler, &stages.sharpeners) {
        (Some(up), Some(sharpeners)) => {
            up.upscale(input, upscaled, &stages.upscale_opts)?;
            sharpeners[slot].sharpen(upscaled, output, &stages.sharpen_opts)
        }
        (Some(up), None) => up.upscale(input, output, &stages.upscale_opts),
        (None, Some(sharpeners)) => sharpeners[slot].sharpen(input, output, &stages.sharpen_opts),
        (None, None) => {
            for y in 0..input.height() {
                output.row_mut(y).copy_from_slice(input.row(y));
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// PostProcessor
// ---------------------------------------------------------------------------

/// Applies the configured pipeline to submitted eye textures.
pub struct PostProcessor {
    settings: Settings,
    arch: GpuArchitecture,
    /// Normalised projection centres, left then right.
    centres: [(f32, f32); 2],
    enabled: bool,
    resources: Option<Resources>,
    eye_count: u32,
    last_texture: Option<TextureId>,
    timer: FrameTimer,
}

impl PostProcessor {
    pub fn new(settings: Settings) -> Self {
        PostProcessor {
            settings,
            arch: GpuArchitecture::default(),
            centres: [(0.5, 0.5); 2],
            enabled: true,
            resources: None,
            eye_count: 0,
            last_texture: None,
            timer: FrameTimer::default(),
        }
    }

    /// Use per-eye projection centres (see
    /// [`projection_center`](crate::cas::projection_center)).
    pub fn with_projection_centres(mut self, centres: [(f32, f32); 2]) -> Self {
        self.centres = centres;
        self.reset();
        self
    }

    pub fn with_architecture(mut self, arch: GpuArchitecture) -> Self {
        self.arch = arch;
        self.reset();
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings; resources are rebuilt on the next submit.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.reset();
    }

    /// Drop all resources and clear a previous failure.
    pub fn reset(&mut self) {
        self.enabled = true;
        self.resources = None;
        self.eye_count = 0;
        self.last_texture = None;
        self.timer.reset();
    }

    /// False once building resources failed; cleared by [`reset`](Self::reset).
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Output size of the current resources.
    pub fn output_size(&self) -> Option<(usize, usize)> {
        self.resources.as_ref().map(|r| r.output)
    }

    /// LOD bias the game's samplers should use, when enabled in settings.
    pub fn mip_lod_bias(&self) -> Option<f32> {
        self.resources.as_ref().and_then(|r| r.mip_bias)
    }

    /// Stereo layout the current resources were built for.
    pub fn layout(&self) -> Option<StereoLayout> {
        self.resources.as_ref().map(|r| r.layout)
    }

    fn build(&self, input: (usize, usize), layout: StereoLayout) -> Result<Resources> {
        let s = &self.settings;
        s.validate()?;
        let kind = s.pipeline();
        let sharpness = s.clamped_sharpness();
        let (out_w, out_h) = output_size(input, s.render_scale)?;
        let side = |v: usize| {
            u32::try_from(v)
                .ok()
                .filter(|&v| v <= MAX_TEXTURE_SIDE)
                .ok_or(Error::OutputSize { width: input.0 as f64, height: input.1 as f64, max: MAX_TEXTURE_SIDE })
        };
        let (in_w, in_h) = (side(input.0)?, side(input.1)?);
        let output = (out_w as usize, out_h as usize);
        info!(
            pipeline = %kind,
            input_w = in_w, input_h = in_h,
            output_w = out_w, output_h = out_h,
            ?layout,
            "creating post-processing resources"
        );

        let scaling = s.render_scale != 1.0;
        let upscaler = if scaling {
            let spec = ViewportSpec::scaling((in_w, in_h), (out_w, out_h));
            Some(build_upscaler(kind, s.hdr_mode, sharpness, &spec)?)
        } else {
            None
        };

        let sharpeners = if kind == PipelineKind::Cas || !scaling {
            let base = sharpen_config(sharpness, &ViewportSpec::full(out_w, out_h), s.hdr_mode)?;
            let eyes = match layout {
                StereoLayout::SingleEye => [Some(Eye::Left), Some(Eye::Right)],
                StereoLayout::SideBySide => [None, None],
            };
            let make = |buffer_eye| {
                let mut cfg = base;
                if kind == PipelineKind::Cas {
                    write_foveation(&mut cfg, self.centres, buffer_eye, s.radius, (out_w, out_h));
                }
                build_sharpener(kind, s.hdr_mode, cfg)
            };
            Some([make(eyes[0]), make(eyes[1])])
        } else {
            None
        };

        let mip_bias = s.apply_mip_bias.then(|| mip_lod_bias(input.0, output.0));
        if let Some(bias) = mip_bias {
            info!(bias, "MIP LOD bias");
        }

        let both = upscaler.is_some() && sharpeners.is_some();
        let scratch = || if both { Image::new(output.0, output.1) } else { Image::new(0, 0) };
        Ok(Resources {
            input,
            output,
            layout,
            mip_bias,
            stages: Stages {
                upscaler,
                sharpeners,
                upscale_opts: DispatchOptions::from_tuning(&DispatchTuning::new(true, self.arch)),
                sharpen_opts: DispatchOptions::from_tuning(&DispatchTuning::new(false, self.arch)),
            },
            upscaled: [scratch(), scratch()],
            outputs: [Image::new(output.0, output.1), Image::new(output.0, output.1)],
        })
    }

    /// Make sure resources exist for `input`. False means passthrough.
    fn ensure_resources(&mut self, input: (usize, usize), bounds: &TextureBounds) -> bool {
        if self.resources.as_ref().is_some_and(|r| r.input != input) {
            info!(w = input.0, h = input.1, "texture size changed, recreating resources");
            self.reset();
        }
        if self.resources.is_none() {
            match self.build(input, StereoLayout::from_bounds(bounds)) {
                Ok(r) => self.resources = Some(r),
                Err(e) => {
                    warn!(error = %e, "resource creation failed, disabling post-processing");
                    self.enabled = false;
                    return false;
                }
            }
        }
        true
    }

    /// Process one eye's submitted texture.
    pub fn submit(&mut self, eye: Eye, texture: TextureId, image: &Image<Rgba>, bounds: &TextureBounds) -> Submission<'_> {
        if !self.settings.enabled || !self.enabled {
            return Submission::Passthrough;
        }
        if !self.ensure_resources((image.width(), image.height()), bounds) {
            return Submission::Passthrough;
        }
        let Some(res) = self.resources.as_mut() else {
            return Submission::Passthrough;
        };

        let single_eye = res.layout == StereoLayout::SingleEye;
        let slot = if single_eye { eye.index() } else { 0 };

        // A shared texture is processed on the first submit of the pair only.
        if self.eye_count == 0 || single_eye || self.last_texture != Some(texture) {
            let start = Instant::now();
            let [up_l, up_r] = &mut res.upscaled;
            let [out_l, out_r] = &mut res.outputs;
            let (upscaled, output) = if slot == 0 { (up_l, out_l) } else { (up_r, out_r) };
            if let Err(e) = run_eye(&res.stages, slot, image, upscaled, output) {
                warn!(error = %e, "post-processing failed, disabling");
                self.enabled = false;
                return Submission::Passthrough;
            }
            if self.settings.debug_mode {
                if let Some(avg_ms) = self.timer.record(start.elapsed(), single_eye) {
                    info!(avg_ms, "average post-processing time per frame");
                }
            }
        }

        self.last_texture = Some(texture);
        self.eye_count = (self.eye_count + 1) % 2;
        Submission::Processed(&res.outputs[slot])
    }

    /// Process both eyes of a frame rendered into two separate textures,
    /// one eye per rayon task. Returns `None` for passthrough.
    pub fn submit_stereo(&mut self, left: &Image<Rgba>, right: &Image<Rgba>) -> Option<[&Image<Rgba>; 2]> {
        assert_eq!(
            (left.width(), left.height()),
            (right.width(), right.height()),
            "eye textures differ in size"
        );
        if !self.settings.enabled || !self.enabled {
            return None;
        }
        if !self.ensure_resources((left.width(), left.height()), &TextureBounds::default()) {
            return None;
        }
        let res = self.resources.as_mut()?;

        let start = Instant::now();
        let stages = &res.stages;
        let [up_l, up_r] = &mut res.upscaled;
        let [out_l, out_r] = &mut res.outputs;
        let (a, b) = rayon::join(
            || run_eye(stages, 0, left, up_l, out_l),
            || run_eye(stages, 1, right, up_r, out_r),
        );
        if let Err(e) = a.and(b) {
            warn!(error = %e, "post-processing failed, disabling");
            self.enabled = false;
            return None;
        }
        if self.settings.debug_mode {
            if let Some(avg_ms) = self.timer.record(start.elapsed(), false) {
                info!(avg_ms, "average post-processing time per frame");
            }
        }
        self.eye_count = 0;
        self.last_texture = None;
        Some([&res.outputs[0], &res.outputs[1]])
    }
}

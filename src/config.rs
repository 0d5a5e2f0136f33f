// config.rs — Kernel constants derived from a sharpness slider and geometry.
//
// The user only ever picks a sharpness in [0, 1] and an HDR mode; everything
// else the kernels read (edge thresholds, contrast limiter, luma ramp,
// scale factors, texel norms) is derived here once per dispatch and then
// treated as immutable.
//
// Slider mapping (s = sharpness − 0.5, so s ∈ [−0.5, 0.5]):
//
//   s ≥ 0:  MinScale = MaxScale = LimitScale = 1.25
//   s < 0:  MinScale = 1.0, MaxScale = 1.75, LimitScale = 1.0
//
//   0% maps to "almost no sharpening", 100% to "strong but not ringing".
//
// `NisConfig` is `#[repr(C)]` + `Pod`: it is laid out exactly like the
// constant buffer a GPU port would upload, so `bytemuck::bytes_of(&cfg)` is
// the upload payload.
//
// NEW RUST CONCEPTS:
// - `#[derive(Pod, Zeroable)]` on a mixed f32/u32 struct (no padding allowed)
// - Returning `Result<T>` from a constructor-like function instead of `bool`

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::error::{Error, Result};
use crate::luma::HdrMode;

/// Numeric constants consumed by the scaler and sharpener kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct NisConfig {
    pub detect_ratio: f32,
    pub detect_thres: f32,
    pub min_contrast_ratio: f32,
    pub ratio_norm: f32,

    pub contrast_boost: f32,
    pub eps: f32,
    pub sharp_start_y: f32,
    pub sharp_scale_y: f32,

    pub sharp_strength_min: f32,
    pub sharp_strength_scale: f32,
    pub sharp_limit_min: f32,
    pub sharp_limit_scale: f32,

    pub scale_x: f32,
    pub scale_y: f32,
    pub dst_norm_x: f32,
    pub dst_norm_y: f32,

    pub src_norm_x: f32,
    pub src_norm_y: f32,

    pub input_viewport_origin_x: u32,
    pub input_viewport_origin_y: u32,
    pub input_viewport_width: u32,
    pub input_viewport_height: u32,

    pub output_viewport_origin_x: u32,
    pub output_viewport_origin_y: u32,
    pub output_viewport_width: u32,
    pub output_viewport_height: u32,

    pub reserved0: f32,
    pub reserved1: f32,

    /// Foveation centre in output pixels: left eye (x, y), right eye (x, y).
    pub image_centre: [u32; 4],
    /// [radius, radius², output width, output height], all in output pixels.
    pub radius: [u32; 4],
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A rectangle inside a texture. A zero width or height means
/// "the whole texture" and is resolved when the config is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Viewport { x, y, width, height }
    }

    /// Whole-texture viewport of the given size.
    pub const fn full(width: u32, height: u32) -> Self {
        Viewport { x: 0, y: 0, width, height }
    }
}

/// Input/output viewports plus the sizes of the textures they live in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportSpec {
    pub input: Viewport,
    pub input_texture: (u32, u32),
    pub output: Viewport,
    pub output_texture: (u32, u32),
}

impl ViewportSpec {
    /// Same-size input and output covering a whole `width × height` texture.
    pub const fn full(width: u32, height: u32) -> Self {
        ViewportSpec {
            input: Viewport::full(width, height),
            input_texture: (width, height),
            output: Viewport::full(width, height),
            output_texture: (width, height),
        }
    }

    /// Whole-texture scaling from `input` to `output` size.
    pub const fn scaling(input: (u32, u32), output: (u32, u32)) -> Self {
        ViewportSpec {
            input: Viewport::full(input.0, input.1),
            input_texture: input,
            output: Viewport::full(output.0, output.1),
            output_texture: output,
        }
    }
}

// ---------------------------------------------------------------------------
// Slider mapping
// ---------------------------------------------------------------------------

/// Sharpening constants before geometry is folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SharpnessParams {
    detect_thres: f32,
    min_contrast_ratio: f32,
    max_contrast_ratio: f32,
    start_y: f32,
    end_y: f32,
    strength_min: f32,
    strength_max: f32,
    limit_min: f32,
    limit_max: f32,
}

fn sharpness_params(sharpness: f32, hdr: HdrMode) -> SharpnessParams {
    let sharpness = sharpness.min(1.0).max(0.0);
    let s = sharpness - 0.5;

    let (max_scale, min_scale, limit_scale) = if s >= 0.0 {
        (1.25, 1.25, 1.25)
    } else {
        (1.75, 1.0, 1.0)
    };

    match hdr {
        HdrMode::None => SharpnessParams {
            detect_thres: 64.0 / 1024.0,
            min_contrast_ratio: 2.0,
            max_contrast_ratio: 10.0,
            start_y: 0.45,
            end_y: 0.9,
            strength_min: (0.4 + s * min_scale * 1.2).max(0.0),
            strength_max: 1.6 + s * 1.8,
            limit_min: (0.14 + s * limit_scale * 0.32).max(0.1),
            limit_max: 0.5 + s * limit_scale * 0.6,
        },
        HdrMode::Linear | HdrMode::Pq => {
            let (start_y, end_y) = if hdr == HdrMode::Pq { (0.35, 0.55) } else { (0.3, 0.5) };
            SharpnessParams {
                detect_thres: 32.0 / 1024.0,
                min_contrast_ratio: 1.5,
                max_contrast_ratio: 5.0,
                start_y,
                end_y,
                strength_min: (0.4 + s * min_scale * 1.1).max(0.0),
                strength_max: 2.2 + s * max_scale * 1.8,
                limit_min: (0.10 + s * limit_scale * 0.28).max(0.06),
                limit_max: 0.6 + s * limit_scale * 0.6,
            }
        }
    }
}

/// Edge detection ratio shared by every mode (≈ 1.1).
pub const DETECT_RATIO: f32 = 1127.0 / 1024.0;

/// Derive the constants for the directional scaler.
///
/// Viewport extents of 0 fall back to the texture size. Fails when any
/// extent is still 0 afterwards, or when input/output is outside [0.5, 1]
/// on either axis.
pub fn scaler_config(sharpness: f32, spec: &ViewportSpec, hdr: HdrMode) -> Result<NisConfig> {
    let params = sharpness_params(sharpness, hdr);

    let resolve = |extent: u32, texture: u32| if extent == 0 { texture } else { extent };
    let in_w = resolve(spec.input.width, spec.input_texture.0);
    let in_h = resolve(spec.input.height, spec.input_texture.1);
    let out_w = resolve(spec.output.width, spec.output_texture.0);
    let out_h = resolve(spec.output.height, spec.output_texture.1);
    if in_w == 0 || in_h == 0 {
        return Err(Error::ZeroViewport { which: "input" });
    }
    if out_w == 0 || out_h == 0 {
        return Err(Error::ZeroViewport { which: "output" });
    }

    let scale_x = in_w as f32 / out_w as f32;
    let scale_y = in_h as f32 / out_h as f32;
    if !(0.5..=1.0).contains(&scale_x) || !(0.5..=1.0).contains(&scale_y) {
        return Err(Error::ScaleOutOfRange { scale_x, scale_y });
    }

    let cfg = NisConfig {
        detect_ratio: DETECT_RATIO,
        detect_thres: params.detect_thres,
        min_contrast_ratio: params.min_contrast_ratio,
        ratio_norm: 1.0 / (params.max_contrast_ratio - params.min_contrast_ratio),
        contrast_boost: 1.0,
        eps: 1.0,
        sharp_start_y: params.start_y,
        sharp_scale_y: 1.0 / (params.end_y - params.start_y),
        sharp_strength_min: params.strength_min,
        sharp_strength_scale: params.strength_max - params.strength_min,
        sharp_limit_min: params.limit_min,
        sharp_limit_scale: params.limit_max - params.limit_min,
        scale_x,
        scale_y,
        // A zero texture size only happens alongside a nonzero viewport,
        // which is a caller bug; the norm then becomes inf and is never read
        // for valid coordinates.
        dst_norm_x: 1.0 / spec.output_texture.0 as f32,
        dst_norm_y: 1.0 / spec.output_texture.1 as f32,
        src_norm_x: 1.0 / spec.input_texture.0 as f32,
        src_norm_y: 1.0 / spec.input_texture.1 as f32,
        input_viewport_origin_x: spec.input.x,
        input_viewport_origin_y: spec.input.y,
        input_viewport_width: in_w,
        input_viewport_height: in_h,
        output_viewport_origin_x: spec.output.x,
        output_viewport_origin_y: spec.output.y,
        output_viewport_width: out_w,
        output_viewport_height: out_h,
        reserved0: 0.0,
        reserved1: 0.0,
        image_centre: [0; 4],
        radius: [0; 4],
    };

    debug!(
        sharpness,
        %hdr,
        in_w, in_h, out_w, out_h,
        strength_scale = cfg.sharp_strength_scale,
        "derived scaler config"
    );
    Ok(cfg)
}

/// Derive the constants for sharpen-only processing.
///
/// Output geometry is the input viewport and texture; only the output origin
/// in `spec` is honoured.
pub fn sharpen_config(sharpness: f32, spec: &ViewportSpec, hdr: HdrMode) -> Result<NisConfig> {
    let same = ViewportSpec {
        input: spec.input,
        input_texture: spec.input_texture,
        output: Viewport {
            x: spec.output.x,
            y: spec.output.y,
            width: spec.input.width,
            height: spec.input.height,
        },
        output_texture: spec.input_texture,
    };
    scaler_config(sharpness, &same, hdr)
}

// ---------------------------------------------------------------------------
// Dispatch tuning
// ---------------------------------------------------------------------------

/// GPU families the block shape can be tuned for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GpuArchitecture {
    #[default]
    NvidiaGeneric,
    AmdGeneric,
    IntelGeneric,
}

/// Thread-group shape recommendation.
///
/// Every known architecture currently wants the same shape; the match keeps
/// room for a per-vendor split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTuning {
    pub is_upscaling: bool,
    pub arch: GpuArchitecture,
}

impl DispatchTuning {
    pub const fn new(is_upscaling: bool, arch: GpuArchitecture) -> Self {
        DispatchTuning { is_upscaling, arch }
    }

    pub fn block_width(&self) -> usize {
        match self.arch {
            GpuArchitecture::NvidiaGeneric | GpuArchitecture::AmdGeneric | GpuArchitecture::IntelGeneric => 32,
        }
    }

    pub fn block_height(&self) -> usize {
        match self.arch {
            GpuArchitecture::NvidiaGeneric | GpuArchitecture::AmdGeneric | GpuArchitecture::IntelGeneric => {
                if self.is_upscaling { 24 } else { 32 }
            }
        }
    }

    pub fn thread_group_size(&self) -> usize {
        match self.arch {
            GpuArchitecture::NvidiaGeneric | GpuArchitecture::AmdGeneric | GpuArchitecture::IntelGeneric => 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_constant_buffer_sized() {
        assert_eq!(std::mem::size_of::<NisConfig>(), 144);
        let cfg = NisConfig::default();
        assert_eq!(bytemuck::bytes_of(&cfg).len(), 144);
    }

    #[test]
    fn test_sdr_midpoint_constants() {
        let cfg = scaler_config(0.5, &ViewportSpec::scaling((100, 100), (150, 150)), HdrMode::None).unwrap();
        assert!((cfg.detect_ratio - 1.1005859).abs() < 1e-6);
        assert_eq!(cfg.detect_thres, 0.0625);
        assert!((cfg.ratio_norm - 0.125).abs() < 1e-6);
        assert!((cfg.sharp_scale_y - 1.0 / 0.45).abs() < 1e-5);
        assert!((cfg.sharp_strength_min - 0.4).abs() < 1e-6);
        assert!((cfg.sharp_strength_scale - 1.2).abs() < 1e-6);
        assert!((cfg.sharp_limit_min - 0.14).abs() < 1e-6);
        assert!((cfg.sharp_limit_scale - 0.36).abs() < 1e-6);
        assert!((cfg.scale_x - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_hdr_ramp_breakpoints() {
        let spec = ViewportSpec::full(8, 8);
        let pq = sharpen_config(0.5, &spec, HdrMode::Pq).unwrap();
        let lin = sharpen_config(0.5, &spec, HdrMode::Linear).unwrap();
        assert_eq!(pq.sharp_start_y, 0.35);
        assert_eq!(lin.sharp_start_y, 0.3);
        assert_eq!(pq.detect_thres, 32.0 / 1024.0);
        assert!((pq.ratio_norm - 1.0 / 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_sharpness_clamped() {
        let spec = ViewportSpec::full(8, 8);
        let hi = sharpen_config(7.0, &spec, HdrMode::None).unwrap();
        let one = sharpen_config(1.0, &spec, HdrMode::None).unwrap();
        assert_eq!(hi, one);
    }

    #[test]
    fn test_zero_viewport_falls_back_to_texture() {
        let spec = ViewportSpec {
            input: Viewport::new(0, 0, 0, 0),
            input_texture: (64, 64),
            output: Viewport::new(0, 0, 0, 0),
            output_texture: (96, 96),
        };
        let cfg = scaler_config(0.5, &spec, HdrMode::None).unwrap();
        assert_eq!(cfg.input_viewport_width, 64);
        assert_eq!(cfg.output_viewport_height, 96);
    }

    #[test]
    fn test_zero_everything_fails() {
        let spec = ViewportSpec::scaling((0, 64), (64, 64));
        assert!(matches!(
            scaler_config(0.5, &spec, HdrMode::None),
            Err(Error::ZeroViewport { which: "input" })
        ));
    }

    #[test]
    fn test_dispatch_tuning() {
        let up = DispatchTuning::new(true, GpuArchitecture::AmdGeneric);
        let sh = DispatchTuning::new(false, GpuArchitecture::IntelGeneric);
        assert_eq!((up.block_width(), up.block_height(), up.thread_group_size()), (32, 24, 256));
        assert_eq!((sh.block_width(), sh.block_height()), (32, 32));
    }
}

// luma.rs — Luma extraction and luma-preserving color correction.
//
// All sharpening happens on a single luma channel. How that luma is formed
// depends on the transfer function of the incoming frame:
//
//   HdrMode::None    display-referred SDR   Y = 0.2126 R + 0.7152 G + 0.0722 B
//   HdrMode::Linear  scene-linear HDR       Y = sqrt(BT.709 luma) * 0.282842712
//   HdrMode::Pq      PQ-encoded HDR         Y = 0.262 R + 0.678 G + 0.0593 B
//
// The square root in linear mode compresses [0, 12.5] into roughly [0, 1],
// so the same thresholds and ramps work on HDR input.
//
// After a kernel has computed the new luma of a pixel, the color has to be
// moved to match it. SDR and PQ shift all channels by the luma delta; linear
// HDR instead rescales them by a ratio of squares, which can never push a
// channel negative.
//
// NEW RUST CONCEPTS:
// - Trait with associated constants and no `self` (ColorSpace). The three
//   zero-sized types below are picked once when a pipeline is built, so the
//   per-pixel loop is monomorphized per mode instead of branching on an enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::image::Rgba;

/// `sqrt(0.08)`: maps scene-linear [0, 12.5] onto [0, 1] after the square root.
pub const HDR_COMPRESSION_FACTOR: f32 = 0.282842712;

/// Fixed-point scale the directional scaler works in (luma × 255).
pub const SCALE_FLOAT: f32 = 255.0;

/// Transfer function of the frame being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrMode {
    #[default]
    None,
    Linear,
    Pq,
}

impl fmt::Display for HdrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HdrMode::None => "none",
            HdrMode::Linear => "linear",
            HdrMode::Pq => "pq",
        };
        f.write_str(s)
    }
}

impl FromStr for HdrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "sdr" => Ok(HdrMode::None),
            "linear" => Ok(HdrMode::Linear),
            "pq" => Ok(HdrMode::Pq),
            other => Err(format!("unknown HDR mode '{other}' (expected none, linear or pq)")),
        }
    }
}

/// Plain BT.709 luma, independent of mode.
#[inline]
pub fn luma_linear(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Working luma for the given mode.
///
/// Negative linear input (possible after an earlier sharpening pass) is
/// clamped before the square root so the result is never NaN.
#[inline]
pub fn luma(mode: HdrMode, rgb: [f32; 3]) -> f32 {
    match mode {
        HdrMode::None => Sdr::luma(rgb),
        HdrMode::Linear => LinearHdr::luma(rgb),
        HdrMode::Pq => PqHdr::luma(rgb),
    }
}

// ---------------------------------------------------------------------------
// ColorSpace — static specialization of the mode-dependent pieces
// ---------------------------------------------------------------------------

/// The mode-dependent math shared by every kernel.
pub trait ColorSpace: Copy + Default + Send + Sync + 'static {
    const MODE: HdrMode;

    /// Working luma of an RGB triple, normalized (not ×255).
    fn luma(rgb: [f32; 3]) -> f32;

    /// Move `op` so its working luma becomes `new_luma / 255`.
    ///
    /// Used by the directional scaler, whose luma lives in the ×255 domain.
    fn correct_scaled(op: Rgba, new_luma: f32) -> Rgba;

    /// Apply a sharpening delta `usm` to `op`, whose working luma was
    /// `old_luma` at the center of the window.
    fn correct_sharpened(op: Rgba, old_luma: f32, usm: f32) -> Rgba;
}

/// Display-referred SDR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sdr;

/// Scene-linear HDR (square-root compressed luma).
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearHdr;

/// Perceptual-quantizer encoded HDR.
#[derive(Debug, Clone, Copy, Default)]
pub struct PqHdr;

impl ColorSpace for Sdr {
    const MODE: HdrMode = HdrMode::None;

    #[inline]
    fn luma(rgb: [f32; 3]) -> f32 {
        luma_linear(rgb)
    }

    #[inline]
    fn correct_scaled(op: Rgba, new_luma: f32) -> Rgba {
        op.offset_rgb(new_luma / SCALE_FLOAT - Self::luma(op.rgb()))
    }

    #[inline]
    fn correct_sharpened(op: Rgba, _old_luma: f32, usm: f32) -> Rgba {
        op.offset_rgb(usm)
    }
}

impl ColorSpace for PqHdr {
    const MODE: HdrMode = HdrMode::Pq;

    #[inline]
    fn luma(rgb: [f32; 3]) -> f32 {
        0.262 * rgb[0] + 0.678 * rgb[1] + 0.0593 * rgb[2]
    }

    #[inline]
    fn correct_scaled(op: Rgba, new_luma: f32) -> Rgba {
        op.offset_rgb(new_luma / SCALE_FLOAT - Self::luma(op.rgb()))
    }

    #[inline]
    fn correct_sharpened(op: Rgba, _old_luma: f32, usm: f32) -> Rgba {
        op.offset_rgb(usm)
    }
}

impl ColorSpace for LinearHdr {
    const MODE: HdrMode = HdrMode::Linear;

    #[inline]
    fn luma(rgb: [f32; 3]) -> f32 {
        luma_linear(rgb).max(0.0).sqrt() * HDR_COMPRESSION_FACTOR
    }

    #[inline]
    fn correct_scaled(op: Rgba, new_luma: f32) -> Rgba {
        const EPS: f32 = 1e-4;
        let norm = 1.0 / (SCALE_FLOAT * HDR_COMPRESSION_FACTOR);
        // new_luma is sqrt-compressed; squaring it recovers linear luma.
        let y = new_luma.max(0.0) * norm;
        let corr = (y * y + EPS) / (luma_linear(op.rgb()).max(0.0) + EPS);
        op.scale_rgb(corr)
    }

    #[inline]
    fn correct_sharpened(op: Rgba, old_luma: f32, usm: f32) -> Rgba {
        let eps = 1e-4 * HDR_COMPRESSION_FACTOR * HDR_COMPRESSION_FACTOR;
        let new_luma = (old_luma + usm).max(0.0);
        let corr = (new_luma * new_luma + eps) / (old_luma * old_luma + eps);
        op.scale_rgb(corr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Rgba, b: Rgba, tol: f32) -> bool {
        (a.r - b.r).abs() < tol && (a.g - b.g).abs() < tol && (a.b - b.b).abs() < tol
    }

    #[test]
    fn test_luma_white_is_one() {
        assert!((luma(HdrMode::None, [1.0; 3]) - 1.0).abs() < 1e-6);
        // PQ weights intentionally do not sum to one.
        assert!((luma(HdrMode::Pq, [1.0; 3]) - 0.9993).abs() < 1e-5);
        assert!((luma(HdrMode::Linear, [12.5; 3]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_linear_luma_never_nan() {
        assert_eq!(luma(HdrMode::Linear, [-1.0, -1.0, -1.0]), 0.0);
    }

    #[test]
    fn test_mode_parse_display() {
        for mode in [HdrMode::None, HdrMode::Linear, HdrMode::Pq] {
            assert_eq!(mode.to_string().parse::<HdrMode>(), Ok(mode));
        }
        assert!("hlg".parse::<HdrMode>().is_err());
    }

    #[test]
    fn test_correction_idempotent_on_unchanged_luma() {
        let op = Rgba::new(0.3, 0.5, 0.2, 1.0);

        let y = Sdr::luma(op.rgb()) * SCALE_FLOAT;
        assert!(close(Sdr::correct_scaled(op, y), op, 1e-5));
        assert!(close(Sdr::correct_sharpened(op, y, 0.0), op, 1e-6));

        let y = PqHdr::luma(op.rgb()) * SCALE_FLOAT;
        assert!(close(PqHdr::correct_scaled(op, y), op, 1e-5));

        let y = LinearHdr::luma(op.rgb());
        assert!(close(LinearHdr::correct_scaled(op, y * SCALE_FLOAT), op, 1e-3));
        assert!(close(LinearHdr::correct_sharpened(op, y, 0.0), op, 1e-6));
    }

    #[test]
    fn test_linear_correction_keeps_channels_non_negative() {
        let op = Rgba::new(0.5, 0.1, 0.0, 1.0);
        let y = LinearHdr::luma(op.rgb());
        let out = LinearHdr::correct_sharpened(op, y, -10.0);
        assert!(out.r >= 0.0 && out.g >= 0.0 && out.b >= 0.0);
    }

    #[test]
    fn test_sdr_sharpen_adds_delta() {
        let out = Sdr::correct_sharpened(Rgba::gray(0.5), 0.5, 0.1);
        assert!(close(out, Rgba::gray(0.6), 1e-6));
        assert_eq!(out.a, 1.0);
    }
}

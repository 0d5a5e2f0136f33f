// ramp.rs — Luma-adaptive sharpening strength and limit.
//
// Bright pixels get less sharpening. The ramp falls linearly from 1 at
// `sharp_start_y` to 0 at `sharp_start_y + 1/sharp_scale_y`:
//
//   y_scale
//     1 ┤─────╮
//       │      ╲
//     0 ┤       ╰──────
//       └──────┬─────┬──── luma
//           start   end
//
// The USM value is then shaped in three fixed steps, strength first, then
// the ±limit clamp, then the ringing factor. Swapping any two changes which
// values saturate.

use crate::config::NisConfig;

/// Per-pixel sharpening strength and absolute limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpenRamp {
    pub strength: f32,
    pub limit: f32,
}

impl SharpenRamp {
    /// Ramp for a pixel of normalized luma `y`; `base` is the value the
    /// limit is proportional to, in whatever scale the caller works in
    /// (the scaler passes luma × 255, the sharpener plain luma).
    #[inline]
    pub fn new(cfg: &NisConfig, y: f32, base: f32) -> Self {
        let y_scale = 1.0 - ((y - cfg.sharp_start_y) * cfg.sharp_scale_y).clamp(0.0, 1.0);
        SharpenRamp {
            strength: y_scale * cfg.sharp_strength_scale + cfg.sharp_strength_min,
            limit: (y_scale * cfg.sharp_limit_scale + cfg.sharp_limit_min) * base,
        }
    }

    /// Strength, then clamp to ±limit, then ringing suppression.
    #[inline]
    pub fn shape(&self, usm: f32, ringing: f32) -> f32 {
        // min/max rather than clamp: a negative base (possible with
        // out-of-gamut SDR input) yields limit < 0, which clamp rejects.
        (usm * self.strength).max(-self.limit).min(self.limit) * ringing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{sharpen_config, ViewportSpec};
    use crate::luma::HdrMode;

    fn cfg() -> NisConfig {
        sharpen_config(0.5, &ViewportSpec::full(4, 4), HdrMode::None).unwrap()
    }

    #[test]
    fn test_dark_pixels_get_full_strength() {
        let c = cfg();
        let r = SharpenRamp::new(&c, 0.1, 0.1);
        assert!((r.strength - (c.sharp_strength_scale + c.sharp_strength_min)).abs() < 1e-6);
    }

    #[test]
    fn test_bright_pixels_get_minimum_strength() {
        let c = cfg();
        let r = SharpenRamp::new(&c, 0.95, 0.95);
        assert!((r.strength - c.sharp_strength_min).abs() < 1e-6);
        assert!((r.limit - c.sharp_limit_min * 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_shape_clamps_before_ringing() {
        let r = SharpenRamp { strength: 2.0, limit: 0.1 };
        // 1.0 * 2 = 2 -> clamp 0.1 -> * 0.5 = 0.05
        assert!((r.shape(1.0, 0.5) - 0.05).abs() < 1e-6);
        assert!((r.shape(-1.0, 0.5) + 0.05).abs() < 1e-6);
        assert!((r.shape(0.02, 1.0) - 0.04).abs() < 1e-6);
    }

    #[test]
    fn test_negative_limit_does_not_panic() {
        let r = SharpenRamp { strength: 1.0, limit: -0.1 };
        let _ = r.shape(0.5, 1.0);
    }
}

// sharpen.rs — Directional unsharp-mask sharpener (no resampling).
//
// Same execution shape as the scaler, with a smaller footprint:
//
//   load     tile of (block + 6)² plain luma values (not ×255),
//            cell c ↔ texel dst_block + c − 2
//   barrier
//   compute  5×5 window centred on the output pixel
//              ramp  = strength / limit from the centre luma
//              usm_d = EvalUSM along 0°, 90°, 45°, 135°
//              w     = edge weights of the centre 3×3
//              usm   = Σ usm_d · w
//            color tap + luma-preserving correction
//
// Directions inside the 5×5 (centre ■ = p[2][2]):
//
//     0°: column 2        90°: row 2
//    45°: p11, ½(p21+p12), ■, ½(p32+p23), p33
//   135°: p31, ½(p32+p21), ■, ½(p23+p12), p13
//
// The diagonals use a fixed half-way sample between the two neighbours that
// straddle the diagonal, since there is no sub-pixel phase to honour.

use std::marker::PhantomData;

use tracing::debug;

use crate::config::NisConfig;
use crate::dispatch::{dispatch, DispatchOptions, GroupId, GroupKernel};
use crate::edge::edge_map;
use crate::error::Result;
use crate::filter_bank::eval_usm;
use crate::image::{fetch_clamped, sample_bilinear, Image, Pixel, Rgba};
use crate::luma::{ColorSpace, Sdr};
use crate::ramp::SharpenRamp;
use crate::tile::{SharedTile, TileLayout};

/// Extra tile cells per axis beyond the block: the 5×5 window needs two on
/// each side, the rest keeps the extent even for 2×2 loads.
const TILE_PAD: usize = 6;

/// Per-direction USM values in [0°, 90°, 45°, 135°] order.
pub fn directional_usm(p: &[[f32; 5]; 5], cfg: &NisConfig) -> [f32; 4] {
    let ramp = SharpenRamp::new(cfg, p[2][2], p[2][2]);
    let mid = |a: f32, b: f32| a + (b - a) * 0.5;

    let d0 = [p[0][2], p[1][2], p[2][2], p[3][2], p[4][2]];
    let d90 = p[2];
    let d45 = [p[1][1], mid(p[2][1], p[1][2]), p[2][2], mid(p[3][2], p[2][3]), p[3][3]];
    let d135 = [p[3][1], mid(p[3][2], p[2][1]), p[2][2], mid(p[2][3], p[1][2]), p[1][3]];

    [
        eval_usm(&d0, &ramp, cfg),
        eval_usm(&d90, &ramp, cfg),
        eval_usm(&d45, &ramp, cfg),
        eval_usm(&d135, &ramp, cfg),
    ]
}

/// Sharpening delta for the centre of a 5×5 luma window.
pub fn sharpen_delta(p: &[[f32; 5]; 5], cfg: &NisConfig) -> f32 {
    let w = edge_map(p, 1, 1, cfg);
    w.blend(directional_usm(p, cfg))
}

/// Directional sharpener for the color space `C`.
#[derive(Debug, Clone, Copy)]
pub struct NisSharpen<C: ColorSpace = Sdr> {
    config: NisConfig,
    _space: PhantomData<C>,
}

impl<C: ColorSpace> NisSharpen<C> {
    pub fn new(config: NisConfig) -> Self {
        NisSharpen { config, _space: PhantomData }
    }

    pub fn config(&self) -> &NisConfig {
        &self.config
    }

    /// Sharpen `src` into `dst`. Both should be the size the config was
    /// derived for.
    pub fn sharpen<T: Pixel, U: Pixel>(&self, src: &Image<T>, dst: &mut Image<U>, opts: &DispatchOptions) -> Result<()> {
        debug!(mode = %C::MODE, w = src.width(), h = src.height(), "NIS sharpen");
        let pass = SharpenPass::<C, T> { cfg: &self.config, src, _space: PhantomData };
        dispatch(&pass, dst, opts)
    }
}

struct SharpenPass<'a, C, T: Pixel> {
    cfg: &'a NisConfig,
    src: &'a Image<T>,
    _space: PhantomData<C>,
}

impl<C: ColorSpace, T: Pixel> GroupKernel for SharpenPass<'_, C, T> {
    type Cell = f32;

    fn grid_extent(&self, _opts: &DispatchOptions) -> (usize, usize) {
        (self.cfg.output_viewport_width as usize, self.cfg.output_viewport_height as usize)
    }

    fn tile_layout(&self, group: GroupId, opts: &DispatchOptions) -> TileLayout {
        let (ox, oy) = if opts.viewport_support {
            (self.cfg.input_viewport_origin_x as i64, self.cfg.input_viewport_origin_y as i64)
        } else {
            (0, 0)
        };
        TileLayout::new(
            (group.x * opts.block_width) as i64 - 2 + ox,
            (group.y * opts.block_height) as i64 - 2 + oy,
            opts.block_width + TILE_PAD,
            opts.block_height + TILE_PAD,
        )
    }

    fn load_batch(&self, layout: &TileLayout, cx: usize, cy: usize, _opts: &DispatchOptions) -> [[f32; 2]; 2] {
        std::array::from_fn(|dy| {
            std::array::from_fn(|dx| {
                let (x, y) = layout.texel(cx + dx, cy + dy);
                C::luma(fetch_clamped(self.src, x, y).rgb())
            })
        })
    }

    fn compute(
        &self,
        tile: &SharedTile<f32>,
        group: GroupId,
        lx: usize,
        ly: usize,
        opts: &DispatchOptions,
    ) -> Option<(usize, usize, Rgba)> {
        let cfg = self.cfg;
        let p: [[f32; 5]; 5] = tile.window(lx, ly);
        let usm = sharpen_delta(&p, cfg);

        let dst_x = group.x * opts.block_width + lx;
        let dst_y = group.y * opts.block_height + ly;

        if opts.viewport_support {
            if dst_x >= cfg.output_viewport_width as usize || dst_y >= cfg.output_viewport_height as usize {
                return None;
            }
            // Pixel-centre tap, same as the full-texture branch below.
            let op = sample_bilinear(
                self.src,
                (dst_x as f32 + 0.5 + cfg.input_viewport_origin_x as f32) * cfg.src_norm_x,
                (dst_y as f32 + 0.5 + cfg.input_viewport_origin_y as f32) * cfg.src_norm_y,
            );
            Some((
                dst_x + cfg.output_viewport_origin_x as usize,
                dst_y + cfg.output_viewport_origin_y as usize,
                C::correct_sharpened(op, p[2][2], usm),
            ))
        } else {
            let op = sample_bilinear(
                self.src,
                (dst_x as f32 + 0.5) * cfg.dst_norm_x,
                (dst_y as f32 + 0.5) * cfg.dst_norm_y,
            );
            Some((dst_x, dst_y, C::correct_sharpened(op, p[2][2], usm)))
        }
    }

    fn output_origin_y(&self, opts: &DispatchOptions) -> usize {
        if opts.viewport_support {
            self.cfg.output_viewport_origin_y as usize
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{sharpen_config, ViewportSpec};
    use crate::luma::HdrMode;

    fn cfg(sharpness: f32) -> NisConfig {
        sharpen_config(sharpness, &ViewportSpec::full(32, 32), HdrMode::None).unwrap()
    }

    #[test]
    fn test_flat_window_has_zero_delta() {
        let p = [[0.3f32; 5]; 5];
        assert_eq!(sharpen_delta(&p, &cfg(1.0)), 0.0);
    }

    fn columns(profile: [f32; 5]) -> [[f32; 5]; 5] {
        std::array::from_fn(|_| profile)
    }

    #[test]
    fn test_soft_edge_pushes_shoulders_apart() {
        // Soft vertical edge: the dark shoulder gets darker, the bright
        // shoulder brighter.
        let c = cfg(1.0);
        assert!(sharpen_delta(&columns([0.2, 0.3, 0.4, 0.6, 0.7]), &c) < 0.0);
        assert!(sharpen_delta(&columns([0.2, 0.3, 0.6, 0.7, 0.75]), &c) > 0.0);
    }

    #[test]
    fn test_hard_step_is_left_alone() {
        // One flat triplet against a step: the ringing limiter vetoes it.
        let c = cfg(1.0);
        assert_eq!(sharpen_delta(&columns([0.2, 0.2, 0.2, 0.6, 0.6]), &c), 0.0);
    }

    #[test]
    fn test_delta_within_limit() {
        let c = cfg(1.0);
        let p = columns([0.1, 0.2, 0.45, 0.6, 0.65]);
        let ramp = SharpenRamp::new(&c, p[2][2], p[2][2]);
        assert!(sharpen_delta(&p, &c).abs() <= ramp.limit + 1e-6);
    }

    #[test]
    fn test_flat_image_unchanged() {
        let src = Image::filled(40, 20, Rgba::new(0.2, 0.4, 0.6, 1.0));
        let spec = ViewportSpec::full(40, 20);
        let s = NisSharpen::<Sdr>::new(sharpen_config(0.7, &spec, HdrMode::None).unwrap());
        let mut dst: Image<Rgba> = Image::new(40, 20);
        s.sharpen(&src, &mut dst, &DispatchOptions::new(16, 8, 32)).unwrap();
        for (_, _, c) in dst.pixels() {
            assert!((c.r - 0.2).abs() < 1e-4 && (c.b - 0.6).abs() < 1e-4);
        }
    }
}

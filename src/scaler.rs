// scaler.rs — Edge-adaptive directional upscaler.
//
// Per thread-group:
//
//   load     Map the group's output block back to source space, pad by the
//            6-tap support, and fill a tile where each cell holds
//              • source luma × 255
//              • the 4-direction edge weights of that texel's 3×3
//            Cells are produced in 2×2 batches from one 4×4 luma
//            neighborhood, so every source texel is fetched four times
//            instead of nine.
//
//   barrier
//
//   compute  For each output pixel:
//              src = (dst + 0.5) · scale − 0.5
//              p   = 6×6 tile window around floor(src)
//              n   = separable polyphase resample of p
//              d   = directional filters of p (0°, 90°, 45°, 135°)
//              w   = edge weights bilinearly interpolated at frac(src)
//              Y'  = Σ d·w + n·(1 − Σ w)
//            then the bilinear color tap is shifted/scaled so its luma
//            becomes Y'.
//
// Tile geometry (one axis):
//
//   src_block_start ─┐
//   cell 0           ▼
//   │ ─2 │ ─1 │  0 │  1 │ … │ n−3 │    cell c ↔ texel src_block_start + c − 2
//
// so the 6×6 window for an output pixel starts at cell floor(src) −
// src_block_start, and its four edge-weight corners sit at +2/+3.

use std::marker::PhantomData;

use tracing::debug;

use crate::coefficients::phase_index;
use crate::config::NisConfig;
use crate::dispatch::{dispatch, DispatchOptions, GroupId, GroupKernel};
use crate::edge::{edge_map, interpolate_edge_map, EdgeWeights};
use crate::error::Result;
use crate::filter_bank::{directional_filters, filter_normal};
use crate::image::{fetch_clamped, sample_bilinear, Image, Pixel, Rgba};
use crate::luma::{ColorSpace, Sdr, SCALE_FLOAT};
use crate::tile::{scaler_source_span, SharedTile, TileLayout};

/// One scaler tile cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScalerCell {
    /// Luma × 255.
    pub luma: f32,
    pub edge: EdgeWeights,
}

/// Directional upscaler for the color space `C`.
#[derive(Debug, Clone, Copy)]
pub struct NisScaler<C: ColorSpace = Sdr> {
    config: NisConfig,
    _space: PhantomData<C>,
}

impl<C: ColorSpace> NisScaler<C> {
    pub fn new(config: NisConfig) -> Self {
        NisScaler { config, _space: PhantomData }
    }

    pub fn config(&self) -> &NisConfig {
        &self.config
    }

    /// Upscale `src` into `dst`.
    ///
    /// `dst` should be the output texture the config was derived for; pixels
    /// outside the output viewport are left as they are.
    pub fn upscale<T: Pixel, U: Pixel>(&self, src: &Image<T>, dst: &mut Image<U>, opts: &DispatchOptions) -> Result<()> {
        debug!(
            mode = %C::MODE,
            src_w = src.width(),
            src_h = src.height(),
            dst_w = dst.width(),
            dst_h = dst.height(),
            "NIS upscale"
        );
        let pass = ScalerPass::<C, T> { cfg: &self.config, src, _space: PhantomData };
        dispatch(&pass, dst, opts)
    }
}

/// One dispatch of the scaler over a particular source image.
struct ScalerPass<'a, C, T: Pixel> {
    cfg: &'a NisConfig,
    src: &'a Image<T>,
    _space: PhantomData<C>,
}

impl<C: ColorSpace, T: Pixel> ScalerPass<'_, C, T> {
    /// Source texel offset applied to every fetch.
    fn input_origin(&self, opts: &DispatchOptions) -> (i64, i64) {
        if opts.viewport_support {
            (self.cfg.input_viewport_origin_x as i64, self.cfg.input_viewport_origin_y as i64)
        } else {
            (0, 0)
        }
    }
}

impl<C: ColorSpace, T: Pixel> GroupKernel for ScalerPass<'_, C, T> {
    type Cell = ScalerCell;

    fn grid_extent(&self, _opts: &DispatchOptions) -> (usize, usize) {
        (self.cfg.output_viewport_width as usize, self.cfg.output_viewport_height as usize)
    }

    fn tile_layout(&self, group: GroupId, opts: &DispatchOptions) -> TileLayout {
        let (start_x, nx) = scaler_source_span(group.x * opts.block_width, opts.block_width, self.cfg.scale_x);
        let (start_y, ny) = scaler_source_span(group.y * opts.block_height, opts.block_height, self.cfg.scale_y);
        TileLayout::new(start_x - 2, start_y - 2, nx, ny)
    }

    fn load_batch(&self, layout: &TileLayout, cx: usize, cy: usize, opts: &DispatchOptions) -> [[ScalerCell; 2]; 2] {
        let (ox, oy) = self.input_origin(opts);
        let (tx, ty) = layout.texel(cx, cy);

        // 4×4 luma neighborhood; p[1][1] is the batch's top-left cell.
        let mut p = [[0.0f32; 4]; 4];
        for (j, row) in p.iter_mut().enumerate() {
            for (k, v) in row.iter_mut().enumerate() {
                let c = fetch_clamped(self.src, tx - 1 + k as i64 + ox, ty - 1 + j as i64 + oy);
                *v = C::luma(c.rgb());
            }
        }

        let cell = |i: usize, j: usize| ScalerCell {
            luma: p[1 + i][1 + j] * SCALE_FLOAT,
            edge: edge_map(&p, i, j, self.cfg),
        };
        [[cell(0, 0), cell(0, 1)], [cell(1, 0), cell(1, 1)]]
    }

    fn compute(
        &self,
        tile: &SharedTile<ScalerCell>,
        group: GroupId,
        lx: usize,
        ly: usize,
        opts: &DispatchOptions,
    ) -> Option<(usize, usize, Rgba)> {
        let cfg = self.cfg;
        let dst_x = group.x * opts.block_width + lx;
        let dst_y = group.y * opts.block_height + ly;

        let src_x = (0.5 + dst_x as f32) * cfg.scale_x - 0.5;
        let src_y = (0.5 + dst_y as f32) * cfg.scale_y - 0.5;

        if opts.viewport_support
            && (src_x >= cfg.input_viewport_width as f32
                || src_y >= cfg.input_viewport_height as f32
                || dst_x >= cfg.output_viewport_width as usize
                || dst_y >= cfg.output_viewport_height as usize)
        {
            return None;
        }

        let layout = tile.layout();
        let floor_x = src_x.floor();
        let floor_y = src_y.floor();
        // Window origin in cells: floor(src) − src_block_start.
        let px = (floor_x as i64 - layout.origin_x - 2) as usize;
        let py = (floor_y as i64 - layout.origin_y - 2) as usize;

        let window: [[ScalerCell; 6]; 6] = tile.window(px, py);
        let p: [[f32; 6]; 6] = std::array::from_fn(|i| std::array::from_fn(|j| window[i][j].luma));

        let fx = src_x - floor_x;
        let fy = src_y - floor_y;
        let fx_int = phase_index(fx);
        let fy_int = phase_index(fy);

        let normal = filter_normal(&p, fx_int, fy_int);
        let dir = directional_filters(&p, fx, fy, fx_int, fy_int, cfg);

        let corners = [
            [window[2][2].edge, window[2][3].edge],
            [window[3][2].edge, window[3][3].edge],
        ];
        let w = interpolate_edge_map(&corners, fx, fy);
        let op_y = w.blend(dir) + normal * (1.0 - w.sum());

        // Both branches sample at the pixel centre. Shader ports that drop
        // the half texel here read a quarter texel up-left of the edge taps
        // on a 2x viewport upscale; see
        // viewport_dispatch_writes_only_inside_output_viewport.
        let op = if opts.viewport_support {
            sample_bilinear(
                self.src,
                (src_x + 0.5 + cfg.input_viewport_origin_x as f32) * cfg.src_norm_x,
                (src_y + 0.5 + cfg.input_viewport_origin_y as f32) * cfg.src_norm_y,
            )
        } else {
            sample_bilinear(
                self.src,
                (dst_x as f32 + 0.5) * cfg.dst_norm_x,
                (dst_y as f32 + 0.5) * cfg.dst_norm_y,
            )
        };
        let out = C::correct_scaled(op, op_y);

        if opts.viewport_support {
            Some((
                dst_x + cfg.output_viewport_origin_x as usize,
                dst_y + cfg.output_viewport_origin_y as usize,
                out,
            ))
        } else {
            Some((dst_x, dst_y, out))
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
    use crate::config::{scaler_config, ViewportSpec};
    use crate::luma::{HdrMode, LinearHdr};

    fn scaler(from: usize, to: usize, sharpness: f32) -> NisScaler {
        let spec = ViewportSpec::scaling((from as u32, from as u32), (to as u32, to as u32));
        NisScaler::new(scaler_config(sharpness, &spec, HdrMode::None).unwrap())
    }

    #[test]
    fn test_flat_gray_stays_flat() {
        let src = Image::filled(24, 24, Rgba::gray(0.4));
        let mut dst: Image<Rgba> = Image::new(36, 36);
        scaler(24, 36, 0.8).upscale(&src, &mut dst, &DispatchOptions::default()).unwrap();
        for (x, y, c) in dst.pixels() {
            assert!((c.r - 0.4).abs() < 1e-3, "({x},{y}) = {c:?}");
        }
    }

    #[test]
    fn test_identity_scale_preserves_smooth_ramp() {
        // A gentle ramp produces no edges; at scale 1 every phase is 0, so
        // the normal filter reduces to the anchor texel.
        let src = Image::from_fn(16, 16, |x, _| Rgba::gray(0.2 + x as f32 * 0.001));
        let mut dst: Image<Rgba> = Image::new(16, 16);
        scaler(16, 16, 0.5).upscale(&src, &mut dst, &DispatchOptions::default()).unwrap();
        for (x, y, c) in dst.pixels() {
            assert!((c.g - src.get(x, y).g).abs() < 1e-3, "({x},{y})");
        }
    }

    #[test]
    fn test_linear_hdr_flat_is_preserved() {
        let src = Image::filled(16, 16, Rgba::gray(4.0));
        let spec = ViewportSpec::scaling((16, 16), (24, 24));
        let cfg = scaler_config(0.5, &spec, HdrMode::Linear).unwrap();
        let mut dst: Image<Rgba> = Image::new(24, 24);
        NisScaler::<LinearHdr>::new(cfg).upscale(&src, &mut dst, &DispatchOptions::default()).unwrap();
        for (_, _, c) in dst.pixels() {
            assert!((c.b - 4.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_alpha_follows_bilinear_tap() {
        let src = Image::filled(8, 8, Rgba::new(0.5, 0.5, 0.5, 0.25));
        let mut dst: Image<Rgba> = Image::new(16, 16);
        scaler(8, 16, 0.5).upscale(&src, &mut dst, &DispatchOptions::new(8, 8, 16)).unwrap();
        assert!(dst.pixels().all(|(_, _, c)| (c.a - 0.25).abs() < 1e-6));
    }
}

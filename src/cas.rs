// cas.rs — Radial contrast-adaptive sharpener and foveation geometry.
//
// The simpler of the two sharpening paths. There is no directional
// decomposition and no edge map: every pixel inside the foveated circle gets
// one horizontal unsharp mask
//
//   usm = −0.6·p[x−1] + 1.2·p[x] − 0.6·p[x+1]
//
// shaped by the luma ramp and damped by the 5-sample min/max limiter over
// p[x−2 .. x+2]. Pixels outside the circle are copied through unchanged.
// With viewport support the circle is placed relative to the viewport, not
// the texture.
//
// Foveation
// ---------
// The circle sits at the projection centre of the eye, which for most HMDs
// is not the texture centre. With both eyes packed side by side into one
// texture the left half uses the left centre and the right half the right
// centre:
//
//   ┌──────────────┬──────────────┐
//   │     ◯ L      │      ◯ R     │     radius = ½ · setting · height
//   └──────────────┴──────────────┘
//
// NEW RUST CONCEPTS:
// - An enum with a data-less "everywhere" variant instead of a sentinel
//   radius, so "not foveated" cannot be confused with "radius 0".

use std::marker::PhantomData;

use tracing::debug;

use crate::config::NisConfig;
use crate::dispatch::{dispatch, DispatchOptions, GroupId, GroupKernel};
use crate::error::Result;
use crate::filter_bank::eval_usm;
use crate::image::{fetch_clamped, Image, Pixel, Rgba};
use crate::luma::{ColorSpace, Sdr};
use crate::ramp::SharpenRamp;
use crate::tile::{SharedTile, TileLayout};

// ---------------------------------------------------------------------------
// Projection centre
// ---------------------------------------------------------------------------

/// One of the two eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Raw projection bounds of one eye, as tangents of the half-angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionBounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// Angle each display is rotated outwards, from the two eyes' forward axes.
///
/// Half the angle between the axes, positive for the left eye and negative
/// for the right.
pub fn canted_angle(left_forward: [f32; 3], right_forward: [f32; 3], eye: Eye) -> f32 {
    let dot: f32 = left_forward.iter().zip(&right_forward).map(|(a, b)| a * b).sum();
    let half = (dot.clamp(-1.0, 1.0).acos() / 2.0).abs();
    match eye {
        Eye::Left => half,
        Eye::Right => -half,
    }
}

/// Normalised (0..1) position of the optical centre inside an eye's image.
pub fn projection_center(bounds: &ProjectionBounds, canted_angle: f32) -> (f32, f32) {
    let ProjectionBounds { left, right, top, bottom } = *bounds;
    let canted = canted_angle.tan();
    let x = 0.5 * (1.0 + (right + left - 2.0 * canted) / (left - right));
    let y = 0.5 * (1.0 + (bottom + top) / (top - bottom));
    (x, y)
}

// ---------------------------------------------------------------------------
// FoveatedRegion
// ---------------------------------------------------------------------------

/// Where the radial sharpener is allowed to act.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FoveatedRegion {
    /// No foveation block in the config: sharpen every pixel.
    Everywhere,
    /// Circle(s) in output pixels. Pixels with x < `split_x` use `left`,
    /// the rest `right`; for a single-eye texture both centres coincide.
    Circle {
        left: (f32, f32),
        right: (f32, f32),
        radius_sq: f32,
        split_x: f32,
    },
}

impl FoveatedRegion {
    /// Read the region from the foveation block of `cfg`.
    ///
    /// An all-zero block (what the config derivation produces) means
    /// [`FoveatedRegion::Everywhere`].
    pub fn from_config(cfg: &NisConfig) -> Self {
        if cfg.radius == [0; 4] && cfg.image_centre == [0; 4] {
            return FoveatedRegion::Everywhere;
        }
        let c = cfg.image_centre;
        FoveatedRegion::Circle {
            left: (c[0] as f32, c[1] as f32),
            right: (c[2] as f32, c[3] as f32),
            radius_sq: cfg.radius[1] as f32,
            split_x: cfg.radius[2] as f32 * 0.5,
        }
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        match *self {
            FoveatedRegion::Everywhere => true,
            FoveatedRegion::Circle { left, right, radius_sq, split_x } => {
                let (px, py) = (x as f32, y as f32);
                let (cx, cy) = if px < split_x { left } else { right };
                let (dx, dy) = (px - cx, py - cy);
                dx * dx + dy * dy <= radius_sq
            }
        }
    }
}

/// Fill the foveation block of `cfg`.
///
/// `centres` are the normalised projection centres of the left and right
/// eye. `buffer_eye` says which eye this config is for when the texture
/// holds one eye only; `None` means a side-by-side texture holding both.
/// `radius_setting` is the user radius as a fraction of the output height.
pub fn write_foveation(
    cfg: &mut NisConfig,
    centres: [(f32, f32); 2],
    buffer_eye: Option<Eye>,
    radius_setting: f32,
    output: (u32, u32),
) {
    let (w, h) = (output.0 as f32, output.1 as f32);
    let [(lx, ly), (rx, ry)] = centres;
    cfg.image_centre = match buffer_eye {
        Some(eye) => {
            let (x, y) = match eye {
                Eye::Left => (lx, ly),
                Eye::Right => (rx, ry),
            };
            let c = [(w * x) as u32, (h * y) as u32];
            [c[0], c[1], c[0], c[1]]
        }
        None => [
            (w / 2.0 * lx) as u32,
            (h * ly) as u32,
            (w / 2.0 * (1.0 + rx)) as u32,
            (h * ry) as u32,
        ],
    };
    let r = (0.5 * radius_setting * h).max(0.0) as u32;
    cfg.radius = [r, r.saturating_mul(r), output.0, output.1];
}

// ---------------------------------------------------------------------------
// RadialSharpen
// ---------------------------------------------------------------------------

/// Tile padding: two cells of horizontal support each side, rounded to keep
/// both extents even.
const TILE_PAD: usize = 4;

/// Horizontal unsharp mask of the centre of a 5-sample luma row.
#[inline]
pub fn radial_delta(row: &[f32; 5], cfg: &NisConfig) -> f32 {
    let ramp = SharpenRamp::new(cfg, row[2], row[2]);
    eval_usm(row, &ramp, cfg)
}

/// Radial min/max sharpener for the color space `C`.
#[derive(Debug, Clone, Copy)]
pub struct RadialSharpen<C: ColorSpace = Sdr> {
    config: NisConfig,
    region: FoveatedRegion,
    _space: PhantomData<C>,
}

impl<C: ColorSpace> RadialSharpen<C> {
    /// Sharpener for the region described by the config's foveation block.
    pub fn new(config: NisConfig) -> Self {
        let region = FoveatedRegion::from_config(&config);
        RadialSharpen { config, region, _space: PhantomData }
    }

    pub fn config(&self) -> &NisConfig {
        &self.config
    }

    pub fn region(&self) -> &FoveatedRegion {
        &self.region
    }

    /// Sharpen `src` into `dst`, both of the size the config was derived for.
    pub fn sharpen<T: Pixel, U: Pixel>(&self, src: &Image<T>, dst: &mut Image<U>, opts: &DispatchOptions) -> Result<()> {
        debug!(mode = %C::MODE, w = src.width(), h = src.height(), region = ?self.region, "radial sharpen");
        let pass = RadialPass::<C, T> { sharpen: self, src };
        dispatch(&pass, dst, opts)
    }
}

struct RadialPass<'a, C: ColorSpace, T: Pixel> {
    sharpen: &'a RadialSharpen<C>,
    src: &'a Image<T>,
}

impl<C: ColorSpace, T: Pixel> RadialPass<'_, C, T> {
    fn origin(&self, opts: &DispatchOptions, input: bool) -> (usize, usize) {
        let cfg = &self.sharpen.config;
        match (opts.viewport_support, input) {
            (false, _) => (0, 0),
            (true, true) => (cfg.input_viewport_origin_x as usize, cfg.input_viewport_origin_y as usize),
            (true, false) => (cfg.output_viewport_origin_x as usize, cfg.output_viewport_origin_y as usize),
        }
    }
}

impl<C: ColorSpace, T: Pixel> GroupKernel for RadialPass<'_, C, T> {
    type Cell = f32;

    fn grid_extent(&self, _opts: &DispatchOptions) -> (usize, usize) {
        let cfg = &self.sharpen.config;
        (cfg.output_viewport_width as usize, cfg.output_viewport_height as usize)
    }

    fn tile_layout(&self, group: GroupId, opts: &DispatchOptions) -> TileLayout {
        let (ox, oy) = self.origin(opts, true);
        TileLayout::new(
            (group.x * opts.block_width + ox) as i64 - 2,
            (group.y * opts.block_height + oy) as i64,
            opts.block_width + TILE_PAD,
            opts.block_height,
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
        let cfg = &self.sharpen.config;
        let x = group.x * opts.block_width + lx;
        let y = group.y * opts.block_height + ly;
        if x >= cfg.output_viewport_width as usize || y >= cfg.output_viewport_height as usize {
            return None;
        }

        // The foveated circle is in viewport coordinates.
        let (ix, iy) = self.origin(opts, true);
        let (ox, oy) = self.origin(opts, false);
        let op = fetch_clamped(self.src, (x + ix) as i64, (y + iy) as i64);
        if !self.sharpen.region.contains(x, y) {
            return Some((x + ox, y + oy, op));
        }

        let row: [f32; 5] = std::array::from_fn(|k| tile.get(lx + k, ly));
        let usm = radial_delta(&row, cfg);
        Some((x + ox, y + oy, C::correct_sharpened(op, row[2], usm)))
    }

    fn output_origin_y(&self, opts: &DispatchOptions) -> usize {
        self.origin(opts, false).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{sharpen_config, ViewportSpec};
    use crate::luma::HdrMode;

    fn cfg(w: u32, h: u32) -> NisConfig {
        sharpen_config(1.0, &ViewportSpec::full(w, h), HdrMode::None).unwrap()
    }

    #[test]
    fn test_symmetric_projection_is_centred() {
        let b = ProjectionBounds { left: -1.0, right: 1.0, top: -1.0, bottom: 1.0 };
        let (x, y) = projection_center(&b, 0.0);
        assert!((x - 0.5).abs() < 1e-6 && (y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_asymmetric_projection_shifts_centre() {
        // Wider on the outside (left) for the left eye: centre moves right.
        let b = ProjectionBounds { left: -1.4, right: 1.0, top: -1.0, bottom: 1.0 };
        let (x, _) = projection_center(&b, 0.0);
        assert!(x > 0.5, "{x}");
    }

    #[test]
    fn test_canted_angle_sign_follows_eye() {
        let l = [0.0, 0.0, 1.0];
        let r = [0.2f32.sin(), 0.0, 0.2f32.cos()];
        let a = canted_angle(l, r, Eye::Left);
        assert!((a - 0.1).abs() < 1e-4);
        assert!((canted_angle(l, r, Eye::Right) + a).abs() < 1e-6);
    }

    #[test]
    fn test_unfoveated_config_covers_everything() {
        assert_eq!(FoveatedRegion::from_config(&cfg(8, 8)), FoveatedRegion::Everywhere);
    }

    #[test]
    fn test_side_by_side_uses_per_half_centres() {
        let mut c = cfg(200, 100);
        write_foveation(&mut c, [(0.5, 0.5), (0.5, 0.5)], None, 0.2, (200, 100));
        assert_eq!(c.image_centre, [50, 50, 150, 50]);
        assert_eq!(c.radius, [10, 100, 200, 100]);
        let region = FoveatedRegion::from_config(&c);
        assert!(region.contains(50, 50) && region.contains(150, 55));
        assert!(!region.contains(100, 50));
        assert!(!region.contains(50, 61));
    }

    #[test]
    fn test_single_eye_buffer_uses_its_own_centre() {
        let mut c = cfg(100, 100);
        write_foveation(&mut c, [(0.4, 0.5), (0.6, 0.5)], Some(Eye::Right), 0.5, (100, 100));
        assert_eq!(c.image_centre, [60, 50, 60, 50]);
    }

    #[test]
    fn test_flat_row_has_no_delta() {
        assert_eq!(radial_delta(&[0.4; 5], &cfg(8, 8)), 0.0);
    }

    #[test]
    fn test_outside_circle_is_passthrough() {
        let src = Image::from_fn(32, 16, |x, _| Rgba::gray(if x % 4 < 2 { 0.3 } else { 0.5 }));
        let mut c = cfg(32, 16);
        write_foveation(&mut c, [(0.25, 0.5), (0.25, 0.5)], Some(Eye::Left), 0.25, (32, 16));
        let s = RadialSharpen::<Sdr>::new(c);
        let mut dst: Image<Rgba> = Image::new(32, 16);
        s.sharpen(&src, &mut dst, &DispatchOptions::new(8, 8, 16)).unwrap();
        for (x, y, v) in dst.pixels() {
            if !s.region().contains(x, y) {
                assert_eq!(v, src.get(x, y), "({x},{y})");
            }
        }
    }
}

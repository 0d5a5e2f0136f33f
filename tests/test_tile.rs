// tests/test_tile.rs — Tile loading at the image boundary.
//
// A group at the top-left corner has a tile that starts left of and above
// the texture. Every halo cell must come from a clamped, in-bounds fetch:
// with a sentinel value painted on the border, the halo must read exactly
// that sentinel, and interior cells must never see it.

use edgescale::dispatch::{dispatch, load_tile, DispatchOptions, GroupId, GroupKernel};
use edgescale::image::{fetch_clamped, Image, Rgba};
use edgescale::tile::{scaler_source_span, SharedTile, TileLayout};

const SENTINEL: f32 = 9.0;
const INTERIOR: f32 = 0.25;

fn bordered(w: usize, h: usize) -> Image<f32> {
    Image::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
            SENTINEL
        } else {
            INTERIOR
        }
    })
}

/// Loads plain values with the scaler's tile placement.
struct Probe<'a> {
    src: &'a Image<f32>,
    scale: f32,
}

impl GroupKernel for Probe<'_> {
    type Cell = f32;

    fn grid_extent(&self, _opts: &DispatchOptions) -> (usize, usize) {
        let w = (self.src.width() as f32 / self.scale) as usize;
        let h = (self.src.height() as f32 / self.scale) as usize;
        (w, h)
    }

    fn tile_layout(&self, group: GroupId, opts: &DispatchOptions) -> TileLayout {
        let (sx, nx) = scaler_source_span(group.x * opts.block_width, opts.block_width, self.scale);
        let (sy, ny) = scaler_source_span(group.y * opts.block_height, opts.block_height, self.scale);
        TileLayout::new(sx - 2, sy - 2, nx, ny)
    }

    fn load_batch(&self, layout: &TileLayout, cx: usize, cy: usize, _opts: &DispatchOptions) -> [[f32; 2]; 2] {
        std::array::from_fn(|dy| {
            std::array::from_fn(|dx| {
                let (x, y) = layout.texel(cx + dx, cy + dy);
                fetch_clamped(self.src, x, y).r
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
        Some((
            group.x * opts.block_width + lx,
            group.y * opts.block_height + ly,
            Rgba::gray(tile.get(lx / 2, ly / 2)),
        ))
    }
}

// ===== Halo at the top-left corner =====

#[test]
fn top_left_halo_reads_clamped_border() {
    let src = bordered(40, 40);
    let probe = Probe { src: &src, scale: 0.5 };
    let opts = DispatchOptions::new(32, 24, 256);
    let tile = load_tile(&probe, GroupId { x: 0, y: 0 }, &opts);

    let layout = *tile.layout();
    assert!(layout.origin_x < 0 && layout.origin_y < 0);

    for cy in 0..tile.height() {
        for cx in 0..tile.width() {
            let (tx, ty) = layout.texel(cx, cy);
            let v = tile.get(cx, cy);
            if tx <= 0 || ty <= 0 {
                assert_eq!(v, SENTINEL, "halo cell ({cx},{cy}) -> texel ({tx},{ty})");
            } else {
                assert_eq!(v, INTERIOR, "interior cell ({cx},{cy}) -> texel ({tx},{ty})");
            }
        }
    }
}

#[test]
fn bottom_right_halo_reads_clamped_border() {
    let src = bordered(20, 20);
    let probe = Probe { src: &src, scale: 0.5 };
    let opts = DispatchOptions::new(8, 8, 16);
    // Output is 40×40, so group (4, 4) covers the last block.
    let tile = load_tile(&probe, GroupId { x: 4, y: 4 }, &opts);
    let layout = *tile.layout();
    for cy in 0..tile.height() {
        for cx in 0..tile.width() {
            let (tx, ty) = layout.texel(cx, cy);
            if tx >= 19 || ty >= 19 {
                assert_eq!(tile.get(cx, cy), SENTINEL, "({tx},{ty})");
            }
        }
    }
}

#[test]
fn every_group_loads_without_panicking() {
    // Odd sizes and a thread count that does not divide the batch count.
    let src = bordered(23, 17);
    let probe = Probe { src: &src, scale: 0.75 };
    let mut dst: Image<f32> = Image::new(30, 22);
    dispatch(&probe, &mut dst, &DispatchOptions::new(10, 6, 7)).unwrap();
    // Writing gray into a single-channel image goes through luma weights,
    // which need not sum to exactly 1 in f32.
    let near = |a: f32, b: f32| (a - b).abs() < 1e-5;
    assert!(dst.pixels().all(|(_, _, v)| near(v, SENTINEL) || near(v, INTERIOR)));
}

// dispatch.rs — Software compute dispatch: thread-groups, striping, barrier.
//
// A GPU dispatch launches a 2D grid of thread-groups. Each group covers one
// block_width × block_height tile of the output and runs `threads` threads
// that cooperate through shared memory in exactly two phases:
//
//   load     thread t handles 2×2 batches t, t + threads, t + 2·threads, …
//            (on the GPU: counter i = 2t, stride 2·threads)
//   barrier  TileBuilder::barrier()
//   compute  thread t handles output pixels k = t, t + threads, …
//            row-major inside the block
//
// Groups never talk to each other, so they run as independent rayon tasks.
// Threads inside a group are *virtual*: they are executed one after another
// on the same worker, but each walks exactly the index sequence a GPU thread
// would, so any kernel that relied on a particular thread↔index mapping
// behaves identically.
//
// Output writes
// -------------
// Each row of groups gets an exclusive horizontal band of the destination
// (`split_at_mut`), so bands can be filled in parallel without locks. Within
// a band every pixel may be written at most once; a second write panics.
// Writes outside the destination texture are dropped, like out-of-range UAV
// stores on a GPU.
//
// NEW RUST CONCEPTS:
// - Associated types on a trait (`GroupKernel::Cell`) so each kernel picks
//   its own tile cell type (plain luma, or luma + edge weights).
// - `rayon::prelude::*` and `into_par_iter()` over a Vec of disjoint
//   `&mut [T]` bands.
// - `split_at_mut` to hand out non-overlapping mutable borrows.

use rayon::prelude::*;
use tracing::trace;

use crate::config::DispatchTuning;
use crate::error::{Error, Result};
use crate::image::{Image, Pixel, Rgba};
use crate::tile::{SharedTile, TileBuilder, TileLayout};

/// Index of a thread-group in the dispatch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId {
    pub x: usize,
    pub y: usize,
}

/// Thread-group shape and feature switches of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub block_width: usize,
    pub block_height: usize,
    pub threads: usize,
    /// Honour the config's viewport origins/extents instead of assuming the
    /// whole texture.
    pub viewport_support: bool,
}

impl DispatchOptions {
    pub fn new(block_width: usize, block_height: usize, threads: usize) -> Self {
        DispatchOptions { block_width, block_height, threads, viewport_support: false }
    }

    pub fn from_tuning(tuning: &DispatchTuning) -> Self {
        Self::new(tuning.block_width(), tuning.block_height(), tuning.thread_group_size())
    }

    pub fn with_viewport_support(mut self, on: bool) -> Self {
        self.viewport_support = on;
        self
    }

    /// Blocks must be non-empty and even, and have at least one thread.
    pub fn validate(&self) -> Result<()> {
        let ok = self.block_width > 0
            && self.block_height > 0
            && self.block_width % 2 == 0
            && self.block_height % 2 == 0
            && self.threads > 0;
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidBlockSize {
                width: self.block_width,
                height: self.block_height,
                threads: self.threads,
            })
        }
    }

    /// Number of groups along each axis needed to cover `extent`.
    pub fn grid(&self, extent: (usize, usize)) -> (usize, usize) {
        (extent.0.div_ceil(self.block_width), extent.1.div_ceil(self.block_height))
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self::from_tuning(&DispatchTuning::new(true, Default::default()))
    }
}

/// A compute kernel expressed as load-phase + compute-phase per group.
pub trait GroupKernel: Sync {
    /// What one tile cell holds.
    type Cell: Copy + Send + Sync;

    /// Output extent the grid must cover (the output viewport).
    fn grid_extent(&self, opts: &DispatchOptions) -> (usize, usize);

    /// Where in the source texture this group's tile sits.
    fn tile_layout(&self, group: GroupId, opts: &DispatchOptions) -> TileLayout;

    /// Produce the 2×2 cells whose top-left is (cx, cy).
    fn load_batch(&self, layout: &TileLayout, cx: usize, cy: usize, opts: &DispatchOptions) -> [[Self::Cell; 2]; 2];

    /// Compute one output pixel at block-local (lx, ly).
    ///
    /// Returns the absolute destination coordinate and value, or `None` when
    /// the pixel is clipped by the viewport.
    fn compute(
        &self,
        tile: &SharedTile<Self::Cell>,
        group: GroupId,
        lx: usize,
        ly: usize,
        opts: &DispatchOptions,
    ) -> Option<(usize, usize, Rgba)>;

    /// First destination row written by group row 0.
    fn output_origin_y(&self, _opts: &DispatchOptions) -> usize {
        0
    }
}

/// Run the load phase of one group and pass the barrier.
pub fn load_tile<K: GroupKernel>(kernel: &K, group: GroupId, opts: &DispatchOptions) -> SharedTile<K::Cell> {
    let layout = kernel.tile_layout(group, opts);
    let mut builder = TileBuilder::new(layout);
    let batches = layout.batch_count();
    for tid in 0..opts.threads {
        for b in (tid..batches).step_by(opts.threads) {
            let (cx, cy) = layout.batch_origin(b);
            let cells = kernel.load_batch(&layout, cx, cy, opts);
            builder.write_batch(cx, cy, cells);
        }
    }
    builder.barrier()
}

/// Run one group's compute phase, handing every produced pixel to `emit`.
fn compute_group<K: GroupKernel>(
    kernel: &K,
    tile: &SharedTile<K::Cell>,
    group: GroupId,
    opts: &DispatchOptions,
    mut emit: impl FnMut(usize, usize, Rgba),
) {
    let pixels = opts.block_width * opts.block_height;
    for tid in 0..opts.threads {
        for k in (tid..pixels).step_by(opts.threads) {
            let (lx, ly) = (k % opts.block_width, k / opts.block_width);
            if let Some((x, y, value)) = kernel.compute(tile, group, lx, ly, opts) {
                emit(x, y, value);
            }
        }
    }
}

/// Execute `kernel` over its whole grid, writing into `dst`.
///
/// Pixels of `dst` the kernel does not cover are left untouched.
pub fn dispatch<K: GroupKernel, T: Pixel>(kernel: &K, dst: &mut Image<T>, opts: &DispatchOptions) -> Result<()> {
    opts.validate()?;
    let (groups_x, groups_y) = opts.grid(kernel.grid_extent(opts));
    trace!(groups_x, groups_y, threads = opts.threads, "dispatch");
    if groups_x == 0 || groups_y == 0 {
        return Ok(());
    }

    let width = dst.width();
    let height = dst.height();
    let stride = dst.stride();
    let origin_y = kernel.output_origin_y(opts);

    // Carve the destination into one band per group row. Rows above the
    // first band and below the last one belong to no group.
    let mut bands: Vec<(usize, usize, &mut [T])> = Vec::with_capacity(groups_y);
    let skip = origin_y.min(height);
    let mut rest = &mut dst.as_mut_slice()[skip * stride..];
    let mut row = skip;
    for gy in 0..groups_y {
        let rows = opts.block_height.min(height - row);
        let (band, tail) = std::mem::take(&mut rest).split_at_mut(rows * stride);
        bands.push((gy, row, band));
        rest = tail;
        row += rows;
    }

    bands.into_par_iter().for_each(|(gy, first_row, band)| {
        if band.is_empty() {
            return;
        }
        let band_rows = band.len() / stride;
        let mut written = vec![false; band.len()];
        for gx in 0..groups_x {
            let group = GroupId { x: gx, y: gy };
            let tile = load_tile(kernel, group, opts);
            compute_group(kernel, &tile, group, opts, |x, y, value| {
                if x >= width || y < first_row || y >= first_row + band_rows {
                    return;
                }
                let idx = (y - first_row) * stride + x;
                assert!(!written[idx], "output pixel ({x},{y}) written twice");
                written[idx] = true;
                band[idx] = T::from_rgba(value);
            });
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Copies source texels through a 2-cell halo tile, shifted by one.
    struct ShiftKernel<'a> {
        src: &'a Image<f32>,
    }

    impl GroupKernel for ShiftKernel<'_> {
        type Cell = f32;

        fn grid_extent(&self, _opts: &DispatchOptions) -> (usize, usize) {
            (self.src.width(), self.src.height())
        }

        fn tile_layout(&self, g: GroupId, o: &DispatchOptions) -> TileLayout {
            TileLayout::new(
                (g.x * o.block_width) as i64 - 2,
                (g.y * o.block_height) as i64 - 2,
                o.block_width + 4,
                o.block_height + 4,
            )
        }

        fn load_batch(&self, l: &TileLayout, cx: usize, cy: usize, _o: &DispatchOptions) -> [[f32; 2]; 2] {
            std::array::from_fn(|dy| {
                std::array::from_fn(|dx| {
                    let (x, y) = l.texel(cx + dx, cy + dy);
                    crate::image::fetch_clamped(self.src, x, y).r
                })
            })
        }

        fn compute(&self, t: &SharedTile<f32>, g: GroupId, lx: usize, ly: usize, o: &DispatchOptions)
            -> Option<(usize, usize, Rgba)> {
            // Output (x, y) = input (x - 1, y) with clamping.
            let v = t.get(lx + 1, ly + 2);
            Some((g.x * o.block_width + lx, g.y * o.block_height + ly, Rgba::gray(v)))
        }
    }

    #[test]
    fn test_dispatch_covers_every_pixel_once() {
        let src = Image::from_fn(37, 29, |x, y| (x + 100 * y) as f32);
        let mut dst: Image<f32> = Image::new(37, 29);
        let opts = DispatchOptions::new(8, 6, 5);
        dispatch(&ShiftKernel { src: &src }, &mut dst, &opts).unwrap();
        for (x, y, v) in dst.pixels() {
            let expect = (x.saturating_sub(1) + 100 * y) as f32;
            assert!((v - expect).abs() < 1e-3, "({x},{y}): {v} vs {expect}");
        }
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let src = Image::from_fn(20, 20, |x, y| ((x * 7 + y * 3) % 11) as f32);
        let mut a: Image<f32> = Image::new(20, 20);
        let mut b: Image<f32> = Image::new(20, 20);
        dispatch(&ShiftKernel { src: &src }, &mut a, &DispatchOptions::new(8, 8, 1)).unwrap();
        dispatch(&ShiftKernel { src: &src }, &mut b, &DispatchOptions::new(8, 8, 256)).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_invalid_block_rejected() {
        let src: Image<f32> = Image::new(4, 4);
        let mut dst: Image<f32> = Image::new(4, 4);
        let err = dispatch(&ShiftKernel { src: &src }, &mut dst, &DispatchOptions::new(7, 8, 64));
        assert!(matches!(err, Err(Error::InvalidBlockSize { .. })));
    }

    #[test]
    fn test_grid_rounds_up() {
        let o = DispatchOptions::new(32, 24, 256);
        assert_eq!(o.grid((100, 48)), (4, 2));
        assert_eq!(o.grid((0, 10)), (0, 1));
    }
}

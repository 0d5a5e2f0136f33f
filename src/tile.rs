// tile.rs — Per-group shared tile with an explicit load/compute barrier.
//
// On the GPU a thread-group fills `groupshared` memory cooperatively, calls
// GroupMemoryBarrierWithGroupSync(), and only then reads it. Forgetting the
// barrier compiles fine and produces torn reads.
//
// Here the two phases are two different types:
//
//   TileBuilder<C>  — write-only, owned mutably by the load phase.
//                     Every cell must be written exactly once.
//        │
//        │ barrier(self)   consumes the builder; panics if any cell is
//        ▼                 missing, so a partially-filled tile cannot exist
//   SharedTile<C>   — read-only, borrowed by every compute thread.
//
// Since `barrier` takes the builder by value, no code can hold a reference to
// a half-loaded tile while computing: the borrow checker enforces the sync
// point.
//
// Loads happen in 2×2 batches (one batch = four cells sharing a 4×4 source
// neighborhood), so tile extents are always even.
//
// NEW RUST CONCEPTS:
// - Typestate: a consuming method turns one type into another, making an
//   ordering constraint a compile-time property.
// - `Option<C>` cells as a write-once slot.

use std::fmt;

/// Placement of a tile in source texel space.
///
/// Cell (cx, cy) holds data for source texel (origin_x + cx, origin_y + cy).
/// Texel coordinates may lie outside the texture; loaders clamp them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub origin_x: i64,
    pub origin_y: i64,
    pub width: usize,
    pub height: usize,
}

impl TileLayout {
    /// # Panics
    /// Panics if either extent is odd or zero.
    pub fn new(origin_x: i64, origin_y: i64, width: usize, height: usize) -> Self {
        assert!(
            width > 0 && height > 0 && width % 2 == 0 && height % 2 == 0,
            "tile extent {width}x{height} must be even and non-zero"
        );
        TileLayout { origin_x, origin_y, width, height }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Number of 2×2 load batches.
    #[inline]
    pub fn batch_count(&self) -> usize {
        self.cell_count() / 4
    }

    /// Top-left cell of load batch `b`.
    ///
    /// Batches are numbered row-major over pairs of rows, which is the same
    /// assignment as striding an even counter `i = 2b` over `width × height / 2`
    /// and taking `(i mod width, 2 ⌊i / width⌋)`.
    #[inline]
    pub fn batch_origin(&self, b: usize) -> (usize, usize) {
        let i = 2 * b;
        (i % self.width, (i / self.width) * 2)
    }

    /// Source texel covered by cell (cx, cy).
    #[inline]
    pub fn texel(&self, cx: usize, cy: usize) -> (i64, i64) {
        (self.origin_x + cx as i64, self.origin_y + cy as i64)
    }
}

/// Halo-padded source rectangle for one scaler group along one axis.
///
/// Returns `(src_block_start, cell_count)`: the first source texel the
/// group's outputs map to, and the number of tile cells needed to cover the
/// group's footprint plus a 6-tap filter support, rounded up to even. The
/// tile itself starts two texels before `src_block_start`.
pub fn scaler_source_span(dst_block_start: usize, block: usize, scale: f32) -> (i64, usize) {
    const SUPPORT: i64 = 6;
    let start = ((dst_block_start as f32 + 0.5) * scale - 0.5).floor() as i64;
    let end = ((dst_block_start as f32 + block as f32 + 0.5) * scale - 0.5).ceil() as i64;
    let mut n = (end - start + SUPPORT - 1).max(2) as usize;
    n += n & 1;
    (start, n)
}

// ---------------------------------------------------------------------------
// TileBuilder — load phase
// ---------------------------------------------------------------------------

/// Write-only tile being filled by the load phase.
pub struct TileBuilder<C> {
    layout: TileLayout,
    cells: Vec<Option<C>>,
}

impl<C: Copy> TileBuilder<C> {
    pub fn new(layout: TileLayout) -> Self {
        TileBuilder {
            layout,
            cells: vec![None; layout.cell_count()],
        }
    }

    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Store one cell.
    ///
    /// # Panics
    /// Panics if the cell is out of range or was already written.
    #[inline]
    pub fn write(&mut self, cx: usize, cy: usize, value: C) {
        assert!(
            cx < self.layout.width && cy < self.layout.height,
            "tile cell ({cx},{cy}) outside {}x{}",
            self.layout.width,
            self.layout.height
        );
        let slot = &mut self.cells[cy * self.layout.width + cx];
        assert!(slot.is_none(), "tile cell ({cx},{cy}) written twice");
        *slot = Some(value);
    }

    /// Store a 2×2 batch with its top-left corner at (cx, cy).
    #[inline]
    pub fn write_batch(&mut self, cx: usize, cy: usize, batch: [[C; 2]; 2]) {
        for (dy, row) in batch.iter().enumerate() {
            for (dx, &v) in row.iter().enumerate() {
                self.write(cx + dx, cy + dy, v);
            }
        }
    }

    /// Group-wide barrier: every cell must have been written.
    ///
    /// # Panics
    /// Panics naming the first missing cell.
    pub fn barrier(self) -> SharedTile<C> {
        let width = self.layout.width;
        let cells = self
            .cells
            .into_iter()
            .enumerate()
            .map(|(i, c)| match c {
                Some(v) => v,
                None => panic!("barrier reached with tile cell ({},{}) unwritten", i % width, i / width),
            })
            .collect();
        SharedTile { layout: self.layout, cells }
    }
}

// ---------------------------------------------------------------------------
// SharedTile — compute phase
// ---------------------------------------------------------------------------

/// Fully-populated, read-only tile.
pub struct SharedTile<C> {
    layout: TileLayout,
    cells: Vec<C>,
}

impl<C: Copy> SharedTile<C> {
    #[inline]
    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.layout.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.layout.height
    }

    /// # Panics
    /// Panics if (cx, cy) is outside the tile.
    #[inline]
    pub fn get(&self, cx: usize, cy: usize) -> C {
        assert!(
            cx < self.layout.width && cy < self.layout.height,
            "tile read ({cx},{cy}) outside {}x{}",
            self.layout.width,
            self.layout.height
        );
        self.cells[cy * self.layout.width + cx]
    }

    /// Copy the N×N window whose top-left cell is (cx, cy), indexed [row][col].
    #[inline]
    pub fn window<const N: usize>(&self, cx: usize, cy: usize) -> [[C; N]; N] {
        std::array::from_fn(|i| std::array::from_fn(|j| self.get(cx + j, cy + i)))
    }
}

impl<C> fmt::Debug for SharedTile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTile").field("layout", &self.layout).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_origins_cover_tile_once() {
        let layout = TileLayout::new(0, 0, 6, 4);
        let mut seen = vec![0u8; layout.cell_count()];
        for b in 0..layout.batch_count() {
            let (x, y) = layout.batch_origin(b);
            for dy in 0..2 {
                for dx in 0..2 {
                    seen[(y + dy) * 6 + x + dx] += 1;
                }
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_barrier_after_full_load() {
        let layout = TileLayout::new(-2, -2, 4, 2);
        let mut b = TileBuilder::new(layout);
        for i in 0..layout.batch_count() {
            let (x, y) = layout.batch_origin(i);
            b.write_batch(x, y, [[x as i32, x as i32 + 1], [10, 11]]);
        }
        let tile = b.barrier();
        assert_eq!(tile.get(3, 0), 3);
        assert_eq!(tile.get(2, 1), 10);
        let w: [[i32; 2]; 2] = tile.window(2, 0);
        assert_eq!(w, [[2, 3], [10, 11]]);
    }

    #[test]
    #[should_panic(expected = "unwritten")]
    fn test_barrier_rejects_partial_tile() {
        let mut b = TileBuilder::new(TileLayout::new(0, 0, 2, 2));
        b.write(0, 0, 1.0f32);
        let _ = b.barrier();
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn test_double_write_rejected() {
        let mut b = TileBuilder::new(TileLayout::new(0, 0, 2, 2));
        b.write(1, 1, 1u8);
        b.write(1, 1, 2u8);
    }

    #[test]
    fn test_scaler_span_even_and_covering() {
        for &scale in &[0.5f32, 2.0 / 3.0, 0.75, 1.0] {
            for &block in &[24usize, 32] {
                for d in (0..200).step_by(block) {
                    let (start, n) = scaler_source_span(d, block, scale);
                    assert_eq!(n % 2, 0);
                    // Last output of the block needs texels up to floor(src) + 3.
                    let last = ((d + block - 1) as f32 + 0.5) * scale - 0.5;
                    let need = last.floor() as i64 + 3 - (start - 2);
                    assert!((need as usize) < n, "scale {scale} d {d}: need {need} n {n}");
                }
            }
        }
    }

    #[test]
    fn test_scaler_span_first_group() {
        // 2x upscale, 32-wide block: start floor(-0.25) = -1, end ceil(15.75) = 16.
        let (start, n) = scaler_source_span(0, 32, 0.5);
        assert_eq!(start, -1);
        assert_eq!(n, 22);
    }
}

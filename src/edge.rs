// edge.rs — Four-direction edge map estimator.
//
// Given a luma neighborhood, classify the 3×3 window at (i, j) as
// horizontal, vertical, diagonal, anti-diagonal, a mix of two, or flat.
//
// Gradient magnitudes over the 3×3 window (rows top to bottom):
//
//   g_0    |top row      − bottom row   |     ■ ■ ■      · · ·      · · ·
//   g_90   |left column  − right column |     · · ·      · · ·      · · ·
//                                             ■ ■ ■      ...
//   g_45   |{(1,0),(0,0),(0,1)} − {(2,1),(2,2),(1,2)}|   upper-left vs lower-right
//   g_135  |{(1,0),(2,0),(2,1)} − {(0,1),(0,2),(1,2)}|   lower-left vs upper-right
//
// The two orthogonal pairs (0/90, 45/135) compete. A pair is "active" only
// when its stronger direction beats the weaker one by `detect_ratio`, clears
// the absolute `detect_thres`, and beats the weaker direction of the other
// pair. Then:
//
//   both pairs active  → soft weights e and 1 − e on the two winners
//   one pair active    → hard weight 1 on that pair's winner
//   neither            → all zero (flat / isotropic; the normal filter takes over)
//
// So the weights are each in [0, 1] and sum to at most 1.

use crate::config::NisConfig;

/// Blend weights for the 0°, 90°, 45° and 135° filters, in that order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EdgeWeights {
    pub w0: f32,
    pub w90: f32,
    pub w45: f32,
    pub w135: f32,
}

impl EdgeWeights {
    pub const ZERO: EdgeWeights = EdgeWeights { w0: 0.0, w90: 0.0, w45: 0.0, w135: 0.0 };

    pub const fn new(w0: f32, w90: f32, w45: f32, w135: f32) -> Self {
        EdgeWeights { w0, w90, w45, w135 }
    }

    #[inline]
    pub fn sum(self) -> f32 {
        self.w0 + self.w90 + self.w45 + self.w135
    }

    /// Weighted sum of per-direction values given as [0°, 90°, 45°, 135°].
    #[inline]
    pub fn blend(self, dir: [f32; 4]) -> f32 {
        dir[0] * self.w0 + dir[1] * self.w90 + dir[2] * self.w45 + dir[3] * self.w135
    }

    #[inline]
    pub fn lerp(self, other: EdgeWeights, t: f32) -> Self {
        let l = |a: f32, b: f32| a + (b - a) * t;
        EdgeWeights {
            w0: l(self.w0, other.w0),
            w90: l(self.w90, other.w90),
            w45: l(self.w45, other.w45),
            w135: l(self.w135, other.w135),
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.w0, self.w90, self.w45, self.w135]
    }
}

/// Edge weights of the 3×3 window whose top-left corner is `p[i][j]`.
///
/// `p` is indexed `[row][column]`. Works on any square window of at least
/// `(i + 3) × (j + 3)`: the scaler evaluates a 4×4 at four offsets, the
/// sharpener a 5×5 at (1, 1).
pub fn edge_map<const N: usize>(p: &[[f32; N]; N], i: usize, j: usize, cfg: &NisConfig) -> EdgeWeights {
    let q = |r: usize, c: usize| p[i + r][j + c];

    let g_0 = (q(0, 0) + q(0, 1) + q(0, 2) - q(2, 0) - q(2, 1) - q(2, 2)).abs();
    let g_45 = (q(1, 0) + q(0, 0) + q(0, 1) - q(2, 1) - q(2, 2) - q(1, 2)).abs();
    let g_90 = (q(0, 0) + q(1, 0) + q(2, 0) - q(0, 2) - q(1, 2) - q(2, 2)).abs();
    let g_135 = (q(1, 0) + q(2, 0) + q(2, 1) - q(0, 1) - q(0, 2) - q(1, 2)).abs();

    let g_0_90_max = g_0.max(g_90);
    let g_0_90_min = g_0.min(g_90);
    let g_45_135_max = g_45.max(g_135);
    let g_45_135_min = g_45.min(g_135);

    let total = g_0_90_max + g_45_135_max;
    let (e_0_90, e_45_135) = if total == 0.0 {
        (0.0, 0.0)
    } else {
        let e = (g_0_90_max / total).min(1.0);
        (e, 1.0 - e)
    };

    let active = |max: f32, min: f32, other_min: f32| {
        max > min * cfg.detect_ratio && max > cfg.detect_thres && max > other_min
    };

    // Winner within each pair: (first, second) as 0/1 flags.
    let (edge_0, edge_90) = if active(g_0_90_max, g_0_90_min, g_45_135_min) {
        if g_0_90_max == g_0 { (1.0, 0.0) } else { (0.0, 1.0) }
    } else {
        (0.0, 0.0)
    };
    let (edge_45, edge_135) = if active(g_45_135_max, g_45_135_min, g_0_90_min) {
        if g_45_135_max == g_45 { (1.0, 0.0) } else { (0.0, 1.0) }
    } else {
        (0.0, 0.0)
    };

    let edges = edge_0 + edge_90 + edge_45 + edge_135;
    if edges >= 2.0 {
        let (w0, w90) = if edge_0 == 1.0 { (e_0_90, 0.0) } else { (0.0, e_0_90) };
        let (w45, w135) = if edge_45 == 1.0 { (e_45_135, 0.0) } else { (0.0, e_45_135) };
        EdgeWeights { w0, w90, w45, w135 }
    } else if edges >= 1.0 {
        EdgeWeights { w0: edge_0, w90: edge_90, w45: edge_45, w135: edge_135 }
    } else {
        EdgeWeights::ZERO
    }
}

/// Bilinear blend of the four corner weight vectors `corners[row][col]`
/// at fractional phase (fx, fy).
#[inline]
pub fn interpolate_edge_map(corners: &[[EdgeWeights; 2]; 2], fx: f32, fy: f32) -> EdgeWeights {
    let h0 = corners[0][0].lerp(corners[0][1], fx);
    let h1 = corners[1][0].lerp(corners[1][1], fx);
    h0.lerp(h1, fy)
}

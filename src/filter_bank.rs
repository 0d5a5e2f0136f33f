// filter_bank.rs — Polyphase and directional luma filters.
//
// All functions here are pure and operate on small fixed-size windows held
// in registers (stack arrays). Window `p` is indexed `[row][column]`, and
// for the scaler the 6×6 window is anchored so that `p[2][2]` is the source
// texel at floor(srcX), floor(srcY).
//
//          col 0   1   2   3   4   5
//   row 0    ·   ·   ·   ·   ·   ·
//       1    ·   ·   ·   ·   ·   ·
//       2    ·   ·  [■]  ·   ·   ·      ■ = floor(src), fx/fy measured from it
//       3    ·   ·   ·   ·   ·   ·
//       4    ·   ·   ·   ·   ·   ·
//       5    ·   ·   ·   ·   ·   ·
//
// The normal filter is a separable 6×6 resample. The directional bank
// reconstructs a 6-sample line through the output position along each of
// 0°, 90°, 45° and 135°, then evaluates smoothing + unsharp mask along it.
//
// Diagonal reconstruction
// -----------------------
// A diagonal line through a fractional position does not hit texel centres.
// The 45° filter first interpolates across the diagonal (`pphase_b`) to get
// seven samples that *do* lie on the line, with odd samples taken between
// (row+1, col) and (row, col+1) and even samples on one side or the other of
// the line depending on which half of the cell the position is in. It then
// picks six consecutive samples, shifted by one when fx + fy ≥ 1, and
// evaluates at phase frac(fx + fy). 135° mirrors this with fx − fy.
// Tie-breaks (`>= 0.5`, `>= 1`) matter: the other choice shifts the tap
// window and produces a visible seam along diagonals.

use crate::coefficients::{phase_index, COEF_SCALE, COEF_USM, PHASE_COUNT, TAP_COUNT};
use crate::config::NisConfig;
use crate::luma::SCALE_FLOAT;
use crate::ramp::SharpenRamp;

#[inline(always)]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Ringing suppression from two overlapping triplets.
///
/// Returns `(1 − sat((maxRange / (minRange + eps) − minRatio) · ratioNorm)) · boost`.
#[inline]
fn contrast_limit(y: [f32; 5], eps: f32, cfg: &NisConfig) -> f32 {
    let a_min = y[0].min(y[1]).min(y[2]);
    let a_max = y[0].max(y[1]).max(y[2]);
    let b_min = y[2].min(y[3]).min(y[4]);
    let b_max = y[2].max(y[3]).max(y[4]);

    let a_cont = a_max - a_min;
    let b_cont = b_max - b_min;

    let ratio = a_cont.max(b_cont) / (a_cont.min(b_cont) + eps);
    (1.0 - ((ratio - cfg.min_contrast_ratio) * cfg.ratio_norm).clamp(0.0, 1.0)) * cfg.contrast_boost
}

/// Ringing factor for a 6-tap line at `phase`: taps 0..5 for phases up to
/// the midpoint, 1..6 past it.
#[inline]
pub fn calc_lti(p: &[f32; 6], phase: usize, cfg: &NisConfig) -> f32 {
    let y = if phase <= PHASE_COUNT / 2 {
        [p[0], p[1], p[2], p[3], p[4]]
    } else {
        [p[1], p[2], p[3], p[4], p[5]]
    };
    contrast_limit(y, cfg.eps, cfg)
}

/// Ringing factor for a 5-tap line in plain (not ×255) luma.
#[inline]
pub fn calc_lti_fast(y: &[f32; 5], cfg: &NisConfig) -> f32 {
    contrast_limit(*y, cfg.eps / SCALE_FLOAT, cfg)
}

/// Smoothed value plus shaped unsharp mask of a 6-sample line (×255 domain).
#[inline]
pub fn eval_poly6(pxl: &[f32; 6], phase: usize, cfg: &NisConfig) -> f32 {
    let scale = &COEF_SCALE[phase];
    let usm_row = &COEF_USM[phase];

    let mut y = 0.0;
    let mut usm = 0.0;
    for i in 0..TAP_COUNT {
        y += scale[i] * pxl[i];
        usm += usm_row[i] * pxl[i];
    }

    let ramp = SharpenRamp::new(cfg, y / SCALE_FLOAT, y);
    y + ramp.shape(usm, calc_lti(pxl, phase, cfg))
}

/// Plain 3-tap unsharp mask of a 5-sample line, shaped by `ramp`.
#[inline]
pub fn eval_usm(pxl: &[f32; 5], ramp: &SharpenRamp, cfg: &NisConfig) -> f32 {
    let usm = -0.6001 * pxl[1] + 1.2002 * pxl[2] - 0.6001 * pxl[3];
    ramp.shape(usm, calc_lti_fast(pxl, cfg))
}

/// Separable 6×6 polyphase resample with the smoothing bank.
#[inline]
pub fn filter_normal(p: &[[f32; 6]; 6], phase_x: usize, phase_y: usize) -> f32 {
    let cx = &COEF_SCALE[phase_x];
    let cy = &COEF_SCALE[phase_y];
    let mut h_acc = 0.0;
    for j in 0..6 {
        let mut v_acc = 0.0;
        for i in 0..6 {
            v_acc += p[i][j] * cy[i];
        }
        h_acc += v_acc * cx[j];
    }
    h_acc
}

/// Directional filter outputs in [0°, 90°, 45°, 135°] order.
///
/// `fx`, `fy` are the fractional phases in [0, 1); `phase_x`, `phase_y`
/// their discretized table rows.
pub fn directional_filters(
    p: &[[f32; 6]; 6],
    fx: f32,
    fy: f32,
    phase_x: usize,
    phase_y: usize,
    cfg: &NisConfig,
) -> [f32; 4] {
    // 0°: interpolate each row between columns 2 and 3, filter vertically.
    let interp0: [f32; 6] = std::array::from_fn(|i| lerp(p[i][2], p[i][3], fx));
    let f0 = eval_poly6(&interp0, phase_y, cfg);

    // 90°: interpolate each column between rows 2 and 3, filter horizontally.
    let interp90: [f32; 6] = std::array::from_fn(|i| lerp(p[2][i], p[3][i], fy));
    let f90 = eval_poly6(&interp90, phase_x, cfg);

    // 45°
    let mut pb = 0.5 + 0.5 * (fx - fy);
    let mut t45 = [0.0f32; 7];
    t45[1] = lerp(p[2][1], p[1][2], pb);
    t45[3] = lerp(p[3][2], p[2][3], pb);
    t45[5] = lerp(p[4][3], p[3][4], pb);
    if pb >= 0.5 {
        pb -= 0.5;
        t45[0] = lerp(p[1][1], p[0][2], pb);
        t45[2] = lerp(p[2][2], p[1][3], pb);
        t45[4] = lerp(p[3][3], p[2][4], pb);
        t45[6] = lerp(p[4][4], p[3][5], pb);
    } else {
        pb = 0.5 - pb;
        t45[0] = lerp(p[1][1], p[2][0], pb);
        t45[2] = lerp(p[2][2], p[3][1], pb);
        t45[4] = lerp(p[3][3], p[4][2], pb);
        t45[6] = lerp(p[4][4], p[5][3], pb);
    }
    let (interp45, pp45) = select_six(&t45, fx + fy);
    let f45 = eval_poly6(&interp45, phase_index(pp45), cfg);

    // 135°
    let mut pb = 0.5 * (fx + fy);
    let mut t135 = [0.0f32; 7];
    t135[1] = lerp(p[3][1], p[4][2], pb);
    t135[3] = lerp(p[2][2], p[3][3], pb);
    t135[5] = lerp(p[1][3], p[2][4], pb);
    if pb >= 0.5 {
        pb -= 0.5;
        t135[0] = lerp(p[4][1], p[5][2], pb);
        t135[2] = lerp(p[3][2], p[4][3], pb);
        t135[4] = lerp(p[2][3], p[3][4], pb);
        t135[6] = lerp(p[1][4], p[2][5], pb);
    } else {
        pb = 0.5 - pb;
        t135[0] = lerp(p[4][1], p[3][0], pb);
        t135[2] = lerp(p[3][2], p[2][1], pb);
        t135[4] = lerp(p[2][3], p[1][2], pb);
        t135[6] = lerp(p[1][4], p[0][3], pb);
    }
    let (interp135, pp135) = select_six(&t135, 1.0 + (fx - fy));
    let f135 = eval_poly6(&interp135, phase_index(pp135), cfg);

    [f0, f90, f45, f135]
}

/// Pick six of seven diagonal samples: skip the first when `pp >= 1`.
#[inline]
fn select_six(t: &[f32; 7], pp: f32) -> ([f32; 6], f32) {
    if pp >= 1.0 {
        (std::array::from_fn(|i| t[i + 1]), pp - 1.0)
    } else {
        (std::array::from_fn(|i| t[i]), pp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{scaler_config, ViewportSpec};
    use crate::luma::HdrMode;

    fn cfg() -> NisConfig {
        scaler_config(1.0, &ViewportSpec::scaling((64, 64), (128, 128)), HdrMode::None).unwrap()
    }

    #[test]
    fn test_flat_line_is_unchanged() {
        // USM rows sum to zero only up to table rounding (|sum| <= 6e-4),
        // amplified by the full-strength ramp.
        let c = cfg();
        let line = [100.0f32; 6];
        for phase in [0, 17, 32, 33, 63] {
            let v = eval_poly6(&line, phase, &c);
            assert!((v - 100.0).abs() < 0.2, "phase {phase}: {v}");
        }
    }

    #[test]
    fn test_normal_filter_phase_zero_picks_anchor() {
        let mut p = [[0.0f32; 6]; 6];
        p[2][2] = 200.0;
        assert!((filter_normal(&p, 0, 0) - 200.0).abs() < 1e-4);
    }

    #[test]
    fn test_normal_filter_constant() {
        let p = [[50.0f32; 6]; 6];
        for (px, py) in [(0, 0), (10, 50), (32, 32), (63, 1)] {
            assert!((filter_normal(&p, px, py) - 50.0).abs() < 0.05);
        }
    }

    #[test]
    fn test_directional_constant_window() {
        let c = cfg();
        let p = [[128.0f32; 6]; 6];
        for (fx, fy) in [(0.0, 0.0), (0.25, 0.75), (0.5, 0.5), (0.9, 0.1), (0.99, 0.99)] {
            let f = directional_filters(&p, fx, fy, phase_index(fx), phase_index(fy), &c);
            for v in f {
                assert!((v - 128.0).abs() < 0.25, "({fx},{fy}): {f:?}");
            }
        }
    }

    #[test]
    fn test_lti_flat_triplets_stay_bounded() {
        let c = cfg();
        // Equal ranges -> ratio ~1 -> below min contrast ratio -> full strength.
        let v = calc_lti(&[0.0, 10.0, 0.0, 10.0, 0.0, 10.0], 0, &c);
        assert!((v - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lti_suppresses_one_sided_contrast() {
        let c = cfg();
        // One triplet flat, the other with a large step: ratio >> max.
        let v = calc_lti(&[10.0, 10.0, 10.0, 200.0, 200.0, 200.0], 0, &c);
        assert!(v.abs() < 1e-6);
    }

    #[test]
    fn test_lti_phase_selects_window() {
        let c = cfg();
        let p = [255.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        // Low phase sees the 255 in triplet a; high phase does not.
        assert!(calc_lti(&p, 10, &c) < 1e-6);
        assert!((calc_lti(&p, 40, &c) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_usm_zero_on_flat() {
        let c = cfg();
        let ramp = SharpenRamp::new(&c, 0.5, 0.5);
        assert!(eval_usm(&[0.5; 5], &ramp, &c).abs() < 1e-6);
    }

    #[test]
    fn test_select_six_tie_break() {
        let t = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let (s, pp) = select_six(&t, 1.0);
        assert_eq!(s[0], 1.0);
        assert_eq!(pp, 0.0);
        let (s, pp) = select_six(&t, 0.999);
        assert_eq!(s[0], 0.0);
        assert!((pp - 0.999).abs() < 1e-6);
    }
}

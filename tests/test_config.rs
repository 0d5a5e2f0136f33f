// tests/test_config.rs — Configuration derivation through the public API.

use edgescale::{scaler_config, sharpen_config, Error, HdrMode, NisConfig, Viewport, ViewportSpec};

fn ratio(input: u32, output: u32) -> Result<NisConfig, Error> {
    scaler_config(0.5, &ViewportSpec::scaling((input, input), (output, output)), HdrMode::None)
}

// ===== Scale ratio validation =====

#[test]
fn ratio_below_half_fails() {
    assert!(matches!(ratio(30, 100), Err(Error::ScaleOutOfRange { .. })));
}

#[test]
fn ratio_above_one_fails() {
    assert!(matches!(ratio(120, 100), Err(Error::ScaleOutOfRange { .. })));
}

#[test]
fn ratio_three_quarters_succeeds() {
    let cfg = ratio(75, 100).unwrap();
    assert!((cfg.scale_x - 0.75).abs() < 1e-6);
    assert!((cfg.scale_y - 0.75).abs() < 1e-6);
}

#[test]
fn ratio_limits_are_inclusive() {
    assert!(ratio(50, 100).is_ok());
    assert!(ratio(100, 100).is_ok());
}

#[test]
fn one_bad_axis_is_enough() {
    let spec = ViewportSpec::scaling((100, 20), (100, 100));
    assert!(matches!(
        scaler_config(0.5, &spec, HdrMode::None),
        Err(Error::ScaleOutOfRange { .. })
    ));
}

// ===== Slider mapping =====

#[test]
fn strength_scale_monotone_in_sdr() {
    let spec = ViewportSpec::full(64, 64);
    let mut prev = f32::NEG_INFINITY;
    for i in 0..=100 {
        let s = i as f32 / 100.0;
        let cfg = sharpen_config(s, &spec, HdrMode::None).unwrap();
        assert!(
            cfg.sharp_strength_scale >= prev,
            "sharpness {s}: {} < {prev}",
            cfg.sharp_strength_scale
        );
        prev = cfg.sharp_strength_scale;
    }
}

#[test]
fn limits_never_negative() {
    let spec = ViewportSpec::full(64, 64);
    for mode in [HdrMode::None, HdrMode::Linear, HdrMode::Pq] {
        for i in 0..=10 {
            let cfg = sharpen_config(i as f32 / 10.0, &spec, mode).unwrap();
            assert!(cfg.sharp_limit_min > 0.0, "{mode} {i}");
            assert!(cfg.sharp_strength_min >= 0.0, "{mode} {i}");
        }
    }
}

// ===== Viewports =====

#[test]
fn sharpen_config_reuses_input_geometry() {
    let spec = ViewportSpec {
        input: Viewport::new(16, 8, 200, 100),
        input_texture: (400, 200),
        output: Viewport::new(4, 2, 999, 999),
        output_texture: (1000, 1000),
    };
    let cfg = sharpen_config(0.5, &spec, HdrMode::None).unwrap();
    assert_eq!((cfg.output_viewport_width, cfg.output_viewport_height), (200, 100));
    assert_eq!((cfg.output_viewport_origin_x, cfg.output_viewport_origin_y), (4, 2));
    assert_eq!((cfg.scale_x, cfg.scale_y), (1.0, 1.0));
    assert_eq!(cfg.dst_norm_x, 1.0 / 400.0);
}

#[test]
fn zero_output_viewport_fails() {
    let spec = ViewportSpec::scaling((64, 64), (64, 0));
    assert!(matches!(
        scaler_config(0.5, &spec, HdrMode::None),
        Err(Error::ZeroViewport { which: "output" })
    ));
}

#[test]
fn config_uploads_as_bytes() {
    let cfg = ratio(75, 100).unwrap();
    let bytes = bytemuck::bytes_of(&cfg);
    assert_eq!(bytes.len(), std::mem::size_of::<NisConfig>());
    let back: NisConfig = *bytemuck::from_bytes(bytes);
    assert_eq!(back, cfg);
}

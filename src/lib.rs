// edgescale: edge-adaptive upscaling and contrast-adaptive sharpening
// CPU reference implementation of the VR post-processing compute kernels
//
// Two pipelines share the luma and configuration code:
//   nis   directional polyphase scaler / directional unsharp mask
//   cas   bilinear resample + radial min/max sharpener inside a foveated circle
//
// Every kernel runs through `dispatch`, which reproduces the thread-group
// execution model (cooperative tile load, barrier, per-pixel compute) on
// rayon.

pub mod error;

pub mod image;
pub mod convert;

pub mod luma;
pub mod coefficients;
pub mod config;

pub mod edge;
pub mod ramp;
pub mod filter_bank;

pub mod tile;
pub mod dispatch;

pub mod scaler;
pub mod sharpen;
pub mod cas;

pub mod pipeline;
pub mod settings;
pub mod postprocess;

pub use crate::config::{scaler_config, sharpen_config, DispatchTuning, GpuArchitecture, NisConfig, Viewport, ViewportSpec};
pub use crate::dispatch::DispatchOptions;
pub use crate::error::{Error, Result};
pub use crate::image::{Image, Pixel, Rgba, Rgba8};
pub use crate::luma::HdrMode;
pub use crate::pipeline::{PipelineKind, Sharpener, Upscaler};
pub use crate::cas::Eye;
pub use crate::postprocess::PostProcessor;
pub use crate::settings::Settings;

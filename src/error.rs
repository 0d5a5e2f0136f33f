// error.rs — Crate error type.
//
// The kernels themselves never fail: every division in the per-pixel math is
// epsilon-guarded and every clamp saturates. Errors only arise when deriving
// a configuration from geometry, when a dispatch is asked to run with an
// unusable group shape, or when settings are read from disk.

use thiserror::Error;

/// Everything that can go wrong outside the per-pixel math.
#[derive(Debug, Error)]
pub enum Error {
    /// A viewport (or the texture it falls back to) has zero width or height.
    #[error("{which} viewport resolves to a zero dimension")]
    ZeroViewport { which: &'static str },

    /// Input/output ratio outside the [0.5, 1.0] range the scaler supports.
    #[error("scale ratio {scale_x:.4}x{scale_y:.4} outside supported range [0.5, 1.0]")]
    ScaleOutOfRange { scale_x: f32, scale_y: f32 },

    /// Thread-group shape the tile loader cannot work with.
    #[error("invalid thread-group shape: block {width}x{height}, {threads} threads")]
    InvalidBlockSize {
        width: usize,
        height: usize,
        threads: usize,
    },

    /// Render scale times input size gives a texture that cannot be allocated.
    #[error("output texture {width}x{height} outside 1..={max} per side")]
    OutputSize { width: f64, height: f64, max: u32 },

    /// A settings value that parsed but makes no sense.
    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// settings.rs — User settings, read from the "fsr" section of a JSON file.
//
//   {
//     "fsr": {
//       "enabled": true,
//       "useNIS": false,
//       "renderScale": 0.77,
//       "sharpness": 0.9,
//       "radius": 0.5,
//       "applyMIPBias": true,
//       "debugMode": false,
//       "hdrMode": "none"
//     }
//   }
//
// Every key is optional. A missing "sharpness" reads as 1.0 while
// `Settings::default()` uses 0.75; both are kept for compatibility with
// existing config files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::luma::HdrMode;
use crate::pipeline::PipelineKind;

fn default_file_sharpness() -> f32 {
    1.0
}

/// Post-processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub enabled: bool,
    #[serde(rename = "useNIS")]
    pub use_nis: bool,
    /// Either the fraction the game renders at (< 1) or the factor to
    /// upscale by (≥ 1).
    pub render_scale: f32,
    #[serde(default = "default_file_sharpness")]
    pub sharpness: f32,
    /// Foveated sharpening radius as a fraction of the output height.
    pub radius: f32,
    #[serde(rename = "applyMIPBias")]
    pub apply_mip_bias: bool,
    pub debug_mode: bool,
    pub hdr_mode: HdrMode,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: false,
            use_nis: false,
            render_scale: 1.0,
            sharpness: 0.75,
            radius: 0.5,
            apply_mip_bias: true,
            debug_mode: false,
            hdr_mode: HdrMode::None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    fsr: Settings,
}

impl Settings {
    /// Parse settings from the text of a config file.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: SettingsFile = serde_json::from_str(text)?;
        let mut settings = file.fsr;
        settings.sharpness = settings.sharpness.max(0.0);
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let settings = Self::from_json(&text)?;
        debug!(path = %path.display(), ?settings, "loaded settings");
        Ok(settings)
    }

    /// Like [`Settings::load`], but any failure yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read settings, using defaults");
                Self::default()
            }
        }
    }

    /// Reject values no pipeline can work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(Error::Settings(format!("renderScale must be positive, got {}", self.render_scale)));
        }
        if !self.sharpness.is_finite() {
            return Err(Error::Settings("sharpness is not a number".into()));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(Error::Settings(format!("radius must be non-negative, got {}", self.radius)));
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineKind {
        if self.use_nis {
            PipelineKind::Nis
        } else {
            PipelineKind::Cas
        }
    }

    /// Sharpness as the kernels consume it.
    pub fn clamped_sharpness(&self) -> f32 {
        self.sharpness.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_section() {
        let s = Settings::from_json(
            r#"{ "fsr": { "enabled": true, "useNIS": true, "renderScale": 0.5,
                 "sharpness": 0.3, "radius": 0.8, "applyMIPBias": false,
                 "debugMode": true, "hdrMode": "pq" } }"#,
        )
        .unwrap();
        assert!(s.enabled && s.use_nis && s.debug_mode && !s.apply_mip_bias);
        assert_eq!(s.render_scale, 0.5);
        assert_eq!(s.sharpness, 0.3);
        assert_eq!(s.radius, 0.8);
        assert_eq!(s.hdr_mode, HdrMode::Pq);
        assert_eq!(s.pipeline(), PipelineKind::Nis);
    }

    #[test]
    fn test_missing_keys_take_file_defaults() {
        let s = Settings::from_json(r#"{ "fsr": { "enabled": true } }"#).unwrap();
        assert_eq!(s.sharpness, 1.0);
        assert_eq!(s.render_scale, 1.0);
        assert_eq!(s.radius, 0.5);
        assert!(s.apply_mip_bias);
        assert_eq!(s.pipeline(), PipelineKind::Cas);
    }

    #[test]
    fn test_missing_section_is_default_disabled() {
        let s = Settings::from_json("{}").unwrap();
        assert!(!s.enabled);
    }

    #[test]
    fn test_negative_sharpness_clamped() {
        let s = Settings::from_json(r#"{ "fsr": { "sharpness": -2 } }"#).unwrap();
        assert_eq!(s.sharpness, 0.0);
        let s = Settings::from_json(r#"{ "fsr": { "sharpness": 3 } }"#).unwrap();
        assert_eq!(s.clamped_sharpness(), 1.0);
    }

    #[test]
    fn test_bad_render_scale_rejected() {
        let err = Settings::from_json(r#"{ "fsr": { "renderScale": 0 } }"#).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
    }

    #[test]
    fn test_malformed_json_is_error_and_load_or_default_recovers() {
        assert!(matches!(Settings::from_json("{ fsr"), Err(Error::Json(_))));
        let s = Settings::load_or_default("/nonexistent/edgescale.json");
        assert_eq!(s, Settings::default());
    }
}

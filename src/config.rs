//! Render parameters consumed by the tracer.
//!
//! The host renderer owns persistence; this module only gives the parameters a
//! serde shape so they can be loaded from and written to JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Error, Result};

/// Probability of letting sun light through a back-facing sub-surface material.
pub const SUBSURFACE_PROBABILITY: f64 = 0.3;

/// Extinction factor for fog rendering.
pub const EXTINCTION_FACTOR: f64 = 0.04;

/// How local emitters contribute light at a diffuse hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmitterSamplingStrategy {
    /// Emitters only contribute when a path hits them.
    #[default]
    None,
    /// One stochastically chosen emitter per grid cell.
    One,
    /// Every emitter associated with the grid cell.
    All,
}

/// Global render parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    /// Maximum ray depth; children at this depth are never enqueued.
    pub ray_depth: u32,
    pub emitters_enabled: bool,
    pub emitter_sampling: EmitterSamplingStrategy,
    /// Skip a hit emitter's own emittance past the first bounce when emitters are sampled.
    pub prevent_normal_emitter_with_sampling: bool,
    pub emitter_intensity: f64,
    /// Distance over which water absorbs light; 0 makes water opaque to shadow rays.
    pub water_visibility: f64,
    pub direct_light: bool,
    pub transparent_sky: bool,
    /// Distance mapped to black by the depth preview.
    pub preview_range: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            ray_depth: 5,
            emitters_enabled: true,
            emitter_sampling: EmitterSamplingStrategy::None,
            prevent_normal_emitter_with_sampling: true,
            emitter_intensity: 13.0,
            water_visibility: 9.0,
            direct_light: true,
            transparent_sky: false,
            preview_range: 64.0,
        }
    }
}

impl RenderParams {
    /// Parse parameters from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save parameters as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.ray_depth == 0 {
            return Err(Error::Config("ray_depth must be at least 1".into()));
        }
        if !(self.emitter_intensity >= 0.0) {
            return Err(Error::Config(format!("emitter_intensity must be >= 0, got {}", self.emitter_intensity)));
        }
        if !(self.water_visibility >= 0.0) {
            return Err(Error::Config(format!("water_visibility must be >= 0, got {}", self.water_visibility)));
        }
        if !(self.preview_range > 0.0) {
            return Err(Error::Config(format!("preview_range must be > 0, got {}", self.preview_range)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RenderParams::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let p = RenderParams::from_json(r#"{ "ray_depth": 8, "emitter_sampling": "ALL" }"#).unwrap();
        assert_eq!(p.ray_depth, 8);
        assert_eq!(p.emitter_sampling, EmitterSamplingStrategy::All);
        assert_eq!(p.water_visibility, RenderParams::default().water_visibility);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = RenderParams::from_json(r#"{ "ray_depth": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let mut p = RenderParams::default();
        p.direct_light = false;
        p.emitter_sampling = EmitterSamplingStrategy::One;
        p.save(&path).unwrap();
        assert_eq!(RenderParams::load(&path).unwrap(), p);
    }

    #[test]
    fn test_missing_file() {
        let err = RenderParams::load("/nonexistent/params.json").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}

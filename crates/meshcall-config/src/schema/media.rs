use serde::{Deserialize, Serialize};

/// Local capture settings, including the blank video used when no camera exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub synthetic_width: u32,
    pub synthetic_height: u32,
    pub synthetic_fps: u32,
    /// Fill color of synthetic frames as `#rrggbb`.
    pub synthetic_fill: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            synthetic_width: 640,
            synthetic_height: 480,
            synthetic_fps: 10,
            synthetic_fill: "#111111".into(),
        }
    }
}

use crate::alloc::string::{String, ToString};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Names of the state elements a robocentric landmark residual touches.
///
/// The names only matter for addressing blocks in the filter's stacked
/// vectors; the defaults follow the `M<quantity>M` frame convention
/// (`MrML`: landmark position, `MvM`: velocity, `MwM`: angular velocity).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BlockNames {
    /// innovation landmark element
    pub inn_landmarks: String,
    pub pre_landmarks: String,
    pub pre_velocity: String,
    pub cur_landmarks: String,
    pub cur_angular_velocity: String,
    pub noi_landmarks: String,
}

impl Default for BlockNames {
    fn default() -> Self {
        Self {
            inn_landmarks: "MrML".to_string(),
            pre_landmarks: "MrML".to_string(),
            pre_velocity: "MvM".to_string(),
            cur_landmarks: "MrML".to_string(),
            cur_angular_velocity: "MwM".to_string(),
            noi_landmarks: "MrML".to_string(),
        }
    }
}

/// Construction parameters of a `RobocentricLandmarkResidual`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResidualConfig {
    pub name: String,
    pub landmark_count: usize,
    pub names: BlockNames,
}

impl Default for ResidualConfig {
    fn default() -> Self {
        Self {
            name: "robocentric_landmarks".to_string(),
            landmark_count: 1,
            names: BlockNames::default(),
        }
    }
}

impl ResidualConfig {
    pub fn new(landmark_count: usize) -> Self {
        Self {
            landmark_count,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_names(mut self, names: BlockNames) -> Self {
        self.names = names;
        self
    }
}

#![no_std]
#[macro_use]
extern crate log;
extern crate alloc;
extern crate hifitime;
extern crate itertools;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
    pub use na::RealField;
}

/// Export the robocentric landmark residual and its framework pieces
pub mod rc {
    pub use super::errors::ResidualError;
    pub use super::lie::so3::{self, hat, Mat3, Vec3};
    pub use super::residuals::base::{JacobianBlocks, Residual, ResidualProperties};
    pub use super::residuals::config::{BlockNames, ResidualConfig};
    pub use super::residuals::findif::{
        analytic_jacobian, check_jacobians, numeric_jacobian, BlockCheck, FindifConfig,
        JacobianKind, JacobianReport,
    };
    pub use super::residuals::flags::{PropagationFlags, PropagationMode};
    pub use super::residuals::layout::{Element, Layout, LayoutBuilder};
    pub use super::residuals::robocentric::{
        CurrentState, Innovation, PreviousState, ProcessNoise, RobocentricLandmarkResidual,
    };
}

pub mod errors;
pub mod lie;
pub mod residuals;
mod tests;

/// Generators of SO(3) are used as below:
///
/// E1 =    |0  0   0 |
///         |0  0   -1|
///         |0  1   0 |
///
/// E2 =    |0  0   1 |
///         |0  0   0 |
///         |-1 0   0 |
///
/// E3 =    |0  -1  0 |
///         |1  0   0 |
///         |0  0   0 |
///
/// so that `hat(w) * x == w.cross(&x)` for every pair of 3-vectors.
use crate::linalg::{OMatrix, OVector, U3};

pub const SMALL_FLOAT: f64 = 1e-7;

pub type Mat3 = OMatrix<f64, U3, U3>;
pub type Vec3 = OVector<f64, U3>;

/// SO(3) mapping vector to algebra, i.e. the cross-product (skew-symmetric) matrix
pub fn hat(w: &Vec3) -> Mat3 {
    Mat3::new(0.0, -w[2], w[1], w[2], 0.0, -w[0], -w[1], w[0], 0.0)
}

/// SO(3) mapping algebra to vector
pub fn vee(alg: &Mat3) -> Vec3 {
    Vec3::new(alg.m32, alg.m13, alg.m21)
}

/// SO(3) mapping a rotation vector to the group (Rodrigues).
///
/// Only the first-order term `I + hat(θ)` enters the propagation model; the
/// closed form is kept to measure the small-angle error of that linearization.
pub fn exp(θ_vec: &Vec3) -> Mat3 {
    let alg = hat(θ_vec);
    let θ2 = θ_vec.dot(θ_vec);
    let θ = libm::sqrt(θ2);
    let (a, b) = if θ < SMALL_FLOAT {
        let a = 1.0 - θ2 / 6.0 + θ2 * θ2 / 120.0;
        let b = 0.5 - θ2 / 24.0 + θ2 * θ2 / 720.0;
        (a, b)
    } else {
        let a = libm::sin(θ) / θ;
        let b = (1.0 - libm::cos(θ)) / θ2;
        (a, b)
    };
    Mat3::identity() + a * alg + b * alg * alg
}

/// First-order rotation compensation `I - hat(dθ)` applied to a robocentric point
/// when the observer turns by the small angle `dθ`.
pub fn small_rotation_compensation(dθ: &Vec3) -> Mat3 {
    Mat3::identity() - hat(dθ)
}

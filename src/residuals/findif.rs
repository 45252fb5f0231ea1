//! Finite-difference check of analytic residual Jacobians.
//!
//! Central differences on `eval_vec` are compared entry by entry against the
//! `jac_*_vec` implementations. An entry passes when
//! `|analytic - numeric| <= threshold * max(1, |analytic|)`.

use super::base::Residual;
use crate::errors::ResidualError;
use crate::linalg::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FindifConfig {
    /// perturbation applied on each side of the linearization point
    pub delta: f64,
    pub threshold: f64,
}

impl Default for FindifConfig {
    fn default() -> Self {
        Self {
            delta: 1e-6,
            threshold: 1e-6,
        }
    }
}

/// Which input block a Jacobian is taken with respect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacobianKind {
    Previous,
    Current,
    Noise,
}

/// Worst entry of one Jacobian comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockCheck {
    pub kind: JacobianKind,
    /// largest scaled error `|a - n| / max(1, |a|)`
    pub max_error: f64,
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JacobianReport {
    pub previous: BlockCheck,
    pub current: BlockCheck,
    pub noise: BlockCheck,
    pub threshold: f64,
}

impl JacobianReport {
    pub fn passed(&self) -> bool {
        self.blocks().iter().all(|b| b.max_error <= self.threshold)
    }

    pub fn blocks(&self) -> [BlockCheck; 3] {
        [self.previous, self.current, self.noise]
    }
}

/// Analytic Jacobian of `residual` wrt the block `kind`, in a freshly allocated matrix.
pub fn analytic_jacobian<R: Residual + ?Sized>(
    residual: &R,
    kind: JacobianKind,
    pre: &DVector<f64>,
    cur: &DVector<f64>,
    noi: &DVector<f64>,
) -> Result<DMatrix<f64>, ResidualError> {
    let mut j = match kind {
        JacobianKind::Previous => residual.pre_blocks().zeros(),
        JacobianKind::Current => residual.cur_blocks().zeros(),
        JacobianKind::Noise => residual.noi_blocks().zeros(),
    };
    match kind {
        JacobianKind::Previous => residual.jac_pre_vec(&mut j, pre, cur, noi)?,
        JacobianKind::Current => residual.jac_cur_vec(&mut j, pre, cur, noi)?,
        JacobianKind::Noise => residual.jac_noi_vec(&mut j, pre, cur, noi)?,
    }
    Ok(j)
}

/// Central-difference Jacobian of `residual` wrt the block `kind`.
pub fn numeric_jacobian<R: Residual + ?Sized>(
    residual: &R,
    kind: JacobianKind,
    pre: &DVector<f64>,
    cur: &DVector<f64>,
    noi: &DVector<f64>,
    delta: f64,
) -> Result<DMatrix<f64>, ResidualError> {
    residual.check_inputs(pre, cur, noi)?;
    let var = match kind {
        JacobianKind::Previous => pre,
        JacobianKind::Current => cur,
        JacobianKind::Noise => noi,
    };
    let eval_at = |x: &DVector<f64>| match kind {
        JacobianKind::Previous => residual.eval_vec(x, cur, noi),
        JacobianKind::Current => residual.eval_vec(pre, x, noi),
        JacobianKind::Noise => residual.eval_vec(pre, cur, x),
    };

    let mut j = DMatrix::zeros(residual.inn_layout().dim(), var.len());
    let mut x = var.clone();
    for k in 0..var.len() {
        x[k] = var[k] + delta;
        let plus = eval_at(&x)?;
        x[k] = var[k] - delta;
        let minus = eval_at(&x)?;
        x[k] = var[k];
        j.set_column(k, &((plus - minus) / (2.0 * delta)));
    }
    Ok(j)
}

fn compare(kind: JacobianKind, analytic: &DMatrix<f64>, numeric: &DMatrix<f64>) -> BlockCheck {
    let mut worst = BlockCheck {
        kind,
        max_error: 0.0,
        row: 0,
        col: 0,
    };
    for c in 0..analytic.ncols() {
        for r in 0..analytic.nrows() {
            let a = analytic[(r, c)];
            let e = libm::fabs(a - numeric[(r, c)]) / libm::fabs(a).max(1.0);
            if e > worst.max_error {
                worst = BlockCheck {
                    kind,
                    max_error: e,
                    row: r,
                    col: c,
                };
            }
        }
    }
    worst
}

/// Compares the three analytic Jacobians of `residual` against central
/// differences at the given linearization point.
pub fn check_jacobians<R: Residual + ?Sized>(
    residual: &R,
    pre: &DVector<f64>,
    cur: &DVector<f64>,
    noi: &DVector<f64>,
    config: &FindifConfig,
) -> Result<JacobianReport, ResidualError> {
    let check = |kind: JacobianKind| -> Result<BlockCheck, ResidualError> {
        let analytic = analytic_jacobian(residual, kind, pre, cur, noi)?;
        let numeric = numeric_jacobian(residual, kind, pre, cur, noi, config.delta)?;
        Ok(compare(kind, &analytic, &numeric))
    };
    let report = JacobianReport {
        previous: check(JacobianKind::Previous)?,
        current: check(JacobianKind::Current)?,
        noise: check(JacobianKind::Noise)?,
        threshold: config.threshold,
    };

    let name = &residual.properties().name;
    for b in report.blocks() {
        if b.max_error > report.threshold {
            warn!(
                "`{}`: {:?} jacobian off by {:e} at ({}, {})",
                name, b.kind, b.max_error, b.row, b.col
            );
        } else {
            debug!("`{}`: {:?} jacobian ok ({:e})", name, b.kind, b.max_error);
        }
    }
    Ok(report)
}

use super::layout::Layout;
use crate::alloc::string::String;
use crate::errors::{check_dim, ResidualError};
use crate::linalg::{DMatrix, DMatrixViewMut, DVector};

/// Static description of a residual as seen by the filter.
///
/// `is_unary`: the residual only depends on the current state.
///
/// `is_splitable`: the residual may be split into a prediction and an update.
///
/// `is_mergeable`: the residual may be merged with other process residuals of the same step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualProperties {
    pub name: String,
    pub is_unary: bool,
    pub is_splitable: bool,
    pub is_mergeable: bool,
}

/// Named-block addressing of a Jacobian whose rows follow `inn` and whose columns follow `var`.
#[derive(Debug, Clone, Copy)]
pub struct JacobianBlocks<'a> {
    inn: &'a Layout,
    var: &'a Layout,
}

impl<'a> JacobianBlocks<'a> {
    pub fn new(inn: &'a Layout, var: &'a Layout) -> Self {
        Self { inn, var }
    }

    pub fn zeros(&self) -> DMatrix<f64> {
        DMatrix::zeros(self.inn.dim(), self.var.dim())
    }

    /// Checks the shape of a caller-owned Jacobian.
    pub fn check(&self, what: &'static str, j: &DMatrix<f64>) -> Result<(), ResidualError> {
        check_dim(what, self.inn.dim(), j.nrows())?;
        check_dim(what, self.var.dim(), j.ncols())
    }

    /// Mutable view of the block (innovation element, variable element), by resolved index.
    /// `j` must have the full `inn.dim() x var.dim()` shape.
    pub fn block_mut<'m>(
        &self,
        j: &'m mut DMatrix<f64>,
        inn_index: usize,
        var_index: usize,
    ) -> Result<DMatrixViewMut<'m, f64>, ResidualError> {
        self.check("jacobian", j)?;
        let (row, nrows) = self.inn.span(inn_index)?;
        let (col, ncols) = self.var.span(var_index)?;
        Ok(j.view_mut((row, col), (nrows, ncols)))
    }

    /// Same as `block_mut`, resolving both elements by name.
    pub fn block_mut_by_name<'m>(
        &self,
        j: &'m mut DMatrix<f64>,
        inn_name: &str,
        var_name: &str,
    ) -> Result<DMatrixViewMut<'m, f64>, ResidualError> {
        let inn_index = self.inn.index_of(inn_name)?;
        let var_index = self.var.index_of(var_name)?;
        self.block_mut(j, inn_index, var_index)
    }
}

/// A residual `inn = f(pre, cur, noi)` between two filter steps, evaluated on stacked vectors.
///
/// Jacobians are written in place into caller-owned matrices of shape
/// `inn.dim() x var.dim()`; implementations zero the matrix before writing
/// their blocks.
pub trait Residual {
    fn properties(&self) -> &ResidualProperties;

    fn inn_layout(&self) -> &Layout;
    fn pre_layout(&self) -> &Layout;
    fn cur_layout(&self) -> &Layout;
    fn noi_layout(&self) -> &Layout;

    fn eval_vec(
        &self,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<DVector<f64>, ResidualError>;

    fn jac_pre_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError>;

    fn jac_cur_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError>;

    fn jac_noi_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError>;

    /// block addressing for the previous-state Jacobian
    fn pre_blocks(&self) -> JacobianBlocks<'_> {
        JacobianBlocks::new(self.inn_layout(), self.pre_layout())
    }

    fn cur_blocks(&self) -> JacobianBlocks<'_> {
        JacobianBlocks::new(self.inn_layout(), self.cur_layout())
    }

    fn noi_blocks(&self) -> JacobianBlocks<'_> {
        JacobianBlocks::new(self.inn_layout(), self.noi_layout())
    }

    /// validate stacked input vectors against the layouts
    fn check_inputs(
        &self,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError> {
        self.pre_layout().check("previous state", pre)?;
        self.cur_layout().check("current state", cur)?;
        self.noi_layout().check("noise", noi)
    }
}

use super::base::{Residual, ResidualProperties};
use super::config::ResidualConfig;
use super::flags::{PropagationFlags, PropagationMode};
use super::layout::Layout;
use crate::alloc::vec;
use crate::alloc::vec::Vec;
use crate::errors::{check_dim, ResidualError};
use crate::itertools::izip;
use crate::lie::so3::{self, hat, Mat3, Vec3};
use crate::linalg::{DMatrix, DVector};
use crate::time::Duration;

/// Landmarks and observer velocity at the previous step.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousState {
    pub landmarks: Vec<Vec3>,
    pub velocity: Vec3,
}

/// Landmarks and observer angular velocity at the current step.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub landmarks: Vec<Vec3>,
    pub angular_velocity: Vec3,
}

/// Continuous-time process noise, one 3-vector per landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessNoise {
    pub landmarks: Vec<Vec3>,
}

/// Per-landmark innovation returned by `eval`. Tracked landmarks carry
/// `(I - [dt·ω]x)·p - dt·v + sqrt(dt)·n - c`, frozen ones `sqrt(dt)·n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Innovation {
    pub landmarks: Vec<Vec3>,
}

impl PreviousState {
    pub fn new(landmarks: Vec<Vec3>, velocity: Vec3) -> Self {
        Self {
            landmarks,
            velocity,
        }
    }
    pub fn zeros(count: usize) -> Self {
        Self::new(vec![Vec3::zeros(); count], Vec3::zeros())
    }
}

impl CurrentState {
    pub fn new(landmarks: Vec<Vec3>, angular_velocity: Vec3) -> Self {
        Self {
            landmarks,
            angular_velocity,
        }
    }
    pub fn zeros(count: usize) -> Self {
        Self::new(vec![Vec3::zeros(); count], Vec3::zeros())
    }
}

impl ProcessNoise {
    pub fn new(landmarks: Vec<Vec3>) -> Self {
        Self { landmarks }
    }
    pub fn zeros(count: usize) -> Self {
        Self::new(vec![Vec3::zeros(); count])
    }
}

impl Innovation {
    pub fn new(landmarks: Vec<Vec3>) -> Self {
        Self { landmarks }
    }
    pub fn zeros(count: usize) -> Self {
        Self::new(vec![Vec3::zeros(); count])
    }
}

/// Element indices inside the four layouts, resolved once at construction.
#[derive(Debug, Clone, Copy)]
struct BlockIndex {
    fea_inn: usize,
    fea_pre: usize,
    vel_pre: usize,
    fea_cur: usize,
    ror_cur: usize,
    fea_noi: usize,
}

/// Propagation residual of `N` landmarks expressed in the frame of a moving observer.
///
/// For a tracked landmark `i`:
///
/// `inn[i] = (I - [dt·w]x)·pre[i] - dt·v + noi[i]·sqrt(dt) - cur[i]`
///
/// and for a frozen one:
///
/// `inn[i] = noi[i]·sqrt(dt)`
///
/// where `v` is the previous observer velocity and `w` the current angular
/// velocity. `dt` is the filter step, set through `set_dt` before evaluating.
///
/// Mutation (`set_dt`, `set_propagation_flag`) needs `&mut self`; evaluation and
/// the Jacobians are pure functions of their inputs, the flags and `dt`.
#[derive(Debug, Clone)]
pub struct RobocentricLandmarkResidual {
    properties: ResidualProperties,
    inn: Layout,
    pre: Layout,
    cur: Layout,
    noi: Layout,
    idx: BlockIndex,
    flags: PropagationFlags,
    dt: f64,
}

impl RobocentricLandmarkResidual {
    /// function that returns a residual with all landmarks tracked and `dt = 0`
    pub fn build(config: &ResidualConfig) -> Result<Self, ResidualError> {
        let n = config.landmark_count;
        if n == 0 {
            return Err(ResidualError::EmptyLandmarkSet);
        }
        let names = &config.names;
        let inn = Layout::builder()
            .element(names.inn_landmarks.as_str(), 3 * n)
            .build()?;
        let pre = Layout::builder()
            .element(names.pre_landmarks.as_str(), 3 * n)
            .element(names.pre_velocity.as_str(), 3)
            .build()?;
        let cur = Layout::builder()
            .element(names.cur_landmarks.as_str(), 3 * n)
            .element(names.cur_angular_velocity.as_str(), 3)
            .build()?;
        let noi = Layout::builder()
            .element(names.noi_landmarks.as_str(), 3 * n)
            .build()?;
        let idx = BlockIndex {
            fea_inn: inn.index_of(&names.inn_landmarks)?,
            fea_pre: pre.index_of(&names.pre_landmarks)?,
            vel_pre: pre.index_of(&names.pre_velocity)?,
            fea_cur: cur.index_of(&names.cur_landmarks)?,
            ror_cur: cur.index_of(&names.cur_angular_velocity)?,
            fea_noi: noi.index_of(&names.noi_landmarks)?,
        };
        debug!("built residual `{}` with {} landmarks", config.name, n);
        Ok(Self {
            properties: ResidualProperties {
                name: config.name.clone(),
                is_unary: false,
                is_splitable: true,
                is_mergeable: true,
            },
            inn,
            pre,
            cur,
            noi,
            idx,
            flags: PropagationFlags::all_enabled(n),
            dt: 0.0,
        })
    }

    /// residual with default block names
    pub fn with_landmarks(landmark_count: usize) -> Result<Self, ResidualError> {
        Self::build(&ResidualConfig::new(landmark_count))
    }

    pub fn landmark_count(&self) -> usize {
        self.flags.len()
    }

    /// current step in seconds
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Sets the step used by the following evaluations. A zero step is accepted
    /// and collapses the model to its static form.
    ///
    /// `Duration` has nanosecond resolution, so the stored step is the
    /// duration rounded to whole nanoseconds. Use `set_dt_seconds` when the
    /// step must match a caller-side `f64` bit for bit.
    pub fn set_dt(&mut self, dt: Duration) -> Result<(), ResidualError> {
        self.set_dt_seconds(dt.to_seconds())
    }

    /// Sets the step in seconds, stored unchanged.
    pub fn set_dt_seconds(&mut self, seconds: f64) -> Result<(), ResidualError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ResidualError::InvalidTimeStep(seconds));
        }
        self.dt = seconds;
        Ok(())
    }

    pub fn flags(&self) -> &PropagationFlags {
        &self.flags
    }

    pub fn propagation_mode(&self, index: usize) -> Result<PropagationMode, ResidualError> {
        self.flags.mode(index)
    }

    /// Switches landmark `index` between tracked (`true`) and frozen (`false`).
    /// Takes effect on the next evaluation.
    pub fn set_propagation_flag(&mut self, index: usize, enabled: bool) -> Result<(), ResidualError> {
        let previous = self.flags.set(index, enabled)?;
        if previous != enabled {
            debug!(
                "`{}`: landmark {} {:?} -> {:?}",
                self.properties.name,
                index,
                PropagationMode::from(previous),
                PropagationMode::from(enabled)
            );
        }
        Ok(())
    }

    fn check_typed(
        &self,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> Result<(), ResidualError> {
        let n = self.landmark_count();
        check_dim("previous landmarks", n, pre.landmarks.len())?;
        check_dim("current landmarks", n, cur.landmarks.len())?;
        check_dim("noise landmarks", n, noi.landmarks.len())
    }

    /// Landmark positions at the current step that zero the innovation of every
    /// tracked landmark under zero noise. Frozen landmarks keep their previous position.
    pub fn predict(
        &self,
        pre: &PreviousState,
        angular_velocity: &Vec3,
    ) -> Result<Vec<Vec3>, ResidualError> {
        check_dim("previous landmarks", self.landmark_count(), pre.landmarks.len())?;
        let comp = so3::small_rotation_compensation(&(angular_velocity * self.dt));
        let shift = pre.velocity * self.dt;
        Ok(izip!(pre.landmarks.iter(), self.flags.iter())
            .map(|(p, tracked)| if tracked { comp * p - shift } else { *p })
            .collect())
    }

    pub fn eval(
        &self,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> Result<Innovation, ResidualError> {
        self.check_typed(pre, cur, noi)?;
        let sqrt_dt = libm::sqrt(self.dt);
        let comp = so3::small_rotation_compensation(&(cur.angular_velocity * self.dt));
        let shift = pre.velocity * self.dt;
        let landmarks = izip!(
            pre.landmarks.iter(),
            cur.landmarks.iter(),
            noi.landmarks.iter(),
            self.flags.iter()
        )
        .map(|(p, c, n, tracked)| {
            if tracked {
                comp * p - shift + n * sqrt_dt - c
            } else {
                n * sqrt_dt
            }
        })
        .collect();
        trace!("`{}` evaluated at dt = {}", self.properties.name, self.dt);
        Ok(Innovation::new(landmarks))
    }

    /// Jacobian of the innovation wrt the previous state, written into `j`
    /// (`3N x (3N + 3)`, zeroed first).
    pub fn jac_pre(
        &self,
        j: &mut DMatrix<f64>,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> Result<(), ResidualError> {
        self.check_typed(pre, cur, noi)?;
        let blocks = self.pre_blocks();
        blocks.check("previous-state jacobian", j)?;
        j.fill(0.0);
        let comp = so3::small_rotation_compensation(&(cur.angular_velocity * self.dt));
        let d_vel = -self.dt * Mat3::identity();
        for (i, tracked) in self.flags.iter().enumerate() {
            if tracked {
                blocks
                    .block_mut(j, self.idx.fea_inn, self.idx.fea_pre)?
                    .fixed_view_mut::<3, 3>(i * 3, i * 3)
                    .copy_from(&comp);
                blocks
                    .block_mut(j, self.idx.fea_inn, self.idx.vel_pre)?
                    .fixed_view_mut::<3, 3>(i * 3, 0)
                    .copy_from(&d_vel);
            }
        }
        Ok(())
    }

    /// Jacobian of the innovation wrt the current state, written into `j`
    /// (`3N x (3N + 3)`, zeroed first).
    pub fn jac_cur(
        &self,
        j: &mut DMatrix<f64>,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> Result<(), ResidualError> {
        self.check_typed(pre, cur, noi)?;
        let blocks = self.cur_blocks();
        blocks.check("current-state jacobian", j)?;
        j.fill(0.0);
        let d_cur = -Mat3::identity();
        for (i, (p, tracked)) in izip!(pre.landmarks.iter(), self.flags.iter()).enumerate() {
            if tracked {
                blocks
                    .block_mut(j, self.idx.fea_inn, self.idx.fea_cur)?
                    .fixed_view_mut::<3, 3>(i * 3, i * 3)
                    .copy_from(&d_cur);
                // -[dt·w]x·p == [p]x·(dt·w)
                blocks
                    .block_mut(j, self.idx.fea_inn, self.idx.ror_cur)?
                    .fixed_view_mut::<3, 3>(i * 3, 0)
                    .copy_from(&(hat(p) * self.dt));
            }
        }
        Ok(())
    }

    /// Jacobian of the innovation wrt the noise, written into `j` (`3N x 3N`,
    /// zeroed first). Independent of the propagation flags.
    pub fn jac_noi(
        &self,
        j: &mut DMatrix<f64>,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> Result<(), ResidualError> {
        self.check_typed(pre, cur, noi)?;
        let blocks = self.noi_blocks();
        blocks.check("noise jacobian", j)?;
        j.fill(0.0);
        let d_noi = libm::sqrt(self.dt) * Mat3::identity();
        for i in 0..self.landmark_count() {
            blocks
                .block_mut(j, self.idx.fea_inn, self.idx.fea_noi)?
                .fixed_view_mut::<3, 3>(i * 3, i * 3)
                .copy_from(&d_noi);
        }
        Ok(())
    }

    fn landmarks_from(
        &self,
        layout: &Layout,
        index: usize,
        v: &DVector<f64>,
    ) -> Result<Vec<Vec3>, ResidualError> {
        let (offset, _) = layout.span(index)?;
        Ok((0..self.landmark_count())
            .map(|i| v.fixed_rows::<3>(offset + 3 * i).into_owned())
            .collect())
    }

    fn vec3_from(layout: &Layout, index: usize, v: &DVector<f64>) -> Result<Vec3, ResidualError> {
        let (o, _) = layout.span(index)?;
        Ok(v.fixed_rows::<3>(o).into_owned())
    }

    /// Unstacks a previous-state vector laid out per `pre_layout`.
    pub fn previous_from_vector(&self, v: &DVector<f64>) -> Result<PreviousState, ResidualError> {
        self.pre.check("previous state", v)?;
        Ok(PreviousState::new(
            self.landmarks_from(&self.pre, self.idx.fea_pre, v)?,
            Self::vec3_from(&self.pre, self.idx.vel_pre, v)?,
        ))
    }

    pub fn current_from_vector(&self, v: &DVector<f64>) -> Result<CurrentState, ResidualError> {
        self.cur.check("current state", v)?;
        Ok(CurrentState::new(
            self.landmarks_from(&self.cur, self.idx.fea_cur, v)?,
            Self::vec3_from(&self.cur, self.idx.ror_cur, v)?,
        ))
    }

    pub fn noise_from_vector(&self, v: &DVector<f64>) -> Result<ProcessNoise, ResidualError> {
        self.noi.check("noise", v)?;
        Ok(ProcessNoise::new(
            self.landmarks_from(&self.noi, self.idx.fea_noi, v)?,
        ))
    }

    fn stack_landmarks(
        layout: &Layout,
        index: usize,
        landmarks: &[Vec3],
        v: &mut DVector<f64>,
    ) -> Result<(), ResidualError> {
        let (offset, _) = layout.span(index)?;
        for (i, l) in landmarks.iter().enumerate() {
            v.fixed_rows_mut::<3>(offset + 3 * i).copy_from(l);
        }
        Ok(())
    }

    pub fn previous_to_vector(&self, pre: &PreviousState) -> Result<DVector<f64>, ResidualError> {
        check_dim("previous landmarks", self.landmark_count(), pre.landmarks.len())?;
        let mut v = self.pre.zeros();
        Self::stack_landmarks(&self.pre, self.idx.fea_pre, &pre.landmarks, &mut v)?;
        let (o, _) = self.pre.span(self.idx.vel_pre)?;
        v.fixed_rows_mut::<3>(o).copy_from(&pre.velocity);
        Ok(v)
    }

    pub fn current_to_vector(&self, cur: &CurrentState) -> Result<DVector<f64>, ResidualError> {
        check_dim("current landmarks", self.landmark_count(), cur.landmarks.len())?;
        let mut v = self.cur.zeros();
        Self::stack_landmarks(&self.cur, self.idx.fea_cur, &cur.landmarks, &mut v)?;
        let (o, _) = self.cur.span(self.idx.ror_cur)?;
        v.fixed_rows_mut::<3>(o).copy_from(&cur.angular_velocity);
        Ok(v)
    }

    pub fn noise_to_vector(&self, noi: &ProcessNoise) -> Result<DVector<f64>, ResidualError> {
        check_dim("noise landmarks", self.landmark_count(), noi.landmarks.len())?;
        let mut v = self.noi.zeros();
        Self::stack_landmarks(&self.noi, self.idx.fea_noi, &noi.landmarks, &mut v)?;
        Ok(v)
    }

    pub fn innovation_to_vector(&self, inn: &Innovation) -> Result<DVector<f64>, ResidualError> {
        check_dim("innovation landmarks", self.landmark_count(), inn.landmarks.len())?;
        let mut v = self.inn.zeros();
        Self::stack_landmarks(&self.inn, self.idx.fea_inn, &inn.landmarks, &mut v)?;
        Ok(v)
    }

    fn unstack(
        &self,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(PreviousState, CurrentState, ProcessNoise), ResidualError> {
        Ok((
            self.previous_from_vector(pre)?,
            self.current_from_vector(cur)?,
            self.noise_from_vector(noi)?,
        ))
    }
}

impl Residual for RobocentricLandmarkResidual {
    fn properties(&self) -> &ResidualProperties {
        &self.properties
    }

    fn inn_layout(&self) -> &Layout {
        &self.inn
    }

    fn pre_layout(&self) -> &Layout {
        &self.pre
    }

    fn cur_layout(&self) -> &Layout {
        &self.cur
    }

    fn noi_layout(&self) -> &Layout {
        &self.noi
    }

    fn eval_vec(
        &self,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<DVector<f64>, ResidualError> {
        let (pre, cur, noi) = self.unstack(pre, cur, noi)?;
        let inn = self.eval(&pre, &cur, &noi)?;
        self.innovation_to_vector(&inn)
    }

    fn jac_pre_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError> {
        let (pre, cur, noi) = self.unstack(pre, cur, noi)?;
        self.jac_pre(j, &pre, &cur, &noi)
    }

    fn jac_cur_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError> {
        let (pre, cur, noi) = self.unstack(pre, cur, noi)?;
        self.jac_cur(j, &pre, &cur, &noi)
    }

    fn jac_noi_vec(
        &self,
        j: &mut DMatrix<f64>,
        pre: &DVector<f64>,
        cur: &DVector<f64>,
        noi: &DVector<f64>,
    ) -> Result<(), ResidualError> {
        let (pre, cur, noi) = self.unstack(pre, cur, noi)?;
        self.jac_noi(j, &pre, &cur, &noi)
    }
}

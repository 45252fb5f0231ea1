#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::alloc::vec;
    use crate::alloc::vec::Vec;
    use crate::errors::ResidualError;
    use crate::lie::so3::{hat, small_rotation_compensation, Mat3, Vec3};
    use crate::linalg::DMatrix;
    use crate::residuals::base::Residual;
    use crate::residuals::config::{BlockNames, ResidualConfig};
    use crate::residuals::flags::PropagationMode;
    use crate::residuals::robocentric::{
        CurrentState, Innovation, PreviousState, ProcessNoise, RobocentricLandmarkResidual,
    };
    use crate::time::{Duration, Unit};

    fn residual(n: usize, dt: f64) -> RobocentricLandmarkResidual {
        let mut r = RobocentricLandmarkResidual::with_landmarks(n).unwrap();
        r.set_dt_seconds(dt).unwrap();
        r
    }

    fn random_vec3(rng: &mut StdRng, scale: f64) -> Vec3 {
        Vec3::new(
            rng.gen_range(-scale..scale),
            rng.gen_range(-scale..scale),
            rng.gen_range(-scale..scale),
        )
    }

    fn random_point(
        rng: &mut StdRng,
        n: usize,
    ) -> (PreviousState, CurrentState, ProcessNoise) {
        let pre = PreviousState::new(
            (0..n).map(|_| random_vec3(rng, 10.0)).collect(),
            random_vec3(rng, 2.0),
        );
        let cur = CurrentState::new(
            (0..n).map(|_| random_vec3(rng, 10.0)).collect(),
            random_vec3(rng, 1.0),
        );
        let noi = ProcessNoise::new((0..n).map(|_| random_vec3(rng, 0.5)).collect());
        (pre, cur, noi)
    }

    fn jacobians(
        r: &RobocentricLandmarkResidual,
        pre: &PreviousState,
        cur: &CurrentState,
        noi: &ProcessNoise,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let mut j_pre = r.pre_blocks().zeros();
        let mut j_cur = r.cur_blocks().zeros();
        let mut j_noi = r.noi_blocks().zeros();
        r.jac_pre(&mut j_pre, pre, cur, noi).unwrap();
        r.jac_cur(&mut j_cur, pre, cur, noi).unwrap();
        r.jac_noi(&mut j_noi, pre, cur, noi).unwrap();
        (j_pre, j_cur, j_noi)
    }

    #[test]
    fn starts_with_all_landmarks_tracked() {
        let r = residual(4, 0.1);
        assert_eq!(r.landmark_count(), 4);
        assert_eq!(r.flags().enabled_count(), 4);
        for i in 0..4 {
            assert_eq!(r.propagation_mode(i).unwrap(), PropagationMode::Tracked);
        }
        let props = r.properties();
        assert!(!props.is_unary);
        assert!(props.is_splitable);
        assert!(props.is_mergeable);
    }

    #[test]
    fn layouts_follow_block_names() {
        let r = residual(3, 0.1);
        assert_eq!(r.inn_layout().dim(), 9);
        assert_eq!(r.pre_layout().dim(), 12);
        assert_eq!(r.pre_layout().offset_of("MvM").unwrap(), 9);
        assert_eq!(r.cur_layout().offset_of("MwM").unwrap(), 9);
        assert_eq!(r.noi_layout().dim_of("MrML").unwrap(), 9);
    }

    #[test]
    fn custom_block_names() {
        let names = BlockNames {
            pre_velocity: "v".into(),
            cur_angular_velocity: "omega".into(),
            ..BlockNames::default()
        };
        let config = ResidualConfig::new(2).with_name("lm").with_names(names);
        let r = RobocentricLandmarkResidual::build(&config).unwrap();
        assert_eq!(r.properties().name, "lm");
        assert_eq!(r.pre_layout().offset_of("v").unwrap(), 6);
        assert_eq!(r.cur_layout().index_of("omega").unwrap(), 1);
        assert!(r.pre_layout().index_of("MvM").is_err());
    }

    #[test]
    fn rejects_bad_construction() {
        assert_eq!(
            RobocentricLandmarkResidual::with_landmarks(0).unwrap_err(),
            ResidualError::EmptyLandmarkSet
        );
        let names = BlockNames {
            pre_velocity: "MrML".into(),
            ..BlockNames::default()
        };
        let err = RobocentricLandmarkResidual::build(&ResidualConfig::new(1).with_names(names))
            .unwrap_err();
        assert_eq!(err, ResidualError::DuplicateElement("MrML".into()));
    }

    #[test]
    fn rejects_negative_step_but_accepts_zero() {
        let mut r = residual(1, 0.1);
        assert!(matches!(
            r.set_dt(Duration::from_f64(-0.1, Unit::Second)),
            Err(ResidualError::InvalidTimeStep(_))
        ));
        assert_relative_eq!(r.dt(), 0.1, epsilon = 1e-12);
        r.set_dt(Duration::from_f64(0.0, Unit::Second)).unwrap();
        assert_eq!(r.dt(), 0.0);
    }

    #[test]
    fn step_in_seconds_is_stored_unchanged() {
        let mut r = residual(1, 0.0);
        let dt = 1.0 / 3.0;
        r.set_dt_seconds(dt).unwrap();
        assert_eq!(r.dt(), dt);
        // below the nanosecond resolution of `Duration`
        r.set_dt_seconds(1e-10).unwrap();
        assert_eq!(r.dt(), 1e-10);
        for bad in [-1e-3, f64::NAN, f64::INFINITY].iter() {
            assert!(matches!(
                r.set_dt_seconds(*bad),
                Err(ResidualError::InvalidTimeStep(_))
            ));
        }
        assert_eq!(r.dt(), 1e-10);
        // the `Duration` setter rounds to whole nanoseconds
        r.set_dt(Duration::from_f64(dt, Unit::Second)).unwrap();
        assert_relative_eq!(r.dt(), dt, epsilon = 1e-9);
    }

    #[test]
    fn non_nanosecond_step_gives_exactly_zero_innovation() {
        let mut rng = StdRng::seed_from_u64(11);
        let dt = 1.0 / 3.0;
        let r = residual(2, dt);
        let p: Vec<Vec3> = (0..2).map(|_| random_vec3(&mut rng, 10.0)).collect();
        let v = random_vec3(&mut rng, 2.0);
        let w = random_vec3(&mut rng, 1.0);
        let comp = small_rotation_compensation(&(w * dt));
        let c: Vec<Vec3> = p.iter().map(|p| comp * p - v * dt).collect();
        let inn = r
            .eval(
                &PreviousState::new(p, v),
                &CurrentState::new(c, w),
                &ProcessNoise::zeros(2),
            )
            .unwrap();
        assert_eq!(inn, Innovation::zeros(2));
    }

    #[test]
    fn innovation_constructors() {
        let inn = Innovation::zeros(3);
        assert_eq!(inn.landmarks.len(), 3);
        assert!(inn.landmarks.iter().all(|l| *l == Vec3::zeros()));
        let inn = Innovation::new(vec![Vec3::new(1.0, -2.0, 0.5)]);
        let r = residual(1, 0.1);
        let v = r.innovation_to_vector(&inn).unwrap();
        assert_eq!(v.as_slice(), &[1.0, -2.0, 0.5]);
        assert!(r.innovation_to_vector(&Innovation::zeros(2)).is_err());
    }

    #[test]
    fn set_flag_out_of_range() {
        let mut r = residual(3, 0.1);
        assert_eq!(
            r.set_propagation_flag(3, false).unwrap_err(),
            ResidualError::LandmarkIndexOutOfRange { index: 3, count: 3 }
        );
        assert!(r.propagation_mode(7).is_err());
    }

    #[test]
    fn mismatched_landmark_count() {
        let r = residual(2, 0.1);
        let err = r
            .eval(
                &PreviousState::zeros(2),
                &CurrentState::zeros(3),
                &ProcessNoise::zeros(2),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ResidualError::DimensionMismatch {
                what: "current landmarks",
                expected: 2,
                actual: 3
            }
        );
        let mut j = DMatrix::zeros(6, 7);
        assert!(r
            .jac_pre(
                &mut j,
                &PreviousState::zeros(2),
                &CurrentState::zeros(2),
                &ProcessNoise::zeros(2)
            )
            .is_err());
    }

    #[test]
    fn translation_only_scenario() {
        let r = residual(1, 0.1);
        let pre = PreviousState::new(vec![Vec3::zeros()], Vec3::new(1.0, 0.0, 0.0));
        let noi = ProcessNoise::zeros(1);

        let cur = CurrentState::new(vec![Vec3::new(-0.1, 0.0, 0.0)], Vec3::zeros());
        let inn = r.eval(&pre, &cur, &noi).unwrap();
        assert_relative_eq!(inn.landmarks[0], Vec3::zeros(), epsilon = 1e-15);

        let other = Vec3::new(0.4, -2.0, 1.5);
        let cur = CurrentState::new(vec![other], Vec3::zeros());
        let inn = r.eval(&pre, &cur, &noi).unwrap();
        assert_relative_eq!(
            inn.landmarks[0],
            Vec3::new(-0.1, 0.0, 0.0) - other,
            epsilon = 1e-15
        );
    }

    #[test]
    fn frozen_scenario_ignores_state() {
        let mut r = residual(1, 0.1);
        r.set_propagation_flag(0, false).unwrap();
        let noise = Vec3::new(0.2, -0.1, 0.0);
        let expected = noise * libm::sqrt(0.1);
        let noi = ProcessNoise::new(vec![noise]);

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            let pre = PreviousState::new(vec![random_vec3(&mut rng, 5.0)], random_vec3(&mut rng, 5.0));
            let cur = CurrentState::new(vec![random_vec3(&mut rng, 5.0)], random_vec3(&mut rng, 5.0));
            let inn = r.eval(&pre, &cur, &noi).unwrap();
            assert_relative_eq!(inn.landmarks[0], expected, epsilon = 1e-15);
        }
    }

    #[test]
    fn predicted_landmarks_give_exactly_zero_innovation() {
        let mut rng = StdRng::seed_from_u64(3);
        for &n in [1usize, 3, 5].iter() {
            let mut r = residual(n, rng.gen_range(0.001..0.5));
            r.set_propagation_flag(n - 1, false).unwrap();
            let (pre, cur, _) = random_point(&mut rng, n);
            let predicted = r.predict(&pre, &cur.angular_velocity).unwrap();
            let cur = CurrentState::new(predicted, cur.angular_velocity);
            let inn = r.eval(&pre, &cur, &ProcessNoise::zeros(n)).unwrap();
            for (i, l) in inn.landmarks.iter().enumerate() {
                // frozen landmarks see zero noise as well
                assert_eq!(*l, Vec3::zeros(), "landmark {} of {}", i, n);
            }
        }
    }

    #[test]
    fn consistency_with_explicit_model() {
        let mut rng = StdRng::seed_from_u64(5);
        let dt = 0.05;
        let r = residual(1, dt);
        for _ in 0..20 {
            let p = random_vec3(&mut rng, 10.0);
            let v = random_vec3(&mut rng, 2.0);
            let w = random_vec3(&mut rng, 1.0);
            let c = small_rotation_compensation(&(w * r.dt())) * p - v * r.dt();
            let inn = r
                .eval(
                    &PreviousState::new(vec![p], v),
                    &CurrentState::new(vec![c], w),
                    &ProcessNoise::zeros(1),
                )
                .unwrap();
            assert_eq!(inn.landmarks[0], Vec3::zeros());
        }
    }

    #[test]
    fn jacobian_blocks_have_expected_values() {
        let mut rng = StdRng::seed_from_u64(17);
        let n = 3;
        let r = residual(n, 0.2);
        let dt = r.dt();
        let (pre, cur, noi) = random_point(&mut rng, n);
        let (j_pre, j_cur, j_noi) = jacobians(&r, &pre, &cur, &noi);

        let comp = Mat3::identity() - hat(&(cur.angular_velocity * dt));
        for i in 0..n {
            for k in 0..n {
                let expected_pre = if i == k { comp } else { Mat3::zeros() };
                assert_eq!(j_pre.fixed_view::<3, 3>(3 * i, 3 * k), expected_pre);
            }
            assert_eq!(
                j_pre.fixed_view::<3, 3>(3 * i, 3 * n),
                -dt * Mat3::identity()
            );
            assert_eq!(j_cur.fixed_view::<3, 3>(3 * i, 3 * i), -Mat3::identity());
            assert_eq!(
                j_cur.fixed_view::<3, 3>(3 * i, 3 * n),
                hat(&pre.landmarks[i]) * dt
            );
            assert_eq!(
                j_noi.fixed_view::<3, 3>(3 * i, 3 * i),
                libm::sqrt(dt) * Mat3::identity()
            );
        }
    }

    #[test]
    fn freezing_zeroes_state_rows_only() {
        let mut rng = StdRng::seed_from_u64(23);
        let n = 5;
        let mut r = residual(n, 0.1);
        let (pre, cur, noi) = random_point(&mut rng, n);
        let (_, _, j_noi_tracked) = jacobians(&r, &pre, &cur, &noi);

        r.set_propagation_flag(2, false).unwrap();
        assert_eq!(r.propagation_mode(2).unwrap(), PropagationMode::Frozen);
        let (j_pre, j_cur, j_noi) = jacobians(&r, &pre, &cur, &noi);

        assert!(j_pre.rows(6, 3).iter().all(|&x| x == 0.0));
        assert!(j_cur.rows(6, 3).iter().all(|&x| x == 0.0));
        assert!(j_pre.rows(3, 3).iter().any(|&x| x != 0.0));
        assert!(j_cur.rows(9, 3).iter().any(|&x| x != 0.0));
        assert_eq!(j_noi, j_noi_tracked);
        assert_eq!(
            j_noi.fixed_view::<3, 3>(6, 6),
            libm::sqrt(0.1) * Mat3::identity()
        );

        // and back
        r.set_propagation_flag(2, true).unwrap();
        let (j_pre_back, _, _) = jacobians(&r, &pre, &cur, &noi);
        assert!(j_pre_back.rows(6, 3).iter().any(|&x| x != 0.0));
    }

    #[test]
    fn jacobians_overwrite_stale_entries() {
        let r = residual(2, 0.1);
        let (pre, cur, noi) = (
            PreviousState::zeros(2),
            CurrentState::zeros(2),
            ProcessNoise::zeros(2),
        );
        let mut j = DMatrix::from_element(6, 9, 42.0);
        r.jac_pre(&mut j, &pre, &cur, &noi).unwrap();
        assert_eq!(j[(0, 3)], 0.0);
        assert_eq!(j[(0, 0)], 1.0);
        assert_eq!(j[(5, 8)], -0.1);
    }

    #[test]
    fn zero_step_collapses_to_static_form() {
        let mut rng = StdRng::seed_from_u64(29);
        let r = residual(2, 0.0);
        let (pre, cur, noi) = random_point(&mut rng, 2);
        let inn = r.eval(&pre, &cur, &noi).unwrap();
        for i in 0..2 {
            assert_eq!(inn.landmarks[i], pre.landmarks[i] - cur.landmarks[i]);
        }
        let (j_pre, j_cur, j_noi) = jacobians(&r, &pre, &cur, &noi);
        assert_eq!(j_pre.columns(0, 6), DMatrix::<f64>::identity(6, 6));
        assert!(j_pre.columns(6, 3).iter().all(|&x| x == 0.0));
        assert!(j_cur.columns(6, 3).iter().all(|&x| x == 0.0));
        assert!(j_noi.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let mut rng = StdRng::seed_from_u64(31);
        let r = residual(3, 0.1);
        let (pre, cur, noi) = random_point(&mut rng, 3);
        let first = r.eval(&pre, &cur, &noi).unwrap();
        let (a, b, c) = jacobians(&r, &pre, &cur, &noi);
        for _ in 0..3 {
            assert_eq!(r.eval(&pre, &cur, &noi).unwrap(), first);
            assert_eq!(jacobians(&r, &pre, &cur, &noi), (a.clone(), b.clone(), c.clone()));
        }
    }

    #[test]
    fn stacked_vectors_match_typed_api() {
        let mut rng = StdRng::seed_from_u64(37);
        let mut r = residual(3, 0.1);
        r.set_propagation_flag(1, false).unwrap();
        let (pre, cur, noi) = random_point(&mut rng, 3);
        let pre_v = r.previous_to_vector(&pre).unwrap();
        let cur_v = r.current_to_vector(&cur).unwrap();
        let noi_v = r.noise_to_vector(&noi).unwrap();

        assert_eq!(r.previous_from_vector(&pre_v).unwrap(), pre);
        assert_eq!(r.current_from_vector(&cur_v).unwrap(), cur);

        let inn = r.eval(&pre, &cur, &noi).unwrap();
        let inn_v = r.eval_vec(&pre_v, &cur_v, &noi_v).unwrap();
        assert_eq!(inn_v, r.innovation_to_vector(&inn).unwrap());

        let (j_pre, j_cur, j_noi) = jacobians(&r, &pre, &cur, &noi);
        let mut j = r.pre_blocks().zeros();
        r.jac_pre_vec(&mut j, &pre_v, &cur_v, &noi_v).unwrap();
        assert_eq!(j, j_pre);
        let mut j = r.cur_blocks().zeros();
        r.jac_cur_vec(&mut j, &pre_v, &cur_v, &noi_v).unwrap();
        assert_eq!(j, j_cur);
        let mut j = r.noi_blocks().zeros();
        r.jac_noi_vec(&mut j, &pre_v, &cur_v, &noi_v).unwrap();
        assert_eq!(j, j_noi);

        let short: Vec<f64> = vec![0.0; 5];
        let short = crate::linalg::DVector::from_vec(short);
        assert!(r.eval_vec(&short, &cur_v, &noi_v).is_err());
    }

    #[test]
    fn named_block_lookup() {
        let r = residual(2, 0.1);
        let mut j = r.cur_blocks().zeros();
        r.jac_cur(
            &mut j,
            &PreviousState::new(vec![Vec3::new(1.0, 2.0, 3.0); 2], Vec3::zeros()),
            &CurrentState::zeros(2),
            &ProcessNoise::zeros(2),
        )
        .unwrap();
        let blocks = r.cur_blocks();
        let ror = blocks.block_mut_by_name(&mut j, "MrML", "MwM").unwrap();
        assert_eq!(ror.shape(), (6, 3));
        assert_eq!(
            ror.fixed_view::<3, 3>(3, 0).into_owned(),
            hat(&Vec3::new(1.0, 2.0, 3.0)) * 0.1
        );
        assert!(blocks.block_mut_by_name(&mut j, "MrML", "MvM").is_err());
    }

    #[test]
    fn block_addressing_rejects_bad_indices_and_shapes() {
        let r = residual(2, 0.1);
        let count = r.pre_layout().len();
        assert_eq!(
            r.pre_layout().span(count).unwrap_err(),
            ResidualError::ElementIndexOutOfRange { index: count, count }
        );
        let blocks = r.pre_blocks();
        let mut small = DMatrix::zeros(3, 3);
        assert_eq!(
            blocks.block_mut(&mut small, 0, 0).unwrap_err(),
            ResidualError::DimensionMismatch {
                what: "jacobian",
                expected: 6,
                actual: 3
            }
        );
        let mut j = blocks.zeros();
        assert!(matches!(
            blocks.block_mut(&mut j, 0, count),
            Err(ResidualError::ElementIndexOutOfRange { .. })
        ));
        assert!(blocks.block_mut(&mut j, 0, 1).is_ok());
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use robocentric::linalg::DMatrix;
use robocentric::rc::{
    check_jacobians, CurrentState, FindifConfig, PreviousState, ProcessNoise, Residual,
    ResidualConfig, RobocentricLandmarkResidual, Vec3,
};
/// import Re-exports of hifitime (for time)
use robocentric::time::{Duration, Unit};

fn main() {
    env_logger::init();

    let nums = 50;
    let n = 4;
    let dt = Duration::from_f64(0.02, Unit::Second);

    let mut residual =
        RobocentricLandmarkResidual::build(&ResidualConfig::new(n).with_name("demo")).unwrap();
    residual.set_dt(dt).unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    let mut landmarks: Vec<Vec3> = (0..n)
        .map(|_| Vec3::new(rng.gen_range(2.0..8.0), rng.gen_range(-2.0..2.0), rng.gen_range(-1.0..1.0)))
        .collect();

    // observer drives forward while turning left
    let velocity = Vec3::new(1.0, 0.0, 0.0);
    let angular_velocity = Vec3::new(0.0, 0.0, 0.3);

    let mut j_pre = residual.pre_blocks().zeros();
    let mut j_cur = residual.cur_blocks().zeros();
    let mut j_noi: DMatrix<f64> = residual.noi_blocks().zeros();

    for k in 0..nums {
        if k == nums / 2 {
            // the far landmark left the field of view
            residual.set_propagation_flag(0, false).unwrap();
        }
        let pre = PreviousState::new(landmarks.clone(), velocity);
        let predicted = residual.predict(&pre, &angular_velocity).unwrap();
        let cur = CurrentState::new(predicted.clone(), angular_velocity);
        let noi = ProcessNoise::zeros(n);

        let inn = residual.eval(&pre, &cur, &noi).unwrap();
        residual.jac_pre(&mut j_pre, &pre, &cur, &noi).unwrap();
        residual.jac_cur(&mut j_cur, &pre, &cur, &noi).unwrap();
        residual.jac_noi(&mut j_noi, &pre, &cur, &noi).unwrap();

        let max_inn = inn.landmarks.iter().map(|l| l.norm()).fold(0.0, f64::max);
        println!(
            "step {:>2}: landmark[1] = {:.3?}, |inn|max = {:e}, |J_pre| = {:.4}",
            k,
            predicted[1].as_slice(),
            max_inn,
            j_pre.norm()
        );

        if k % 10 == 0 {
            let report = check_jacobians(
                &residual,
                &residual.previous_to_vector(&pre).unwrap(),
                &residual.current_to_vector(&cur).unwrap(),
                &residual.noise_to_vector(&noi).unwrap(),
                &FindifConfig::default(),
            )
            .unwrap();
            println!("         jacobian check passed: {}", report.passed());
        }
        landmarks = predicted;
    }
}

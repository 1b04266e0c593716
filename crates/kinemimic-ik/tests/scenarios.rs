//! Integration test: end-to-end IK requests through `JlMimicSolver`.
//!
//! Covers the behaviours a caller relies on:
//! 1. Reachable targets inside the limits converge on the first attempt
//! 2. Targets that need out-of-range joints fail after the retry budget
//! 3. Mimic joints follow their drivers in the returned vector
//! 4. Locked redundant joints keep the caller's value exactly
//! 5. Singular configurations abort without retrying
//! 6. Retries restart from the clamped answer, and stop once clamping is a no-op

use std::cell::RefCell;
use std::f64::consts::TAU;

use approx::assert_relative_eq;
use kinemimic_ik::{
    ChainJoint, ForwardKinematics, IkConfig, IkError, JlMimicSolver, JointLimits, JointMimic,
    KinematicChain, KinematicsError, LevenbergMarquardt, LmConfig, LmOptions, LmOutcome, LmStatus,
    MimicMap, PositionSolver, SolveStatus,
};
use nalgebra::{Isometry3, Vector3};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One hinge about +Z with the tool 1 m out along X, limits ±1.57.
fn single_hinge() -> KinematicChain {
    KinematicChain::new(
        vec![ChainJoint::revolute(
            "hinge",
            Isometry3::identity(),
            Vector3::z(),
            -1.57,
            1.57,
        )],
        Isometry3::translation(1.0, 0.0, 0.0),
    )
}

/// Two hinges about +Z, 1 m apart, tool 1 m past the second.
fn planar_pair(lower: f64, upper: f64) -> KinematicChain {
    KinematicChain::new(
        vec![
            ChainJoint::revolute("j1", Isometry3::identity(), Vector3::z(), lower, upper),
            ChainJoint::revolute(
                "j2",
                Isometry3::translation(1.0, 0.0, 0.0),
                Vector3::z(),
                lower,
                upper,
            ),
        ],
        Isometry3::translation(1.0, 0.0, 0.0),
    )
}

/// Replays scripted LM answers and records every start vector it is handed.
///
/// Once the script runs out the last answer repeats.
struct ScriptedSolver {
    answers: Vec<Vec<f64>>,
    starts: RefCell<Vec<Vec<f64>>>,
}

impl ScriptedSolver {
    fn new(answers: Vec<Vec<f64>>) -> Self {
        Self {
            answers,
            starts: RefCell::new(Vec::new()),
        }
    }

    fn starts(&self) -> Vec<Vec<f64>> {
        self.starts.borrow().clone()
    }
}

impl PositionSolver for ScriptedSolver {
    fn solve(
        &self,
        _model: &dyn ForwardKinematics,
        q_init: &[f64],
        _target: &Isometry3<f64>,
        _options: &LmOptions<'_>,
    ) -> Result<LmOutcome, KinematicsError> {
        let mut starts = self.starts.borrow_mut();
        let answer = self.answers[starts.len().min(self.answers.len() - 1)].clone();
        starts.push(q_init.to_vec());
        Ok(LmOutcome {
            joint_positions: answer,
            status: LmStatus::Converged,
            iterations: 3,
            error_norm: 0.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Single joint
// ---------------------------------------------------------------------------

#[test]
fn reachable_target_converges() {
    init_tracing();
    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = chain.forward_kinematics(&[0.3]);
    let solution = solver.cart_to_jnt(&[0.0], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::Success);
    assert_eq!(solution.attempts, 1);
    assert!(solution.error_norm < 1e-6);
    assert_relative_eq!(solution.joint_positions[0], 0.3, epsilon = 1e-6);
}

#[test]
fn out_of_range_target_exhausts_attempts() {
    init_tracing();
    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let config = IkConfig {
        max_attempts: 5,
        ..IkConfig::default()
    };
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, config).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = chain.forward_kinematics(&[2.0]);
    match solver.cart_to_jnt(&[0.0], &target) {
        Err(IkError::LimitViolation {
            attempts,
            joint_positions,
        }) => {
            assert_eq!(attempts, 5);
            assert_relative_eq!(joint_positions[0], 2.0, epsilon = 1e-6);
        }
        other => panic!("expected a limit violation, got {other:?}"),
    }
}

#[test]
fn whole_turns_are_removed_before_the_limit_check() {
    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    // Starting one turn up, the LM lands on 0.3 + 2π.
    let target = chain.forward_kinematics(&[0.3]);
    let solution = solver.cart_to_jnt(&[TAU], &target).unwrap();

    assert_eq!(solution.attempts, 1);
    assert_relative_eq!(solution.joint_positions[0], 0.3, epsilon = 1e-6);
}

#[test]
fn iteration_budget_gives_approximate_success() {
    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::new(LmConfig {
        max_iterations: 1,
        ..LmConfig::default()
    });
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = chain.forward_kinematics(&[0.3]);
    let solution = solver.cart_to_jnt(&[0.0], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::SuccessApproximate);
    assert!(!solution.is_exact());
    assert_eq!(solution.lm_iterations, 1);
    assert!(limits.obeys(&solution.joint_positions));
}

#[test]
fn projected_limits_stop_at_the_bound() {
    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let config = IkConfig {
        project_limits: true,
        ..IkConfig::default()
    };
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, config).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = chain.forward_kinematics(&[2.0]);
    let solution = solver.cart_to_jnt(&[0.0], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::SuccessApproximate);
    assert_eq!(solution.joint_positions, vec![1.57]);
}

#[test]
fn lm_table_from_config_file_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ik.toml");
    std::fs::write(&path, "max_attempts = 3\n\n[lm]\nmax_iterations = 1\n").unwrap();
    let config = IkConfig::from_file(&path).unwrap();

    let chain = single_hinge();
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::from_ik_config(&config);
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, config).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = chain.forward_kinematics(&[0.3]);
    let solution = solver.cart_to_jnt(&[0.0], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::SuccessApproximate);
    assert_eq!(solution.lm_iterations, 1);
}

#[test]
fn tool_on_joint_axis_is_singular() {
    init_tracing();
    let chain = KinematicChain::new(
        vec![ChainJoint::revolute(
            "spin",
            Isometry3::identity(),
            Vector3::z(),
            -1.57,
            1.57,
        )],
        Isometry3::translation(0.0, 0.0, 0.5),
    );
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_joints(vec![JointMimic::active(0)]).unwrap();

    let target = Isometry3::translation(0.2, 0.0, 0.5);
    let err = solver.cart_to_jnt(&[0.0], &target).unwrap_err();
    assert!(matches!(err, IkError::Singular { attempt: 1 }));
}

// ---------------------------------------------------------------------------
// Mimic joints and locking
// ---------------------------------------------------------------------------

#[test]
fn mimic_joint_follows_its_driver() {
    init_tracing();
    // Joint b sits 1 m out along X and turns at twice the rate of a.
    let chain = KinematicChain::new(
        vec![
            ChainJoint::revolute("a", Isometry3::identity(), Vector3::z(), -3.0, 3.0),
            ChainJoint::revolute(
                "b",
                Isometry3::translation(1.0, 0.0, 0.0),
                Vector3::z(),
                -3.0,
                3.0,
            ),
        ],
        Isometry3::translation(0.5, 0.0, 0.0),
    );
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver
        .set_mimic_joints(vec![JointMimic::active(0), JointMimic::mimic(0, 2.0, 0.0)])
        .unwrap();

    let target = chain.forward_kinematics(&[0.4, 0.8]);
    let solution = solver.cart_to_jnt(&[0.0, 0.0], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::Success);
    let q = &solution.joint_positions;
    assert_relative_eq!(q[0], 0.4, epsilon = 1e-6);
    assert_relative_eq!(q[1], 0.8, epsilon = 1e-6);
    assert_relative_eq!(q[1], 2.0 * q[0], epsilon = 1e-12);
}

#[test]
fn locked_redundant_joint_keeps_initial_value() {
    init_tracing();
    let chain = planar_pair(-3.0, 3.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();
    solver.set_redundant_joints(&[1]).unwrap();

    let target = chain.forward_kinematics(&[0.7, 0.5]);
    let solution = solver
        .cart_to_jnt_advanced(&[0.0, 0.5], &target, true)
        .unwrap();

    assert_eq!(solution.joint_positions[1], 0.5);
    assert_relative_eq!(solution.joint_positions[0], 0.7, epsilon = 1e-6);
}

#[test]
fn unlocked_solve_moves_every_joint() {
    let chain = planar_pair(-3.0, 3.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();
    solver.set_redundant_joints(&[1]).unwrap();

    let target = chain.forward_kinematics(&[0.7, 0.5]);
    let solution = solver
        .cart_to_jnt_advanced(&[0.0, 0.0], &target, false)
        .unwrap();

    assert_relative_eq!(solution.joint_positions[0], 0.7, epsilon = 1e-6);
    assert_relative_eq!(solution.joint_positions[1], 0.5, epsilon = 1e-6);
}

#[test]
fn position_only_request_ignores_orientation() {
    let chain = planar_pair(-3.0, 3.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let config = IkConfig {
        position_ik: true,
        ..IkConfig::default()
    };
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, config).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();

    let reachable = chain.forward_kinematics(&[0.3, 0.6]);
    let target = Isometry3::from_parts(
        reachable.translation,
        nalgebra::UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.5),
    );
    let solution = solver.cart_to_jnt(&[0.2, 0.5], &target).unwrap();

    assert_eq!(solution.status, SolveStatus::Success);
    let reached = chain.forward_kinematics(&solution.joint_positions);
    assert_relative_eq!(
        reached.translation.vector,
        target.translation.vector,
        epsilon = 1e-6
    );
}

#[test]
fn projected_mimic_bound_expands_inside_limits() {
    init_tracing();
    // b = 0.6 a, and 0.7 / 0.6 does not round-trip through the multiplier.
    let chain = KinematicChain::new(
        vec![
            ChainJoint::revolute("a", Isometry3::identity(), Vector3::z(), -3.0, 3.0),
            ChainJoint::revolute(
                "b",
                Isometry3::translation(1.0, 0.0, 0.0),
                Vector3::z(),
                -3.0,
                0.7,
            ),
        ],
        Isometry3::translation(0.5, 0.0, 0.0),
    );
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let config = IkConfig {
        max_attempts: 5,
        project_limits: true,
        ..IkConfig::default()
    };
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, config).unwrap();
    solver
        .set_mimic_joints(vec![JointMimic::active(0), JointMimic::mimic(0, 0.6, 0.0)])
        .unwrap();

    let upper = solver.reduced_limits().unwrap().upper()[0];
    let beyond = solver.mimic_map().unwrap().expand(&[upper + 0.3]).unwrap();
    let target = chain.forward_kinematics(&beyond);
    let solution = solver.cart_to_jnt(&[0.0, 0.0], &target).unwrap();

    assert_eq!(solution.attempts, 1);
    assert!(!solution.is_exact());
    let q = &solution.joint_positions;
    assert!(q[1] <= 0.7);
    assert!(limits.obeys(q));
    assert_relative_eq!(q[0], upper, epsilon = 1e-6);
}

#[test]
fn locked_joint_out_of_range_fails_on_first_attempt() {
    init_tracing();
    let chain = planar_pair(-1.0, 1.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();
    solver.set_redundant_joints(&[1]).unwrap();

    let target = chain.forward_kinematics(&[0.3, 2.0]);
    match solver.cart_to_jnt_advanced(&[0.0, 2.0], &target, true) {
        Err(IkError::LimitViolation {
            attempts,
            joint_positions,
        }) => {
            assert_eq!(attempts, 1);
            assert_eq!(joint_positions[1], 2.0);
        }
        other => panic!("expected a limit violation, got {other:?}"),
    }
}

#[test]
fn locked_joint_keeps_whole_turns() {
    let chain = planar_pair(-10.0, 10.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();
    solver.set_redundant_joints(&[1]).unwrap();

    // 7.0 is past one turn, so harmonization alone would rewrite it.
    let target = chain.forward_kinematics(&[0.4, 7.0]);
    let solution = solver
        .cart_to_jnt_advanced(&[0.0, 7.0], &target, true)
        .unwrap();

    assert_eq!(solution.joint_positions[1], 7.0);
    assert_relative_eq!(solution.joint_positions[0], 0.4, epsilon = 1e-6);
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[test]
fn retry_restarts_from_clamped_answer() {
    init_tracing();
    let chain = planar_pair(-1.0, 1.0);
    let limits = JointLimits::from_chain(&chain);
    let lm = ScriptedSolver::new(vec![vec![1.4, 0.3], vec![0.9, 0.3]]);
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();

    let solution = solver
        .cart_to_jnt(&[1.5, 0.2], &Isometry3::identity())
        .unwrap();

    // The caller's start goes in unclamped; only the violating joint is moved
    // before the second attempt.
    assert_eq!(lm.starts(), vec![vec![1.5, 0.2], vec![1.0, 0.3]]);
    assert_eq!(solution.joint_positions, vec![0.9, 0.3]);
    assert_eq!(solution.status, SolveStatus::Success);
    assert_eq!(solution.attempts, 2);
    assert_eq!(solution.lm_iterations, 6);
}

#[test]
fn retry_clamps_drivers_into_mimic_derived_range() {
    let chain = KinematicChain::new(
        vec![
            ChainJoint::revolute("a", Isometry3::identity(), Vector3::z(), -3.0, 3.0),
            ChainJoint::revolute(
                "b",
                Isometry3::translation(1.0, 0.0, 0.0),
                Vector3::z(),
                -1.0,
                1.0,
            ),
        ],
        Isometry3::translation(0.5, 0.0, 0.0),
    );
    let limits = JointLimits::from_chain(&chain);
    let lm = ScriptedSolver::new(vec![vec![0.8], vec![0.45]]);
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver
        .set_mimic_joints(vec![JointMimic::active(0), JointMimic::mimic(0, 2.0, 0.0)])
        .unwrap();

    let solution = solver
        .cart_to_jnt(&[0.1, 0.2], &Isometry3::identity())
        .unwrap();

    // a = 0.8 is inside its own limits, but b = 1.6 is not: a is clamped to
    // the reduced bound 0.5, where b = 1.0.
    assert_eq!(lm.starts(), vec![vec![0.1], vec![0.5]]);
    assert_eq!(solution.attempts, 2);
    assert_relative_eq!(solution.joint_positions[0], 0.45);
    assert_relative_eq!(solution.joint_positions[1], 0.9);
}

#[test]
fn scripted_answer_that_never_clamps_stops_early() {
    let chain = planar_pair(-1.0, 1.0);
    let limits = JointLimits::from_chain(&chain);
    // The second joint is locked at an out-of-range start, so clamping cannot help.
    let lm = ScriptedSolver::new(vec![vec![0.2, 1.5]]);
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(MimicMap::identity(2)).unwrap();
    solver.set_redundant_joints(&[1]).unwrap();

    let err = solver
        .cart_to_jnt_advanced(&[0.0, 1.5], &Isometry3::identity(), true)
        .unwrap_err();

    assert!(matches!(err, IkError::LimitViolation { attempts: 1, .. }));
    assert_eq!(lm.starts().len(), 1);
}

// ---------------------------------------------------------------------------
// URDF front-end
// ---------------------------------------------------------------------------

const MIMIC_ARM: &str = r#"
    <robot name="mimic_arm">
        <link name="base"/><link name="l1"/><link name="l2"/><link name="l3"/><link name="tool"/>
        <joint name="a" type="revolute">
            <parent link="base"/><child link="l1"/>
            <axis xyz="0 0 1"/>
            <limit lower="-1" upper="1" effort="1" velocity="1"/>
        </joint>
        <joint name="b" type="revolute">
            <parent link="l1"/><child link="l2"/>
            <origin xyz="1 0 0"/>
            <axis xyz="0 0 1"/>
            <limit lower="-2" upper="2" effort="1" velocity="1"/>
            <mimic joint="a" multiplier="2.0" offset="0.1"/>
        </joint>
        <joint name="c" type="revolute">
            <parent link="l2"/><child link="l3"/>
            <origin xyz="1 0 0"/>
            <axis xyz="0 0 1"/>
            <limit lower="-2" upper="2" effort="1" velocity="1"/>
        </joint>
        <joint name="tool_fixed" type="fixed">
            <parent link="l3"/><child link="tool"/>
            <origin xyz="0.5 0 0"/>
        </joint>
    </robot>
"#;

#[test]
fn urdf_model_solves_end_to_end() {
    init_tracing();
    let model = kinemimic_urdf::parse_string(MIMIC_ARM).unwrap();
    let chain = KinematicChain::from_model(&model, "tool").unwrap();
    let limits = JointLimits::from_chain(&chain);
    let map = MimicMap::from_model(&model, &chain).unwrap();
    assert_eq!(map.reduced_dof(), 2);

    let lm = LevenbergMarquardt::with_defaults();
    let mut solver = JlMimicSolver::new(&chain, &limits, &chain, &lm, IkConfig::default()).unwrap();
    solver.set_mimic_map(map).unwrap();

    // a in [-1, 1] and b = 2a + 0.1 in [-2, 2]  =>  a in [-1, 0.95]
    let reduced = solver.reduced_limits().unwrap();
    assert_relative_eq!(reduced.lower()[0], -1.0);
    assert_relative_eq!(reduced.upper()[0], 0.95, epsilon = 1e-12);

    let goal = solver.mimic_map().unwrap().expand(&[0.3, 0.2]).unwrap();
    let target = chain.forward_kinematics(&goal);
    let solution = solver.cart_to_jnt(&[0.25, 0.6, 0.15], &target).unwrap();

    let q = &solution.joint_positions;
    assert_relative_eq!(q[1], 2.0 * q[0] + 0.1, epsilon = 1e-9);
    let reached = chain.forward_kinematics(q);
    assert_relative_eq!(
        reached.translation.vector,
        target.translation.vector,
        epsilon = 1e-5
    );
    assert!(limits.obeys(q));
}

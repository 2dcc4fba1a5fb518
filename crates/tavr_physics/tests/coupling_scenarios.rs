// crates/tavr_physics/tests/coupling_scenarios.rs

//! 流固耦合端到端场景
//!
//! 直管 Poiseuille 流、求解器发散、取消与续算、执行后端一致性、
//! 瓣膜植入后的完整流程。

use std::f64::consts::PI;
use std::sync::Arc;

use tavr_config::{AnalysisConfig, SimulationParameters};
use tavr_foundation::error::TavrError;
use tavr_mesh::{PipeMeshBuilder, ValveBoundary, VascularMesh};
use tavr_physics::boundary::BoundaryConditionSet;
use tavr_physics::metrics::{self, MetricsError};
use tavr_physics::{
    deploy_selected, BackendKind, CancellationToken, CouplingController, ExecutionBackend,
    FailureKind, ResidualSource, RunCheckpoint, RunResult, RunStatus,
};

// ============================================================
// 测试辅助设施
// ============================================================

fn pipe() -> VascularMesh {
    PipeMeshBuilder::new(0.002, 0.02)
        .with_resolution(10, 4, 12)
        .build()
        .unwrap()
}

/// 直管恒定流量：R = 2 mm，Q = 1 mL/s，牛顿流体
fn poiseuille_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.fluid.blood_viscosity_model = "newtonian".into();
    config.fluid.newtonian_viscosity = 0.0035;
    config.simulation.time_step = 0.01;
    config.simulation.cycle_duration = 0.5;
    config.simulation.simulation_cycles = 3;
    config.simulation.convergence_residual = 1e-4;
    config.simulation.max_iterations = 1000;
    config.simulation.relaxation_factor = 0.7;
    config.boundary.inlet_waveform = "constant".into();
    config.boundary.inlet_flow_rate = 1.0e-6;
    config
}

fn short_config() -> AnalysisConfig {
    let mut config = poiseuille_config();
    config.simulation.cycle_duration = 0.1;
    config.simulation.simulation_cycles = 2;
    config.boundary.inlet_waveform = "physiological".into();
    config.boundary.inlet_flow_rate = 1.0e-6;
    config
}

fn controller(config: &AnalysisConfig, mesh: VascularMesh) -> CouplingController {
    let params = Arc::new(SimulationParameters::from_config(config).unwrap());
    let boundaries = BoundaryConditionSet::from_parameters(&params);
    CouplingController::new(params, Arc::new(mesh), boundaries).unwrap()
}

fn run(config: &AnalysisConfig, mesh: VascularMesh) -> RunResult {
    controller(config, mesh).run(&CancellationToken::new())
}

fn max_relative_difference(a: &[f64], b: &[f64]) -> f64 {
    let scale = a.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / scale)
        .fold(0.0, f64::max)
}

// ============================================================
// Poiseuille
// ============================================================

#[test]
fn test_poiseuille_scenario_completes() {
    let config = poiseuille_config();
    let c = controller(&config, pipe());
    let domain = Arc::clone(c.domain());
    let result = c.run(&CancellationToken::new());

    assert_eq!(result.status, RunStatus::Completed, "failure: {:?}", result.failure);
    assert_eq!(result.checkpoint.step, 150);
    assert_eq!(result.history.len(), 150);

    let state = &result.checkpoint.state;
    let sections = domain.sections();
    let mut checked = 0;
    for v in 0..domain.mesh().node_count() {
        if domain.wall_tag(v).is_some() {
            continue;
        }
        let s = sections.section_of(v);
        let r = state.sections.radius[s];
        let u_max = 2.0 * 1.0e-6 / (PI * r * r);
        let xi = sections.radial(v) / sections.section(s).reference_radius;
        let exact = u_max * (1.0 - xi * xi);
        let u = state.velocity[v].dot(sections.axis());
        assert!(
            (u - exact).abs() <= 0.05 * u_max,
            "node {}: u = {:.5}, exact = {:.5}",
            v,
            u,
            exact
        );
        checked += 1;
    }
    assert!(checked > 0);
}

#[test]
fn test_zero_relaxation_rejected() {
    let mut config = poiseuille_config();
    config.simulation.relaxation_factor = 0.0;
    let err = SimulationParameters::from_config(&config).unwrap_err();
    assert!(matches!(err, TavrError::InvalidConfiguration { .. }), "{:?}", err);
}

#[test]
fn test_unknown_outlet_type_fails_at_setup() {
    let mut config = poiseuille_config();
    config.boundary.outlet_bc_type = "resistance".into();
    let err = SimulationParameters::from_config(&config).unwrap_err();
    assert!(matches!(err, TavrError::InvalidBoundaryType { .. }), "{:?}", err);
}

// ============================================================
// 收敛性质
// ============================================================

#[test]
fn test_residuals_non_increasing_within_step() {
    let mut config = AnalysisConfig::default();
    config.simulation.time_step = 0.01;
    config.simulation.cycle_duration = 0.4;
    config.simulation.simulation_cycles = 1;
    let mesh = PipeMeshBuilder::new(0.012, 0.06)
        .with_resolution(12, 3, 12)
        .build()
        .unwrap();
    let result = run(&config, mesh);
    assert!(result.is_completed(), "failure: {:?}", result.failure);

    let mut multi_iteration_steps = 0;
    for step in 0..40 {
        let combined: Vec<f64> = result
            .record
            .for_step(step)
            .filter(|e| e.source == ResidualSource::Coupling && e.accepted)
            .map(|e| e.combined)
            .collect();
        assert!(!combined.is_empty(), "step {} has no accepted entries", step);
        if combined.len() > 1 {
            multi_iteration_steps += 1;
        }
        for pair in combined.windows(2) {
            assert!(
                pair[1] <= pair[0] * (1.0 + 1e-9),
                "step {}: residual rose {:e} -> {:e}",
                step,
                pair[0],
                pair[1]
            );
        }
    }
    assert!(multi_iteration_steps > 0);
}

#[test]
fn test_fluid_divergence_fails_with_capped_record() {
    let mut config = poiseuille_config();
    config.fluid.newtonian_viscosity = 0.0;
    config.simulation.max_iterations = 40;

    // 完全闭塞的瓣口
    let mut mesh = pipe();
    mesh.install_valve(ValveBoundary {
        stented_sections: vec![],
        frame_radius: vec![],
        leaflet_section: 5,
        orifice_radius: 0.0,
        contact_nodes: vec![],
        contact_pressure: vec![],
    })
    .unwrap();

    let result = run(&config, mesh);
    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::FluidDivergence);
    assert_eq!(failure.step, 0);
    assert!(failure.to_string().contains("流体求解器"));

    let retried = result.record.for_attempt(0, 2).count();
    assert_eq!(retried, 40);
    assert_eq!(result.record.len(), 2 * 40);
    assert!(result
        .record
        .entries()
        .iter()
        .all(|e| !e.accepted && e.source == ResidualSource::FluidSolver));
    assert!(result.history.is_empty());
}

// ============================================================
// 取消、续算与后端
// ============================================================

#[test]
fn test_cancel_then_resume_matches_full_run() {
    let config = short_config();
    let full = run(&config, pipe());
    assert!(full.is_completed());

    let token = CancellationToken::new();
    let trigger = token.clone();
    let partial = controller(&config, pipe())
        .with_progress(move |p| {
            if p.step == 7 {
                trigger.cancel();
            }
        })
        .run(&token);
    assert!(partial.is_cancelled());
    assert_eq!(partial.status, RunStatus::Failed);
    assert_eq!(partial.checkpoint.step, 7);
    assert_eq!(partial.history.len(), 7);

    let mut resumed = controller(&config, pipe());
    resumed.resume(partial.checkpoint.clone()).unwrap();
    let rest = resumed.run(&CancellationToken::new());
    assert!(rest.is_completed());
    assert_eq!(rest.history.len(), full.history.len() - 7);

    let mut history = partial.history.clone();
    history.extend(rest.history.clone()).unwrap();
    assert_eq!(history.len(), full.history.len());

    let a = &full.checkpoint.state.sections;
    let b = &rest.checkpoint.state.sections;
    assert!(max_relative_difference(&a.pressure, &b.pressure) < 1e-10);
    assert!(max_relative_difference(&a.displacement, &b.displacement) < 1e-10);
    assert!((full.windkessel.stored_pressure - rest.windkessel.stored_pressure).abs() < 1e-8);
}

#[test]
fn test_checkpoint_file_resumes_run() {
    let config = short_config();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let partial = controller(&config, pipe())
        .with_progress(move |p| {
            if p.step == 4 {
                trigger.cancel();
            }
        })
        .run(&token);
    assert!(partial.is_cancelled());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    std::fs::write(&path, serde_json::to_string(&partial.checkpoint).unwrap()).unwrap();
    let loaded: RunCheckpoint =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.step, 4);

    let mut resumed = controller(&config, pipe());
    resumed.resume(loaded).unwrap();
    let rest = resumed.run(&CancellationToken::new());
    assert!(rest.is_completed(), "failure: {:?}", rest.failure);
    assert_eq!(rest.checkpoint.step, 20);
    assert_eq!(rest.history.len(), 16);
}

#[test]
fn test_accelerated_backend_matches_cpu() {
    let config = short_config();
    let cpu = controller(&config, pipe())
        .with_backend(ExecutionBackend::with_kind(BackendKind::Cpu))
        .run(&CancellationToken::new());

    let mut accelerated_config = config.clone();
    accelerated_config.execution.gpu = true;
    let c = controller(&accelerated_config, pipe());
    let accelerated = c.run(&CancellationToken::new());

    assert!(cpu.is_completed() && accelerated.is_completed());
    let a = &cpu.checkpoint.state;
    let b = &accelerated.checkpoint.state;
    assert!(max_relative_difference(&a.sections.pressure, &b.sections.pressure) < 1e-8);
    for (u, v) in a.velocity.iter().zip(&b.velocity) {
        assert!((*u - *v).length() < 1e-8);
    }
}

// ============================================================
// 植入 + 耦合 + 指标
// ============================================================

#[test]
fn test_deployed_valve_pipeline() {
    let mut config = AnalysisConfig::default();
    config.simulation.time_step = 0.01;
    config.simulation.cycle_duration = 0.2;
    config.simulation.simulation_cycles = 2;
    let params = SimulationParameters::from_config(&config).unwrap();

    let mut mesh = PipeMeshBuilder::aortic_root(0.012, 0.06)
        .with_resolution(16, 3, 12)
        .build()
        .unwrap();
    let valve = deploy_selected(&mut mesh, &params).unwrap();

    let params = Arc::new(params);
    let boundaries = BoundaryConditionSet::from_parameters(&params);
    let c = CouplingController::new(Arc::clone(&params), Arc::new(mesh), boundaries).unwrap();
    let domain = Arc::clone(c.domain());
    let result = c.run(&CancellationToken::new());
    assert!(result.is_completed(), "failure: {:?}", result.failure);
    assert!(result.history.snapshots().iter().any(|s| s.valve_closed));
    assert!(result.history.snapshots().iter().any(|s| !s.valve_closed));
    assert!(result.history.snapshots().iter().any(|s| s.frame_stress > 0.0));

    let report = metrics::evaluate(&result.history, &domain, &params, Some(&valve)).unwrap();
    assert_eq!(report.window.snapshots, 20);
    assert!(report.gradient.peak_mmhg > 0.0);
    assert!(report.leak.is_some());
    assert!(report.valve_function.is_some());
    assert_eq!(report.coronary.len(), 2);
    assert!(report.stress.max_von_mises > 0.0);
    assert!(report.wall_shear.max_tawss > 0.0);
}

#[test]
fn test_single_cycle_rejected_by_warmup_policy() {
    let mut config = short_config();
    config.simulation.simulation_cycles = 1;
    let params = SimulationParameters::from_config(&config).unwrap();
    let c = controller(&config, pipe());
    let domain = Arc::clone(c.domain());
    let result = c.run(&CancellationToken::new());
    assert!(result.is_completed());

    let err = metrics::evaluate(&result.history, &domain, &params, None).unwrap_err();
    assert!(matches!(err, MetricsError::InsufficientCycles { available: 1, .. }));

    config.postprocess.discard_warmup_cycle = false;
    let params = SimulationParameters::from_config(&config).unwrap();
    let report = metrics::evaluate(&result.history, &domain, &params, None).unwrap();
    assert_eq!(report.window.snapshots, 10);
}

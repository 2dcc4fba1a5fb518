// crates/tavr_workflow/tests/service.rs

//! 求解服务端到端测试：本地线程服务与 JSON 回环远程客户端

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tavr_config::AnalysisConfig;
use tavr_foundation::TavrError;
use tavr_mesh::{PipeMeshBuilder, VascularMesh};
use tavr_physics::{FailureKind, RunStatus};
use tavr_workflow::{
    service_for, AnalysisRequest, JobStatus, LocalSolverService, LoopbackTransport,
    RemoteSolverClient, SolverServer, SolverService, WorkflowError, WorkflowEvent,
};

// ============================================================
// 测试辅助设施
// ============================================================

const TIMEOUT: Duration = Duration::from_secs(300);

fn pipe() -> VascularMesh {
    PipeMeshBuilder::new(0.002, 0.02)
        .with_resolution(10, 4, 12)
        .build()
        .unwrap()
}

fn aortic_root() -> VascularMesh {
    PipeMeshBuilder::aortic_root(0.012, 0.06)
        .with_resolution(16, 3, 12)
        .build()
        .unwrap()
}

/// 两个 0.1 s 心动周期，共 20 步
fn short_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.fluid.blood_viscosity_model = "newtonian".into();
    config.fluid.newtonian_viscosity = 0.0035;
    config.simulation.time_step = 0.01;
    config.simulation.cycle_duration = 0.1;
    config.simulation.simulation_cycles = 2;
    config.boundary.inlet_flow_rate = 1.0e-6;
    config
}

fn native_request(name: &str) -> AnalysisRequest {
    AnalysisRequest::new(name, short_config(), pipe()).without_valve()
}

/// 记录事件名称
fn record_events(service: &LocalSolverService) -> Arc<Mutex<Vec<WorkflowEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    service
        .events()
        .add_fn_listener("recorder", move |e| sink.lock().push(e.clone()));
    events
}

/// 终止事件在状态写入之后发出，等待它到达监听器
fn wait_for_event(events: &Mutex<Vec<WorkflowEvent>>, name: &str) {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if events.lock().iter().any(|e| e.name() == name) {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("event {} never arrived", name);
}

fn max_relative_difference(a: &[f64], b: &[f64]) -> f64 {
    let scale = a.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / scale)
        .fold(0.0, f64::max)
}

// ============================================================
// 本地服务
// ============================================================

#[test]
fn test_local_job_lifecycle() {
    let service = LocalSolverService::new();
    let events = record_events(&service);

    let id = service.submit(native_request("native")).unwrap();
    let snapshot = service.wait(id, TIMEOUT).unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed, "{:?}", snapshot.message);
    assert_eq!(snapshot.name, "native");
    assert_eq!(snapshot.progress.step, 20);
    assert_eq!(snapshot.progress.total_steps, 20);
    assert_eq!(snapshot.progress.fraction(), 1.0);
    assert!(snapshot.started_at.is_some() && snapshot.finished_at.is_some());

    let report = service.result(id).unwrap().unwrap();
    assert!(report.is_completed());
    assert_eq!(report.history.len(), 20);
    assert!(report.metrics.is_some());

    wait_for_event(&events, "JobCompleted");
    let events = events.lock();
    assert_eq!(events.first().map(|e| e.name()), Some("JobSubmitted"));
    assert!(events.iter().all(|e| e.job_id() == id));
    let progress = events.iter().filter(|e| e.name() == "JobProgress").count();
    assert_eq!(progress, 20);
    let started = events.iter().position(|e| e.name() == "JobStarted").unwrap();
    let first_progress = events.iter().position(|e| e.name() == "JobProgress").unwrap();
    assert!(started < first_progress);
    assert!(!events.iter().any(|e| e.name() == "ValveDeployed"));
}

#[test]
fn test_deployed_valve_job_reports_leak() {
    let mut config = short_config();
    config.simulation.cycle_duration = 0.2;

    let service = LocalSolverService::new();
    let events = record_events(&service);
    let id = service
        .submit(AnalysisRequest::new("tavr", config, aortic_root()))
        .unwrap();
    let snapshot = service.wait(id, TIMEOUT).unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed, "{:?}", snapshot.message);

    let report = service.result(id).unwrap().unwrap();
    let valve = report.valve.as_ref().unwrap();
    assert!(valve.orifice_radius > 0.0);
    let metrics = report.metrics.as_ref().unwrap();
    assert!(metrics.leak.is_some());
    assert_eq!(metrics.coronary.len(), 2);

    wait_for_event(&events, "JobCompleted");
    let deployed = events
        .lock()
        .iter()
        .find_map(|e| match e {
            WorkflowEvent::ValveDeployed { orifice_radius, .. } => Some(*orifice_radius),
            _ => None,
        })
        .unwrap();
    assert_eq!(deployed, valve.orifice_radius);
}

#[test]
fn test_setup_error_rejected_at_submit() {
    let mut config = short_config();
    config.valve.selected_size = 25;
    let service = LocalSolverService::new();

    let err = service
        .submit(AnalysisRequest::new("bad-size", config.clone(), aortic_root()))
        .unwrap_err();
    assert!(
        matches!(err, WorkflowError::Simulation(TavrError::InvalidSize { requested: 25, .. })),
        "{:?}",
        err
    );
    assert!(service.list().is_empty());

    config.valve.selected_size = 26;
    config.simulation.relaxation_factor = 1.5;
    let err = service
        .submit(AnalysisRequest::new("bad-omega", config, aortic_root()))
        .unwrap_err();
    let back: TavrError = err.into();
    assert!(back.is_setup_error());
}

#[test]
fn test_deployment_divergence_fails_job() {
    let mut config = short_config();
    config.deployment.optimization_iterations = 1;
    let service = LocalSolverService::new();
    let events = record_events(&service);

    let id = service
        .submit(AnalysisRequest::new("stuck", config, aortic_root()))
        .unwrap();
    let snapshot = service.wait(id, TIMEOUT).unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.message.as_deref().unwrap_or("").contains("瓣膜植入不收敛"));
    assert!(service.result(id).unwrap().is_none());

    wait_for_event(&events, "JobFailed");
    assert!(!events.lock().iter().any(|e| e.name() == "JobProgress"));
}

#[test]
fn test_cancel_keeps_partial_results() {
    let service = LocalSolverService::new();
    let canceller = service.clone();
    service.events().add_fn_listener("cancel-at-5", move |e| {
        if let WorkflowEvent::JobProgress { job_id, progress } = e {
            if progress.step == 5 {
                canceller.cancel(*job_id).unwrap();
            }
        }
    });

    let id = service.submit(native_request("cancelled")).unwrap();
    let snapshot = service.wait(id, TIMEOUT).unwrap();
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert_eq!(snapshot.progress.step, 5);
    assert!(snapshot.message.is_some());

    let report = service.result(id).unwrap().unwrap();
    assert!(report.is_cancelled());
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure.as_ref().unwrap().kind, FailureKind::Cancelled);
    assert_eq!(report.history.len(), 5);
    assert!(report.metrics.is_none());

    let err = service.cancel(id).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidState {
            status: JobStatus::Cancelled,
            ..
        }
    ));
}

// ============================================================
// 远程
// ============================================================

#[test]
fn test_remote_client_matches_local_service() {
    let local = LocalSolverService::new();
    let local_id = local.submit(native_request("local")).unwrap();
    local.wait(local_id, TIMEOUT).unwrap();
    let local_report = local.result(local_id).unwrap().unwrap();

    let server = Arc::new(SolverServer::new(LocalSolverService::new()));
    let client = RemoteSolverClient::new(LoopbackTransport::new(Arc::clone(&server)));
    let remote_id = client.submit(native_request("remote")).unwrap();
    let snapshot = client.wait(remote_id, TIMEOUT).unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(server.service().list().len(), 1);

    let remote_report = client.result(remote_id).unwrap().unwrap();
    assert_eq!(remote_report.name, "remote");
    assert_eq!(remote_report.status, local_report.status);
    assert_eq!(remote_report.history.len(), local_report.history.len());
    assert_eq!(remote_report.record.len(), local_report.record.len());
    let a = &local_report.checkpoint.state.sections;
    let b = &remote_report.checkpoint.state.sections;
    assert!(max_relative_difference(&a.pressure, &b.pressure) < 1e-12);
    assert!(max_relative_difference(&a.displacement, &b.displacement) < 1e-12);

    let err = client.cancel(remote_id).unwrap_err();
    assert!(
        matches!(
            err,
            WorkflowError::InvalidState {
                status: JobStatus::Completed,
                ..
            }
        ),
        "{:?}",
        err
    );
}

#[test]
fn test_remote_setup_error_keeps_its_kind() {
    let mut config = short_config();
    config.valve.selected_size = 25;
    let request = AnalysisRequest::new("bad-size", config.clone(), aortic_root());

    let local_err = LocalSolverService::new()
        .submit(request.clone())
        .unwrap_err();

    let server = Arc::new(SolverServer::default());
    let client = RemoteSolverClient::new(LoopbackTransport::new(Arc::clone(&server)));
    let remote_err = client.submit(request).unwrap_err();
    assert_eq!(remote_err.to_string(), local_err.to_string());
    assert!(server.service().list().is_empty());

    let remote: TavrError = remote_err.into();
    assert!(
        matches!(remote, TavrError::InvalidSize { requested: 25, .. }),
        "{:?}",
        remote
    );
    assert!(remote.is_setup_error());

    config.valve.selected_size = 26;
    config.simulation.relaxation_factor = 0.0;
    let err = client
        .submit(AnalysisRequest::new("bad-omega", config, aortic_root()))
        .unwrap_err();
    assert!(
        matches!(
            err,
            WorkflowError::Simulation(TavrError::InvalidConfiguration { ref key, .. })
                if key == "simulation.relaxation_factor"
        ),
        "{:?}",
        err
    );
}

#[test]
fn test_service_selection_follows_execution_settings() {
    let mut config = short_config();
    config.execution.remote_solver_enabled = true;
    let params = tavr_config::SimulationParameters::from_config(&config).unwrap();

    let (service, local) = service_for(params.execution());
    let id = service
        .submit(AnalysisRequest::new("routed", config, pipe()).without_valve())
        .unwrap();
    assert_eq!(service.wait(id, TIMEOUT).unwrap().status, JobStatus::Completed);
    assert_eq!(local.list().len(), 1);
    assert_eq!(local.poll(id).unwrap().name, "routed");
}

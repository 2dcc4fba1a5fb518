// crates/tavr_config/tests/config_files.rs

//! 配置文件读写与验证集成测试

use tavr_config::{AnalysisConfig, ConfigError, SimulationParameters};
use tavr_foundation::TavrError;

// ============================================================
// 文件往返
// ============================================================

#[test]
fn test_save_and_reload_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("analysis.json");

    let mut config = AnalysisConfig::default();
    config.simulation.time_step = 0.002;
    config.valve.selected_size = 23;
    config.boundary.wall_bc_type = "rigid".into();
    config.save_to_file(&path).unwrap();

    let loaded = AnalysisConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);

    let params = SimulationParameters::from_config(&loaded).unwrap();
    assert_eq!(params.valve().selected_size, 23);
    assert_eq!(params.time().steps_per_cycle(), 400);
}

#[test]
fn test_missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();

    let err = AnalysisConfig::from_file(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ not json").unwrap();
    let err = AnalysisConfig::from_file(&bad).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

// ============================================================
// INI 配置到参数快照
// ============================================================

#[test]
fn test_ini_to_parameters() {
    let ini = r#"
[simulation]
time_step = 0.01
cycle_duration = 0.5
simulation_cycles = 3
convergence_residual = 1e-4
max_iterations = 1000
relaxation_factor = 0.7

[boundary]
inlet_waveform = constant
inlet_flow_rate = 1e-6
"#;
    let config = AnalysisConfig::from_ini_str(ini).unwrap();
    let params = SimulationParameters::from_config(&config).unwrap();
    assert_eq!(params.time().total_steps(), 150);
    assert_eq!(params.convergence().max_iterations, 1000);
}

#[test]
fn test_ini_zero_relaxation_rejected_at_construction() {
    let config = AnalysisConfig::from_ini_str("[simulation]\nrelaxation_factor = 0\n").unwrap();
    let err = SimulationParameters::from_config(&config).unwrap_err();
    match err {
        TavrError::InvalidConfiguration { key, value, .. } => {
            assert_eq!(key, "simulation.relaxation_factor");
            assert_eq!(value, "0");
        }
        other => panic!("期望 InvalidConfiguration, 实际 {:?}", other),
    }
}

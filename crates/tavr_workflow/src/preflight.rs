// crates/tavr_workflow/src/preflight.rs

//! 提交前检查
//!
//! 把配置与网格的全部问题收集进一个 [`ValidationReport`]，不在第一个错误处返回。
//! 错误对应 `submit` 时会被拒绝的请求，警告不影响运行。

use tavr_config::SimulationParameters;
use tavr_foundation::validation::{check_range, warn_if_high};
use tavr_foundation::{ValidationError, ValidationReport, ValidationWarning};
use tavr_mesh::SectionMap;

use crate::analysis::AnalysisRequest;

/// 每个心动周期建议的最少时间步数
pub const MIN_STEPS_PER_CYCLE: f64 = 50.0;

/// 成人主动脉瓣环半径的合理范围 [m]
const ANNULUS_RADIUS_RANGE: (f64, f64) = (0.005, 0.02);

/// 检查一个分析请求
pub fn preflight(request: &AnalysisRequest) -> ValidationReport {
    let mut report = ValidationReport::new();

    let params = match SimulationParameters::from_config(&request.config) {
        Ok(params) => Some(params),
        Err(e) => {
            report.add_error(ValidationError::Custom {
                message: e.to_string(),
            });
            None
        }
    };

    if let Some(params) = &params {
        report.merge(check_parameters(params, request.deploy_valve));
    }
    report.merge(check_mesh(request, params.as_ref()));
    report
}

fn check_parameters(params: &SimulationParameters, deploy_valve: bool) -> ValidationReport {
    let mut report = ValidationReport::new();
    let time = params.time();
    warn_if_high(
        &mut report,
        "simulation.time_step",
        0,
        time.time_step,
        time.cycle_duration / MIN_STEPS_PER_CYCLE,
    );

    let averaging = params.postprocess().averaging;
    if time.simulation_cycles < averaging.required_cycles() {
        report.add_warning(ValidationWarning::Custom {
            message: format!(
                "平均窗口 {:?} 需要至少 {} 个周期，当前 {} 个，指标将无法计算",
                averaging,
                averaging.required_cycles(),
                time.simulation_cycles
            ),
        });
    }

    if deploy_valve {
        let valve = params.valve();
        if let Err(e) = valve.catalog.entry(valve.selected_size) {
            report.add_error(ValidationError::Custom {
                message: e.to_string(),
            });
        }
    }
    report
}

fn check_mesh(request: &AnalysisRequest, params: Option<&SimulationParameters>) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mesh = &request.mesh;
    if request.deploy_valve && mesh.valve().is_some() {
        report.add_error(ValidationError::Topology {
            message: "网格上已安装瓣膜边界".into(),
            element_id: None,
        });
    }

    let axial_sections = params.and_then(|p| p.execution().axial_sections);
    let sections = match SectionMap::build(mesh, axial_sections) {
        Ok(sections) => sections,
        Err(e) => {
            report.add_error(ValidationError::Topology {
                message: e.to_string(),
                element_id: None,
            });
            return report;
        }
    };

    let annulus = sections.annulus_section();
    check_range(
        &mut report,
        "annulus_radius",
        annulus,
        sections.section(annulus).reference_radius,
        ANNULUS_RADIUS_RANGE.0,
        ANNULUS_RADIUS_RANGE.1,
    );

    if request.deploy_valve && sections.coronary_ostia().is_empty() {
        report.add_warning(ValidationWarning::Quality {
            message: "网格没有冠脉开口，冠脉阻塞风险不会被评估".into(),
            element_id: None,
        });
    }
    report
}

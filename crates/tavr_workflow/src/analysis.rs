// crates/tavr_workflow/src/analysis.rs

//! 单次分析流水线：植入 → 耦合 → 指标
//!
//! 建立阶段错误（配置、瓣膜尺寸、网格）在 [`Analysis::prepare`] 中立即返回；
//! 植入不收敛作为致命错误从 [`Analysis::execute`] 返回；耦合阶段的失败与
//! 取消不是错误，而是 `RunReport` 中带部分结果的终止状态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use tavr_config::{AnalysisConfig, SimulationParameters};
use tavr_foundation::{TavrError, TavrResult};
use tavr_mesh::VascularMesh;
use tavr_physics::metrics;
use tavr_physics::{
    deploy_selected, BoundaryConditionSet, CancellationToken, ConvergenceRecord,
    CouplingController, DeployedValveGeometry, FieldHistory, HemodynamicReport, RunCheckpoint,
    RunFailure, RunStatus, StepProgress,
};

/// 分析请求：原始配置 + 患者网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// 任务名称
    pub name: String,
    /// 原始配置
    pub config: AnalysisConfig,
    /// 血管网格
    pub mesh: VascularMesh,
    /// 是否在耦合前植入选定的瓣膜
    pub deploy_valve: bool,
}

impl AnalysisRequest {
    /// 创建请求（默认植入瓣膜）
    pub fn new(name: impl Into<String>, config: AnalysisConfig, mesh: VascularMesh) -> Self {
        Self {
            name: name.into(),
            config,
            mesh,
            deploy_valve: true,
        }
    }

    /// 只做原生血管的耦合计算
    pub fn without_valve(mut self) -> Self {
        self.deploy_valve = false;
        self
    }
}

/// 分析报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// 任务名称
    pub name: String,
    /// 耦合运行的终止状态
    pub status: RunStatus,
    /// 失败诊断
    pub failure: Option<RunFailure>,
    /// 植入结果
    pub valve: Option<DeployedValveGeometry>,
    /// 血流动力学指标（仅完成的运行）
    pub metrics: Option<HemodynamicReport>,
    /// 指标无法计算的原因
    pub metrics_error: Option<String>,
    /// 场历史
    pub history: FieldHistory,
    /// 收敛记录
    pub record: ConvergenceRecord,
    /// 续算检查点
    pub checkpoint: RunCheckpoint,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// 是否正常完成
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// 是否因取消而终止
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.failure, Some(f) if f.kind == tavr_physics::FailureKind::Cancelled)
    }

    /// 已提交的时间步数
    pub fn completed_steps(&self) -> usize {
        self.checkpoint.step
    }

    /// 运行时长 [s]
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// 保存为 JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> TavrResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TavrError::serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 从 JSON 文件读取
    pub fn from_file<P: AsRef<Path>>(path: P) -> TavrResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| TavrError::serialization(e.to_string()))
    }
}

/// 已通过建立阶段校验的分析
#[derive(Debug)]
pub struct Analysis {
    name: String,
    params: Arc<SimulationParameters>,
    mesh: VascularMesh,
    deploy_valve: bool,
}

impl Analysis {
    /// 校验配置并检查瓣膜尺寸
    pub fn prepare(request: AnalysisRequest) -> TavrResult<Self> {
        let params = SimulationParameters::from_config(&request.config)?;
        if request.deploy_valve {
            let valve = params.valve();
            valve.catalog.entry(valve.selected_size)?;
            if request.mesh.valve().is_some() {
                return Err(TavrError::invalid_mesh("网格上已安装瓣膜边界"));
            }
        }
        Ok(Self {
            name: request.name,
            params: Arc::new(params),
            mesh: request.mesh,
            deploy_valve: request.deploy_valve,
        })
    }

    /// 任务名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已验证的参数
    pub fn params(&self) -> &Arc<SimulationParameters> {
        &self.params
    }

    /// 在当前线程上运行，不可取消
    pub fn run_local(self) -> TavrResult<RunReport> {
        self.execute(&CancellationToken::new(), |_| {}, |_| {})
    }

    /// 运行流水线
    ///
    /// `on_deployed` 在植入完成后调用一次，`progress` 在每个已提交时间步后调用。
    pub fn execute<D, P>(
        self,
        cancel: &CancellationToken,
        on_deployed: D,
        progress: P,
    ) -> TavrResult<RunReport>
    where
        D: FnOnce(&DeployedValveGeometry),
        P: FnMut(&StepProgress) + Send + 'static,
    {
        let started_at = Utc::now();
        let Self {
            name,
            params,
            mut mesh,
            deploy_valve,
        } = self;

        let valve = if deploy_valve {
            let geometry = deploy_selected(&mut mesh, &params)?;
            info!(
                analysis = %name,
                orifice_mm = geometry.orifice_radius * 1.0e3,
                iterations = geometry.iterations(),
                "瓣膜植入完成"
            );
            on_deployed(&geometry);
            Some(geometry)
        } else {
            None
        };

        let boundaries = BoundaryConditionSet::from_parameters(&params);
        let controller = CouplingController::new(Arc::clone(&params), Arc::new(mesh), boundaries)?
            .with_progress(progress);
        let domain = Arc::clone(controller.domain());
        let result = controller.run(cancel);

        let (report, metrics_error) = if result.is_completed() {
            match metrics::evaluate(&result.history, &domain, &params, valve.as_ref()) {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!(analysis = %name, error = %e, "血流动力学指标无法计算");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        Ok(RunReport {
            name,
            status: result.status,
            failure: result.failure,
            valve,
            metrics: report,
            metrics_error,
            history: result.history,
            record: result.record,
            checkpoint: result.checkpoint,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

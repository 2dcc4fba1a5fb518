// apps/tavr_cli/src/commands/run.rs

//! 运行分析命令
//!
//! 植入 → 耦合 → 指标，经由 `tavr_workflow` 的求解服务执行。
//! `execution.remote_solver_enabled` 为真时请求通过 JSON 报文边界传递。

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tavr_config::SimulationParameters;
use tavr_foundation::units::pa_to_mmhg;
use tavr_workflow::{service_for, AnalysisRequest, JobStatus, LoggingListener, RunReport};

use super::InputArgs;

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// 结果文件
    #[arg(short, long, default_value = "result.json")]
    pub output: PathBuf,

    /// 任务名称
    #[arg(long, default_value = "tavr-analysis")]
    pub name: String,

    /// 最长等待时间 [s]
    #[arg(long, default_value = "86400")]
    pub timeout: u64,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== TAVR-FSI 分析启动 ===");

    let config = args.input.load_config()?;
    let mesh = args.input.load_mesh()?;
    let params = SimulationParameters::from_config(&config).context("配置无效")?;
    info!(
        steps = params.time().total_steps(),
        dt = params.time().time_step,
        cycles = params.time().simulation_cycles,
        valve = %params.valve().valve_type(),
        size_mm = params.valve().selected_size,
        remote = params.execution().remote_solver_enabled,
        "模拟参数"
    );

    let mut request = AnalysisRequest::new(args.name.clone(), config, mesh);
    if args.input.no_valve {
        request = request.without_valve();
    }

    let (service, local) = service_for(params.execution());
    local.events().add_listener(Arc::new(LoggingListener));

    let id = service.submit(request).context("分析请求被拒绝")?;
    let snapshot = service
        .wait(id, Duration::from_secs(args.timeout))
        .context("等待分析结果失败")?;
    let report = service.result(id)?;

    if let Some(report) = &report {
        report
            .save_to_file(&args.output)
            .with_context(|| format!("无法写入结果文件 {}", args.output.display()))?;
        info!(path = %args.output.display(), "结果已保存");
        print_summary(report);
    }

    match snapshot.status {
        JobStatus::Completed => {
            info!("=== 分析完成 ===");
            Ok(())
        }
        JobStatus::Cancelled => {
            warn!("分析被取消，已保存部分结果");
            Ok(())
        }
        status => bail!(
            "分析以 {} 状态结束: {}",
            status,
            snapshot.message.unwrap_or_default()
        ),
    }
}

fn print_summary(report: &RunReport) {
    println!("=== 分析结果: {} ===", report.name);
    println!("状态: {:?}", report.status);
    println!("已提交时间步: {}", report.completed_steps());
    println!("耦合迭代记录: {}", report.record.len());
    println!("运行时长: {:.2} s", report.duration_secs());

    if let Some(failure) = &report.failure {
        println!("诊断: {}", failure);
    }

    if let Some(valve) = &report.valve {
        let entry = &valve.valve.entry;
        println!("\n瓣膜: {} {} mm", entry.valve_type, entry.size_mm);
        println!("  瓣口半径: {:.2} mm", valve.orifice_radius * 1.0e3);
        println!("  植入迭代: {}", valve.iterations());
    }

    let Some(metrics) = &report.metrics else {
        if let Some(reason) = &report.metrics_error {
            println!("\n指标未计算: {}", reason);
        }
        return;
    };

    println!(
        "\n平均窗口: {:.3} s ({} 个快照)",
        metrics.window.duration(),
        metrics.window.snapshots
    );
    println!(
        "跨瓣压差: 峰值 {:.1} mmHg, 平均 {:.1} mmHg",
        metrics.gradient.peak_mmhg, metrics.gradient.mean_mmhg
    );
    if let Some(eoa) = metrics.gradient.effective_orifice_area {
        println!("有效瓣口面积: {:.2} cm²", eoa);
    }
    println!(
        "最大流速: {:.2} m/s, 峰值雷诺数: {:.0}",
        metrics.flow.max_velocity, metrics.flow.peak_reynolds
    );
    println!(
        "TAWSS: 最大 {:.2} Pa, 平均 {:.2} Pa, 低剪切比例 {:.1}%",
        metrics.wall_shear.max_tawss,
        metrics.wall_shear.mean_tawss,
        metrics.wall_shear.low_wss_fraction() * 100.0
    );
    if let Some(leak) = &metrics.leak {
        println!(
            "瓣周漏: {} ({:.1}%, {} 个扇区超阈值)",
            leak.grade.label(),
            leak.leak_fraction * 100.0,
            leak.flagged_sectors()
        );
    }
    for risk in &metrics.coronary {
        println!(
            "冠脉 {:?}: 高度 {:.1} mm, 风险 {:.0}% ({:?})",
            risk.side,
            risk.height * 1.0e3,
            risk.risk_percent,
            risk.category
        );
    }
    println!(
        "最大 von Mises 应力: {:.1} kPa (集中系数 {:.2})",
        metrics.stress.max_von_mises / 1.0e3,
        metrics.stress.concentration_factor
    );
    if let Some(state) = report.history.last() {
        let outlet = state.sections.pressure.last().copied().unwrap_or_default();
        println!("末时刻出口压力: {:.1} mmHg", pa_to_mmhg(outlet));
    }
}

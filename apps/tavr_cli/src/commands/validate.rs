// apps/tavr_cli/src/commands/validate.rs

//! 配置与网格检查命令

use anyhow::{bail, Result};
use clap::Args;
use tracing::{error, info, warn};

use tavr_foundation::ValidationReport;
use tavr_workflow::{preflight, AnalysisRequest};

use super::InputArgs;

/// 检查参数
#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 执行检查命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== TAVR-FSI 配置检查 ===");

    let config = args.input.load_config()?;
    let mesh = args.input.load_mesh()?;
    let mut request = AnalysisRequest::new("validate", config, mesh);
    if args.input.no_valve {
        request = request.without_valve();
    }

    let report = preflight(&request);
    print_report(&report, args.strict)
}

fn print_report(report: &ValidationReport, strict: bool) -> Result<()> {
    println!("\n=== 检查结果 ===");

    if report.has_errors() {
        println!("\n错误 ({}):", report.error_count());
        for err in &report.errors {
            error!("{}", err);
            println!("  ✗ {}", err);
        }
    }

    if report.has_warnings() {
        println!("\n警告 ({}):", report.warning_count());
        for warning in &report.warnings {
            warn!("{}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    let success = report.is_valid() && (!strict || !report.has_warnings());
    if success {
        println!("\n✓ 检查通过");
        Ok(())
    } else {
        println!("\n✗ 检查失败");
        bail!(
            "检查失败：发现 {} 个错误，{} 个警告",
            report.error_count(),
            report.warning_count()
        )
    }
}

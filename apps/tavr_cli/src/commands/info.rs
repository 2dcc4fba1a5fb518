// apps/tavr_cli/src/commands/info.rs

//! 信息显示命令

use anyhow::Result;
use clap::Args;
use tracing::info;

use tavr_config::valve::NOMINAL_SIZES;
use tavr_config::{AnalysisConfig, SimulationParameters, ValveCatalog, ValveType};

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 只显示瓣膜目录
    #[arg(long)]
    pub valves: bool,

    /// 以 JSON 输出默认配置
    #[arg(long)]
    pub defaults_json: bool,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== TAVR-FSI 信息 ===");

    if args.defaults_json {
        println!("{}", serde_json::to_string_pretty(&AnalysisConfig::default())?);
        return Ok(());
    }

    print_valve_catalog()?;
    if !args.valves {
        println!();
        print_defaults()?;
    }
    Ok(())
}

fn print_valve_catalog() -> Result<()> {
    println!("=== 瓣膜目录 ===");
    for name in ValveType::NAMES {
        let valve_type: ValveType = name.parse()?;
        let catalog = ValveCatalog::new(valve_type, NOMINAL_SIZES.to_vec())?;
        println!("{} ({})", valve_type, name);
        for &size in catalog.sizes() {
            let entry = catalog.entry(size)?;
            println!(
                "  {} mm: 公称半径 {:.1} mm, 支架高度 {:.1} mm",
                size,
                entry.nominal_radius * 1.0e3,
                entry.frame_height * 1.0e3
            );
        }
    }
    Ok(())
}

fn print_defaults() -> Result<()> {
    println!("=== 默认参数 ===");
    println!("TAVR-FSI CLI 版本: {}", env!("CARGO_PKG_VERSION"));

    let params = SimulationParameters::from_config(&AnalysisConfig::default())?;
    let time = params.time();
    println!(
        "时间步长: {} s, 心动周期: {} s, 周期数: {} (共 {} 步)",
        time.time_step,
        time.cycle_duration,
        time.simulation_cycles,
        time.total_steps()
    );
    let convergence = params.convergence();
    println!(
        "收敛残差: {:e}, 每步最大迭代: {}, 松弛因子: {}",
        convergence.residual, convergence.max_iterations, convergence.relaxation_factor
    );
    let fluid = params.fluid();
    println!("血液密度: {} kg/m³", fluid.density);
    println!(
        "选定瓣膜: {} {} mm",
        params.valve().valve_type(),
        params.valve().selected_size
    );
    println!("平均窗口: {:?}", params.postprocess().averaging);
    Ok(())
}

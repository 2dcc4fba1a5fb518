// apps/tavr_cli/src/main.rs

//! TAVR-FSI 命令行界面
//!
//! 本模块属于 **Layer 5: Application**：只负责参数解析、日志初始化与结果输出，
//! 计算全部委托给 `tavr_workflow` 的求解服务。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// 经导管主动脉瓣置换流固耦合分析工具
#[derive(Parser)]
#[command(name = "tavr_cli")]
#[command(author = "TAVR-FSI Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "TAVR fluid-structure interaction analysis", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 植入瓣膜并运行耦合分析
    Run(commands::run::RunArgs),
    /// 检查配置与网格
    Validate(commands::validate::ValidateArgs),
    /// 显示瓣膜目录与默认参数
    Info(commands::info::InfoArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Info(args) => commands::info::execute(args),
    }
}

// apps/tavr_cli/src/commands/mod.rs

//! 子命令与共用的输入加载

pub mod info;
pub mod run;
pub mod validate;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

use tavr_config::AnalysisConfig;
use tavr_mesh::{PipeMeshBuilder, VascularMesh};

/// 演示网格的瓣环半径 [m]
const DEMO_ANNULUS_RADIUS: f64 = 0.012;
/// 演示网格长度 [m]
const DEMO_LENGTH: f64 = 0.06;

/// 配置与网格输入
#[derive(Args)]
pub struct InputArgs {
    /// 配置文件（.json 或 .ini），缺省时使用默认参数
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 网格文件（JSON）
    #[arg(short, long, conflicts_with = "demo_pipe")]
    pub mesh: Option<PathBuf>,

    /// 使用内置的主动脉根部演示网格
    #[arg(long)]
    pub demo_pipe: bool,

    /// 不植入瓣膜，只计算原生血管
    #[arg(long)]
    pub no_valve: bool,
}

impl InputArgs {
    /// 读取配置
    pub fn load_config(&self) -> Result<AnalysisConfig> {
        match &self.config {
            Some(path) => load_config_file(path),
            None => {
                info!("未指定配置文件，使用默认参数");
                Ok(AnalysisConfig::default())
            }
        }
    }

    /// 读取网格
    pub fn load_mesh(&self) -> Result<VascularMesh> {
        if let Some(path) = &self.mesh {
            let mesh = VascularMesh::from_file(path)
                .with_context(|| format!("无法读取网格文件 {}", path.display()))?;
            info!(
                nodes = mesh.node_count(),
                elements = mesh.element_count(),
                "网格已加载"
            );
            return Ok(mesh);
        }
        if self.demo_pipe {
            let mesh = PipeMeshBuilder::aortic_root(DEMO_ANNULUS_RADIUS, DEMO_LENGTH)
                .build()
                .context("无法生成演示网格")?;
            info!(nodes = mesh.node_count(), "使用演示网格");
            return Ok(mesh);
        }
        bail!("需要 --mesh <文件> 或 --demo-pipe")
    }
}

fn load_config_file(path: &Path) -> Result<AnalysisConfig> {
    let is_ini = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ini"));
    let config = if is_ini {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        AnalysisConfig::from_ini_str(&content)?
    } else {
        AnalysisConfig::from_file(path)?
    };
    info!(path = %path.display(), "配置已加载");
    Ok(config)
}

// crates/tavr_config/src/analysis_config.rs

//! AnalysisConfig - 原始分析配置
//!
//! 与 INI 配置文件的节一一对应，所有字段均带 serde 默认值，允许部分配置。
//! 本结构只做语法层面的解析，数值范围和类型字符串的检查统一在
//! [`SimulationParameters::from_config`](crate::SimulationParameters::from_config) 中完成。
//!
//! 支持三种来源：
//!
//! - JSON 文件（[`AnalysisConfig::from_file`]）
//! - 节限定的扁平键值对（[`AnalysisConfig::from_key_values`]，如 `"fluid.blood_density" -> "1060"`）
//! - INI 文本（[`AnalysisConfig::from_ini_str`]）

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;

/// 分析配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    /// 血液流变参数
    #[serde(default)]
    pub fluid: FluidSection,
    /// 血管壁材料参数
    #[serde(default)]
    pub structure: StructureSection,
    /// 瓣膜目录与材料
    #[serde(default)]
    pub valve: ValveSection,
    /// 植入参数
    #[serde(default)]
    pub deployment: DeploymentSection,
    /// 时间步进与收敛控制
    #[serde(default)]
    pub simulation: SimulationSection,
    /// 边界条件选择
    #[serde(default)]
    pub boundary: BoundarySection,
    /// 后处理阈值
    #[serde(default)]
    pub postprocess: PostprocessSection,
    /// 执行选项
    #[serde(default)]
    pub execution: ExecutionSection,
}

// ============================================================================
// fluid
// ============================================================================

/// 血液流变参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluidSection {
    /// 血液密度 [kg/m³]
    #[serde(default = "default_blood_density")]
    pub blood_density: f64,
    /// 粘度模型（"newtonian" | "carreau"）
    #[serde(default = "default_viscosity_model")]
    pub blood_viscosity_model: String,
    /// 牛顿粘度 [Pa·s]
    #[serde(default = "default_newtonian_viscosity")]
    pub newtonian_viscosity: f64,
    /// Carreau 零剪切粘度 [Pa·s]
    #[serde(default = "default_carreau_mu_zero")]
    pub carreau_mu_zero: f64,
    /// Carreau 无穷剪切粘度 [Pa·s]
    #[serde(default = "default_carreau_mu_infinity")]
    pub carreau_mu_infinity: f64,
    /// Carreau 松弛时间 [s]
    #[serde(default = "default_carreau_lambda")]
    pub carreau_lambda: f64,
    /// Carreau 幂指数
    #[serde(default = "default_carreau_power_index")]
    pub carreau_power_index: f64,
}

fn default_blood_density() -> f64 { 1060.0 }
fn default_viscosity_model() -> String { "carreau".into() }
fn default_newtonian_viscosity() -> f64 { 0.0035 }
fn default_carreau_mu_zero() -> f64 { 0.056 }
fn default_carreau_mu_infinity() -> f64 { 0.00345 }
fn default_carreau_lambda() -> f64 { 3.313 }
fn default_carreau_power_index() -> f64 { 0.3568 }

impl Default for FluidSection {
    fn default() -> Self {
        Self {
            blood_density: default_blood_density(),
            blood_viscosity_model: default_viscosity_model(),
            newtonian_viscosity: default_newtonian_viscosity(),
            carreau_mu_zero: default_carreau_mu_zero(),
            carreau_mu_infinity: default_carreau_mu_infinity(),
            carreau_lambda: default_carreau_lambda(),
            carreau_power_index: default_carreau_power_index(),
        }
    }
}

// ============================================================================
// structure
// ============================================================================

/// 血管壁材料参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSection {
    /// 动脉壁弹性模量 [Pa]
    #[serde(default = "default_wall_modulus")]
    pub arterial_wall_modulus: f64,
    /// 钙化组织弹性模量 [Pa]
    #[serde(default = "default_calcification_modulus")]
    pub calcification_modulus: f64,
    /// 壁厚 [m]
    #[serde(default = "default_wall_thickness")]
    pub wall_thickness: f64,
    /// 轴向预拉伸
    #[serde(default = "default_axial_prestretch")]
    pub axial_prestretch: f64,
    /// 外部（组织）压力 [Pa]
    #[serde(default)]
    pub external_pressure: f64,
}

fn default_wall_modulus() -> f64 { 2.0e6 }
fn default_calcification_modulus() -> f64 { 6.0e7 }
fn default_wall_thickness() -> f64 { 2.0e-3 }
fn default_axial_prestretch() -> f64 { 0.1 }

impl Default for StructureSection {
    fn default() -> Self {
        Self {
            arterial_wall_modulus: default_wall_modulus(),
            calcification_modulus: default_calcification_modulus(),
            wall_thickness: default_wall_thickness(),
            axial_prestretch: default_axial_prestretch(),
            external_pressure: 0.0,
        }
    }
}

// ============================================================================
// valve
// ============================================================================

/// 瓣膜目录与材料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveSection {
    /// 瓣膜类型（"sapien3" | "corevalve" | "acurate"）
    #[serde(default = "default_valve_type")]
    pub valve_type: String,
    /// 可用尺寸 [mm]
    #[serde(default = "default_available_sizes")]
    pub available_sizes: Vec<u32>,
    /// 选定尺寸 [mm]
    #[serde(default = "default_selected_size")]
    pub selected_size: u32,
    /// 支架材料弹性模量 [Pa]
    #[serde(default = "default_frame_modulus")]
    pub frame_modulus: f64,
    /// 瓣叶材料弹性模量 [Pa]
    #[serde(default = "default_leaflet_modulus")]
    pub leaflet_modulus: f64,
    /// 支架丝径 [m]
    #[serde(default = "default_frame_thickness")]
    pub frame_thickness: f64,
    /// 瓣叶厚度 [m]
    #[serde(default = "default_leaflet_thickness")]
    pub leaflet_thickness: f64,
    /// 支架金属覆盖率
    #[serde(default = "default_frame_coverage")]
    pub frame_coverage: f64,
}

fn default_valve_type() -> String { "sapien3".into() }
fn default_available_sizes() -> Vec<u32> { vec![20, 23, 26, 29] }
fn default_selected_size() -> u32 { 26 }
fn default_frame_modulus() -> f64 { 2.33e11 }
fn default_leaflet_modulus() -> f64 { 5.0e6 }
fn default_frame_thickness() -> f64 { 5.0e-4 }
fn default_leaflet_thickness() -> f64 { 3.0e-4 }
fn default_frame_coverage() -> f64 { 0.12 }

impl Default for ValveSection {
    fn default() -> Self {
        Self {
            valve_type: default_valve_type(),
            available_sizes: default_available_sizes(),
            selected_size: default_selected_size(),
            frame_modulus: default_frame_modulus(),
            leaflet_modulus: default_leaflet_modulus(),
            frame_thickness: default_frame_thickness(),
            leaflet_thickness: default_leaflet_thickness(),
            frame_coverage: default_frame_coverage(),
        }
    }
}

// ============================================================================
// deployment
// ============================================================================

/// 植入参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSection {
    /// 植入方式（目前仅 "balloon"）
    #[serde(default = "default_deployment_method")]
    pub deployment_method: String,
    /// 压握比
    #[serde(default = "default_crimping_ratio")]
    pub crimping_ratio: f64,
    /// 优化迭代次数（松弛预算为其 10 倍）
    #[serde(default = "default_optimization_iterations")]
    pub optimization_iterations: usize,
    /// 扩张载荷增量数
    #[serde(default = "default_expansion_increments")]
    pub expansion_increments: usize,
    /// 植入深度（瓣环以下的支架长度）[m]
    #[serde(default = "default_implantation_depth")]
    pub implantation_depth: f64,
}

fn default_deployment_method() -> String { "balloon".into() }
fn default_crimping_ratio() -> f64 { 0.3 }
fn default_optimization_iterations() -> usize { 100 }
fn default_expansion_increments() -> usize { 20 }
fn default_implantation_depth() -> f64 { 3.0e-3 }

impl Default for DeploymentSection {
    fn default() -> Self {
        Self {
            deployment_method: default_deployment_method(),
            crimping_ratio: default_crimping_ratio(),
            optimization_iterations: default_optimization_iterations(),
            expansion_increments: default_expansion_increments(),
            implantation_depth: default_implantation_depth(),
        }
    }
}

// ============================================================================
// simulation
// ============================================================================

/// 时间步进与收敛控制
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSection {
    /// 时间步长 [s]
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// 心动周期 [s]
    #[serde(default = "default_cycle_duration")]
    pub cycle_duration: f64,
    /// 模拟周期数
    #[serde(default = "default_simulation_cycles")]
    pub simulation_cycles: usize,
    /// 收敛残差
    #[serde(default = "default_convergence_residual")]
    pub convergence_residual: f64,
    /// 每步最大迭代次数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 松弛因子
    #[serde(default = "default_relaxation_factor")]
    pub relaxation_factor: f64,
    /// 场历史记录间隔 [步]
    #[serde(default = "default_output_frequency")]
    pub output_frequency: usize,
}

fn default_time_step() -> f64 { 1.0e-3 }
fn default_cycle_duration() -> f64 { 0.8 }
fn default_simulation_cycles() -> usize { 3 }
fn default_convergence_residual() -> f64 { 1.0e-4 }
fn default_max_iterations() -> usize { 1000 }
fn default_relaxation_factor() -> f64 { 0.7 }
fn default_output_frequency() -> usize { 1 }

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            time_step: default_time_step(),
            cycle_duration: default_cycle_duration(),
            simulation_cycles: default_simulation_cycles(),
            convergence_residual: default_convergence_residual(),
            max_iterations: default_max_iterations(),
            relaxation_factor: default_relaxation_factor(),
            output_frequency: default_output_frequency(),
        }
    }
}

// ============================================================================
// boundary
// ============================================================================

/// 边界条件选择
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySection {
    /// 入口边界类型
    #[serde(default = "default_inlet_bc_type")]
    pub inlet_bc_type: String,
    /// 入口波形（"constant" | "physiological" | "sampled"）
    #[serde(default = "default_inlet_waveform")]
    pub inlet_waveform: String,
    /// 恒定流量或平均流量 [m³/s]
    #[serde(default = "default_inlet_flow_rate")]
    pub inlet_flow_rate: f64,
    /// 收缩期占周期比例
    #[serde(default = "default_systolic_fraction")]
    pub systolic_fraction: f64,
    /// 生理波形的傅里叶谐波数
    #[serde(default = "default_waveform_harmonics")]
    pub waveform_harmonics: usize,
    /// 采样波形 `[t, Q]` 对
    #[serde(default)]
    pub inlet_samples: Vec<[f64; 2]>,
    /// 出口边界类型
    #[serde(default = "default_outlet_bc_type")]
    pub outlet_bc_type: String,
    /// Windkessel 近端阻力 [Pa·s/m³]
    #[serde(default = "default_wk_rp")]
    pub windkessel_proximal_resistance: f64,
    /// Windkessel 远端阻力 [Pa·s/m³]
    #[serde(default = "default_wk_rd")]
    pub windkessel_distal_resistance: f64,
    /// Windkessel 顺应性 [m³/Pa]
    #[serde(default = "default_wk_c")]
    pub windkessel_compliance: f64,
    /// Windkessel 初始储存压力 [Pa]
    #[serde(default = "default_wk_p0")]
    pub windkessel_initial_pressure: f64,
    /// 静脉回流压力 [Pa]
    #[serde(default)]
    pub venous_pressure: f64,
    /// 壁面边界类型（"elastic" | "rigid"）
    #[serde(default = "default_wall_bc_type")]
    pub wall_bc_type: String,
}

fn default_inlet_bc_type() -> String { "flow_waveform".into() }
fn default_inlet_waveform() -> String { "physiological".into() }
fn default_inlet_flow_rate() -> f64 { 8.33e-5 }
fn default_systolic_fraction() -> f64 { 0.35 }
fn default_waveform_harmonics() -> usize { 24 }
fn default_outlet_bc_type() -> String { "windkessel".into() }
fn default_wk_rp() -> f64 { 6.7e6 }
fn default_wk_rd() -> f64 { 1.33e8 }
fn default_wk_c() -> f64 { 1.13e-8 }
fn default_wk_p0() -> f64 { 10666.0 }
fn default_wall_bc_type() -> String { "elastic".into() }

impl Default for BoundarySection {
    fn default() -> Self {
        Self {
            inlet_bc_type: default_inlet_bc_type(),
            inlet_waveform: default_inlet_waveform(),
            inlet_flow_rate: default_inlet_flow_rate(),
            systolic_fraction: default_systolic_fraction(),
            waveform_harmonics: default_waveform_harmonics(),
            inlet_samples: Vec::new(),
            outlet_bc_type: default_outlet_bc_type(),
            windkessel_proximal_resistance: default_wk_rp(),
            windkessel_distal_resistance: default_wk_rd(),
            windkessel_compliance: default_wk_c(),
            windkessel_initial_pressure: default_wk_p0(),
            venous_pressure: 0.0,
            wall_bc_type: default_wall_bc_type(),
        }
    }
}

// ============================================================================
// postprocess
// ============================================================================

/// 后处理阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostprocessSection {
    /// 瓣周漏扇区数
    #[serde(default = "default_leak_regions")]
    pub leak_regions: usize,
    /// 瓣周漏角度分辨率 [deg]
    #[serde(default = "default_leak_angle_resolution")]
    pub leak_angle_resolution: f64,
    /// 瓣周漏速度阈值 [m/s]
    #[serde(default = "default_leak_threshold_velocity")]
    pub leak_threshold_velocity: f64,
    /// 窦管交界高度阈值 [m]
    #[serde(default = "default_sov_height_threshold")]
    pub sov_height_threshold: f64,
    /// 瓣膜-冠脉距离阈值 [m]
    #[serde(default = "default_vtc_distance_threshold")]
    pub vtc_distance_threshold: f64,
    /// 是否丢弃首个（预热）周期
    #[serde(default = "default_discard_warmup_cycle")]
    pub discard_warmup_cycle: bool,
    /// 左心室舒张压 [Pa]
    #[serde(default = "default_lv_diastolic_pressure")]
    pub ventricular_diastolic_pressure: f64,
}

fn default_leak_regions() -> usize { 4 }
fn default_leak_angle_resolution() -> f64 { 5.0 }
fn default_leak_threshold_velocity() -> f64 { 1.0 }
fn default_sov_height_threshold() -> f64 { 10.0e-3 }
fn default_vtc_distance_threshold() -> f64 { 4.0e-3 }
fn default_discard_warmup_cycle() -> bool { true }
fn default_lv_diastolic_pressure() -> f64 { 1333.0 }

impl Default for PostprocessSection {
    fn default() -> Self {
        Self {
            leak_regions: default_leak_regions(),
            leak_angle_resolution: default_leak_angle_resolution(),
            leak_threshold_velocity: default_leak_threshold_velocity(),
            sov_height_threshold: default_sov_height_threshold(),
            vtc_distance_threshold: default_vtc_distance_threshold(),
            discard_warmup_cycle: default_discard_warmup_cycle(),
            ventricular_diastolic_pressure: default_lv_diastolic_pressure(),
        }
    }
}

// ============================================================================
// execution
// ============================================================================

/// 执行选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// 工作线程数（0 = 自动）
    #[serde(default)]
    pub threads: usize,
    /// GPU 加速提示
    #[serde(default)]
    pub gpu: bool,
    /// 是否通过远程服务执行
    #[serde(default)]
    pub remote_solver_enabled: bool,
    /// 每个截面的径向单元数
    #[serde(default = "default_radial_cells")]
    pub radial_cells: usize,
    /// 轴向截面数（None = 按网格平面自动聚类）
    #[serde(default)]
    pub axial_sections: Option<usize>,
}

fn default_radial_cells() -> usize { 16 }

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            threads: 0,
            gpu: false,
            remote_solver_enabled: false,
            radial_cells: default_radial_cells(),
            axial_sections: None,
        }
    }
}

// ============================================================================
// 加载与保存
// ============================================================================

impl AnalysisConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串解析
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 保存配置到 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 从节限定的扁平键值对构建，未给出的键取默认值
    ///
    /// 键格式为 `section.key`。值按默认值的 JSON 类型解析：数值、布尔、
    /// 字符串，列表既可写成 JSON 数组也可写成逗号分隔列表。
    pub fn from_key_values<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// 从 INI 文本构建
    ///
    /// `[section]` 开启一节，`key = value` 为键值对，`#` 或 `;` 开头的行为注释。
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut section: Option<String> = None;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Some(name.trim().to_string());
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ConfigError::Parse(format!("第 {} 行缺少 '=': {}", lineno + 1, line))
            })?;
            let section = section.as_deref().ok_or_else(|| {
                ConfigError::Parse(format!("第 {} 行位于任何节之前", lineno + 1))
            })?;
            config.set(&format!("{}.{}", section, key.trim()), value.trim())?;
        }
        Ok(config)
    }

    /// 设置单个 `section.key` 值
    pub fn set(&mut self, qualified_key: &str, raw: &str) -> Result<(), ConfigError> {
        let (section, key) = qualified_key
            .split_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(qualified_key.to_string()))?;

        let mut tree =
            serde_json::to_value(&*self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let slot = tree
            .get_mut(section)
            .and_then(|s| s.get_mut(key))
            .ok_or_else(|| ConfigError::UnknownKey(qualified_key.to_string()))?;

        *slot = parse_like(slot, raw)
            .ok_or_else(|| ConfigError::invalid(qualified_key, raw, "类型不匹配"))?;

        *self = serde_json::from_value(tree)
            .map_err(|e| ConfigError::invalid(qualified_key, raw, e.to_string()))?;
        debug!(key = qualified_key, value = raw, "配置项已设置");
        Ok(())
    }
}

/// 按模板值的 JSON 类型解析原始字符串
fn parse_like(template: &Value, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match template {
        Value::Bool(_) => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Number(_) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_number),
        Value::String(_) => Some(Value::String(unquote(raw).to_string())),
        Value::Array(_) => {
            if raw.starts_with('[') {
                serde_json::from_str::<Value>(raw).ok().filter(Value::is_array)
            } else if raw.is_empty() {
                Some(Value::Array(Vec::new()))
            } else {
                raw.split(',')
                    .map(|item| serde_json::from_str::<Value>(item.trim()).ok())
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
            }
        }
        // Option 字段：空值或 none 表示未设置
        Value::Null => match raw.to_ascii_lowercase().as_str() {
            "" | "none" | "null" | "auto" => Some(Value::Null),
            _ => serde_json::from_str::<Value>(raw).ok(),
        },
        Value::Object(_) => serde_json::from_str::<Value>(raw).ok().filter(Value::is_object),
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw)
}

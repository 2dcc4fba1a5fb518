// crates/tavr_config/src/parameters.rs

//! SimulationParameters - 已验证的不可变参数快照
//!
//! [`SimulationParameters::from_config`] 是整个系统唯一的验证入口：
//! 范围错误返回 `InvalidConfiguration`，未知边界类型返回 `InvalidBoundaryType`。
//! 构建成功后所有字段只读，通过 `Arc<SimulationParameters>` 在各组件间共享，
//! 重新运行需要构建新的快照。
//!
//! 边界条件类型字符串在这里一次性解析为封闭枚举，运行期间不再做字符串比较。

use serde::{Deserialize, Serialize};
use tracing::debug;

use tavr_foundation::error::{TavrError, TavrResult};

use crate::analysis_config::AnalysisConfig;
use crate::valve::{ValveCatalog, ValveMaterial, ValveType};

// ============================================================================
// 流体
// ============================================================================

/// 粘度模型
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ViscosityModel {
    /// 牛顿流体
    Newtonian {
        /// 动力粘度 [Pa·s]
        viscosity: f64,
    },
    /// Carreau 剪切稀化模型
    ///
    /// `μ(γ̇) = μ∞ + (μ0 − μ∞)·[1 + (λγ̇)²]^((n−1)/2)`
    Carreau {
        /// 零剪切粘度 [Pa·s]
        mu_zero: f64,
        /// 无穷剪切粘度 [Pa·s]
        mu_infinity: f64,
        /// 松弛时间 [s]
        lambda: f64,
        /// 幂指数
        power_index: f64,
    },
}

impl ViscosityModel {
    /// 配置中使用的模型字符串
    pub const NAMES: [&'static str; 2] = ["newtonian", "carreau"];

    /// 给定剪切率下的表观粘度 [Pa·s]
    #[inline]
    pub fn viscosity(&self, shear_rate: f64) -> f64 {
        match *self {
            Self::Newtonian { viscosity } => viscosity,
            Self::Carreau {
                mu_zero,
                mu_infinity,
                lambda,
                power_index,
            } => {
                let lg = lambda * shear_rate.abs();
                mu_infinity
                    + (mu_zero - mu_infinity) * (1.0 + lg * lg).powf((power_index - 1.0) / 2.0)
            }
        }
    }

    /// 是否与剪切率相关（需要 Picard 迭代）
    pub fn is_shear_dependent(&self) -> bool {
        matches!(self, Self::Carreau { .. })
    }

    /// 零剪切粘度（初始猜测）
    pub fn zero_shear_viscosity(&self) -> f64 {
        self.viscosity(0.0)
    }
}

/// 流体属性
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FluidProperties {
    /// 血液密度 [kg/m³]
    pub density: f64,
    /// 粘度模型
    pub viscosity: ViscosityModel,
}

// ============================================================================
// 结构
// ============================================================================

/// 血管壁属性
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WallProperties {
    /// 动脉壁弹性模量 [Pa]
    pub wall_modulus: f64,
    /// 钙化组织弹性模量 [Pa]
    pub calcification_modulus: f64,
    /// 壁厚 [m]
    pub thickness: f64,
    /// 轴向预拉伸
    pub axial_prestretch: f64,
    /// 外部压力 [Pa]
    pub external_pressure: f64,
}

/// 瓣膜设置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValveSettings {
    /// 目录
    pub catalog: ValveCatalog,
    /// 选定尺寸 [mm]（植入时才校验是否在目录中）
    pub selected_size: u32,
    /// 材料
    pub material: ValveMaterial,
}

impl ValveSettings {
    /// 瓣膜类型
    pub fn valve_type(&self) -> ValveType {
        self.catalog.valve_type()
    }
}

// ============================================================================
// 植入
// ============================================================================

/// 植入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMethod {
    /// 球囊扩张
    Balloon,
}

impl DeploymentMethod {
    /// 支持的方式字符串
    pub const NAMES: [&'static str; 1] = ["balloon"];
}

/// 植入设置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeploymentSettings {
    /// 植入方式
    pub method: DeploymentMethod,
    /// 压握比
    pub crimping_ratio: f64,
    /// 优化迭代次数
    pub optimization_iterations: usize,
    /// 扩张载荷增量数
    pub expansion_increments: usize,
    /// 植入深度 [m]
    pub implantation_depth: f64,
}

impl DeploymentSettings {
    /// 力平衡松弛的总迭代预算
    pub fn iteration_budget(&self) -> usize {
        self.optimization_iterations * 10
    }
}

// ============================================================================
// 时间与收敛
// ============================================================================

/// 时间步进设置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSettings {
    /// 时间步长 [s]
    pub time_step: f64,
    /// 心动周期 [s]
    pub cycle_duration: f64,
    /// 模拟周期数
    pub simulation_cycles: usize,
    /// 场历史记录间隔 [步]
    pub output_frequency: usize,
}

impl TimeSettings {
    /// 每周期步数
    ///
    /// 构建时已检查整除，取整只消除浮点舍入。
    pub fn steps_per_cycle(&self) -> usize {
        ((self.cycle_duration / self.time_step).round() as usize).max(1)
    }

    /// 总步数
    pub fn total_steps(&self) -> usize {
        self.steps_per_cycle() * self.simulation_cycles
    }
}

/// 收敛设置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvergenceSettings {
    /// 收敛残差
    pub residual: f64,
    /// 每步最大迭代次数
    pub max_iterations: usize,
    /// 松弛因子 ∈ (0, 1]
    pub relaxation_factor: f64,
}

// ============================================================================
// 边界条件
// ============================================================================

/// 入口流量波形
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum InletWaveform {
    /// 恒定流量
    Constant {
        /// 流量 [m³/s]
        flow_rate: f64,
    },
    /// 生理波形：收缩期半正弦脉冲的傅里叶拟合
    Physiological {
        /// 周期平均流量 [m³/s]
        mean_flow: f64,
        /// 收缩期占周期比例
        systolic_fraction: f64,
        /// 谐波数
        harmonics: usize,
    },
    /// 采样波形（周期样条插值）
    Sampled {
        /// `(t, Q)` 采样点，首尾流量相同
        samples: Vec<(f64, f64)>,
    },
}

impl InletWaveform {
    /// 支持的波形字符串
    pub const NAMES: [&'static str; 3] = ["constant", "physiological", "sampled"];
}

/// 入口边界
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InletBoundary {
    /// 流量波形入口
    FlowWaveform(InletWaveform),
}

impl InletBoundary {
    /// 支持的类型字符串
    pub const NAMES: [&'static str; 1] = ["flow_waveform"];
}

/// 三元件 Windkessel 参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindkesselParameters {
    /// 近端阻力 Rp [Pa·s/m³]
    pub proximal_resistance: f64,
    /// 远端阻力 Rd [Pa·s/m³]
    pub distal_resistance: f64,
    /// 顺应性 C [m³/Pa]
    pub compliance: f64,
    /// 初始储存压力 [Pa]
    pub initial_pressure: f64,
    /// 静脉压 [Pa]
    pub venous_pressure: f64,
}

/// 出口边界
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OutletBoundary {
    /// Windkessel 出口
    Windkessel(WindkesselParameters),
}

impl OutletBoundary {
    /// 支持的类型字符串
    pub const NAMES: [&'static str; 1] = ["windkessel"];
}

/// 壁面边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WallBoundary {
    /// 弹性壁
    Elastic,
    /// 刚性壁（零位移）
    Rigid,
}

impl WallBoundary {
    /// 支持的类型字符串
    pub const NAMES: [&'static str; 2] = ["elastic", "rigid"];
}

/// 边界条件选择
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundarySelection {
    /// 入口
    pub inlet: InletBoundary,
    /// 出口
    pub outlet: OutletBoundary,
    /// 壁面
    pub wall: WallBoundary,
}

// ============================================================================
// 后处理与执行
// ============================================================================

/// 血流动力学指标的时间平均窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingWindow {
    /// 丢弃预热周期，只对最后一个完整周期求平均（要求至少 2 个周期）
    DiscardWarmup,
    /// 对全部已记录时间求平均
    AllCycles,
}

impl AveragingWindow {
    /// 计算指标所需的最少周期数
    pub fn required_cycles(&self) -> usize {
        match self {
            Self::DiscardWarmup => 2,
            Self::AllCycles => 1,
        }
    }
}

/// 后处理设置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PostprocessSettings {
    /// 瓣周漏扇区数
    pub leak_regions: usize,
    /// 瓣周漏角度分辨率 [deg]
    pub leak_angle_resolution: f64,
    /// 瓣周漏速度阈值 [m/s]
    pub leak_threshold_velocity: f64,
    /// 窦管交界高度阈值 [m]
    pub sov_height_threshold: f64,
    /// 瓣膜-冠脉距离阈值 [m]
    pub vtc_distance_threshold: f64,
    /// 平均窗口
    pub averaging: AveragingWindow,
    /// 左心室舒张压 [Pa]
    pub ventricular_diastolic_pressure: f64,
}

/// 执行设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionSettings {
    /// 工作线程数（0 = 自动）
    pub threads: usize,
    /// GPU 加速提示
    pub gpu: bool,
    /// 远程执行
    pub remote_solver_enabled: bool,
    /// 径向单元数
    pub radial_cells: usize,
    /// 轴向截面数
    pub axial_sections: Option<usize>,
}

// ============================================================================
// SimulationParameters
// ============================================================================

/// 已验证的模拟参数快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationParameters {
    fluid: FluidProperties,
    wall: WallProperties,
    valve: ValveSettings,
    deployment: DeploymentSettings,
    time: TimeSettings,
    convergence: ConvergenceSettings,
    boundary: BoundarySelection,
    postprocess: PostprocessSettings,
    execution: ExecutionSettings,
}

impl SimulationParameters {
    /// 从原始配置构建并验证
    pub fn from_config(config: &AnalysisConfig) -> TavrResult<Self> {
        let fluid = build_fluid(config)?;
        let wall = build_wall(config)?;
        let valve = build_valve(config)?;
        let deployment = build_deployment(config)?;
        let time = build_time(config)?;
        let convergence = build_convergence(config)?;
        let boundary = build_boundary(config, &time)?;
        let postprocess = build_postprocess(config)?;
        let execution = build_execution(config)?;

        let params = Self {
            fluid,
            wall,
            valve,
            deployment,
            time,
            convergence,
            boundary,
            postprocess,
            execution,
        };
        debug!(
            steps = params.time.total_steps(),
            omega = params.convergence.relaxation_factor,
            "模拟参数验证通过"
        );
        Ok(params)
    }

    /// 流体属性
    pub fn fluid(&self) -> &FluidProperties {
        &self.fluid
    }

    /// 血管壁属性
    pub fn wall(&self) -> &WallProperties {
        &self.wall
    }

    /// 瓣膜设置
    pub fn valve(&self) -> &ValveSettings {
        &self.valve
    }

    /// 植入设置
    pub fn deployment(&self) -> &DeploymentSettings {
        &self.deployment
    }

    /// 时间设置
    pub fn time(&self) -> &TimeSettings {
        &self.time
    }

    /// 收敛设置
    pub fn convergence(&self) -> &ConvergenceSettings {
        &self.convergence
    }

    /// 边界条件选择
    pub fn boundary(&self) -> &BoundarySelection {
        &self.boundary
    }

    /// 后处理设置
    pub fn postprocess(&self) -> &PostprocessSettings {
        &self.postprocess
    }

    /// 执行设置
    pub fn execution(&self) -> &ExecutionSettings {
        &self.execution
    }
}

// ============================================================================
// 验证辅助
// ============================================================================

/// `cycle_duration / time_step` 与整数的相对偏差上限
const STEP_DIVISIBILITY_TOLERANCE: f64 = 1e-6;

fn require(ok: bool, key: &str, value: impl ToString, reason: &str) -> TavrResult<()> {
    if ok {
        Ok(())
    } else {
        Err(TavrError::invalid_configuration(key, value, reason))
    }
}

fn positive(key: &str, v: f64) -> TavrResult<f64> {
    require(v > 0.0 && v.is_finite(), key, v, "必须为正的有限值")?;
    Ok(v)
}

fn non_negative(key: &str, v: f64) -> TavrResult<f64> {
    require(v >= 0.0 && v.is_finite(), key, v, "不能为负")?;
    Ok(v)
}

fn finite(key: &str, v: f64) -> TavrResult<f64> {
    require(v.is_finite(), key, v, "必须为有限值")?;
    Ok(v)
}

fn nonzero(key: &str, v: usize) -> TavrResult<usize> {
    require(v > 0, key, v, "必须大于 0")?;
    Ok(v)
}

fn normalized(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn build_fluid(config: &AnalysisConfig) -> TavrResult<FluidProperties> {
    let f = &config.fluid;
    let density = positive("fluid.blood_density", f.blood_density)?;

    let viscosity = match normalized(&f.blood_viscosity_model).as_str() {
        "newtonian" => ViscosityModel::Newtonian {
            viscosity: non_negative("fluid.newtonian_viscosity", f.newtonian_viscosity)?,
        },
        "carreau" => {
            let mu_zero = non_negative("fluid.carreau_mu_zero", f.carreau_mu_zero)?;
            let mu_infinity = non_negative("fluid.carreau_mu_infinity", f.carreau_mu_infinity)?;
            require(
                mu_zero >= mu_infinity,
                "fluid.carreau_mu_zero",
                mu_zero,
                "零剪切粘度不能小于无穷剪切粘度",
            )?;
            let lambda = non_negative("fluid.carreau_lambda", f.carreau_lambda)?;
            let power_index = f.carreau_power_index;
            require(
                power_index > 0.0 && power_index <= 1.0,
                "fluid.carreau_power_index",
                power_index,
                "必须在 (0, 1] 范围内",
            )?;
            ViscosityModel::Carreau {
                mu_zero,
                mu_infinity,
                lambda,
                power_index,
            }
        }
        other => {
            return Err(TavrError::invalid_configuration(
                "fluid.blood_viscosity_model",
                other,
                format!("支持的模型: {:?}", ViscosityModel::NAMES),
            ))
        }
    };

    Ok(FluidProperties { density, viscosity })
}

fn build_wall(config: &AnalysisConfig) -> TavrResult<WallProperties> {
    let s = &config.structure;
    Ok(WallProperties {
        wall_modulus: positive("structure.arterial_wall_modulus", s.arterial_wall_modulus)?,
        calcification_modulus: positive(
            "structure.calcification_modulus",
            s.calcification_modulus,
        )?,
        thickness: positive("structure.wall_thickness", s.wall_thickness)?,
        axial_prestretch: non_negative("structure.axial_prestretch", s.axial_prestretch)?,
        external_pressure: finite("structure.external_pressure", s.external_pressure)?,
    })
}

fn build_valve(config: &AnalysisConfig) -> TavrResult<ValveSettings> {
    let v = &config.valve;
    let valve_type: ValveType = v.valve_type.parse()?;
    let catalog = ValveCatalog::new(valve_type, v.available_sizes.clone())?;
    let coverage = v.frame_coverage;
    require(
        coverage > 0.0 && coverage <= 1.0,
        "valve.frame_coverage",
        coverage,
        "必须在 (0, 1] 范围内",
    )?;

    Ok(ValveSettings {
        catalog,
        selected_size: v.selected_size,
        material: ValveMaterial {
            frame_modulus: positive("valve.frame_modulus", v.frame_modulus)?,
            leaflet_modulus: positive("valve.leaflet_modulus", v.leaflet_modulus)?,
            frame_thickness: positive("valve.frame_thickness", v.frame_thickness)?,
            leaflet_thickness: positive("valve.leaflet_thickness", v.leaflet_thickness)?,
            frame_coverage: coverage,
        },
    })
}

fn build_deployment(config: &AnalysisConfig) -> TavrResult<DeploymentSettings> {
    let d = &config.deployment;
    let method = match normalized(&d.deployment_method).as_str() {
        "balloon" => DeploymentMethod::Balloon,
        other => {
            return Err(TavrError::invalid_configuration(
                "deployment.deployment_method",
                other,
                format!("支持的方式: {:?}", DeploymentMethod::NAMES),
            ))
        }
    };
    require(
        d.crimping_ratio > 0.0 && d.crimping_ratio < 1.0,
        "deployment.crimping_ratio",
        d.crimping_ratio,
        "必须在 (0, 1) 范围内",
    )?;

    Ok(DeploymentSettings {
        method,
        crimping_ratio: d.crimping_ratio,
        optimization_iterations: nonzero(
            "deployment.optimization_iterations",
            d.optimization_iterations,
        )?,
        expansion_increments: nonzero("deployment.expansion_increments", d.expansion_increments)?,
        implantation_depth: non_negative("deployment.implantation_depth", d.implantation_depth)?,
    })
}

fn build_time(config: &AnalysisConfig) -> TavrResult<TimeSettings> {
    let s = &config.simulation;
    let time_step = positive("simulation.time_step", s.time_step)?;
    let cycle_duration = positive("simulation.cycle_duration", s.cycle_duration)?;
    require(
        time_step <= cycle_duration,
        "simulation.time_step",
        time_step,
        "不能大于 cycle_duration",
    )?;

    // 步长必须整除周期，否则步时刻与入口波形相位逐周期漂移
    let ratio = cycle_duration / time_step;
    require(
        (ratio - ratio.round()).abs() <= STEP_DIVISIBILITY_TOLERANCE * ratio,
        "simulation.time_step",
        time_step,
        "cycle_duration 必须是 time_step 的整数倍",
    )?;

    Ok(TimeSettings {
        time_step,
        cycle_duration,
        simulation_cycles: nonzero("simulation.simulation_cycles", s.simulation_cycles)?,
        output_frequency: nonzero("simulation.output_frequency", s.output_frequency)?,
    })
}

fn build_convergence(config: &AnalysisConfig) -> TavrResult<ConvergenceSettings> {
    let s = &config.simulation;
    let omega = s.relaxation_factor;
    require(
        omega > 0.0 && omega <= 1.0,
        "simulation.relaxation_factor",
        omega,
        "必须在 (0, 1] 范围内",
    )?;

    Ok(ConvergenceSettings {
        residual: positive("simulation.convergence_residual", s.convergence_residual)?,
        max_iterations: nonzero("simulation.max_iterations", s.max_iterations)?,
        relaxation_factor: omega,
    })
}

fn build_boundary(config: &AnalysisConfig, time: &TimeSettings) -> TavrResult<BoundarySelection> {
    let b = &config.boundary;

    let inlet = match normalized(&b.inlet_bc_type).as_str() {
        "flow_waveform" => InletBoundary::FlowWaveform(build_waveform(config, time)?),
        _ => {
            return Err(TavrError::invalid_boundary_type(
                "inlet",
                b.inlet_bc_type.clone(),
                &InletBoundary::NAMES,
            ))
        }
    };

    let outlet = match normalized(&b.outlet_bc_type).as_str() {
        "windkessel" => OutletBoundary::Windkessel(WindkesselParameters {
            proximal_resistance: non_negative(
                "boundary.windkessel_proximal_resistance",
                b.windkessel_proximal_resistance,
            )?,
            distal_resistance: positive(
                "boundary.windkessel_distal_resistance",
                b.windkessel_distal_resistance,
            )?,
            compliance: positive("boundary.windkessel_compliance", b.windkessel_compliance)?,
            initial_pressure: finite(
                "boundary.windkessel_initial_pressure",
                b.windkessel_initial_pressure,
            )?,
            venous_pressure: finite("boundary.venous_pressure", b.venous_pressure)?,
        }),
        _ => {
            return Err(TavrError::invalid_boundary_type(
                "outlet",
                b.outlet_bc_type.clone(),
                &OutletBoundary::NAMES,
            ))
        }
    };

    let wall = match normalized(&b.wall_bc_type).as_str() {
        "elastic" => WallBoundary::Elastic,
        "rigid" => WallBoundary::Rigid,
        _ => {
            return Err(TavrError::invalid_boundary_type(
                "wall",
                b.wall_bc_type.clone(),
                &WallBoundary::NAMES,
            ))
        }
    };

    Ok(BoundarySelection {
        inlet,
        outlet,
        wall,
    })
}

fn build_waveform(config: &AnalysisConfig, time: &TimeSettings) -> TavrResult<InletWaveform> {
    let b = &config.boundary;
    match normalized(&b.inlet_waveform).as_str() {
        "constant" => Ok(InletWaveform::Constant {
            flow_rate: finite("boundary.inlet_flow_rate", b.inlet_flow_rate)?,
        }),
        "physiological" => {
            let fraction = b.systolic_fraction;
            require(
                fraction > 0.0 && fraction < 1.0,
                "boundary.systolic_fraction",
                fraction,
                "必须在 (0, 1) 范围内",
            )?;
            Ok(InletWaveform::Physiological {
                mean_flow: finite("boundary.inlet_flow_rate", b.inlet_flow_rate)?,
                systolic_fraction: fraction,
                harmonics: nonzero("boundary.waveform_harmonics", b.waveform_harmonics)?,
            })
        }
        "sampled" => {
            let samples: Vec<(f64, f64)> = b.inlet_samples.iter().map(|s| (s[0], s[1])).collect();
            check_periodic_samples(&samples, time.cycle_duration)?;
            Ok(InletWaveform::Sampled { samples })
        }
        // 波形是入口边界的子类型
        _ => Err(TavrError::invalid_boundary_type(
            "inlet waveform",
            b.inlet_waveform.clone(),
            &InletWaveform::NAMES,
        )),
    }
}

/// 采样波形必须覆盖整个周期 `[0, T]` 且首尾流量一致（闭合波形）
fn check_periodic_samples(samples: &[(f64, f64)], cycle_duration: f64) -> TavrResult<()> {
    const KEY: &str = "boundary.inlet_samples";

    require(samples.len() >= 3, KEY, samples.len(), "至少需要 3 个采样点")?;
    require(
        samples.iter().all(|(t, q)| t.is_finite() && q.is_finite()),
        KEY,
        "non-finite",
        "采样值必须有限",
    )?;
    require(
        samples.windows(2).all(|w| w[1].0 > w[0].0),
        KEY,
        "unsorted",
        "采样时间必须严格递增",
    )?;

    let time_tol = 1e-9 * cycle_duration;
    let (t0, q0) = samples[0];
    let (tn, qn) = samples[samples.len() - 1];
    require(t0.abs() <= time_tol, KEY, t0, "首个采样时间必须为 0")?;
    require(
        (tn - cycle_duration).abs() <= time_tol,
        KEY,
        tn,
        "末个采样时间必须等于 cycle_duration",
    )?;

    let scale = samples.iter().map(|(_, q)| q.abs()).fold(0.0, f64::max);
    require(
        (q0 - qn).abs() <= 1e-9 * scale.max(1e-30),
        KEY,
        format!("Q(0)={}, Q(T)={}", q0, qn),
        "波形不闭合：首尾流量必须相同",
    )?;
    Ok(())
}

fn build_postprocess(config: &AnalysisConfig) -> TavrResult<PostprocessSettings> {
    let p = &config.postprocess;
    require(
        p.leak_angle_resolution > 0.0 && p.leak_angle_resolution <= 360.0,
        "postprocess.leak_angle_resolution",
        p.leak_angle_resolution,
        "必须在 (0, 360] 范围内",
    )?;

    Ok(PostprocessSettings {
        leak_regions: nonzero("postprocess.leak_regions", p.leak_regions)?,
        leak_angle_resolution: p.leak_angle_resolution,
        leak_threshold_velocity: positive(
            "postprocess.leak_threshold_velocity",
            p.leak_threshold_velocity,
        )?,
        sov_height_threshold: positive("postprocess.sov_height_threshold", p.sov_height_threshold)?,
        vtc_distance_threshold: positive(
            "postprocess.vtc_distance_threshold",
            p.vtc_distance_threshold,
        )?,
        averaging: if p.discard_warmup_cycle {
            AveragingWindow::DiscardWarmup
        } else {
            AveragingWindow::AllCycles
        },
        ventricular_diastolic_pressure: finite(
            "postprocess.ventricular_diastolic_pressure",
            p.ventricular_diastolic_pressure,
        )?,
    })
}

fn build_execution(config: &AnalysisConfig) -> TavrResult<ExecutionSettings> {
    let e = &config.execution;
    require(
        e.radial_cells >= 4,
        "execution.radial_cells",
        e.radial_cells,
        "至少需要 4 个径向单元",
    )?;
    if let Some(n) = e.axial_sections {
        require(n >= 2, "execution.axial_sections", n, "至少需要 2 个截面")?;
    }

    Ok(ExecutionSettings {
        threads: e.threads,
        gpu: e.gpu,
        remote_solver_enabled: e.remote_solver_enabled,
        radial_cells: e.radial_cells,
        axial_sections: e.axial_sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_defaults_are_valid() {
        let params = SimulationParameters::from_config(&defaults()).unwrap();
        assert_eq!(params.time().steps_per_cycle(), 800);
        assert_eq!(params.time().total_steps(), 2400);
        assert_eq!(params.deployment().iteration_budget(), 1000);
        assert_eq!(params.postprocess().averaging, AveragingWindow::DiscardWarmup);
        assert!(params.fluid().viscosity.is_shear_dependent());
    }

    #[test]
    fn test_carreau_limits() {
        let model = ViscosityModel::Carreau {
            mu_zero: 0.056,
            mu_infinity: 0.00345,
            lambda: 3.313,
            power_index: 0.3568,
        };
        assert!((model.viscosity(0.0) - 0.056).abs() < 1e-15);
        let high = model.viscosity(1e6);
        assert!(high > 0.00345 && high < 0.004);
        // 单调递减
        assert!(model.viscosity(10.0) > model.viscosity(100.0));
    }

    #[test]
    fn test_relaxation_factor_range() {
        for omega in [0.0, -0.5, 1.5, f64::NAN] {
            let mut cfg = defaults();
            cfg.simulation.relaxation_factor = omega;
            let err = SimulationParameters::from_config(&cfg).unwrap_err();
            assert!(
                matches!(err, TavrError::InvalidConfiguration { ref key, .. } if key == "simulation.relaxation_factor"),
                "omega={} 应被拒绝: {:?}",
                omega,
                err
            );
        }
        let mut cfg = defaults();
        cfg.simulation.relaxation_factor = 1.0;
        assert!(SimulationParameters::from_config(&cfg).is_ok());
    }

    #[test]
    fn test_negative_physical_values_rejected() {
        let mut cfg = defaults();
        cfg.fluid.blood_density = -1060.0;
        assert!(SimulationParameters::from_config(&cfg).is_err());

        let mut cfg = defaults();
        cfg.fluid.blood_viscosity_model = "newtonian".into();
        cfg.fluid.newtonian_viscosity = -0.001;
        assert!(SimulationParameters::from_config(&cfg).is_err());

        // 零粘度允许构建（退化情形由求解器报告发散）
        cfg.fluid.newtonian_viscosity = 0.0;
        assert!(SimulationParameters::from_config(&cfg).is_ok());

        let mut cfg = defaults();
        cfg.simulation.cycle_duration = 0.0;
        assert!(SimulationParameters::from_config(&cfg).is_err());
    }

    #[test]
    fn test_unknown_boundary_types() {
        let mut cfg = defaults();
        cfg.boundary.outlet_bc_type = "zero_pressure".into();
        let err = SimulationParameters::from_config(&cfg).unwrap_err();
        assert!(matches!(err, TavrError::InvalidBoundaryType { ref role, .. } if role == "outlet"));

        let mut cfg = defaults();
        cfg.boundary.inlet_bc_type = "velocity".into();
        let err = SimulationParameters::from_config(&cfg).unwrap_err();
        assert!(matches!(err, TavrError::InvalidBoundaryType { ref role, .. } if role == "inlet"));

        let mut cfg = defaults();
        cfg.boundary.wall_bc_type = "viscoelastic".into();
        assert!(matches!(
            SimulationParameters::from_config(&cfg),
            Err(TavrError::InvalidBoundaryType { ref role, .. }) if role == "wall"
        ));

        // 大小写与空白不影响
        let mut cfg = defaults();
        cfg.boundary.wall_bc_type = " Rigid ".into();
        let params = SimulationParameters::from_config(&cfg).unwrap();
        assert_eq!(params.boundary().wall, WallBoundary::Rigid);
    }

    #[test]
    fn test_sampled_waveform_must_close() {
        let mut cfg = defaults();
        cfg.boundary.inlet_waveform = "sampled".into();
        cfg.boundary.inlet_samples = vec![[0.0, 1e-5], [0.3, 3e-4], [0.8, 2e-5]];
        let err = SimulationParameters::from_config(&cfg).unwrap_err();
        assert!(matches!(err, TavrError::InvalidConfiguration { ref key, .. } if key == "boundary.inlet_samples"));

        cfg.boundary.inlet_samples = vec![[0.0, 1e-5], [0.3, 3e-4], [0.8, 1e-5]];
        assert!(SimulationParameters::from_config(&cfg).is_ok());

        // 未覆盖完整周期
        cfg.boundary.inlet_samples = vec![[0.0, 1e-5], [0.3, 3e-4], [0.7, 1e-5]];
        assert!(SimulationParameters::from_config(&cfg).is_err());
    }

    #[test]
    fn test_time_step_larger_than_cycle() {
        let mut cfg = defaults();
        cfg.simulation.time_step = 1.0;
        assert!(SimulationParameters::from_config(&cfg).is_err());
    }

    #[test]
    fn test_time_step_must_divide_cycle() {
        let mut cfg = defaults();
        cfg.simulation.time_step = 0.3;
        cfg.simulation.cycle_duration = 0.8;
        cfg.simulation.simulation_cycles = 3;
        let err = SimulationParameters::from_config(&cfg).unwrap_err();
        assert!(
            matches!(err, TavrError::InvalidConfiguration { ref key, .. } if key == "simulation.time_step"),
            "{:?}",
            err
        );

        // 浮点舍入误差内的整除仍然接受
        cfg.simulation.time_step = 0.1;
        let params = SimulationParameters::from_config(&cfg).unwrap();
        assert_eq!(params.time().steps_per_cycle(), 8);
        let simulated = params.time().total_steps() as f64 * params.time().time_step;
        assert!((simulated - 2.4).abs() < 1e-12);
    }

    #[test]
    fn test_misc_ranges() {
        let cases: [fn(&mut AnalysisConfig); 10] = [
            |c| c.deployment.crimping_ratio = 1.0,
            |c| c.deployment.deployment_method = "self_expanding".into(),
            |c| c.simulation.max_iterations = 0,
            |c| c.simulation.output_frequency = 0,
            |c| c.postprocess.leak_regions = 0,
            |c| c.execution.radial_cells = 2,
            |c| c.execution.axial_sections = Some(1),
            |c| c.valve.available_sizes = vec![21],
            |c| c.valve.valve_type = "unknown".into(),
            |c| c.fluid.carreau_power_index = 1.5,
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut cfg = defaults();
            mutate(&mut cfg);
            let err = SimulationParameters::from_config(&cfg).unwrap_err();
            assert!(err.is_setup_error(), "用例 {} 应为建立阶段错误: {:?}", i, err);
        }
    }
}

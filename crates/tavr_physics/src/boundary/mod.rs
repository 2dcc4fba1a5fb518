// crates/tavr_physics/src/boundary/mod.rs

//! 边界条件
//!
//! 每个边界角色（入口/出口/壁面）对应一个封闭枚举，在建立阶段由
//! [`SimulationParameters`] 中已解析的选择一次性构造，运行期间只做求值，
//! 不再解析类型字符串。三个角色共享 [`BoundaryCondition`] 求值能力。
//!
//! # 示例
//!
//! ```
//! use tavr_config::{AnalysisConfig, SimulationParameters};
//! use tavr_physics::boundary::BoundaryConditionSet;
//!
//! let mut config = AnalysisConfig::default();
//! config.boundary.inlet_waveform = "constant".into();
//! let params = SimulationParameters::from_config(&config).unwrap();
//! let set = BoundaryConditionSet::from_parameters(&params);
//! assert!(set.inlet.flow_rate(0.1) > 0.0);
//! ```

pub mod inlet;
pub mod wall;
pub mod windkessel;

pub use inlet::{FourierSeries, InletProvider, PeriodicSpline};
pub use wall::{ElasticWall, WallProvider, WallResponse};
pub use windkessel::{WindkesselCheckpoint, WindkesselOutlet};

use tavr_config::{InletBoundary, OutletBoundary, SimulationParameters, WallBoundary};

/// 边界角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryRole {
    /// 入口
    Inlet,
    /// 出口
    Outlet,
    /// 壁面
    Wall,
}

/// 边界求值结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryValue {
    /// 体积流量 [m³/s]
    FlowRate(f64),
    /// 压力 [Pa]
    Pressure(f64),
    /// 壁面响应
    Wall(WallResponse),
}

/// 边界条件共享的求值能力
pub trait BoundaryCondition {
    /// 边界角色
    fn role(&self) -> BoundaryRole;

    /// 在给定时刻求值
    fn evaluate(&self, time: f64) -> BoundaryValue;
}

/// 出口边界提供者
#[derive(Debug, Clone, PartialEq)]
pub enum OutletProvider {
    /// 三元件 Windkessel
    Windkessel(WindkesselOutlet),
}

impl OutletProvider {
    /// 试算出口压力（不修改状态）
    pub fn pressure_for_flow(&self, flow: f64, dt: f64) -> f64 {
        match self {
            Self::Windkessel(wk) => wk.pressure_for_flow(flow, dt),
        }
    }

    /// 提交一个时间步，返回出口压力
    pub fn advance(&mut self, flow: f64, dt: f64) -> f64 {
        match self {
            Self::Windkessel(wk) => wk.advance(flow, dt),
        }
    }

    /// 保存状态
    pub fn checkpoint(&self) -> WindkesselCheckpoint {
        match self {
            Self::Windkessel(wk) => wk.checkpoint(),
        }
    }

    /// 恢复状态
    pub fn restore(&mut self, checkpoint: &WindkesselCheckpoint) {
        match self {
            Self::Windkessel(wk) => wk.restore(checkpoint),
        }
    }

    /// 最近一次提交的出口压力
    pub fn outlet_pressure(&self) -> f64 {
        match self {
            Self::Windkessel(wk) => wk.outlet_pressure(),
        }
    }
}

impl BoundaryCondition for OutletProvider {
    fn role(&self) -> BoundaryRole {
        BoundaryRole::Outlet
    }

    fn evaluate(&self, time: f64) -> BoundaryValue {
        match self {
            Self::Windkessel(wk) => wk.evaluate(time),
        }
    }
}

/// 一次运行使用的全部边界条件
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditionSet {
    /// 入口
    pub inlet: InletProvider,
    /// 出口
    pub outlet: OutletProvider,
    /// 壁面
    pub wall: WallProvider,
}

impl BoundaryConditionSet {
    /// 由已验证参数构造
    pub fn from_parameters(params: &SimulationParameters) -> Self {
        let period = params.time().cycle_duration;
        let selection = params.boundary();

        let inlet = match &selection.inlet {
            InletBoundary::FlowWaveform(waveform) => InletProvider::from_waveform(waveform, period),
        };
        let outlet = match selection.outlet {
            OutletBoundary::Windkessel(wk) => OutletProvider::Windkessel(WindkesselOutlet::new(wk)),
        };
        let wall = match selection.wall {
            WallBoundary::Elastic => {
                WallProvider::Elastic(ElasticWall::new(*params.wall(), params.valve().material))
            }
            WallBoundary::Rigid => WallProvider::Rigid {
                properties: *params.wall(),
            },
        };

        Self { inlet, outlet, wall }
    }

    /// 给定时刻所有边界的求值结果
    pub fn evaluate_all(&self, time: f64) -> [(BoundaryRole, BoundaryValue); 3] {
        [
            (self.inlet.role(), self.inlet.evaluate(time)),
            (self.outlet.role(), self.outlet.evaluate(time)),
            (self.wall.role(), self.wall.evaluate(time)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavr_config::AnalysisConfig;

    #[test]
    fn test_set_from_defaults() {
        let params = SimulationParameters::from_config(&AnalysisConfig::default()).unwrap();
        let set = BoundaryConditionSet::from_parameters(&params);

        assert!(matches!(set.inlet, InletProvider::Fourier(_)));
        assert!(!set.wall.is_rigid());

        let values = set.evaluate_all(0.0);
        assert_eq!(values[0].0, BoundaryRole::Inlet);
        assert_eq!(values[1].1, BoundaryValue::Pressure(10666.0));
        assert!(matches!(values[2].1, BoundaryValue::Wall(WallResponse::Elastic { .. })));
    }

    #[test]
    fn test_rigid_wall_selection() {
        let mut config = AnalysisConfig::default();
        config.boundary.wall_bc_type = "rigid".into();
        let params = SimulationParameters::from_config(&config).unwrap();
        let set = BoundaryConditionSet::from_parameters(&params);
        assert!(set.wall.is_rigid());
    }
}

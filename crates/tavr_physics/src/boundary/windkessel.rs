// crates/tavr_physics/src/boundary/windkessel.rs

//! 三元件 Windkessel 出口
//!
//! ```text
//!   Q ──Rp──┬──Rd── Pv
//!           C
//!           ┴
//! ```
//!
//! 出口压力 `P = Rp·Q + Pc`，储存压力满足 `C·dPc/dt = Q − (Pc − Pv)/Rd`，
//! 采用隐式 Euler 离散：
//!
//! `Pc^{n+1} = (Pc^n + Δt·(Q + Pv/Rd)/C) / (1 + Δt/(Rd·C))`
//!
//! 耦合迭代中用 [`WindkesselOutlet::pressure_for_flow`] 试算（不修改状态），
//! 时间步被接受后才调用 [`WindkesselOutlet::advance`] 提交。

use serde::{Deserialize, Serialize};

use tavr_config::WindkesselParameters;

use super::{BoundaryCondition, BoundaryRole, BoundaryValue};

/// Windkessel 状态快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindkesselCheckpoint {
    /// 储存压力 [Pa]
    pub stored_pressure: f64,
    /// 最近一次提交的出口压力 [Pa]
    pub outlet_pressure: f64,
    /// 已推进时间 [s]
    pub time: f64,
}

/// 三元件 Windkessel 出口
#[derive(Debug, Clone, PartialEq)]
pub struct WindkesselOutlet {
    params: WindkesselParameters,
    stored_pressure: f64,
    outlet_pressure: f64,
    time: f64,
}

impl WindkesselOutlet {
    /// 以初始储存压力创建
    pub fn new(params: WindkesselParameters) -> Self {
        Self {
            stored_pressure: params.initial_pressure,
            outlet_pressure: params.initial_pressure,
            time: 0.0,
            params,
        }
    }

    /// 参数
    pub fn parameters(&self) -> &WindkesselParameters {
        &self.params
    }

    /// 当前储存压力 [Pa]
    pub fn stored_pressure(&self) -> f64 {
        self.stored_pressure
    }

    /// 最近一次提交的出口压力 [Pa]
    pub fn outlet_pressure(&self) -> f64 {
        self.outlet_pressure
    }

    /// 已推进时间 [s]
    pub fn time(&self) -> f64 {
        self.time
    }

    fn next_stored_pressure(&self, flow: f64, dt: f64) -> f64 {
        let p = &self.params;
        (self.stored_pressure + dt * (flow + p.venous_pressure / p.distal_resistance) / p.compliance)
            / (1.0 + dt / (p.distal_resistance * p.compliance))
    }

    /// 试算：以流量 `flow` 推进 `dt` 后的出口压力，不修改状态
    pub fn pressure_for_flow(&self, flow: f64, dt: f64) -> f64 {
        self.params.proximal_resistance * flow + self.next_stored_pressure(flow, dt)
    }

    /// 提交：以流量 `flow` 推进 `dt`，返回出口压力
    pub fn advance(&mut self, flow: f64, dt: f64) -> f64 {
        self.stored_pressure = self.next_stored_pressure(flow, dt);
        self.outlet_pressure = self.params.proximal_resistance * flow + self.stored_pressure;
        self.time += dt;
        self.outlet_pressure
    }

    /// 保存状态
    pub fn checkpoint(&self) -> WindkesselCheckpoint {
        WindkesselCheckpoint {
            stored_pressure: self.stored_pressure,
            outlet_pressure: self.outlet_pressure,
            time: self.time,
        }
    }

    /// 恢复状态
    pub fn restore(&mut self, checkpoint: &WindkesselCheckpoint) {
        self.stored_pressure = checkpoint.stored_pressure;
        self.outlet_pressure = checkpoint.outlet_pressure;
        self.time = checkpoint.time;
    }
}

impl BoundaryCondition for WindkesselOutlet {
    fn role(&self) -> BoundaryRole {
        BoundaryRole::Outlet
    }

    fn evaluate(&self, _time: f64) -> BoundaryValue {
        BoundaryValue::Pressure(self.outlet_pressure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> WindkesselParameters {
        WindkesselParameters {
            proximal_resistance: 6.7e6,
            distal_resistance: 1.33e8,
            compliance: 1.13e-8,
            initial_pressure: 10666.0,
            venous_pressure: 0.0,
        }
    }

    #[test]
    fn test_trial_does_not_mutate() {
        let outlet = WindkesselOutlet::new(params());
        let p1 = outlet.pressure_for_flow(1e-4, 1e-3);
        let p2 = outlet.pressure_for_flow(1e-4, 1e-3);
        assert_eq!(p1, p2);
        assert_eq!(outlet.stored_pressure(), 10666.0);
    }

    #[test]
    fn test_advance_matches_trial() {
        let mut outlet = WindkesselOutlet::new(params());
        let trial = outlet.pressure_for_flow(1e-4, 1e-3);
        assert_eq!(outlet.advance(1e-4, 1e-3), trial);
        assert!((outlet.time() - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_steady_state() {
        // 恒定流量下储存压力趋于 Pv + Q·Rd
        let mut outlet = WindkesselOutlet::new(params());
        let q = 5e-5;
        for _ in 0..200_000 {
            outlet.advance(q, 1e-3);
        }
        let expected = q * 1.33e8;
        assert!((outlet.stored_pressure() - expected).abs() / expected < 1e-6);
        assert!((outlet.outlet_pressure() - (expected + 6.7e6 * q)).abs() / expected < 1e-6);
    }

    #[test]
    fn test_advance_follows_implicit_euler_recurrence() {
        let mut p = params();
        p.venous_pressure = 500.0;
        let mut outlet = WindkesselOutlet::new(p);
        let dt = 2e-3;
        let flows = [0.0, 1e-4, 3e-4, 2e-4, -5e-5, 0.0, 4e-5, 1e-4];

        // C·(Pc' − Pc)/Δt = Q − (Pc' − Pv)/Rd  =>  Pc' = (C·Pc + Δt·Q + Δt·Pv/Rd) / (C + Δt/Rd)
        let (rp, rd) = (p.proximal_resistance, p.distal_resistance);
        let (c, pv) = (p.compliance, p.venous_pressure);
        let mut pc = p.initial_pressure;
        for (n, &q) in flows.iter().enumerate() {
            pc = (c * pc + dt * q + dt * pv / rd) / (c + dt / rd);
            let outlet_pressure = outlet.advance(q, dt);
            assert!((outlet.stored_pressure() - pc).abs() <= 1e-12 * pc.abs(), "step {n}");
            assert!((outlet_pressure - (rp * q + pc)).abs() <= 1e-12 * pc.abs(), "step {n}");
        }
        assert!((outlet.time() - dt * flows.len() as f64).abs() < 1e-15);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut outlet = WindkesselOutlet::new(params());
        outlet.advance(1e-4, 1e-3);
        let cp = outlet.checkpoint();
        let p_next = outlet.advance(2e-4, 1e-3);
        outlet.restore(&cp);
        assert_eq!(outlet.checkpoint(), cp);
        assert_eq!(outlet.advance(2e-4, 1e-3), p_next);
    }
}

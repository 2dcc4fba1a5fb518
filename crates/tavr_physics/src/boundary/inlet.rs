// crates/tavr_physics/src/boundary/inlet.rs

//! 入口流量波形
//!
//! 三种波形在建立阶段一次性构造，运行期间只做求值：
//!
//! - 恒定流量
//! - 傅里叶级数：收缩期半正弦脉冲的离散傅里叶拟合
//! - 周期样条：采样点上的周期 Catmull-Rom 三次 Hermite 插值
//!
//! 傅里叶级数和周期样条都严格以心动周期为周期，
//! `evaluate(0) == evaluate(T)` 且一阶导数连续。

use std::f64::consts::{PI, TAU};

use tavr_config::InletWaveform;

use super::{BoundaryCondition, BoundaryRole, BoundaryValue};

/// 傅里叶拟合的采样点数
const FOURIER_SAMPLES: usize = 2048;

/// 入口流量提供者
#[derive(Debug, Clone, PartialEq)]
pub enum InletProvider {
    /// 恒定流量 [m³/s]
    Constant(f64),
    /// 傅里叶级数
    Fourier(FourierSeries),
    /// 周期样条
    PeriodicSpline(PeriodicSpline),
}

impl InletProvider {
    /// 由已验证的波形构造
    pub fn from_waveform(waveform: &InletWaveform, period: f64) -> Self {
        match waveform {
            InletWaveform::Constant { flow_rate } => Self::Constant(*flow_rate),
            InletWaveform::Physiological {
                mean_flow,
                systolic_fraction,
                harmonics,
            } => Self::Fourier(FourierSeries::systolic_pulse(
                *mean_flow,
                *systolic_fraction,
                *harmonics,
                period,
            )),
            InletWaveform::Sampled { samples } => {
                Self::PeriodicSpline(PeriodicSpline::new(samples, period))
            }
        }
    }

    /// 时刻 `t` 的入口流量 [m³/s]
    pub fn flow_rate(&self, t: f64) -> f64 {
        match self {
            Self::Constant(q) => *q,
            Self::Fourier(series) => series.value(t),
            Self::PeriodicSpline(spline) => spline.value(t),
        }
    }

    /// 时刻 `t` 的流量变化率 [m³/s²]
    pub fn derivative(&self, t: f64) -> f64 {
        match self {
            Self::Constant(_) => 0.0,
            Self::Fourier(series) => series.derivative(t),
            Self::PeriodicSpline(spline) => spline.derivative(t),
        }
    }
}

impl BoundaryCondition for InletProvider {
    fn role(&self) -> BoundaryRole {
        BoundaryRole::Inlet
    }

    fn evaluate(&self, time: f64) -> BoundaryValue {
        BoundaryValue::FlowRate(self.flow_rate(time))
    }
}

// ============================================================================
// 傅里叶级数
// ============================================================================

/// 截断傅里叶级数 `a0 + Σ aₙcos(nωt) + bₙsin(nωt)`
#[derive(Debug, Clone, PartialEq)]
pub struct FourierSeries {
    period: f64,
    mean: f64,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl FourierSeries {
    /// 拟合收缩期半正弦脉冲
    ///
    /// 脉冲在 `[0, fraction·T]` 上为 `Q_peak·sin(πt/(fraction·T))`，其余时间为零，
    /// 峰值使周期平均流量等于 `mean_flow`。
    pub fn systolic_pulse(mean_flow: f64, fraction: f64, harmonics: usize, period: f64) -> Self {
        let systole = fraction * period;
        let peak = mean_flow * PI / (2.0 * fraction);
        let pulse = |t: f64| {
            if t < systole {
                peak * (PI * t / systole).sin()
            } else {
                0.0
            }
        };

        // 中点采样的离散傅里叶变换
        let m = FOURIER_SAMPLES;
        let dt = period / m as f64;
        let samples: Vec<(f64, f64)> = (0..m)
            .map(|k| {
                let t = (k as f64 + 0.5) * dt;
                (t, pulse(t))
            })
            .collect();

        let omega = TAU / period;
        let mut cos = Vec::with_capacity(harmonics);
        let mut sin = Vec::with_capacity(harmonics);
        for n in 1..=harmonics {
            let w = omega * n as f64;
            let (a, b) = samples.iter().fold((0.0, 0.0), |(a, b), &(t, q)| {
                (a + q * (w * t).cos(), b + q * (w * t).sin())
            });
            cos.push(2.0 * a / m as f64);
            sin.push(2.0 * b / m as f64);
        }

        // 平均值直接取解析值，保证周期平均流量精确
        Self {
            period,
            mean: mean_flow,
            cos,
            sin,
        }
    }

    /// 周期 [s]
    pub fn period(&self) -> f64 {
        self.period
    }

    /// 周期平均值
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 级数值
    pub fn value(&self, t: f64) -> f64 {
        let omega = TAU / self.period;
        let t = t.rem_euclid(self.period);
        self.cos
            .iter()
            .zip(&self.sin)
            .enumerate()
            .fold(self.mean, |acc, (i, (a, b))| {
                let w = omega * (i + 1) as f64;
                acc + a * (w * t).cos() + b * (w * t).sin()
            })
    }

    /// 级数导数
    pub fn derivative(&self, t: f64) -> f64 {
        let omega = TAU / self.period;
        let t = t.rem_euclid(self.period);
        self.cos
            .iter()
            .zip(&self.sin)
            .enumerate()
            .fold(0.0, |acc, (i, (a, b))| {
                let w = omega * (i + 1) as f64;
                acc + w * (b * (w * t).cos() - a * (w * t).sin())
            })
    }
}

// ============================================================================
// 周期样条
// ============================================================================

/// 周期 Catmull-Rom 样条
///
/// 节点取采样点去掉与首点重合的末点，切线用周期环绕的中心差分，
/// 因此在周期端点处值与一阶导数都连续。
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicSpline {
    period: f64,
    times: Vec<f64>,
    values: Vec<f64>,
    tangents: Vec<f64>,
}

impl PeriodicSpline {
    /// 从闭合采样点构造（首尾流量相同，末点时间等于周期）
    pub fn new(samples: &[(f64, f64)], period: f64) -> Self {
        let knots: Vec<(f64, f64)> = match samples.last() {
            Some(&(t_last, _)) if samples.len() > 1 && (t_last - period).abs() < 1e-12 * period.max(1.0) => {
                samples[..samples.len() - 1].to_vec()
            }
            _ => samples.to_vec(),
        };
        let times: Vec<f64> = knots.iter().map(|k| k.0).collect();
        let values: Vec<f64> = knots.iter().map(|k| k.1).collect();
        let n = knots.len();

        let tangents = (0..n)
            .map(|i| {
                if n < 2 {
                    return 0.0;
                }
                let (t_prev, q_prev) = if i == 0 {
                    (times[n - 1] - period, values[n - 1])
                } else {
                    (times[i - 1], values[i - 1])
                };
                let (t_next, q_next) = if i + 1 == n {
                    (times[0] + period, values[0])
                } else {
                    (times[i + 1], values[i + 1])
                };
                (q_next - q_prev) / (t_next - t_prev)
            })
            .collect();

        Self {
            period,
            times,
            values,
            tangents,
        }
    }

    /// 定位区间 `[t_i, t_{i+1}]`，返回 (i, 区间起点, 区间长度, 局部参数)
    fn locate(&self, t: f64) -> (usize, usize, f64, f64) {
        let n = self.times.len();
        let t = t.rem_euclid(self.period);
        // times[0] 为 0，partition_point 至少为 1
        let i = self.times.partition_point(|&ti| ti <= t).max(1) - 1;
        let j = (i + 1) % n;
        let t_end = if j == 0 { self.period } else { self.times[j] };
        let h = t_end - self.times[i];
        let s = if h > 0.0 { (t - self.times[i]) / h } else { 0.0 };
        (i, j, h, s)
    }

    /// 插值
    pub fn value(&self, t: f64) -> f64 {
        if self.times.len() < 2 {
            return self.values.first().copied().unwrap_or(0.0);
        }
        let (i, j, h, s) = self.locate(t);
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.values[i] + h10 * h * self.tangents[i] + h01 * self.values[j] + h11 * h * self.tangents[j]
    }

    /// 一阶导数
    pub fn derivative(&self, t: f64) -> f64 {
        if self.times.len() < 2 {
            return 0.0;
        }
        let (i, j, h, s) = self.locate(t);
        if h <= 0.0 {
            return 0.0;
        }
        let s2 = s * s;
        let d00 = 6.0 * s2 - 6.0 * s;
        let d10 = 3.0 * s2 - 4.0 * s + 1.0;
        let d01 = -6.0 * s2 + 6.0 * s;
        let d11 = 3.0 * s2 - 2.0 * s;
        (d00 * self.values[i] + d01 * self.values[j]) / h + d10 * self.tangents[i] + d11 * self.tangents[j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourier_mean_and_periodicity() {
        let series = FourierSeries::systolic_pulse(8.33e-5, 0.35, 24, 0.8);

        // 数值积分一个周期等于平均流量
        let n = 4000;
        let avg: f64 = (0..n).map(|k| series.value((k as f64 + 0.5) * 0.8 / n as f64)).sum::<f64>()
            / n as f64;
        assert!((avg - 8.33e-5).abs() < 1e-9);

        assert!((series.value(0.0) - series.value(0.8)).abs() < 1e-12);
        assert!((series.derivative(0.0) - series.derivative(0.8)).abs() < 1e-9);

        // 收缩期中点接近峰值
        let peak = 8.33e-5 * PI / (2.0 * 0.35);
        assert!((series.value(0.14) - peak).abs() / peak < 0.05);
        // 舒张期接近零
        assert!(series.value(0.6).abs() < 0.05 * peak);
    }

    #[test]
    fn test_spline_interpolates_and_wraps() {
        let samples = vec![(0.0, 1.0), (0.2, 3.0), (0.5, 2.0), (0.8, 1.0)];
        let spline = PeriodicSpline::new(&samples, 0.8);

        assert!((spline.value(0.2) - 3.0).abs() < 1e-12);
        assert!((spline.value(0.5) - 2.0).abs() < 1e-12);
        assert!((spline.value(0.0) - spline.value(0.8)).abs() < 1e-12);
        assert!((spline.value(0.1) - spline.value(0.9)).abs() < 1e-12);

        // 周期端点处导数连续
        let left = spline.derivative(0.8 - 1e-9);
        let right = spline.derivative(1e-9);
        assert!((left - right).abs() < 1e-5);
    }

    #[test]
    fn test_provider_evaluate() {
        let inlet = InletProvider::from_waveform(&InletWaveform::Constant { flow_rate: 1e-6 }, 0.5);
        assert_eq!(inlet.role(), BoundaryRole::Inlet);
        assert_eq!(inlet.evaluate(0.3), BoundaryValue::FlowRate(1e-6));
        assert_eq!(inlet.derivative(0.3), 0.0);
    }
}

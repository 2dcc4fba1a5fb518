// crates/tavr_foundation/src/units.rs

//! 临床单位换算
//!
//! 内部计算统一使用 SI 单位，报告量按临床惯例换算（mmHg、mL、mm）。

/// 1 mmHg 对应的帕斯卡数
pub const PASCAL_PER_MMHG: f64 = 133.322;

/// 1 m³ 对应的毫升数
pub const ML_PER_M3: f64 = 1.0e6;

/// 1 m 对应的毫米数
pub const MM_PER_M: f64 = 1.0e3;

/// Gorlin 公式常数（临床单位 cm², mL/s, mmHg）
pub const GORLIN_CONSTANT: f64 = 44.3;

/// Pa → mmHg
#[inline]
pub fn pa_to_mmhg(p: f64) -> f64 {
    p / PASCAL_PER_MMHG
}

/// mmHg → Pa
#[inline]
pub fn mmhg_to_pa(p: f64) -> f64 {
    p * PASCAL_PER_MMHG
}

/// m³ → mL
#[inline]
pub fn m3_to_ml(v: f64) -> f64 {
    v * ML_PER_M3
}

/// 瓣膜公称尺寸 [mm] → 公称半径 [m]
#[inline]
pub fn size_mm_to_radius_m(size_mm: u32) -> f64 {
    size_mm as f64 / MM_PER_M / 2.0
}

// crates/tavr_foundation/src/float.rs

//! 安全浮点运算与收敛判据
//!
//! 耦合迭代、植入松弛和 Picard 迭代都以相对变化量作为残差，
//! 这里集中提供这些范数的定义，保证各求解器的残差尺度一致。
//!
//! # 示例
//!
//! ```
//! use tavr_foundation::float::{relative_change, safe_div};
//!
//! assert_eq!(safe_div(1.0, 0.0, -1.0), -1.0);
//! let r = relative_change(&[1.0, 2.0], &[1.0, 2.0]);
//! assert_eq!(r, 0.0);
//! ```

// ============================================================================
// 数值常量
// ============================================================================

/// 安全除法的最小分母阈值
pub const SAFE_DIV_EPSILON: f64 = 1e-14;

/// 相对范数的分母下限，避免静止场上的 0/0
pub const NORM_FLOOR: f64 = 1e-30;

// ============================================================================
// 辅助函数
// ============================================================================

/// 安全除法
#[inline]
pub fn safe_div(a: f64, b: f64, fallback: f64) -> f64 {
    if b.abs() < SAFE_DIV_EPSILON {
        fallback
    } else {
        let result = a / b;
        if result.is_finite() {
            result
        } else {
            fallback
        }
    }
}

/// 相对变化量 `||new - old||₂ / max(||new||₂, floor)`
///
/// 任一输入含非有限值时返回 `f64::INFINITY`，调用方据此判定发散。
/// 两个向量长度不同时只比较公共前缀。
pub fn relative_change(new: &[f64], old: &[f64]) -> f64 {
    let mut diff = 0.0;
    let mut norm = 0.0;
    for (a, b) in new.iter().zip(old.iter()) {
        if !a.is_finite() || !b.is_finite() {
            return f64::INFINITY;
        }
        diff += (a - b) * (a - b);
        norm += a * a;
    }
    let norm = norm.sqrt();
    if norm < NORM_FLOOR {
        // 两个场都为零时无变化
        return diff.sqrt();
    }
    diff.sqrt() / norm
}

/// 把非有限残差映射为 `f64::MAX`，保证收敛记录中的残差非负且可比较
#[inline]
pub fn sanitize_residual(r: f64) -> f64 {
    if r.is_finite() {
        r.abs()
    } else {
        f64::MAX
    }
}

// ============================================================================
// Kahan 求和算法
// ============================================================================

/// Kahan 求和器
///
/// 时间平均指标（TAWSS、OSI）和快照平均在数千个时间步上累加小量，
/// 使用补偿求和避免后期步骤的贡献被吞掉。
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// 创建新的 Kahan 求和器
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 获取当前求和值
    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }
}

impl std::iter::Sum<f64> for KahanSum {
    fn sum<I: Iterator<Item = f64>>(iter: I) -> Self {
        let mut kahan = KahanSum::new();
        for v in iter {
            kahan.add(v);
        }
        kahan
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(6.0, 3.0, 0.0), 2.0);
        assert_eq!(safe_div(1.0, 0.0, 7.0), 7.0);
        assert_eq!(safe_div(1.0, 1e-20, 7.0), 7.0);
    }

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        let r = relative_change(&[1.0, 0.0], &[0.9, 0.0]);
        assert!((r - 0.1).abs() < 1e-12);
        assert!(relative_change(&[f64::NAN], &[1.0]).is_infinite());
    }

    #[test]
    fn test_sanitize_residual() {
        assert_eq!(sanitize_residual(-0.5), 0.5);
        assert_eq!(sanitize_residual(f64::NAN), f64::MAX);
        assert_eq!(sanitize_residual(f64::INFINITY), f64::MAX);
    }

    #[test]
    fn test_kahan_sum() {
        let sum: KahanSum = (0..10000).map(|_| 0.1).sum();
        assert!((sum.value() - 1000.0).abs() < 1e-10);

        // 大数之后的小量不被吞掉
        let mut kahan = KahanSum::new();
        kahan.add(1.0);
        for _ in 0..1000 {
            kahan.add(1.0e-16);
        }
        assert!((kahan.value() - (1.0 + 1.0e-13)).abs() < 1e-15);
    }
}

// crates/tavr_physics/src/numerics/pcg.rs

//! 预处理共轭梯度法（PCG）求解器
//!
//! 求解稀疏对称正定线性系统 Ax = b。流体求解器用它求解每个截面的
//! 径向动量方程，结构求解器用它求解沿轴向耦合的壁面位移方程。
//!
//! # 算法概述
//!
//! 1. r_0 = b - A*x_0
//! 2. z_0 = M^{-1} * r_0
//! 3. p_0 = z_0
//! 4. 对于 k = 0, 1, 2, ...
//!    - α_k = (r_k, z_k) / (p_k, A*p_k)
//!    - x_{k+1} = x_k + α_k * p_k
//!    - r_{k+1} = r_k - α_k * A*p_k
//!    - 检查收敛: ||r_{k+1}|| < tol * ||b||
//!    - z_{k+1} = M^{-1} * r_{k+1}
//!    - β_k = (r_{k+1}, z_{k+1}) / (r_k, z_k)
//!    - p_{k+1} = z_{k+1} + β_k * p_k
//!
//! 每次迭代的相对残差都记录在 [`PcgResult::history`] 中，
//! 求解失败时由调用方写入收敛记录。

use tracing::trace;

/// PCG 求解器配置
#[derive(Debug, Clone)]
pub struct PcgConfig {
    /// 相对容差
    pub rtol: f64,
    /// 绝对容差
    pub atol: f64,
    /// 最大迭代次数
    pub max_iter: usize,
    /// 预处理器类型
    pub preconditioner: PreconditionerType,
}

impl Default for PcgConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-30,
            max_iter: 1000,
            preconditioner: PreconditionerType::Jacobi,
        }
    }
}

impl PcgConfig {
    /// 指定容差与迭代上限
    pub fn with_tolerance(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Self::default()
        }
    }
}

/// 预处理器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionerType {
    /// 无预处理（单位矩阵）
    None,
    /// 雅可比（对角）预处理
    Jacobi,
}

/// PCG 求解结果
#[derive(Debug, Clone)]
pub struct PcgResult {
    /// 是否收敛
    pub converged: bool,
    /// 实际迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: f64,
    /// 相对残差 (||r|| / ||b||)
    pub relative_residual: f64,
    /// 每次迭代的相对残差
    pub history: Vec<f64>,
}

/// 稀疏矩阵的矩阵-向量乘法 trait
///
/// 实现者提供 y = A*x 以及对角元素（雅可比预处理使用）。
pub trait SparseMvp {
    /// 计算矩阵-向量乘积: y = A * x
    fn apply(&self, x: &[f64], y: &mut [f64]);

    /// 矩阵维度
    fn dimension(&self) -> usize;

    /// 对角元素
    fn diagonal(&self) -> Vec<f64>;
}

/// PCG 求解器工作区
///
/// 存储迭代所需的临时向量，同一个求解器重复求解时不重新分配。
#[derive(Debug, Default)]
struct PcgWorkspace {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    ap: Vec<f64>,
    inv_diag: Vec<f64>,
}

impl PcgWorkspace {
    fn ensure_capacity(&mut self, n: usize) {
        for v in [
            &mut self.r,
            &mut self.z,
            &mut self.p,
            &mut self.ap,
            &mut self.inv_diag,
        ] {
            v.clear();
            v.resize(n, 0.0);
        }
    }
}

/// PCG 求解器
///
/// # 示例
///
/// ```
/// use tavr_physics::numerics::{PcgConfig, PcgSolver, SymmetricTridiagonal};
///
/// let matrix = SymmetricTridiagonal::new(vec![2.0, 2.0, 2.0], vec![-1.0, -1.0]).unwrap();
/// let mut x = vec![0.0; 3];
/// let result = PcgSolver::new(PcgConfig::default()).solve(&matrix, &mut x, &[1.0, 0.0, 1.0]);
/// assert!(result.converged);
/// assert!((x[1] - 1.0).abs() < 1e-10);
/// ```
#[derive(Debug)]
pub struct PcgSolver {
    config: PcgConfig,
    workspace: PcgWorkspace,
}

impl PcgSolver {
    /// 创建求解器
    pub fn new(config: PcgConfig) -> Self {
        Self {
            config,
            workspace: PcgWorkspace::default(),
        }
    }

    /// 配置
    pub fn config(&self) -> &PcgConfig {
        &self.config
    }

    /// 求解线性系统 Ax = b
    ///
    /// `x` 输入初始猜测，输出解。
    pub fn solve<M: SparseMvp + ?Sized>(&mut self, matrix: &M, x: &mut [f64], b: &[f64]) -> PcgResult {
        let n = matrix.dimension();
        let ws = &mut self.workspace;
        ws.ensure_capacity(n);

        if self.config.preconditioner == PreconditionerType::Jacobi {
            for (inv, d) in ws.inv_diag.iter_mut().zip(matrix.diagonal()) {
                *inv = if d.abs() > 1e-300 { 1.0 / d } else { 1.0 };
            }
        } else {
            ws.inv_diag.iter_mut().for_each(|v| *v = 1.0);
        }

        // r = b - A*x
        matrix.apply(x, &mut ws.r);
        for i in 0..n {
            ws.r[i] = b[i] - ws.r[i];
        }

        let b_norm = dot(b, b).sqrt();
        let mut history = Vec::new();

        // 右端为零时解即为零
        if b_norm < self.config.atol {
            x.iter_mut().for_each(|v| *v = 0.0);
            return PcgResult {
                converged: true,
                iterations: 0,
                residual_norm: 0.0,
                relative_residual: 0.0,
                history,
            };
        }

        precondition(&ws.r, &ws.inv_diag, &mut ws.z);
        ws.p.copy_from_slice(&ws.z);
        let mut rho = dot(&ws.r, &ws.z);

        for iter in 0..self.config.max_iter {
            matrix.apply(&ws.p, &mut ws.ap);

            let p_ap = dot(&ws.p, &ws.ap);
            if !(p_ap.abs() > 1e-300) {
                // 搜索方向退化（矩阵奇异或含非有限值）
                let r_norm = dot(&ws.r, &ws.r).sqrt();
                history.push(r_norm / b_norm);
                return PcgResult {
                    converged: false,
                    iterations: iter + 1,
                    residual_norm: r_norm,
                    relative_residual: r_norm / b_norm,
                    history,
                };
            }
            let alpha = rho / p_ap;

            for i in 0..n {
                x[i] += alpha * ws.p[i];
                ws.r[i] -= alpha * ws.ap[i];
            }

            let r_norm = dot(&ws.r, &ws.r).sqrt();
            let relative_residual = r_norm / b_norm;
            history.push(relative_residual);
            trace!(iter, relative_residual, "PCG 迭代");

            if r_norm < self.config.atol || relative_residual < self.config.rtol {
                return PcgResult {
                    converged: true,
                    iterations: iter + 1,
                    residual_norm: r_norm,
                    relative_residual,
                    history,
                };
            }

            precondition(&ws.r, &ws.inv_diag, &mut ws.z);
            let rho_new = dot(&ws.r, &ws.z);
            let beta = rho_new / rho;
            rho = rho_new;

            for i in 0..n {
                ws.p[i] = ws.z[i] + beta * ws.p[i];
            }
        }

        let r_norm = dot(&ws.r, &ws.r).sqrt();
        PcgResult {
            converged: false,
            iterations: self.config.max_iter,
            residual_norm: r_norm,
            relative_residual: r_norm / b_norm,
            history,
        }
    }
}

#[inline]
fn precondition(r: &[f64], inv_diag: &[f64], z: &mut [f64]) {
    for ((zi, ri), di) in z.iter_mut().zip(r).zip(inv_diag) {
        *zi = ri * di;
    }
}

#[inline]
fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Diagonal(Vec<f64>);

    impl SparseMvp for Diagonal {
        fn apply(&self, x: &[f64], y: &mut [f64]) {
            for i in 0..self.0.len() {
                y[i] = self.0[i] * x[i];
            }
        }
        fn dimension(&self) -> usize {
            self.0.len()
        }
        fn diagonal(&self) -> Vec<f64> {
            self.0.clone()
        }
    }

    /// 测试简单的对角系统求解
    #[test]
    fn test_pcg_diagonal_system() {
        let n = 10;
        let matrix = Diagonal((1..=n).map(|i| i as f64).collect());
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];

        let result = PcgSolver::new(PcgConfig::default()).solve(&matrix, &mut x, &b);
        assert!(result.converged, "PCG 应该收敛");
        // 雅可比预处理下对角系统一步收敛
        assert_eq!(result.iterations, 1);
        for i in 0..n {
            let expected = 1.0 / ((i + 1) as f64);
            assert!((x[i] - expected).abs() < 1e-12, "x[{}] = {}, 期望 {}", i, x[i], expected);
        }
    }

    #[test]
    fn test_pcg_zero_rhs() {
        let matrix = Diagonal(vec![1.0, 2.0]);
        let mut x = vec![5.0, 5.0];
        let result = PcgSolver::new(PcgConfig::default()).solve(&matrix, &mut x, &[0.0, 0.0]);
        assert!(result.converged);
        assert_eq!(x, vec![0.0, 0.0]);
    }

    #[test]
    fn test_pcg_singular_reports_failure() {
        let matrix = Diagonal(vec![0.0, 0.0]);
        let mut x = vec![0.0; 2];
        let result = PcgSolver::new(PcgConfig::default()).solve(&matrix, &mut x, &[1.0, 1.0]);
        assert!(!result.converged);
        assert_eq!(result.history.len(), result.iterations);
    }

    #[test]
    fn test_pcg_iteration_cap() {
        // 无预处理的病态系统在 1 次迭代内无法收敛
        let matrix = Diagonal(vec![1.0, 1e6]);
        let config = PcgConfig {
            max_iter: 1,
            preconditioner: PreconditionerType::None,
            ..PcgConfig::default()
        };
        let mut x = vec![0.0; 2];
        let result = PcgSolver::new(config).solve(&matrix, &mut x, &[1.0, 1.0]);
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.history.len(), 1);
    }
}

// crates/tavr_physics/src/numerics/sparse.rs

//! 稀疏矩阵存储
//!
//! - [`SymmetricTridiagonal`]: 对称三对角矩阵（径向有限体积离散）
//! - [`CsrMatrix`]: 压缩稀疏行格式，由 [`CsrBuilder`] 从三元组组装

use tavr_foundation::error::{TavrError, TavrResult};

use super::pcg::SparseMvp;

// ============================================================================
// 对称三对角矩阵
// ============================================================================

/// 对称三对角矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricTridiagonal {
    diag: Vec<f64>,
    off: Vec<f64>,
}

impl SymmetricTridiagonal {
    /// 由主对角线和次对角线创建（`off.len() == diag.len() - 1`）
    pub fn new(diag: Vec<f64>, off: Vec<f64>) -> TavrResult<Self> {
        TavrError::check_size("off_diagonal", diag.len().saturating_sub(1), off.len())?;
        Ok(Self { diag, off })
    }

    /// 主对角线
    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    /// 次对角线
    pub fn off_diagonal(&self) -> &[f64] {
        &self.off
    }

    /// Thomas 算法直接求解
    ///
    /// 批量加速路径使用，不做主元选取。主元为零或结果非有限时返回 `None`。
    pub fn solve_direct(&self, b: &[f64]) -> Option<Vec<f64>> {
        let n = self.diag.len();
        if n == 0 {
            return Some(Vec::new());
        }
        let mut c = vec![0.0; n];
        let mut d = vec![0.0; n];

        let mut pivot = self.diag[0];
        if pivot == 0.0 {
            return None;
        }
        if n > 1 {
            c[0] = self.off[0] / pivot;
        }
        d[0] = b[0] / pivot;
        for i in 1..n {
            pivot = self.diag[i] - self.off[i - 1] * c[i - 1];
            if pivot == 0.0 {
                return None;
            }
            if i < n - 1 {
                c[i] = self.off[i] / pivot;
            }
            d[i] = (b[i] - self.off[i - 1] * d[i - 1]) / pivot;
        }

        let mut x = d;
        for i in (0..n - 1).rev() {
            x[i] -= c[i] * x[i + 1];
        }
        if x.iter().all(|v| v.is_finite()) {
            Some(x)
        } else {
            None
        }
    }
}

impl SparseMvp for SymmetricTridiagonal {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        let n = self.diag.len();
        for i in 0..n {
            let mut sum = self.diag[i] * x[i];
            if i > 0 {
                sum += self.off[i - 1] * x[i - 1];
            }
            if i + 1 < n {
                sum += self.off[i] * x[i + 1];
            }
            y[i] = sum;
        }
    }

    fn dimension(&self) -> usize {
        self.diag.len()
    }

    fn diagonal(&self) -> Vec<f64> {
        self.diag.clone()
    }
}

// ============================================================================
// CSR
// ============================================================================

/// 通用稀疏矩阵（CSR 格式）
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    n: usize,
}

impl CsrMatrix {
    /// 行数（方阵）
    pub fn n_rows(&self) -> usize {
        self.n
    }

    /// 非零元素个数
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// 元素值（不存在时为 0）
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .binary_search(&col)
            .map(|k| self.values[range.start + k])
            .unwrap_or(0.0)
    }
}

impl SparseMvp for CsrMatrix {
    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for row in 0..self.n {
            let mut sum = 0.0;
            for j in self.row_ptr[row]..self.row_ptr[row + 1] {
                sum += self.values[j] * x[self.col_idx[j]];
            }
            y[row] = sum;
        }
    }

    fn dimension(&self) -> usize {
        self.n
    }

    fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }
}

/// CSR 三元组组装器，重复位置的值累加
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n: usize,
    triplets: Vec<(usize, usize, f64)>,
}

impl CsrBuilder {
    /// 创建 n×n 组装器
    pub fn new(n: usize) -> Self {
        Self {
            n,
            triplets: Vec::new(),
        }
    }

    /// 累加一个元素
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n && col < self.n);
        self.triplets.push((row, col, value));
    }

    /// 完成组装
    pub fn build(mut self) -> CsrMatrix {
        self.triplets.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0; self.n + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(self.triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(self.triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, value) in self.triplets {
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += value;
                }
                continue;
            }
            col_idx.push(col);
            values.push(value);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }
        for i in 0..self.n {
            row_ptr[i + 1] += row_ptr[i];
        }

        CsrMatrix {
            row_ptr,
            col_idx,
            values,
            n: self.n,
        }
    }
}

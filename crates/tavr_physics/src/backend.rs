// crates/tavr_physics/src/backend.rs

//! 执行后端
//!
//! 各截面的径向流体求解相互独立，可以并行执行：
//!
//! - `Cpu`: 每个截面用 PCG 迭代求解；`threads != 1` 时在专用 rayon 线程池中并行
//! - `Accelerated`: 加速提示打开时使用的批量路径，全部截面的三对角系统
//!   作为一批用 Thomas 算法直接求解
//!
//! 两种后端的结果在容差内一致，但不保证逐位相同。

use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use tavr_config::ExecutionSettings;
use tavr_foundation::error::{TavrError, TavrResult};

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// CPU 迭代求解
    Cpu,
    /// 批量直接求解
    Accelerated,
}

/// 执行统计
#[derive(Debug, Clone, Default)]
pub struct BackendMetrics {
    /// 批次数
    pub batches: usize,
    /// 并行批次数
    pub parallel_batches: usize,
    /// 处理的任务总数
    pub tasks: usize,
    /// 总耗时
    pub duration: Duration,
}

/// 执行后端
#[derive(Debug, Clone)]
pub struct ExecutionBackend {
    kind: BackendKind,
    pool: Option<Arc<rayon::ThreadPool>>,
    metrics: Arc<Mutex<BackendMetrics>>,
}

impl ExecutionBackend {
    /// 串行 CPU 后端
    pub fn sequential() -> Self {
        Self {
            kind: BackendKind::Cpu,
            pool: None,
            metrics: Arc::new(Mutex::new(BackendMetrics::default())),
        }
    }

    /// 由执行设置构造
    ///
    /// `threads == 1` 串行执行；其余值建立专用线程池（0 表示 rayon 默认线程数）。
    pub fn from_settings(settings: &ExecutionSettings) -> TavrResult<Self> {
        let kind = if settings.gpu {
            BackendKind::Accelerated
        } else {
            BackendKind::Cpu
        };
        let pool = if settings.threads == 1 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.threads)
                .thread_name(|i| format!("tavr-solver-{}", i))
                .build()
                .map_err(|e| TavrError::internal(format!("无法创建线程池: {}", e)))?;
            Some(Arc::new(pool))
        };
        info!(
            backend = ?kind,
            threads = pool.as_ref().map_or(1, |p| p.current_num_threads()),
            "执行后端已就绪"
        );
        Ok(Self {
            kind,
            pool,
            metrics: Arc::new(Mutex::new(BackendMetrics::default())),
        })
    }

    /// 以指定类型构造串行后端
    pub fn with_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            ..Self::sequential()
        }
    }

    /// 后端类型
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// 工作线程数
    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// 对 `0..n` 逐项求值，结果按索引顺序返回
    pub fn map<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let start = Instant::now();
        let result = match &self.pool {
            Some(pool) => pool.install(|| (0..n).into_par_iter().map(&f).collect()),
            None => (0..n).map(&f).collect(),
        };

        let mut metrics = self.metrics.lock();
        metrics.batches += 1;
        metrics.tasks += n;
        metrics.duration += start.elapsed();
        if self.pool.is_some() {
            metrics.parallel_batches += 1;
        }
        result
    }

    /// 执行统计快照
    pub fn metrics(&self) -> BackendMetrics {
        self.metrics.lock().clone()
    }
}

impl Default for ExecutionBackend {
    fn default() -> Self {
        Self::sequential()
    }
}

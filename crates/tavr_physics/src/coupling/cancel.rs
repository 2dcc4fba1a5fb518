// crates/tavr_physics/src/coupling/cancel.rs

//! 协作式取消信号
//!
//! 控制器只在时间步边界检查取消标志，不会打断正在进行的线性求解。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 取消令牌，克隆后共享同一标志
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// 创建未取消的令牌
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 是否已请求取消
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// crates/tavr_config/src/error.rs

//! 配置层错误类型

use tavr_foundation::TavrError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 未知配置键
    #[error("未知配置键: {0}")]
    UnknownKey(String),
}

impl ConfigError {
    /// 无效值
    pub fn invalid(key: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for TavrError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => TavrError::from(e),
            ConfigError::Parse(message) => TavrError::Serialization { message },
            ConfigError::InvalidValue { key, value, reason } => {
                TavrError::InvalidConfiguration { key, value, reason }
            }
            ConfigError::UnknownKey(key) => {
                TavrError::invalid_configuration(key, "", "未知配置键")
            }
        }
    }
}

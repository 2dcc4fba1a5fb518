// crates/tavr_foundation/src/validation.rs

//! 运行时验证报告
//!
//! 网格检查和场数据检查共用的错误/警告收集器。检查函数不会提前返回，
//! 而是把所有问题记入报告，由调用方决定是否中止。
//!
//! # 示例
//!
//! ```
//! use tavr_foundation::validation::{check_range, ValidationReport};
//!
//! let radius = [0.012, f64::NAN, 0.011];
//! let mut report = ValidationReport::new();
//! for (i, &r) in radius.iter().enumerate() {
//!     check_range(&mut report, "radius", i, r, 0.0, 0.05);
//! }
//! assert_eq!(report.error_count(), 1);
//! ```

use std::fmt;

/// 验证报告
#[derive(Debug, Default, Clone)]
pub struct ValidationReport {
    /// 错误列表
    pub errors: Vec<ValidationError>,
    /// 警告列表
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// 创建空的验证报告
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 是否有警告
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 错误数量
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// 警告数量
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// 是否通过（无错误）
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 合并另一个报告
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// 第一条错误的描述（用于构造简短的错误消息）
    pub fn first_error_message(&self) -> Option<String> {
        self.errors.first().map(|e| e.to_string())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "验证报告:")?;
        writeln!(f, "  错误: {} 个", self.error_count())?;
        writeln!(f, "  警告: {} 个", self.warning_count())?;

        if self.has_errors() {
            writeln!(f, "\n错误详情:")?;
            for (i, err) in self.errors.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, err)?;
            }
        }

        if self.has_warnings() {
            writeln!(f, "\n警告详情:")?;
            for (i, warn) in self.warnings.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, warn)?;
            }
        }

        Ok(())
    }
}

/// 验证错误类型
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// 数据超出范围
    OutOfRange {
        /// 字段名称
        field: &'static str,
        /// 节点或单元索引
        index: usize,
        /// 实际值
        value: f64,
        /// 下界
        min: f64,
        /// 上界
        max: f64,
    },
    /// 连接关系错误（引用了不存在的节点等）
    Topology {
        /// 错误描述
        message: String,
        /// 可选的单元/面索引
        element_id: Option<usize>,
    },
    /// 自定义错误
    Custom {
        /// 自定义消息
        message: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                field,
                index,
                value,
                min,
                max,
            } => write!(
                f,
                "索引{}: 字段{}={} 超出范围[{}, {}]",
                index, field, value, min, max
            ),
            Self::Topology {
                message,
                element_id,
            } => match element_id {
                Some(id) => write!(f, "单元{}: 拓扑错误: {}", id, message),
                None => write!(f, "拓扑错误: {}", message),
            },
            Self::Custom { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// 验证警告类型
#[derive(Debug, Clone)]
pub enum ValidationWarning {
    /// 高数值
    HighValue {
        /// 字段名称
        field: &'static str,
        /// 索引
        index: usize,
        /// 实际值
        value: f64,
        /// 阈值
        threshold: f64,
    },
    /// 质量警告（退化单元、过小截面等）
    Quality {
        /// 警告描述
        message: String,
        /// 可选的单元索引
        element_id: Option<usize>,
    },
    /// 自定义警告
    Custom {
        /// 自定义消息
        message: String,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighValue {
                field,
                index,
                value,
                threshold,
            } => write!(
                f,
                "索引{}: 字段{}={} 超过阈值{}",
                index, field, value, threshold
            ),
            Self::Quality {
                message,
                element_id,
            } => match element_id {
                Some(id) => write!(f, "单元{}: 质量警告: {}", id, message),
                None => write!(f, "质量警告: {}", message),
            },
            Self::Custom { message } => write!(f, "{}", message),
        }
    }
}

// ============================================================================
// 验证辅助函数
// ============================================================================

/// 检查值是否在闭区间内
pub fn check_range(
    report: &mut ValidationReport,
    field: &'static str,
    index: usize,
    value: f64,
    min: f64,
    max: f64,
) -> bool {
    if !(min..=max).contains(&value) {
        report.add_error(ValidationError::OutOfRange {
            field,
            index,
            value,
            min,
            max,
        });
        false
    } else {
        true
    }
}

/// 检查值是否超过阈值并添加警告
pub fn warn_if_high(
    report: &mut ValidationReport,
    field: &'static str,
    index: usize,
    value: f64,
    threshold: f64,
) -> bool {
    if value > threshold {
        report.add_warning(ValidationWarning::HighValue {
            field,
            index,
            value,
            threshold,
        });
        true
    } else {
        false
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report_new() {
        let report = ValidationReport::new();
        assert!(!report.has_errors());
        assert!(!report.has_warnings());
        assert!(report.is_valid());
        assert!(report.first_error_message().is_none());
    }

    #[test]
    fn test_warning_does_not_invalidate() {
        let mut report = ValidationReport::new();
        report.add_warning(ValidationWarning::Quality {
            message: "截面半径过小".into(),
            element_id: Some(3),
        });

        assert!(report.has_warnings());
        assert!(report.is_valid());
    }

    #[test]
    fn test_validation_report_merge() {
        let mut a = ValidationReport::new();
        a.add_error(ValidationError::Custom {
            message: "error 1".into(),
        });

        let mut b = ValidationReport::new();
        b.add_error(ValidationError::Topology {
            message: "节点 99 不存在".into(),
            element_id: Some(7),
        });
        b.add_warning(ValidationWarning::Custom {
            message: "warning 1".into(),
        });

        a.merge(b);
        assert_eq!(a.error_count(), 2);
        assert_eq!(a.warning_count(), 1);
        assert_eq!(a.first_error_message().as_deref(), Some("error 1"));
    }

    #[test]
    fn test_check_helpers() {
        let mut report = ValidationReport::new();

        assert!(check_range(&mut report, "displacement", 1, 0.5, 0.0, 1.0));
        assert!(!report.has_errors());

        assert!(!check_range(&mut report, "displacement", 3, -0.1, 0.0, 1.0));
        assert!(!check_range(&mut report, "displacement", 4, f64::NAN, 0.0, 1.0));
        assert_eq!(report.error_count(), 2);

        assert!(warn_if_high(&mut report, "stress", 5, 2.0e7, 1.0e7));
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_report_display() {
        let mut report = ValidationReport::new();
        report.add_error(ValidationError::OutOfRange {
            field: "pressure",
            index: 42,
            value: f64::NAN,
            min: 0.0,
            max: 1.0e5,
        });

        let s = format!("{}", report);
        assert!(s.contains("错误: 1 个"));
        assert!(s.contains("42"));
        assert!(s.contains("pressure"));
    }
}

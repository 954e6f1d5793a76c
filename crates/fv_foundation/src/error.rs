// crates/fv_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `FvError` 枚举和 `FvResult` 类型别名，贯穿场变量、离散项、
//! 组装器、求解器与通信层。
//!
//! # 错误分类
//!
//! 1. **前置条件**: 形状不匹配、广播失败，在调用处立即报错
//! 2. **几何**: 面积或距离为零的退化几何，中止当前组装
//! 3. **求解**: 发散与奇异矩阵，原样上抛，不在本地重试
//! 4. **通信**: 启动期的后端配置错误与运行期的集合通信失败
//!
//! # 示例
//!
//! ```
//! use fv_foundation::error::{FvError, FvResult};
//!
//! fn check_rank(rank: usize, element_shape: &[usize]) -> FvResult<()> {
//!     if element_shape.len() != rank {
//!         return Err(FvError::shape_mismatch(format!(
//!             "elementShape {:?} 与 rank {} 不一致",
//!             element_shape, rank
//!         )));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_rank(1, &[2]).is_ok());
//! assert!(check_rank(2, &[2]).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type FvResult<T> = Result<T, FvError>;

/// FvTerm 错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FvError {
    // ========================================================================
    // 形状与广播
    // ========================================================================
    /// 元素形状与张量阶数不一致，或算子作用于不相容的阶数
    #[error("形状不匹配: {message}")]
    ShapeMismatch {
        /// 具体原因
        message: String,
    },

    /// 操作数形状无法统一
    #[error("广播失败: {lhs:?} 与 {rhs:?} 无法广播 ({operation})")]
    Broadcast {
        /// 触发广播的操作
        operation: &'static str,
        /// 左操作数形状
        lhs: Vec<usize>,
        /// 右操作数形状
        rhs: Vec<usize>,
    },

    // ========================================================================
    // 网格与几何
    // ========================================================================
    /// 几何量退化（零面积、重合单元中心等）
    #[error("退化几何: 面 {face} 的 {quantity} = {value}")]
    DegenerateGeometry {
        /// 面索引
        face: usize,
        /// 退化的几何量名称
        quantity: &'static str,
        /// 实际值
        value: f64,
    },

    /// 操作要求特定网格类型
    #[error("网格类型不符: 需要 {expected}, 实际为 {found}")]
    MeshDimension {
        /// 需要的网格类型
        expected: String,
        /// 实际网格类型
        found: String,
    },

    /// 未知的边界片
    #[error("未知的边界片: {name}")]
    UnknownPatch {
        /// 边界片名称
        name: String,
    },

    // ========================================================================
    // 线性求解
    // ========================================================================
    /// 迭代求解发散或未收敛
    #[error("求解器发散: {iterations} 次迭代后残差 {residual:.3e}")]
    SolverDiverged {
        /// 已执行的迭代次数
        iterations: usize,
        /// 最终残差范数
        residual: f64,
    },

    /// 系数矩阵奇异
    #[error("奇异矩阵: 第 {row} 行无可用主元")]
    SingularMatrix {
        /// 出问题的行
        row: usize,
    },

    // ========================================================================
    // 并行通信
    // ========================================================================
    /// 请求的并行后端不可用
    #[error("通信配置错误: {message}")]
    CommunicationConfig {
        /// 具体原因
        message: String,
    },

    /// 集合通信失败（超时、调用不匹配、对端中止）
    #[error("通信失败 (rank {rank}): {message}")]
    Communication {
        /// 报告错误的进程号
        rank: usize,
        /// 具体原因
        message: String,
    },

    // ========================================================================
    // 通用
    // ========================================================================
    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl FvError {
    /// 形状不匹配
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// 广播失败
    pub fn broadcast(operation: &'static str, lhs: &[usize], rhs: &[usize]) -> Self {
        Self::Broadcast {
            operation,
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// 退化几何
    pub fn degenerate_geometry(face: usize, quantity: &'static str, value: f64) -> Self {
        Self::DegenerateGeometry {
            face,
            quantity,
            value,
        }
    }

    /// 网格类型不符
    pub fn mesh_dimension(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::MeshDimension {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// 未知边界片
    pub fn unknown_patch(name: impl Into<String>) -> Self {
        Self::UnknownPatch { name: name.into() }
    }

    /// 求解器发散
    pub fn solver_diverged(iterations: usize, residual: f64) -> Self {
        Self::SolverDiverged {
            iterations,
            residual,
        }
    }

    /// 奇异矩阵
    pub fn singular_matrix(row: usize) -> Self {
        Self::SingularMatrix { row }
    }

    /// 通信配置错误
    pub fn communication_config(message: impl Into<String>) -> Self {
        Self::CommunicationConfig {
            message: message.into(),
        }
    }

    /// 集合通信失败
    pub fn communication(rank: usize, message: impl Into<String>) -> Self {
        Self::Communication {
            rank,
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 是否属于调用方前置条件错误
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::Broadcast { .. }
                | Self::SizeMismatch { .. }
                | Self::IndexOutOfBounds { .. }
                | Self::InvalidInput { .. }
        )
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl FvError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> FvResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> FvResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }

    /// 检查几何量为有限正数
    #[inline]
    pub fn check_geometry(face: usize, quantity: &'static str, value: f64) -> FvResult<()> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(Self::degenerate_geometry(face, quantity, value))
        }
    }
}

// ========================================================================
// 宏
// ========================================================================

/// 条件不满足时提前返回错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

/// 解包 `Option`，为 `None` 时提前返回错误
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err.into()),
        }
    };
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FvError::config("缺少 mesh 段");
        assert!(err.to_string().contains("配置错误"));
    }

    #[test]
    fn test_broadcast_display() {
        let err = FvError::broadcast("dot", &[2, 6], &[3, 6]);
        let msg = err.to_string();
        assert!(msg.contains("[2, 6]"));
        assert!(msg.contains("[3, 6]"));
        assert!(msg.contains("dot"));
    }

    #[test]
    fn test_degenerate_geometry() {
        let err = FvError::degenerate_geometry(3, "面积", 0.0);
        assert!(err.to_string().contains("面 3"));
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_check_size() {
        assert!(FvError::check_size("rhs", 10, 10).is_ok());
        assert!(FvError::check_size("rhs", 10, 5).is_err());
    }

    #[test]
    fn test_check_index() {
        assert!(FvError::check_index("Cell", 5, 10).is_ok());
        assert!(FvError::check_index("Cell", 10, 10).is_err());
    }

    #[test]
    fn test_check_geometry() {
        assert!(FvError::check_geometry(0, "距离", 0.5).is_ok());
        assert!(FvError::check_geometry(0, "距离", 0.0).is_err());
        assert!(FvError::check_geometry(0, "距离", -1.0).is_err());
        assert!(FvError::check_geometry(0, "距离", f64::NAN).is_err());
    }

    #[test]
    fn test_ensure_macro() {
        fn check(value: i32) -> FvResult<()> {
            ensure!(value > 0, FvError::invalid_input("value must be positive"));
            Ok(())
        }

        assert!(check(1).is_ok());
        assert!(check(-1).is_err());
    }

    #[test]
    fn test_require_macro() {
        fn get_value(opt: Option<i32>) -> FvResult<i32> {
            let v = require!(opt, FvError::unknown_patch("left"));
            Ok(v)
        }

        assert_eq!(get_value(Some(42)).unwrap(), 42);
        assert!(matches!(
            get_value(None),
            Err(FvError::UnknownPatch { .. })
        ));
    }
}

// crates/fv_config/src/lib.rs

//! FvTerm 配置层
//!
//! 用 JSON 描述一个完整算例，并把它构建成网格、边界条件与方程。
//!
//! # 模块概览
//!
//! - [`case`]: [`CaseConfig`] 及各节配置
//! - [`error`]: 配置错误类型 [`ConfigError`]
//!
//! # 层级
//!
//! ```text
//! fv_cli     ─> CaseConfig
//! fv_config  ─> 本层
//! fv_physics ─> Equation, SolverConfig, AssemblerConfig
//! fv_comm    ─> ParallelConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod case;
pub mod error;

pub use case::{
    BoundaryConfig, CaseConfig, ConvectionConfig, EquationConfig, MeshConfig, OutputConfig,
    TimeConfig,
};
pub use error::ConfigError;

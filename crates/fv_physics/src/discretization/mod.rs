// crates/fv_physics/src/discretization/mod.rs

//! 离散化模块
//!
//! 从微分算子到线性系统的完整链路：
//!
//! ```text
//! Term ──weight()──> Weight { Implicit | Explicit }
//!   │                       │
//!   └─geometric_coefficients()
//!                           ▼
//!               Assembler ──> LinearSystem { matrix, rhs } ──> LinearSolver
//! ```
//!
//! # 子模块
//!
//! - [`weight`]: 组装角色与面/单元模板
//! - [`scheme`]: 对流插值格式
//! - [`term`]: 离散项（算子 + 角色）
//! - [`boundary`]: 边界条件
//! - [`assembler`]: 组装器与线性系统
//! - [`equation`]: 方程代数与求解

pub mod assembler;
pub mod boundary;
pub mod equation;
pub mod scheme;
pub mod term;
pub mod weight;

pub use assembler::{Assembler, AssemblerConfig, LinearSystem};
pub use boundary::{BoundaryCondition, BoundaryConditions};
pub use equation::{Equation, ScaledTerm, SweepReport};
pub use scheme::{
    CentralDifferenceScheme, ConvectionScheme, ExponentialScheme, HybridScheme, PowerLawScheme,
    SchemeKind, UpwindScheme,
};
pub use term::{AssemblyContext, Coefficient, Term, TermOperator};
pub use weight::{AssemblyRole, CellStencil, FaceStencil, Stencil, Weight};

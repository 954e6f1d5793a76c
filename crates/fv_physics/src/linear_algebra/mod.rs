// crates/fv_physics/src/linear_algebra/mod.rs

//! 线性代数模块
//!
//! 组装结果的稀疏存储与求解适配层。
//!
//! # 子模块
//!
//! - [`csr`]: CSR 稀疏矩阵与构建器
//! - [`vector_ops`]: 向量运算
//! - [`preconditioner`]: 恒等与 Jacobi 预条件器
//! - [`solver`]: `LinearSolver` 接口、BiCGStab 与稠密 LU

pub mod csr;
pub mod preconditioner;
pub mod solver;
pub mod vector_ops;

pub use csr::{CsrBuilder, CsrMatrix, CsrPattern};
pub use preconditioner::{IdentityPreconditioner, JacobiPreconditioner, Preconditioner};
pub use solver::{
    create_solver, BiCgStabSolver, DenseLuSolver, IterativeSolver, LinearSolver, SolverConfig,
    SolverKind, SolverResult, SolverStatus,
};

// crates/fv_physics/src/lib.rs

//! FvTerm 离散引擎
//!
//! 把微分算子的组合离散成有限体积线性系统并求解。
//!
//! # 模块概览
//!
//! - [`field`]: 网格场变量与惰性运算图
//! - [`discretization`]: 权重、格式、离散项、边界条件、组装器、方程
//! - [`linear_algebra`]: CSR 矩阵与线性求解适配
//! - [`viewer`]: 二维网格图像数据
//!
//! # 示例
//!
//! ```ignore
//! use fv_mesh::{Grid1D, Mesh};
//! use fv_physics::prelude::*;
//! use std::sync::Arc;
//!
//! let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::new(50, 0.02)?);
//! let phi = Field::scalar_cell(mesh.clone(), "phi", 0.0)?;
//! let bcs = BoundaryConditions::new().fixed_value(&*mesh, "left", 1.0)?;
//! let eq = Term::diffusion(1.0) - Term::upwind_convection(vec![1.0]);
//! eq.solve(&phi, &bcs, &mut DenseLuSolver::new(), &AssemblyContext::steady())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discretization;
pub mod field;
pub mod linear_algebra;
pub mod viewer;

/// 预导入模块
pub mod prelude {
    pub use crate::discretization::{
        Assembler, AssemblerConfig, AssemblyContext, AssemblyRole, BoundaryCondition,
        BoundaryConditions, Coefficient, Equation, LinearSystem, SchemeKind, Term, Weight,
    };
    pub use crate::field::{Field, FieldLocation, FieldSpec, FieldState, Operand};
    pub use crate::linear_algebra::{
        create_solver, BiCgStabSolver, DenseLuSolver, LinearSolver, SolverConfig, SolverKind,
    };
    pub use crate::viewer::{GridImage, ViewerLimits};
    pub use fv_foundation::{FvError, FvResult};
}

// crates/fv_physics/src/discretization/equation.rs

//! 方程
//!
//! 方程是带系数离散项与源项的线性组合，支持 `+`、`-`、数乘：
//!
//! ```ignore
//! let eq = Term::transient(1.0) + Term::upwind_convection(u) - 0.1 * Term::diffusion(1.0);
//! let eq = eq.with_source(source_field);
//! eq.solve(&phi, &bcs, &mut *solver, &AssemblyContext::with_dt(0.01))?;
//! ```

use super::assembler::{Assembler, LinearSystem};
use super::boundary::BoundaryConditions;
use super::term::{AssemblyContext, Coefficient, Term};
use crate::field::Field;
use crate::linear_algebra::LinearSolver;
use fv_foundation::FvResult;
use std::ops::{Add, Mul, Neg, Sub};

/// 带系数的离散项
#[derive(Debug, Clone)]
pub struct ScaledTerm {
    /// 离散项
    pub term: Term,
    /// 系数
    pub coefficient: f64,
}

impl ScaledTerm {
    /// 构造
    pub fn new(term: Term, coefficient: f64) -> Self {
        Self { term, coefficient }
    }
}

impl From<Term> for ScaledTerm {
    fn from(term: Term) -> Self {
        Self::new(term, 1.0)
    }
}

/// 一次求解的残差记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepReport {
    /// 以求解前的变量值计算的残差
    pub initial_residual: f64,
    /// 写回解之后的残差
    pub final_residual: f64,
}

/// 方程 `Σ c_k L_k(φ) = Σ s_j S_j`
///
/// 相加时沿用左侧显式设置的组装器；左侧未设置时取右侧的。
#[derive(Debug, Clone, Default)]
pub struct Equation {
    terms: Vec<ScaledTerm>,
    sources: Vec<(Coefficient, f64)>,
    assembler: Assembler,
    custom_assembler: bool,
}

impl Equation {
    /// 空方程
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加离散项
    pub fn term(mut self, term: impl Into<ScaledTerm>) -> Self {
        self.terms.push(term.into());
        self
    }

    /// 追加源项（单元值，乘以体积后进入右端）
    pub fn with_source(mut self, source: impl Into<Coefficient>) -> Self {
        self.sources.push((source.into(), 1.0));
        self
    }

    /// 替换组装器
    pub fn with_assembler(mut self, assembler: Assembler) -> Self {
        self.assembler = assembler;
        self.custom_assembler = true;
        self
    }

    /// 离散项
    pub fn terms(&self) -> &[ScaledTerm] {
        &self.terms
    }

    /// 源项
    pub fn sources(&self) -> &[(Coefficient, f64)] {
        &self.sources
    }

    /// 组装器
    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// 组装线性系统
    pub fn assemble(
        &self,
        var: &Field,
        bcs: &BoundaryConditions,
        ctx: &AssemblyContext,
    ) -> FvResult<LinearSystem> {
        self.assembler
            .assemble(var, &self.terms, &self.sources, bcs, ctx)
    }

    /// 组装、求解并写回 `var`
    pub fn solve(
        &self,
        var: &Field,
        bcs: &BoundaryConditions,
        solver: &mut dyn LinearSolver,
        ctx: &AssemblyContext,
    ) -> FvResult<SweepReport> {
        let system = self.assemble(var, bcs, ctx)?;
        let current = var.values()?;
        let initial_residual = self.assembler.global_residual_norm(&system, &current)?;
        let x = solver.solve(&system.matrix, &system.rhs)?;
        let final_residual = self.assembler.global_residual_norm(&system, &x)?;
        var.set_value(x, None)?;
        log::debug!(
            "{}: 残差 {:.3e} -> {:.3e}",
            solver.name(),
            initial_residual,
            final_residual
        );
        Ok(SweepReport {
            initial_residual,
            final_residual,
        })
    }

    /// 一次扫描，返回求解前的残差
    pub fn sweep(
        &self,
        var: &Field,
        bcs: &BoundaryConditions,
        solver: &mut dyn LinearSolver,
        ctx: &AssemblyContext,
    ) -> FvResult<f64> {
        Ok(self.solve(var, bcs, solver, ctx)?.initial_residual)
    }

    fn scaled(mut self, factor: f64) -> Self {
        for t in &mut self.terms {
            t.coefficient *= factor;
        }
        for (_, s) in &mut self.sources {
            *s *= factor;
        }
        self
    }
}

impl From<Term> for Equation {
    fn from(term: Term) -> Self {
        Equation::new().term(term)
    }
}

impl From<ScaledTerm> for Equation {
    fn from(term: ScaledTerm) -> Self {
        Equation::new().term(term)
    }
}

// ============================================================================
// 运算符
// ============================================================================

impl<R: Into<Equation>> Add<R> for Equation {
    type Output = Equation;

    fn add(mut self, rhs: R) -> Equation {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.sources.extend(rhs.sources);
        if !self.custom_assembler && rhs.custom_assembler {
            self.assembler = rhs.assembler;
            self.custom_assembler = true;
        }
        self
    }
}

impl<R: Into<Equation>> Sub<R> for Equation {
    type Output = Equation;

    fn sub(self, rhs: R) -> Equation {
        self + rhs.into().scaled(-1.0)
    }
}

impl Neg for Equation {
    type Output = Equation;

    fn neg(self) -> Equation {
        self.scaled(-1.0)
    }
}

impl Mul<f64> for Equation {
    type Output = Equation;

    fn mul(self, rhs: f64) -> Equation {
        self.scaled(rhs)
    }
}

impl Mul<Equation> for f64 {
    type Output = Equation;

    fn mul(self, rhs: Equation) -> Equation {
        rhs.scaled(self)
    }
}

macro_rules! term_ops {
    ($t:ty) => {
        impl<R: Into<Equation>> Add<R> for $t {
            type Output = Equation;

            fn add(self, rhs: R) -> Equation {
                Equation::from(self) + rhs
            }
        }

        impl<R: Into<Equation>> Sub<R> for $t {
            type Output = Equation;

            fn sub(self, rhs: R) -> Equation {
                Equation::from(self) - rhs
            }
        }
    };
}

term_ops!(Term);
term_ops!(ScaledTerm);

impl Mul<f64> for Term {
    type Output = ScaledTerm;

    fn mul(self, rhs: f64) -> ScaledTerm {
        ScaledTerm::new(self, rhs)
    }
}

impl Mul<Term> for f64 {
    type Output = ScaledTerm;

    fn mul(self, rhs: Term) -> ScaledTerm {
        ScaledTerm::new(rhs, self)
    }
}

impl Mul<f64> for ScaledTerm {
    type Output = ScaledTerm;

    fn mul(mut self, rhs: f64) -> ScaledTerm {
        self.coefficient *= rhs;
        self
    }
}

impl Neg for Term {
    type Output = ScaledTerm;

    fn neg(self) -> ScaledTerm {
        ScaledTerm::new(self, -1.0)
    }
}

impl Neg for ScaledTerm {
    type Output = ScaledTerm;

    fn neg(mut self) -> ScaledTerm {
        self.coefficient = -self.coefficient;
        self
    }
}

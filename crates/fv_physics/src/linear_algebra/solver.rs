// crates/fv_physics/src/linear_algebra/solver.rs

//! 线性求解器
//!
//! 组装器把 `(A, b)` 交给 [`LinearSolver`]，只关心得到解向量或错误：
//! 迭代发散、停滞或达到最大迭代次数映射为 `SolverDiverged`，
//! 全零行或零主元映射为 `SingularMatrix`。失败不在此处重试。
//!
//! # 求解器类型
//!
//! - [`BiCgStabSolver`]: Jacobi 预条件的 BiCGStab，适用于非对称矩阵
//! - [`DenseLuSolver`]: 部分选主元高斯消元，适用于小规模系统
//!
//! # 使用示例
//!
//! ```ignore
//! use fv_physics::linear_algebra::{create_solver, SolverConfig};
//!
//! let mut solver = create_solver(&SolverConfig::default());
//! let x = solver.solve(&system.matrix, &system.rhs)?;
//! ```

use super::csr::CsrMatrix;
use super::preconditioner::{JacobiPreconditioner, Preconditioner};
use super::vector_ops::{axpy, copy, dot, norm2};
use fv_foundation::{FvError, FvResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// 配置
// ============================================================================

/// 求解器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// BiCGStab + Jacobi
    #[default]
    #[serde(rename = "bicgstab")]
    BiCgStab,
    /// 稠密 LU
    DenseLu,
}

/// 求解器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// 求解器种类
    #[serde(default)]
    pub kind: SolverKind,
    /// 相对收敛容差
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    /// 绝对收敛容差
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// 最大迭代次数
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// 是否输出每次迭代的残差
    #[serde(default)]
    pub verbose: bool,
}

fn default_rtol() -> f64 {
    1e-10
}

fn default_atol() -> f64 {
    1e-14
}

fn default_max_iter() -> usize {
    1000
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::BiCgStab,
            rtol: default_rtol(),
            atol: default_atol(),
            max_iter: default_max_iter(),
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// 创建求解器配置
    pub fn new(rtol: f64, max_iter: usize) -> Self {
        Self {
            rtol,
            max_iter,
            ..Default::default()
        }
    }

    /// 设置绝对容差
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    /// 启用详细输出
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

/// 求解器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// 收敛
    Converged,
    /// 达到最大迭代次数
    MaxIterationsReached,
    /// 发散
    Diverged,
    /// 停滞
    Stagnated,
}

/// 迭代求解结果
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// 求解状态
    pub status: SolverStatus,
    /// 迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: f64,
    /// 初始残差范数
    pub initial_residual_norm: f64,
}

impl SolverResult {
    /// 是否成功收敛
    pub fn is_converged(&self) -> bool {
        self.status == SolverStatus::Converged
    }

    fn into_result(self) -> FvResult<()> {
        if self.is_converged() {
            Ok(())
        } else {
            Err(FvError::solver_diverged(self.iterations, self.residual_norm))
        }
    }
}

// ============================================================================
// 接口
// ============================================================================

/// 不透明线性求解接口 `solve(A, b) -> x`
pub trait LinearSolver: Send {
    /// 求解 A x = b
    fn solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> FvResult<Vec<f64>>;

    /// 名称
    fn name(&self) -> &'static str;
}

/// 带预条件器与初值的迭代求解接口
pub trait IterativeSolver {
    /// 求解 A x = b，`x` 输入初值、输出解
    fn solve_with<P: Preconditioner>(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &P,
    ) -> SolverResult;
}

/// 按配置创建求解器
pub fn create_solver(config: &SolverConfig) -> Box<dyn LinearSolver> {
    match config.kind {
        SolverKind::BiCgStab => Box::new(BiCgStabSolver::new(config.clone())),
        SolverKind::DenseLu => Box::new(DenseLuSolver::new()),
    }
}

/// 检查方阵形状、右端项长度与全零行
fn check_system(matrix: &CsrMatrix, rhs: &[f64]) -> FvResult<()> {
    FvError::check_size("矩阵列数", matrix.n_rows(), matrix.n_cols())?;
    FvError::check_size("右端项", matrix.n_rows(), rhs.len())?;
    for row in 0..matrix.n_rows() {
        if matrix.row(row).all(|(_, v)| v == 0.0) {
            return Err(FvError::singular_matrix(row));
        }
    }
    Ok(())
}

// ============================================================================
// BiCGStab
// ============================================================================

/// 双共轭梯度稳定法求解器
///
/// 适用于对流引入的非对称矩阵。
pub struct BiCgStabSolver {
    config: SolverConfig,
    r: Vec<f64>,
    r0: Vec<f64>,
    p: Vec<f64>,
    v: Vec<f64>,
    s: Vec<f64>,
    t: Vec<f64>,
    z: Vec<f64>,
}

impl BiCgStabSolver {
    /// 创建 BiCGStab 求解器
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            r: Vec::new(),
            r0: Vec::new(),
            p: Vec::new(),
            v: Vec::new(),
            s: Vec::new(),
            t: Vec::new(),
            z: Vec::new(),
        }
    }

    fn ensure_workspace(&mut self, n: usize) {
        if self.r.len() != n {
            self.r = vec![0.0; n];
            self.r0 = vec![0.0; n];
            self.p = vec![0.0; n];
            self.v = vec![0.0; n];
            self.s = vec![0.0; n];
            self.t = vec![0.0; n];
            self.z = vec![0.0; n];
        }
    }

    fn finish(
        &self,
        status: SolverStatus,
        iterations: usize,
        residual: f64,
        initial: f64,
    ) -> SolverResult {
        SolverResult {
            status,
            iterations,
            residual_norm: residual,
            initial_residual_norm: initial,
        }
    }
}

impl IterativeSolver for BiCgStabSolver {
    fn solve_with<P: Preconditioner>(
        &mut self,
        matrix: &CsrMatrix,
        b: &[f64],
        x: &mut [f64],
        precond: &P,
    ) -> SolverResult {
        const STAG_TOL: f64 = 1e-30;
        const DIV_FACTOR: f64 = 1e6;

        let n = b.len();
        self.ensure_workspace(n);
        let (rtol, atol) = (self.config.rtol, self.config.atol);

        // r = b - A x
        matrix.mul_vec(x, &mut self.r);
        for i in 0..n {
            self.r[i] = b[i] - self.r[i];
        }

        let initial = norm2(&self.r);
        let b_norm = norm2(b).max(initial);
        if initial < atol || initial <= rtol * b_norm {
            return self.finish(SolverStatus::Converged, 0, initial, initial);
        }

        // 影子残差在迭代中保持不变
        copy(&self.r, &mut self.r0);

        let mut rho_old = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        self.v.fill(0.0);
        self.p.fill(0.0);

        for iter in 0..self.config.max_iter {
            let rho = dot(&self.r0, &self.r);
            if rho.abs() < STAG_TOL {
                let res = norm2(&self.r);
                return self.finish(SolverStatus::Stagnated, iter, res, initial);
            }

            let beta = if iter == 0 {
                0.0
            } else {
                (rho / rho_old) * (alpha / omega)
            };
            rho_old = rho;

            // p = r + beta (p - omega v)
            for i in 0..n {
                self.p[i] = self.r[i] + beta * (self.p[i] - omega * self.v[i]);
            }

            precond.apply(&self.p, &mut self.z);
            matrix.mul_vec(&self.z, &mut self.v);

            let r0v = dot(&self.r0, &self.v);
            if r0v.abs() < STAG_TOL {
                let res = norm2(&self.r);
                return self.finish(SolverStatus::Stagnated, iter, res, initial);
            }
            alpha = rho / r0v;

            // s = r - alpha v
            for i in 0..n {
                self.s[i] = self.r[i] - alpha * self.v[i];
            }

            let s_norm = norm2(&self.s);
            if s_norm < atol || s_norm <= rtol * b_norm {
                axpy(alpha, &self.z, x);
                return self.finish(SolverStatus::Converged, iter + 1, s_norm, initial);
            }

            // x += alpha M⁻¹p 需在 z 被覆盖前完成
            axpy(alpha, &self.z, x);

            precond.apply(&self.s, &mut self.z);
            matrix.mul_vec(&self.z, &mut self.t);

            let tt = dot(&self.t, &self.t);
            omega = if tt < STAG_TOL {
                0.0
            } else {
                dot(&self.t, &self.s) / tt
            };
            if omega.abs() < STAG_TOL {
                return self.finish(SolverStatus::Stagnated, iter + 1, s_norm, initial);
            }

            axpy(omega, &self.z, x);

            // r = s - omega t
            for i in 0..n {
                self.r[i] = self.s[i] - omega * self.t[i];
            }

            let res = norm2(&self.r);
            if self.config.verbose {
                log::trace!("BiCGStab iter {}: residual = {:.6e}", iter + 1, res);
            }

            if res < atol || res <= rtol * b_norm {
                return self.finish(SolverStatus::Converged, iter + 1, res, initial);
            }
            if !res.is_finite() || res > initial * DIV_FACTOR {
                return self.finish(SolverStatus::Diverged, iter + 1, res, initial);
            }
        }

        let res = norm2(&self.r);
        self.finish(
            SolverStatus::MaxIterationsReached,
            self.config.max_iter,
            res,
            initial,
        )
    }
}

impl LinearSolver for BiCgStabSolver {
    fn solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> FvResult<Vec<f64>> {
        check_system(matrix, rhs)?;
        let precond = JacobiPreconditioner::from_matrix(matrix);
        let mut x = vec![0.0; rhs.len()];
        let result = self.solve_with(matrix, rhs, &mut x, &precond);
        log::debug!(
            "BiCGStab: {:?}, {} 次迭代, 残差 {:.3e} (初始 {:.3e})",
            result.status,
            result.iterations,
            result.residual_norm,
            result.initial_residual_norm
        );
        result.into_result()?;
        Ok(x)
    }

    fn name(&self) -> &'static str {
        "BiCGStab"
    }
}

// ============================================================================
// 稠密 LU
// ============================================================================

/// 部分选主元高斯消元
#[derive(Debug, Clone)]
pub struct DenseLuSolver {
    pivot_tol: f64,
}

impl DenseLuSolver {
    /// 默认主元阈值 1e-14
    pub fn new() -> Self {
        Self { pivot_tol: 1e-14 }
    }
}

impl Default for DenseLuSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSolver for DenseLuSolver {
    fn solve(&mut self, matrix: &CsrMatrix, rhs: &[f64]) -> FvResult<Vec<f64>> {
        check_system(matrix, rhs)?;
        let n = rhs.len();
        let mut a = matrix.to_dense();
        let mut b = rhs.to_vec();
        // 原始行号，用于报告奇异行
        let mut rows: Vec<usize> = (0..n).collect();

        for col in 0..n {
            let (pivot_row, pivot_val) = (col..n)
                .map(|r| (r, a[r][col].abs()))
                .fold((col, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            if pivot_val <= self.pivot_tol {
                return Err(FvError::singular_matrix(rows[col]));
            }
            if pivot_row != col {
                a.swap(pivot_row, col);
                b.swap(pivot_row, col);
                rows.swap(pivot_row, col);
            }

            let pivot = a[col][col];
            for r in (col + 1)..n {
                let factor = a[r][col] / pivot;
                if factor == 0.0 {
                    continue;
                }
                a[r][col] = 0.0;
                for c in (col + 1)..n {
                    a[r][c] -= factor * a[col][c];
                }
                b[r] -= factor * b[col];
            }
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let tail: f64 = ((i + 1)..n).map(|j| a[i][j] * x[j]).sum();
            x[i] = (b[i] - tail) / a[i][i];
        }

        if let Some(i) = x.iter().position(|v| !v.is_finite()) {
            return Err(FvError::solver_diverged(0, x[i]));
        }
        log::debug!("DenseLU: {} 未知量", n);
        Ok(x)
    }

    fn name(&self) -> &'static str {
        "DenseLU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::csr::CsrBuilder;
    use crate::linear_algebra::vector_ops::residual_norm;

    /// 一维 Poisson 矩阵（负定）加非对称项
    fn convection_diffusion(n: usize, peclet: f64) -> CsrMatrix {
        let mut b = CsrBuilder::new_square(n);
        for i in 0..n {
            b.add(i, i, -2.0 - peclet);
            if i > 0 {
                b.add(i, i - 1, 1.0 + peclet);
            }
            if i + 1 < n {
                b.add(i, i + 1, 1.0);
            }
        }
        b.build()
    }

    #[test]
    fn test_bicgstab_nonsymmetric() {
        let m = convection_diffusion(20, 0.5);
        let rhs = vec![-1.0; 20];
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-12, 500));
        let x = solver.solve(&m, &rhs).unwrap();
        assert!(residual_norm(&m, &x, &rhs) < 1e-8);
    }

    #[test]
    fn test_dense_matches_bicgstab() {
        let m = convection_diffusion(8, 1.0);
        let rhs: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let x1 = DenseLuSolver::new().solve(&m, &rhs).unwrap();
        let x2 = BiCgStabSolver::new(SolverConfig::new(1e-13, 500))
            .solve(&m, &rhs)
            .unwrap();
        for (a, b) in x1.iter().zip(&x2) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_zero_row_is_singular() {
        let mut b = CsrBuilder::new_square(3);
        b.add(0, 0, 1.0);
        b.add(2, 2, 1.0);
        let m = b.build();
        let solvers: Vec<Box<dyn LinearSolver>> = vec![
            create_solver(&SolverConfig::default()),
            Box::new(DenseLuSolver::new()),
        ];
        for mut solver in solvers {
            assert!(matches!(
                solver.solve(&m, &[1.0, 1.0, 1.0]),
                Err(FvError::SingularMatrix { row: 1 })
            ));
        }
    }

    #[test]
    fn test_dependent_rows_singular_in_lu() {
        let mut b = CsrBuilder::new_square(2);
        b.add(0, 0, 1.0);
        b.add(0, 1, 1.0);
        b.add(1, 0, 2.0);
        b.add(1, 1, 2.0);
        let m = b.build();
        assert!(matches!(
            DenseLuSolver::new().solve(&m, &[1.0, 2.0]),
            Err(FvError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_iteration_limit_is_divergence() {
        let m = convection_diffusion(50, 0.0);
        let rhs = vec![1.0; 50];
        let mut solver = BiCgStabSolver::new(SolverConfig::new(1e-14, 2));
        assert!(matches!(
            solver.solve(&m, &rhs),
            Err(FvError::SolverDiverged { .. })
        ));
    }

    #[test]
    fn test_zero_rhs_converges_immediately() {
        let m = convection_diffusion(4, 0.0);
        let x = BiCgStabSolver::new(SolverConfig::default())
            .solve(&m, &[0.0; 4])
            .unwrap();
        assert_eq!(x, vec![0.0; 4]);
    }

    #[test]
    fn test_config_serde_defaults() {
        let c: SolverConfig = serde_json::from_str(r#"{"kind": "dense_lu"}"#).unwrap();
        assert_eq!(c.kind, SolverKind::DenseLu);
        assert_eq!(c.max_iter, 1000);
        assert_eq!(create_solver(&c).name(), "DenseLU");
    }
}

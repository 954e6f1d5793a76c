// crates/fv_physics/src/discretization/assembler.rs

//! 线性系统组装器
//!
//! 把若干带系数的离散项累加成一个稀疏矩阵与右端向量：
//!
//! ```text
//! Σ_k c_k L_k(φ) = S
//! ```
//!
//! - 隐式模板按 (cell1,cell1) (cell1,cell2) (cell2,cell2) (cell2,cell1) 进入矩阵
//! - 显式模板用旧值 φ_old 求值后移到右端，符号取反
//! - 边界面没有 cell2，非对角部分乘以边界值进入右端，从不产生矩阵非对角元
//! - 面贡献乘以面积，单元贡献乘以体积
//!
//! 旧值取变量的 `old()`；变量没有旧值时取当前值（上一迭代值）。
//!
//! 组装只覆盖单个分区：跨分区面按边界面处理。通信后端只用于全局残差归约。

use super::boundary::{BoundaryCondition, BoundaryConditions};
use super::equation::ScaledTerm;
use super::term::{AssemblyContext, Coefficient};
use super::weight::{AssemblyRole, CellStencil, FaceStencil, Stencil};
use crate::field::{Field, FieldLocation};
use crate::linear_algebra::{vector_ops, CsrBuilder, CsrMatrix};
use fv_comm::{CommBackend, DummyComm};
use fv_foundation::{FvError, FvResult};
use fv_mesh::Mesh;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// 配置
// ============================================================================

fn default_geometry_tolerance() -> f64 {
    0.0
}

fn default_true() -> bool {
    true
}

/// 组装配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// 面积、中心距、体积不大于此值视为退化
    #[serde(default = "default_geometry_tolerance")]
    pub geometry_tolerance: f64,
    /// 跳过系数为零的项
    #[serde(default = "default_true")]
    pub skip_zero_terms: bool,
    /// 每行都写入对角元（可能为 0）
    #[serde(default = "default_true")]
    pub ensure_diagonal: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            geometry_tolerance: default_geometry_tolerance(),
            skip_zero_terms: true,
            ensure_diagonal: true,
        }
    }
}

// ============================================================================
// 线性系统
// ============================================================================

/// 组装结果 `A x = b`
#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// 系数矩阵，行列按单元编号
    pub matrix: CsrMatrix,
    /// 右端项
    pub rhs: Vec<f64>,
}

impl LinearSystem {
    /// 未知量个数
    pub fn n_unknowns(&self) -> usize {
        self.rhs.len()
    }

    /// 残差向量 `b - A x`
    pub fn residual(&self, x: &[f64]) -> FvResult<Vec<f64>> {
        FvError::check_size("解向量", self.n_unknowns(), x.len())?;
        let mut ax = vec![0.0; self.n_unknowns()];
        self.matrix.mul_vec(x, &mut ax);
        Ok(self.rhs.iter().zip(&ax).map(|(b, a)| b - a).collect())
    }

    /// 残差 2-范数
    pub fn residual_norm(&self, x: &[f64]) -> FvResult<f64> {
        FvError::check_size("解向量", self.n_unknowns(), x.len())?;
        Ok(vector_ops::residual_norm(&self.matrix, x, &self.rhs))
    }

    /// 每行除以单元体积，得到逐点差分形式
    pub fn scaled_by_inverse_volume(&self, mesh: &dyn Mesh) -> FvResult<LinearSystem> {
        FvError::check_size("单元数", mesh.n_cells(), self.n_unknowns())?;
        let mut factors = Vec::with_capacity(self.n_unknowns());
        for cell in 0..mesh.n_cells() {
            let v = mesh.cell_volume(cell);
            FvError::check_geometry(cell, "单元体积", v)?;
            factors.push(1.0 / v);
        }
        let mut matrix = self.matrix.clone();
        matrix.scale_rows(&factors);
        let rhs = self.rhs.iter().zip(&factors).map(|(b, f)| b * f).collect();
        Ok(LinearSystem { matrix, rhs })
    }
}

// ============================================================================
// 组装器
// ============================================================================

/// 组装器
///
/// 通信后端在构造时注入，默认单进程。
#[derive(Debug, Clone)]
pub struct Assembler {
    config: AssemblerConfig,
    comm: Arc<dyn CommBackend>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

/// 单次组装的只读输入
struct Inputs<'a> {
    mesh: &'a dyn Mesh,
    old: &'a [f64],
    bcs: &'a BoundaryConditions,
}

impl Assembler {
    /// 单进程组装器
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            comm: Arc::new(DummyComm::new()),
        }
    }

    /// 注入通信后端
    pub fn with_comm(mut self, comm: Arc<dyn CommBackend>) -> Self {
        self.comm = comm;
        self
    }

    /// 配置
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// 通信后端
    pub fn comm(&self) -> &Arc<dyn CommBackend> {
        &self.comm
    }

    /// 组装 `Σ c_k L_k(var) = Σ s_j S_j`
    pub fn assemble(
        &self,
        var: &Field,
        terms: &[ScaledTerm],
        sources: &[(Coefficient, f64)],
        bcs: &BoundaryConditions,
        ctx: &AssemblyContext,
    ) -> FvResult<LinearSystem> {
        if var.location() != FieldLocation::Cell || var.rank() != 0 {
            return Err(FvError::shape_mismatch(format!(
                "求解变量 {} 必须是单元标量场 (位置 {:?}, rank {})",
                var.name(),
                var.location(),
                var.rank()
            )));
        }
        let mesh = Arc::clone(var.mesh());
        let n = mesh.n_cells();
        let old = match var.old() {
            Some(old) => old.values()?,
            None => var.values()?,
        };
        FvError::check_size("旧值", n, old.len())?;

        let inputs = Inputs {
            mesh: &*mesh,
            old: &old,
            bcs,
        };
        let mut builder = CsrBuilder::new_square(n);
        let mut rhs = vec![0.0; n];

        for scaled in terms {
            let c = scaled.coefficient;
            if self.config.skip_zero_terms && c == 0.0 {
                continue;
            }
            let term = &scaled.term;
            let weight = term.weight_with_tolerance(&mesh, self.config.geometry_tolerance)?;
            let geometric = term.geometric_coefficients(&mesh, ctx)?;
            let role = weight.role();
            match weight.stencil() {
                Stencil::Face(stencil) => {
                    FvError::check_size("面几何系数", mesh.n_faces(), geometric.len())?;
                    FvError::check_size("面模板", mesh.n_faces(), stencil.len())?;
                    self.add_faces(
                        &inputs,
                        role,
                        stencil,
                        &geometric,
                        c,
                        &mut builder,
                        &mut rhs,
                    );
                }
                Stencil::Cell(stencil) => {
                    FvError::check_size("单元几何系数", n, geometric.len())?;
                    FvError::check_size("单元模板", n, stencil.new_value.len())?;
                    self.add_cells(
                        &inputs,
                        role,
                        stencil,
                        &geometric,
                        c,
                        &mut builder,
                        &mut rhs,
                    );
                }
            }
            log::trace!("组装项 {} (系数 {})", term.name(), c);
        }

        for (source, scale) in sources {
            let s = source.cell_values(&mesh)?;
            for (cell, value) in s.iter().enumerate() {
                rhs[cell] += scale * value * mesh.cell_volume(cell);
            }
        }

        if self.config.ensure_diagonal {
            for row in 0..n {
                builder.add(row, row, 0.0);
            }
        }
        let matrix = builder.build();
        for row in 0..n {
            if matrix.row(row).all(|(_, v)| v == 0.0) {
                log::warn!("第 {} 行没有任何耦合", row);
            }
        }
        log::debug!(
            "组装完成: {} 个未知量, {} 个非零元, {} 项",
            n,
            matrix.nnz(),
            terms.len()
        );
        Ok(LinearSystem { matrix, rhs })
    }

    #[allow(clippy::too_many_arguments)]
    fn add_faces(
        &self,
        inputs: &Inputs<'_>,
        role: AssemblyRole,
        s: &FaceStencil,
        geometric: &[f64],
        c: f64,
        builder: &mut CsrBuilder,
        rhs: &mut [f64],
    ) {
        let mesh = inputs.mesh;
        let old = inputs.old;
        for face in 0..mesh.n_faces() {
            let k = c * geometric[face] * mesh.face_area(face);
            let (c1d, c1o) = (s.cell1_diag[face], s.cell1_offdiag[face]);
            match mesh.face_cells(face) {
                (c1, Some(c2)) => {
                    let (c2d, c2o) = (s.cell2_diag[face], s.cell2_offdiag[face]);
                    match role {
                        AssemblyRole::Implicit => {
                            builder.add(c1, c1, k * c1d);
                            builder.add(c1, c2, k * c1o);
                            builder.add(c2, c2, k * c2d);
                            builder.add(c2, c1, k * c2o);
                        }
                        AssemblyRole::Explicit => {
                            rhs[c1] -= k * (c1d * old[c1] + c1o * old[c2]);
                            rhs[c2] -= k * (c2d * old[c2] + c2o * old[c1]);
                        }
                    }
                }
                (c1, None) => {
                    // 边界值 φ_b = fixed 或 φ_1 + g d
                    let (diag, known) = match inputs.bcs.get(face) {
                        Some(BoundaryCondition::FixedValue(v)) => (c1d, c1o * v),
                        Some(BoundaryCondition::FixedGradient(g)) => {
                            (c1d + c1o, c1o * g * mesh.cell_distance(face))
                        }
                        None => (c1d + c1o, 0.0),
                    };
                    match role {
                        AssemblyRole::Implicit => {
                            builder.add(c1, c1, k * diag);
                            rhs[c1] -= k * known;
                        }
                        AssemblyRole::Explicit => {
                            rhs[c1] -= k * (diag * old[c1] + known);
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_cells(
        &self,
        inputs: &Inputs<'_>,
        role: AssemblyRole,
        s: &CellStencil,
        geometric: &[f64],
        c: f64,
        builder: &mut CsrBuilder,
        rhs: &mut [f64],
    ) {
        let mesh = inputs.mesh;
        let old = inputs.old;
        for cell in 0..mesh.n_cells() {
            let k = c * geometric[cell] * mesh.cell_volume(cell);
            let known = s.old_value[cell] * old[cell] + s.b_vector[cell];
            match role {
                AssemblyRole::Implicit => {
                    builder.add(cell, cell, k * s.new_value[cell]);
                    rhs[cell] += k * known;
                }
                AssemblyRole::Explicit => {
                    rhs[cell] -= k * (s.new_value[cell] * old[cell] - known);
                }
            }
        }
    }

    /// 所有分区残差的全局 2-范数
    pub fn global_residual_norm(&self, system: &LinearSystem, x: &[f64]) -> FvResult<f64> {
        let local = system.residual(x)?;
        let sq: f64 = local.iter().map(|r| r * r).sum();
        let gathered = self.comm.all_gather(&[sq])?;
        Ok(gathered.iter().flatten().sum::<f64>().sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::term::Term;
    use fv_mesh::Grid1D;

    fn line(n: usize, dx: f64) -> Arc<dyn Mesh> {
        Arc::new(Grid1D::new(n, dx).unwrap())
    }

    fn scaled(term: Term) -> ScaledTerm {
        ScaledTerm::from(term)
    }

    #[test]
    fn test_diffusion_dirichlet_rows() {
        let mesh = line(5, 0.5);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 0.0).unwrap();
        let bcs = BoundaryConditions::new()
            .fixed_value(&*mesh, "left", 1.0)
            .unwrap()
            .fixed_value(&*mesh, "right", 0.0)
            .unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::diffusion(1.0))],
                &[],
                &bcs,
                &AssemblyContext::steady(),
            )
            .unwrap();
        // 内部行 Γ A / dx = 2
        assert!((sys.matrix.get(2, 1) - 2.0).abs() < 1e-12);
        assert!((sys.matrix.get(2, 2) + 4.0).abs() < 1e-12);
        assert!((sys.matrix.get(2, 3) - 2.0).abs() < 1e-12);
        // 边界半距离 Γ A / (dx/2) = 4
        assert!((sys.matrix.get(0, 0) + 2.0 + 4.0).abs() < 1e-12);
        assert!((sys.rhs[0] + 4.0).abs() < 1e-12);
        assert_eq!(sys.rhs[4], 0.0);
    }

    #[test]
    fn test_zero_gradient_boundary_adds_nothing() {
        let mesh = line(3, 1.0);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 0.0).unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::diffusion(1.0))],
                &[],
                &BoundaryConditions::new(),
                &AssemblyContext::steady(),
            )
            .unwrap();
        for row in sys.matrix.row_sums() {
            assert!(row.abs() < 1e-12);
        }
        assert!(sys.rhs.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_fixed_gradient_flux() {
        let mesh = line(3, 1.0);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 0.0).unwrap();
        let bcs = BoundaryConditions::new()
            .fixed_gradient(&*mesh, "right", 2.0)
            .unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[ScaledTerm::new(Term::diffusion(3.0), 1.0)],
                &[],
                &bcs,
                &AssemblyContext::steady(),
            )
            .unwrap();
        // 通量 Γ A g = 6 移到右端
        assert!((sys.rhs[2] + 6.0).abs() < 1e-12);
        assert!((sys.matrix.get(2, 2) + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_convection_uses_old_value() {
        let mesh = line(3, 1.0);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_old()
            .unwrap();
        var.set_value(vec![10.0, 20.0, 30.0], None).unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::explicit_upwind_convection(vec![1.0]))],
                &[],
                &BoundaryConditions::new(),
                &AssemblyContext::steady(),
            )
            .unwrap();
        assert!(sys.matrix.values().iter().all(|&v| v == 0.0));
        // 单元 1: -(F φ_1 - F φ_0) 用旧值
        assert!((sys.rhs[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transient_and_source() {
        let mesh = line(2, 0.5);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 4.0)
            .unwrap()
            .with_old()
            .unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::transient(1.0))],
                &[(Coefficient::Constant(2.0), 1.0)],
                &BoundaryConditions::new(),
                &AssemblyContext::with_dt(0.25),
            )
            .unwrap();
        // ρ V / dt = 2, rhs = 2·4 + S V = 9
        assert!((sys.matrix.get(0, 0) - 2.0).abs() < 1e-12);
        assert!((sys.rhs[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_source_on_other_mesh_rejected() {
        let mesh = line(2, 1.0);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 0.0).unwrap();
        let source = Field::scalar_cell(line(5, 1.0), "s", 1.0).unwrap();
        let err = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::implicit_source(1.0))],
                &[(Coefficient::from(&source), 1.0)],
                &BoundaryConditions::new(),
                &AssemblyContext::steady(),
            )
            .unwrap_err();
        assert!(matches!(err, FvError::InvalidInput { .. }));
    }

    #[test]
    fn test_rejects_vector_variable() {
        let mesh = line(2, 1.0);
        let var = Field::new(
            Arc::clone(&mesh),
            crate::field::FieldSpec::cell("u").rank(1),
            vec![1.0],
        )
        .unwrap();
        let err = Assembler::default()
            .assemble(
                &var,
                &[],
                &[],
                &BoundaryConditions::new(),
                &AssemblyContext::steady(),
            )
            .unwrap_err();
        assert!(matches!(err, FvError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_global_residual_single_process() {
        let mesh = line(2, 1.0);
        let var = Field::scalar_cell(Arc::clone(&mesh), "phi", 0.0).unwrap();
        let sys = Assembler::default()
            .assemble(
                &var,
                &[scaled(Term::implicit_source(1.0))],
                &[(Coefficient::Constant(1.0), 1.0)],
                &BoundaryConditions::new(),
                &AssemblyContext::steady(),
            )
            .unwrap();
        let asm = Assembler::default();
        let r = asm.global_residual_norm(&sys, &[0.0, 0.0]).unwrap();
        assert!((r - 2f64.sqrt()).abs() < 1e-12);
        assert!(asm.global_residual_norm(&sys, &[1.0, 1.0]).unwrap() < 1e-12);
    }

    #[test]
    fn test_config_defaults_from_json() {
        let cfg: AssemblerConfig =
            serde_json::from_str(r#"{"geometry_tolerance": 1e-12}"#).unwrap();
        assert_eq!(cfg.geometry_tolerance, 1e-12);
        assert!(cfg.skip_zero_terms);
        assert!(cfg.ensure_diagonal);
    }
}

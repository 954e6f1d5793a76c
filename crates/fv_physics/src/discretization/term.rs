// crates/fv_physics/src/discretization/term.rs

//! 离散项
//!
//! 一个离散项由算子和组装角色组合而成：`Term { operator, role }`。
//! 显式迎风对流就是 `Term { Convection(迎风格式), Explicit }`，与隐式版本
//! 共享同一套权重计算，只有标签不同。
//!
//! 每个离散项提供两样东西：
//!
//! - [`Term::weight`]: 无量纲模板（对角/非对角分配），只依赖网格与流向
//! - [`Term::geometric_coefficients`]: 每面（每单元）的物理系数，
//!   组装器再乘以面积（体积）与离散项系数
//!
//! | 算子 | 模板 | 几何系数 |
//! |------|------|----------|
//! | 扩散 | 面 `{-1, +1, -1, +1}` | Γ_f / d_f |
//! | 对流 | 面 `{α, 1-α, -(1-α), -α}` | u_f · n_f |
//! | 瞬态 | 单元 `new 1, old 1` | ρ / Δt |
//! | 隐式源 | 单元 `new 1` | S_p |

use super::scheme::{ConvectionScheme, SchemeKind};
use super::weight::{AssemblyRole, CellStencil, FaceStencil, Stencil, Weight};
use crate::field::{Field, FieldLocation, Operand};
use fv_foundation::{ensure, FvError, FvResult};
use fv_mesh::{ElementKind, Mesh};
use std::sync::Arc;

// ============================================================================
// 系数
// ============================================================================

/// 标量系数：常数或标量场
#[derive(Debug, Clone)]
pub enum Coefficient {
    /// 常数
    Constant(f64),
    /// 标量场（单元、面或常量场）
    Field(Field),
}

impl From<f64> for Coefficient {
    fn from(x: f64) -> Self {
        Self::Constant(x)
    }
}

impl From<Field> for Coefficient {
    fn from(f: Field) -> Self {
        Self::Field(f)
    }
}

impl From<&Field> for Coefficient {
    fn from(f: &Field) -> Self {
        Self::Field(f.clone())
    }
}

impl Coefficient {
    fn check_field(f: &Field, mesh: &Arc<dyn Mesh>) -> FvResult<()> {
        ensure!(
            f.rank() == 0,
            FvError::shape_mismatch(format!(
                "系数场 {} 必须是标量, 实际 rank {}",
                f.name(),
                f.rank()
            ))
        );
        ensure!(
            f.is_on(mesh),
            FvError::invalid_input(format!("系数场 {} 不在被组装的网格上", f.name()))
        );
        Ok(())
    }

    /// 面上的值，长度为 `n_faces`
    pub fn face_values(&self, mesh: &Arc<dyn Mesh>) -> FvResult<Vec<f64>> {
        let nf = mesh.n_faces();
        let values = match self {
            Self::Constant(c) => vec![*c; nf],
            Self::Field(f) => {
                Self::check_field(f, mesh)?;
                match f.location() {
                    FieldLocation::Face => f.values()?,
                    FieldLocation::Cell => f.arithmetic_face_value()?.values()?,
                    FieldLocation::Constant => vec![f.values()?[0]; nf],
                }
            }
        };
        FvError::check_size("面系数", nf, values.len())?;
        Ok(values)
    }

    /// 单元上的值，长度为 `n_cells`
    pub fn cell_values(&self, mesh: &Arc<dyn Mesh>) -> FvResult<Vec<f64>> {
        let nc = mesh.n_cells();
        let values = match self {
            Self::Constant(c) => vec![*c; nc],
            Self::Field(f) => {
                Self::check_field(f, mesh)?;
                match f.location() {
                    FieldLocation::Cell => f.values()?,
                    FieldLocation::Constant => vec![f.values()?[0]; nc],
                    FieldLocation::Face => {
                        return Err(FvError::shape_mismatch(format!(
                            "单元系数不接受面场 {}",
                            f.name()
                        )))
                    }
                }
            }
        };
        FvError::check_size("单元系数", nc, values.len())?;
        Ok(values)
    }
}

// ============================================================================
// 算子
// ============================================================================

/// 微分算子
#[derive(Debug, Clone)]
pub enum TermOperator {
    /// ∇·(Γ∇φ)
    Diffusion {
        /// 扩散系数 Γ
        coefficient: Coefficient,
    },
    /// ∇·(uφ)
    Convection {
        /// 速度（向量场或常向量）
        velocity: Operand,
        /// 插值格式
        scheme: Arc<dyn ConvectionScheme>,
        /// 计算 Peclet 数用的扩散系数
        peclet_diffusion: Option<Coefficient>,
    },
    /// ρ ∂φ/∂t
    Transient {
        /// ρ
        coefficient: Coefficient,
    },
    /// S_p φ
    ImplicitSource {
        /// S_p
        coefficient: Coefficient,
    },
}

/// 组装所需的上下文
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyContext {
    /// 时间步长，瞬态项必需
    pub dt: Option<f64>,
}

impl AssemblyContext {
    /// 稳态
    pub fn steady() -> Self {
        Self { dt: None }
    }

    /// 带时间步长
    pub fn with_dt(dt: f64) -> Self {
        Self { dt: Some(dt) }
    }
}

/// 离散项
#[derive(Debug, Clone)]
pub struct Term {
    operator: TermOperator,
    role: AssemblyRole,
}

impl Term {
    /// 由算子与角色组合
    pub fn new(operator: TermOperator, role: AssemblyRole) -> Self {
        Self { operator, role }
    }

    /// 隐式扩散项
    pub fn diffusion(coefficient: impl Into<Coefficient>) -> Self {
        Self::new(
            TermOperator::Diffusion {
                coefficient: coefficient.into(),
            },
            AssemblyRole::Implicit,
        )
    }

    /// 指定格式的隐式对流项
    pub fn convection(velocity: impl Into<Operand>, scheme: SchemeKind) -> Self {
        Self::convection_with(velocity, scheme.build())
    }

    /// 自定义格式对象的隐式对流项
    pub fn convection_with(
        velocity: impl Into<Operand>,
        scheme: Arc<dyn ConvectionScheme>,
    ) -> Self {
        Self::new(
            TermOperator::Convection {
                velocity: velocity.into(),
                scheme,
                peclet_diffusion: None,
            },
            AssemblyRole::Implicit,
        )
    }

    /// 隐式迎风对流项
    pub fn upwind_convection(velocity: impl Into<Operand>) -> Self {
        Self::convection(velocity, SchemeKind::Upwind)
    }

    /// 显式迎风对流项
    pub fn explicit_upwind_convection(velocity: impl Into<Operand>) -> Self {
        Self::upwind_convection(velocity).explicit()
    }

    /// 瞬态项
    pub fn transient(coefficient: impl Into<Coefficient>) -> Self {
        Self::new(
            TermOperator::Transient {
                coefficient: coefficient.into(),
            },
            AssemblyRole::Implicit,
        )
    }

    /// 隐式源项
    pub fn implicit_source(coefficient: impl Into<Coefficient>) -> Self {
        Self::new(
            TermOperator::ImplicitSource {
                coefficient: coefficient.into(),
            },
            AssemblyRole::Implicit,
        )
    }

    /// 改为显式
    pub fn explicit(self) -> Self {
        self.with_role(AssemblyRole::Explicit)
    }

    /// 设置角色
    pub fn with_role(mut self, role: AssemblyRole) -> Self {
        self.role = role;
        self
    }

    /// 对流项计算 Peclet 数时使用的扩散系数；其他算子忽略
    pub fn with_peclet_diffusion(mut self, coefficient: impl Into<Coefficient>) -> Self {
        if let TermOperator::Convection {
            peclet_diffusion, ..
        } = &mut self.operator
        {
            *peclet_diffusion = Some(coefficient.into());
        }
        self
    }

    /// 角色
    pub fn role(&self) -> AssemblyRole {
        self.role
    }

    /// 算子
    pub fn operator(&self) -> &TermOperator {
        &self.operator
    }

    /// 模板所在元素
    pub fn stencil_kind(&self) -> ElementKind {
        match self.operator {
            TermOperator::Diffusion { .. } | TermOperator::Convection { .. } => ElementKind::Face,
            TermOperator::Transient { .. } | TermOperator::ImplicitSource { .. } => {
                ElementKind::Cell
            }
        }
    }

    /// 名称
    pub fn name(&self) -> String {
        let base = match &self.operator {
            TermOperator::Diffusion { .. } => "Diffusion".to_string(),
            TermOperator::Convection { scheme, .. } => format!("Convection[{}]", scheme.kind()),
            TermOperator::Transient { .. } => "Transient".to_string(),
            TermOperator::ImplicitSource { .. } => "ImplicitSource".to_string(),
        };
        match self.role {
            AssemblyRole::Implicit => base,
            AssemblyRole::Explicit => format!("Explicit{}", base),
        }
    }

    // ========================================================================
    // 权重
    // ========================================================================

    /// 计算权重
    ///
    /// 面项要求每个面面积与中心距为正，否则返回 `DegenerateGeometry`。
    pub fn weight(&self, mesh: &Arc<dyn Mesh>) -> FvResult<Weight> {
        self.weight_with_tolerance(mesh, 0.0)
    }

    /// 计算权重，几何量不大于 `tolerance` 视为退化
    pub fn weight_with_tolerance(&self, mesh: &Arc<dyn Mesh>, tolerance: f64) -> FvResult<Weight> {
        let stencil = match &self.operator {
            TermOperator::Diffusion { .. } => {
                check_face_geometry(&**mesh, tolerance)?;
                Stencil::Face(FaceStencil::uniform(mesh.n_faces(), -1.0, 1.0, -1.0, 1.0))
            }
            TermOperator::Convection {
                velocity,
                scheme,
                peclet_diffusion,
            } => {
                check_face_geometry(&**mesh, tolerance)?;
                let normal_velocity = normal_velocity(mesh, velocity)?;
                let gamma = match peclet_diffusion {
                    Some(c) => Some(c.face_values(mesh)?),
                    None => None,
                };
                let nf = mesh.n_faces();
                let mut stencil = FaceStencil::uniform(nf, 0.0, 0.0, 0.0, 0.0);
                for face in 0..nf {
                    let un = normal_velocity[face];
                    let distance = mesh.cell_distance(face);
                    let peclet = face_peclet(un, distance, gamma.as_ref().map(|g| g[face]));
                    let alpha = scheme.alpha(peclet);
                    stencil.cell1_diag[face] = alpha;
                    stencil.cell1_offdiag[face] = 1.0 - alpha;
                    stencil.cell2_diag[face] = -(1.0 - alpha);
                    stencil.cell2_offdiag[face] = -alpha;
                }
                Stencil::Face(stencil)
            }
            TermOperator::Transient { .. } => {
                check_cell_geometry(&**mesh, tolerance)?;
                Stencil::Cell(CellStencil::uniform(mesh.n_cells(), 1.0, 1.0, 0.0))
            }
            TermOperator::ImplicitSource { .. } => {
                check_cell_geometry(&**mesh, tolerance)?;
                Stencil::Cell(CellStencil::uniform(mesh.n_cells(), 1.0, 0.0, 0.0))
            }
        };
        Ok(Weight::new(self.role, stencil))
    }

    /// 物理系数（不含面积/体积）
    pub fn geometric_coefficients(
        &self,
        mesh: &Arc<dyn Mesh>,
        ctx: &AssemblyContext,
    ) -> FvResult<Vec<f64>> {
        match &self.operator {
            TermOperator::Diffusion { coefficient } => {
                check_face_geometry(&**mesh, 0.0)?;
                let gamma = coefficient.face_values(mesh)?;
                Ok(gamma
                    .iter()
                    .enumerate()
                    .map(|(face, g)| g / mesh.cell_distance(face))
                    .collect())
            }
            TermOperator::Convection { velocity, .. } => normal_velocity(mesh, velocity),
            TermOperator::Transient { coefficient } => {
                let dt = match ctx.dt {
                    Some(dt) if dt.is_finite() && dt > 0.0 => dt,
                    other => {
                        return Err(FvError::invalid_input(format!(
                            "瞬态项需要正的时间步长, 实际 {:?}",
                            other
                        )))
                    }
                };
                Ok(coefficient
                    .cell_values(mesh)?
                    .into_iter()
                    .map(|rho| rho / dt)
                    .collect())
            }
            TermOperator::ImplicitSource { coefficient } => coefficient.cell_values(mesh),
        }
    }
}

/// 面 Peclet 数 `P = (u·n) d / Γ`，与通量同号
fn face_peclet(un: f64, distance: f64, gamma: Option<f64>) -> f64 {
    if un == 0.0 {
        return 0.0;
    }
    match gamma {
        Some(g) if g > 0.0 => un * distance / g,
        _ => un.signum() * f64::INFINITY,
    }
}

/// 面法向速度 `u_f · n_f`
fn normal_velocity(mesh: &Arc<dyn Mesh>, velocity: &Operand) -> FvResult<Vec<f64>> {
    let u = match velocity {
        Operand::Field(f) => f.clone(),
        Operand::Value(v) => Field::constant(Arc::clone(mesh), v.clone()),
    };
    if u.rank() != 1 || u.element_shape()[0] != mesh.dimension() {
        return Err(FvError::shape_mismatch(format!(
            "速度必须是 {} 维向量, 实际元素形状 {:?}",
            mesh.dimension(),
            u.element_shape()
        )));
    }
    let u_face = match u.location() {
        FieldLocation::Cell => u.arithmetic_face_value()?,
        FieldLocation::Face | FieldLocation::Constant => u,
    };
    let normals = Field::face_normals(Arc::clone(mesh))?;
    u_face.dot(&normals)?.values()
}

fn check_measure(index: usize, quantity: &'static str, value: f64, tolerance: f64) -> FvResult<()> {
    FvError::check_geometry(index, quantity, value)?;
    if value <= tolerance {
        return Err(FvError::degenerate_geometry(index, quantity, value));
    }
    Ok(())
}

fn check_face_geometry(mesh: &dyn Mesh, tolerance: f64) -> FvResult<()> {
    for face in 0..mesh.n_faces() {
        check_measure(face, "面积", mesh.face_area(face), tolerance)?;
        check_measure(face, "中心距", mesh.cell_distance(face), tolerance)?;
    }
    Ok(())
}

fn check_cell_geometry(mesh: &dyn Mesh, tolerance: f64) -> FvResult<()> {
    for cell in 0..mesh.n_cells() {
        check_measure(cell, "单元体积", mesh.cell_volume(cell), tolerance)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSpec;
    use fv_mesh::{Grid1D, Grid2D};

    fn line(n: usize) -> Arc<dyn Mesh> {
        Arc::new(Grid1D::new(n, 0.1).unwrap())
    }

    fn face_stencil(w: &Weight) -> &FaceStencil {
        match w.stencil() {
            Stencil::Face(s) => s,
            Stencil::Cell(_) => panic!("期望面模板"),
        }
    }

    #[test]
    fn test_diffusion_weight() {
        let mesh = line(4);
        let w = Term::diffusion(1.0).weight(&mesh).unwrap();
        assert_eq!(w.role(), AssemblyRole::Implicit);
        let s = face_stencil(&w);
        assert_eq!(s.len(), 5);
        assert!(s.cell1_diag.iter().all(|&v| v == -1.0));
        assert!(s.cell1_offdiag.iter().all(|&v| v == 1.0));
        assert!(s.cell2_diag.iter().all(|&v| v == -1.0));
        assert!(s.cell2_offdiag.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_diffusion_geometric_coefficients() {
        let mesh = line(4);
        let g = Term::diffusion(2.0)
            .geometric_coefficients(&mesh, &AssemblyContext::steady())
            .unwrap();
        // 内部面 Γ/dx，边界面 Γ/(dx/2)
        assert!((g[2] - 20.0).abs() < 1e-12);
        assert!((g[0] - 40.0).abs() < 1e-12);
    }

    #[test]
    fn test_upwind_follows_flux_sign() {
        let mesh: Arc<dyn Mesh> = Arc::new(Grid2D::new(3, 2, 1.0, 1.0).unwrap());
        for u in [vec![1.0, -2.0], vec![-1.0, 0.5], vec![0.0, 0.0]] {
            let term = Term::upwind_convection(u.clone());
            let w = term.weight(&mesh).unwrap();
            let un = term
                .geometric_coefficients(&mesh, &AssemblyContext::steady())
                .unwrap();
            let s = face_stencil(&w);
            for face in 0..mesh.n_faces() {
                let expected = if un[face] >= 0.0 { 1.0 } else { 0.0 };
                assert_eq!(s.cell1_diag[face], expected, "u={:?} face={}", u, face);
                assert_eq!(s.cell2_offdiag[face], -expected);
            }
        }
    }

    #[test]
    fn test_explicit_upwind_is_relabel() {
        let mesh = line(6);
        let velocity = Field::new(
            Arc::clone(&mesh),
            FieldSpec::face("u").rank(1),
            ndarray::Array::linspace(-1.0, 1.0, 7).insert_axis(ndarray::Axis(0)),
        )
        .unwrap();
        let implicit = Term::upwind_convection(&velocity).weight(&mesh).unwrap();
        let explicit = Term::explicit_upwind_convection(&velocity)
            .weight(&mesh)
            .unwrap();
        assert!(implicit.explicit().is_none());
        assert!(explicit.implicit().is_none());
        assert_eq!(explicit.explicit(), implicit.implicit());
    }

    #[test]
    fn test_cell_velocity_is_interpolated() {
        let mesh = line(3);
        let u = Field::new(Arc::clone(&mesh), FieldSpec::cell("u").rank(1), vec![2.0]).unwrap();
        let un = Term::upwind_convection(u)
            .geometric_coefficients(&mesh, &AssemblyContext::steady())
            .unwrap();
        // 左边界法向 -1
        assert_eq!(un, vec![-2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_velocity_rank_checked() {
        let mesh = line(3);
        let err = Term::upwind_convection(1.0).weight(&mesh).unwrap_err();
        assert!(matches!(err, FvError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_degenerate_geometry_detected() {
        let spacing = vec![1.0, 0.0, 0.0, 1.0];
        let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::from_spacing(spacing).unwrap());
        // 两个零长度单元中心重合
        let err = Term::diffusion(1.0).weight(&mesh).unwrap_err();
        assert!(matches!(err, FvError::DegenerateGeometry { face: 2, .. }));
        let err = Term::upwind_convection(vec![1.0]).weight(&mesh).unwrap_err();
        assert!(matches!(err, FvError::DegenerateGeometry { .. }));
        let err = Term::transient(1.0).weight(&mesh).unwrap_err();
        assert!(matches!(err, FvError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_geometry_tolerance() {
        let spacing = vec![1.0, 1e-9, 1e-9, 1.0];
        let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::from_spacing(spacing).unwrap());
        assert!(Term::diffusion(1.0).weight(&mesh).is_ok());
        let err = Term::diffusion(1.0)
            .weight_with_tolerance(&mesh, 1e-6)
            .unwrap_err();
        assert!(matches!(err, FvError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_transient_needs_dt() {
        let mesh = line(3);
        let term = Term::transient(2.0);
        assert!(term
            .geometric_coefficients(&mesh, &AssemblyContext::steady())
            .is_err());
        let g = term
            .geometric_coefficients(&mesh, &AssemblyContext::with_dt(0.5))
            .unwrap();
        assert_eq!(g, vec![4.0; 3]);
    }

    #[test]
    fn test_peclet_diffusion_controls_blend() {
        let mesh = line(4);
        // u d / Γ = 1 * 0.1 / 1 = 0.1，混合格式取中心差分
        let w = Term::convection(vec![1.0], SchemeKind::Hybrid)
            .with_peclet_diffusion(1.0)
            .weight(&mesh)
            .unwrap();
        assert_eq!(face_stencil(&w).cell1_diag[2], 0.5);
        // 无扩散时退化为迎风
        let w = Term::convection(vec![1.0], SchemeKind::Hybrid)
            .weight(&mesh)
            .unwrap();
        assert_eq!(face_stencil(&w).cell1_diag[2], 1.0);
    }

    #[test]
    fn test_diffusion_coefficient_on_other_mesh_rejected() {
        let mesh = line(3);
        let gamma = Field::scalar_cell(line(6), "gamma", 1.0).unwrap();
        let err = Term::diffusion(&gamma)
            .geometric_coefficients(&mesh, &AssemblyContext::steady())
            .unwrap_err();
        assert!(matches!(err, FvError::InvalidInput { .. }));
    }

    #[test]
    fn test_peclet_diffusion_on_other_mesh_rejected() {
        let mesh = line(6);
        let gamma = Field::scalar_cell(line(2), "gamma", 1.0).unwrap();
        let err = Term::convection(vec![1.0], SchemeKind::Hybrid)
            .with_peclet_diffusion(&gamma)
            .weight(&mesh)
            .unwrap_err();
        assert!(matches!(err, FvError::InvalidInput { .. }));
    }

    #[test]
    fn test_coefficient_values_match_mesh() {
        let mesh = line(3);
        let gamma = Field::scalar_cell(Arc::clone(&mesh), "gamma", 2.0).unwrap();
        let c = Coefficient::from(&gamma);
        assert_eq!(c.face_values(&mesh).unwrap(), vec![2.0; 4]);
        assert_eq!(c.cell_values(&mesh).unwrap(), vec![2.0; 3]);
        let k = Field::constant(Arc::clone(&mesh), ndarray::arr0(5.0).into_dyn());
        let k = Coefficient::Field(k);
        assert_eq!(k.cell_values(&mesh).unwrap(), vec![5.0; 3]);
    }

    #[test]
    fn test_names() {
        assert_eq!(Term::diffusion(1.0).name(), "Diffusion");
        assert_eq!(
            Term::explicit_upwind_convection(vec![1.0]).name(),
            "ExplicitConvection[upwind]"
        );
    }
}

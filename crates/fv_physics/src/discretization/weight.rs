// crates/fv_physics/src/discretization/weight.rs

//! 离散权重
//!
//! 一个离散项在每个面（或单元）上的局部贡献。权重只描述系数如何在
//! 对角/非对角之间分配；几何系数与离散项系数在组装时再乘上。
//! 角色决定贡献落点：隐式进矩阵，显式乘旧值后进右端项。

use serde::{Deserialize, Serialize};

/// 组装角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyRole {
    /// 作用于当前未知量，进矩阵
    #[default]
    Implicit,
    /// 作用于旧值，进右端项
    Explicit,
}

/// 面模板：每个面一组 2×2 系数
#[derive(Debug, Clone, PartialEq)]
pub struct FaceStencil {
    /// cell1 行、cell1 列
    pub cell1_diag: Vec<f64>,
    /// cell1 行、cell2 列
    pub cell1_offdiag: Vec<f64>,
    /// cell2 行、cell2 列
    pub cell2_diag: Vec<f64>,
    /// cell2 行、cell1 列
    pub cell2_offdiag: Vec<f64>,
}

impl FaceStencil {
    /// 所有面取相同系数
    pub fn uniform(n_faces: usize, c1_diag: f64, c1_off: f64, c2_diag: f64, c2_off: f64) -> Self {
        Self {
            cell1_diag: vec![c1_diag; n_faces],
            cell1_offdiag: vec![c1_off; n_faces],
            cell2_diag: vec![c2_diag; n_faces],
            cell2_offdiag: vec![c2_off; n_faces],
        }
    }

    /// 面数
    pub fn len(&self) -> usize {
        self.cell1_diag.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.cell1_diag.is_empty()
    }
}

/// 单元模板：`A[i,i] += new`，`b[i] += old * φ_old + b`
#[derive(Debug, Clone, PartialEq)]
pub struct CellStencil {
    /// 当前值系数
    pub new_value: Vec<f64>,
    /// 旧值系数
    pub old_value: Vec<f64>,
    /// 常数项
    pub b_vector: Vec<f64>,
}

impl CellStencil {
    /// 所有单元取相同系数
    pub fn uniform(n_cells: usize, new_value: f64, old_value: f64, b_vector: f64) -> Self {
        Self {
            new_value: vec![new_value; n_cells],
            old_value: vec![old_value; n_cells],
            b_vector: vec![b_vector; n_cells],
        }
    }
}

/// 模板
#[derive(Debug, Clone, PartialEq)]
pub enum Stencil {
    /// 面耦合
    Face(FaceStencil),
    /// 单元局部
    Cell(CellStencil),
}

/// 带角色标签的权重
#[derive(Debug, Clone, PartialEq)]
pub enum Weight {
    /// 隐式
    Implicit(Stencil),
    /// 显式
    Explicit(Stencil),
}

impl Weight {
    /// 按角色打标签
    pub fn new(role: AssemblyRole, stencil: Stencil) -> Self {
        match role {
            AssemblyRole::Implicit => Self::Implicit(stencil),
            AssemblyRole::Explicit => Self::Explicit(stencil),
        }
    }

    /// 角色
    pub fn role(&self) -> AssemblyRole {
        match self {
            Self::Implicit(_) => AssemblyRole::Implicit,
            Self::Explicit(_) => AssemblyRole::Explicit,
        }
    }

    /// 模板
    pub fn stencil(&self) -> &Stencil {
        match self {
            Self::Implicit(s) | Self::Explicit(s) => s,
        }
    }

    /// 隐式模板
    pub fn implicit(&self) -> Option<&Stencil> {
        match self {
            Self::Implicit(s) => Some(s),
            Self::Explicit(_) => None,
        }
    }

    /// 显式模板
    pub fn explicit(&self) -> Option<&Stencil> {
        match self {
            Self::Explicit(s) => Some(s),
            Self::Implicit(_) => None,
        }
    }

    /// 只改标签，系数不变
    pub fn relabel(self, role: AssemblyRole) -> Self {
        match self {
            Self::Implicit(s) | Self::Explicit(s) => Self::new(role, s),
        }
    }
}

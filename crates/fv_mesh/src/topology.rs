// crates/fv_mesh/src/topology.rs

//! 网格拓扑抽象
//!
//! 组装器只通过 [`Mesh`] 读取网格：单元数、面数、面两侧单元、面积、
//! 中心距以及按元素类别给出的形状。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 场变量所在的网格元素类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// 单元中心
    Cell,
    /// 面中心
    Face,
}

/// 网格类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshKind {
    /// 一维网格
    #[serde(rename = "grid1d")]
    Grid1D {
        /// 单元数
        nx: usize,
    },
    /// 二维矩形网格
    #[serde(rename = "grid2d")]
    Grid2D {
        /// x 方向单元数
        nx: usize,
        /// y 方向单元数
        ny: usize,
    },
}

impl MeshKind {
    /// 类型名
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grid1D { .. } => "Grid1D",
            Self::Grid2D { .. } => "Grid2D",
        }
    }
}

impl fmt::Display for MeshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid1D { nx } => write!(f, "Grid1D(nx={})", nx),
            Self::Grid2D { nx, ny } => write!(f, "Grid2D(nx={}, ny={})", nx, ny),
        }
    }
}

/// 面几何记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGeometry {
    /// 面的第一个单元
    pub cell1: usize,
    /// 面的第二个单元，边界面为 None
    pub cell2: Option<usize>,
    /// 面积（一维为 1，二维为边长）
    pub area: f64,
    /// 两侧单元中心距；边界面为单元中心到面中心距离
    pub distance: f64,
    /// 单位法向量，从 cell1 指向外侧
    pub normal: [f64; 3],
    /// 面中心
    pub center: [f64; 3],
}

/// 单元几何记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    /// 单元中心
    pub center: [f64; 3],
    /// 单元体积（一维为长度，二维为面积）
    pub volume: f64,
}

/// 网格接口
///
/// 网格在构造后只读，按 `Arc<dyn Mesh>` 在场变量与离散项之间共享。
pub trait Mesh: Send + Sync + fmt::Debug {
    // ========== 基本信息 ==========

    /// 空间维数
    fn dimension(&self) -> usize;

    /// 单元数量
    fn n_cells(&self) -> usize;

    /// 面数量
    fn n_faces(&self) -> usize;

    /// 网格类型
    fn mesh_kind(&self) -> MeshKind;

    // ========== 几何数据 ==========

    /// 面的几何记录
    fn face(&self, face: usize) -> &FaceGeometry;

    /// 单元的几何记录
    fn cell(&self, cell: usize) -> &CellGeometry;

    // ========== 边界 ==========

    /// 边界片名称
    fn patch_names(&self) -> &[&'static str];

    /// 边界片包含的面，未知名称返回 None
    fn patch_faces(&self, name: &str) -> Option<Vec<usize>>;

    // ========== 派生查询 ==========

    /// 面两侧单元 `(cell1, cell2)`
    fn face_cells(&self, face: usize) -> (usize, Option<usize>) {
        let f = self.face(face);
        (f.cell1, f.cell2)
    }

    /// 面积
    fn face_area(&self, face: usize) -> f64 {
        self.face(face).area
    }

    /// 中心距
    fn cell_distance(&self, face: usize) -> f64 {
        self.face(face).distance
    }

    /// 单位法向量
    fn face_normal(&self, face: usize) -> [f64; 3] {
        self.face(face).normal
    }

    /// 单元体积
    fn cell_volume(&self, cell: usize) -> f64 {
        self.cell(cell).volume
    }

    /// 单元中心
    fn cell_center(&self, cell: usize) -> [f64; 3] {
        self.cell(cell).center
    }

    /// 面中心
    fn face_center(&self, face: usize) -> [f64; 3] {
        self.face(face).center
    }

    /// 是否为边界面
    fn is_boundary_face(&self, face: usize) -> bool {
        self.face(face).cell2.is_none()
    }

    /// 所有边界面
    fn exterior_faces(&self) -> Vec<usize> {
        (0..self.n_faces())
            .filter(|&f| self.is_boundary_face(f))
            .collect()
    }

    /// 给定元素类别的网格形状
    fn shape_for(&self, kind: ElementKind) -> Vec<usize> {
        match kind {
            ElementKind::Cell => vec![self.n_cells()],
            ElementKind::Face => vec![self.n_faces()],
        }
    }
}

/// 校验单元间距输入
pub(crate) fn check_spacing(name: &'static str, spacing: &[f64]) -> fv_foundation::FvResult<()> {
    if spacing.is_empty() {
        return Err(fv_foundation::FvError::invalid_input(format!(
            "{} 至少需要一个单元",
            name
        )));
    }
    if let Some(bad) = spacing.iter().find(|d| !d.is_finite() || **d < 0.0) {
        return Err(fv_foundation::FvError::invalid_input(format!(
            "{} 含非法间距 {}",
            name, bad
        )));
    }
    Ok(())
}

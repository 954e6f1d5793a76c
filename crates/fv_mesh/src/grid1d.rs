// crates/fv_mesh/src/grid1d.rs

//! 一维网格
//!
//! 面 `i` 位于单元 `i-1` 与 `i` 之间；面 `0` 与面 `nx` 为边界面。
//! 面积恒为 1，单元体积即单元长度。

use crate::topology::{check_spacing, CellGeometry, FaceGeometry, Mesh, MeshKind};
use fv_foundation::FvResult;

const PATCHES: [&str; 2] = ["left", "right"];

/// 一维网格
#[derive(Debug, Clone)]
pub struct Grid1D {
    cells: Vec<CellGeometry>,
    faces: Vec<FaceGeometry>,
}

impl Grid1D {
    /// 均匀网格，`nx` 个长度为 `dx` 的单元
    pub fn new(nx: usize, dx: f64) -> FvResult<Self> {
        Self::from_spacing(vec![dx; nx])
    }

    /// 由逐单元长度构造非均匀网格
    ///
    /// 允许零长度单元，其退化几何在离散项计算权重时报告。
    pub fn from_spacing(dx: Vec<f64>) -> FvResult<Self> {
        check_spacing("dx", &dx)?;
        let nx = dx.len();

        let mut cells = Vec::with_capacity(nx);
        let mut left = 0.0;
        for &d in &dx {
            cells.push(CellGeometry {
                center: [left + 0.5 * d, 0.0, 0.0],
                volume: d,
            });
            left += d;
        }

        let mut faces = Vec::with_capacity(nx + 1);
        let mut x = 0.0;
        for i in 0..=nx {
            let face = if i == 0 {
                FaceGeometry {
                    cell1: 0,
                    cell2: None,
                    area: 1.0,
                    distance: 0.5 * dx[0],
                    normal: [-1.0, 0.0, 0.0],
                    center: [x, 0.0, 0.0],
                }
            } else if i == nx {
                FaceGeometry {
                    cell1: nx - 1,
                    cell2: None,
                    area: 1.0,
                    distance: 0.5 * dx[nx - 1],
                    normal: [1.0, 0.0, 0.0],
                    center: [x, 0.0, 0.0],
                }
            } else {
                FaceGeometry {
                    cell1: i - 1,
                    cell2: Some(i),
                    area: 1.0,
                    distance: cells[i].center[0] - cells[i - 1].center[0],
                    normal: [1.0, 0.0, 0.0],
                    center: [x, 0.0, 0.0],
                }
            };
            faces.push(face);
            if i < nx {
                x += dx[i];
            }
        }

        log::debug!("构建 Grid1D: {} 单元, 长度 {:.6}", nx, x);
        Ok(Self { cells, faces })
    }

    /// 单元数
    pub fn nx(&self) -> usize {
        self.cells.len()
    }
}

impl Mesh for Grid1D {
    fn dimension(&self) -> usize {
        1
    }

    fn n_cells(&self) -> usize {
        self.cells.len()
    }

    fn n_faces(&self) -> usize {
        self.faces.len()
    }

    fn mesh_kind(&self) -> MeshKind {
        MeshKind::Grid1D { nx: self.nx() }
    }

    fn face(&self, face: usize) -> &FaceGeometry {
        &self.faces[face]
    }

    fn cell(&self, cell: usize) -> &CellGeometry {
        &self.cells[cell]
    }

    fn patch_names(&self) -> &[&'static str] {
        &PATCHES
    }

    fn patch_faces(&self, name: &str) -> Option<Vec<usize>> {
        match name {
            "left" => Some(vec![0]),
            "right" => Some(vec![self.nx()]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_counts() {
        let mesh = Grid1D::new(4, 0.25).unwrap();
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.n_faces(), 5);
        assert_eq!(mesh.exterior_faces(), vec![0, 4]);
    }

    #[test]
    fn test_face_adjacency() {
        let mesh = Grid1D::new(3, 1.0).unwrap();
        assert_eq!(mesh.face_cells(0), (0, None));
        assert_eq!(mesh.face_cells(1), (0, Some(1)));
        assert_eq!(mesh.face_cells(3), (2, None));
        assert_eq!(mesh.face_normal(0)[0], -1.0);
        assert_eq!(mesh.face_normal(3)[0], 1.0);
    }

    #[test]
    fn test_distances() {
        let mesh = Grid1D::from_spacing(vec![1.0, 3.0]).unwrap();
        assert!((mesh.cell_distance(1) - 2.0).abs() < 1e-14);
        assert!((mesh.cell_distance(0) - 0.5).abs() < 1e-14);
        assert!((mesh.cell_distance(2) - 1.5).abs() < 1e-14);
        assert!((mesh.cell_volume(1) - 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_patches() {
        let mesh = Grid1D::new(5, 0.1).unwrap();
        assert_eq!(mesh.patch_faces("left"), Some(vec![0]));
        assert_eq!(mesh.patch_faces("right"), Some(vec![5]));
        assert_eq!(mesh.patch_faces("top"), None);
    }

    #[test]
    fn test_invalid_spacing() {
        assert!(Grid1D::new(0, 1.0).is_err());
        assert!(Grid1D::from_spacing(vec![1.0, -1.0]).is_err());
    }
}

// crates/fv_mesh/src/grid2d.rs

//! 二维矩形网格
//!
//! 单元编号 `i + j * nx`。面先列水平面（法向 ±y），共 `(ny + 1) * nx` 个，
//! 编号 `j * nx + i`；再列竖直面（法向 ±x），共 `ny * (nx + 1)` 个，
//! 编号 `(ny + 1) * nx + j * (nx + 1) + i`。

use crate::topology::{check_spacing, CellGeometry, FaceGeometry, Mesh, MeshKind};
use fv_foundation::FvResult;

const PATCHES: [&str; 4] = ["left", "right", "bottom", "top"];

/// 二维矩形网格
#[derive(Debug, Clone)]
pub struct Grid2D {
    nx: usize,
    ny: usize,
    dx: f64,
    dy: f64,
    cells: Vec<CellGeometry>,
    faces: Vec<FaceGeometry>,
}

impl Grid2D {
    /// 创建 `nx * ny` 个 `dx * dy` 单元的均匀网格
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64) -> FvResult<Self> {
        check_spacing("dx", &vec![dx; nx])?;
        check_spacing("dy", &vec![dy; ny])?;

        let cell_id = |i: usize, j: usize| i + j * nx;

        let mut cells = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                cells.push(CellGeometry {
                    center: [(i as f64 + 0.5) * dx, (j as f64 + 0.5) * dy, 0.0],
                    volume: dx * dy,
                });
            }
        }

        let mut faces = Vec::with_capacity((ny + 1) * nx + ny * (nx + 1));

        // 水平面
        for j in 0..=ny {
            for i in 0..nx {
                let center = [(i as f64 + 0.5) * dx, j as f64 * dy, 0.0];
                let face = if j == 0 {
                    FaceGeometry {
                        cell1: cell_id(i, 0),
                        cell2: None,
                        area: dx,
                        distance: 0.5 * dy,
                        normal: [0.0, -1.0, 0.0],
                        center,
                    }
                } else {
                    let interior = j < ny;
                    FaceGeometry {
                        cell1: cell_id(i, j - 1),
                        cell2: interior.then(|| cell_id(i, j)),
                        area: dx,
                        distance: if interior { dy } else { 0.5 * dy },
                        normal: [0.0, 1.0, 0.0],
                        center,
                    }
                };
                faces.push(face);
            }
        }

        // 竖直面
        for j in 0..ny {
            for i in 0..=nx {
                let center = [i as f64 * dx, (j as f64 + 0.5) * dy, 0.0];
                let face = if i == 0 {
                    FaceGeometry {
                        cell1: cell_id(0, j),
                        cell2: None,
                        area: dy,
                        distance: 0.5 * dx,
                        normal: [-1.0, 0.0, 0.0],
                        center,
                    }
                } else {
                    let interior = i < nx;
                    FaceGeometry {
                        cell1: cell_id(i - 1, j),
                        cell2: interior.then(|| cell_id(i, j)),
                        area: dy,
                        distance: if interior { dx } else { 0.5 * dx },
                        normal: [1.0, 0.0, 0.0],
                        center,
                    }
                };
                faces.push(face);
            }
        }

        log::debug!("构建 Grid2D: {}x{} 单元, {} 个面", nx, ny, faces.len());
        Ok(Self {
            nx,
            ny,
            dx,
            dy,
            cells,
            faces,
        })
    }

    /// x 方向单元数
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// y 方向单元数
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// 单元尺寸 `(dx, dy)`
    pub fn spacing(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }

    /// 水平面数量（竖直面编号的起点）
    pub fn n_horizontal_faces(&self) -> usize {
        (self.ny + 1) * self.nx
    }
}

impl Mesh for Grid2D {
    fn dimension(&self) -> usize {
        2
    }

    fn n_cells(&self) -> usize {
        self.cells.len()
    }

    fn n_faces(&self) -> usize {
        self.faces.len()
    }

    fn mesh_kind(&self) -> MeshKind {
        MeshKind::Grid2D {
            nx: self.nx,
            ny: self.ny,
        }
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
        let h = self.n_horizontal_faces();
        let (nx, ny) = (self.nx, self.ny);
        match name {
            "bottom" => Some((0..nx).collect()),
            "top" => Some((ny * nx..(ny + 1) * nx).collect()),
            "left" => Some((0..ny).map(|j| h + j * (nx + 1)).collect()),
            "right" => Some((0..ny).map(|j| h + j * (nx + 1) + nx).collect()),
            _ => None,
        }
    }
}

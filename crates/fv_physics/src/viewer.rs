// crates/fv_physics/src/viewer.rs

//! 二维网格图像数据
//!
//! 把二维结构化网格上的单元标量场整理成 `(ny, nx)` 的图像数组，
//! 附带坐标范围与色标范围。渲染交给外部工具。

use crate::field::{Field, FieldLocation};
use fv_foundation::{ensure, FvError, FvResult};
use fv_mesh::MeshKind;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// 显示范围，缺省项取数据本身的范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerLimits {
    /// x 下限
    pub xmin: Option<f64>,
    /// x 上限
    pub xmax: Option<f64>,
    /// y 下限
    pub ymin: Option<f64>,
    /// y 上限
    pub ymax: Option<f64>,
    /// 色标下限
    pub datamin: Option<f64>,
    /// 色标上限
    pub datamax: Option<f64>,
}

/// 图像数据
#[derive(Debug, Clone, PartialEq)]
pub struct GridImage {
    /// 单元值，行对应 y
    pub data: Array2<f64>,
    /// 列中心 x 坐标
    pub x: Vec<f64>,
    /// 行中心 y 坐标
    pub y: Vec<f64>,
    /// 色标范围
    pub data_range: (f64, f64),
}

impl GridImage {
    /// 由二维单元标量场生成
    ///
    /// 网格不是 `Grid2D` 时返回 `MeshDimension`；场不是单元标量时返回 `ShapeMismatch`。
    pub fn from_field(field: &Field, limits: &ViewerLimits) -> FvResult<GridImage> {
        let mesh = field.mesh();
        let (nx, ny) = match mesh.mesh_kind() {
            MeshKind::Grid2D { nx, ny } => (nx, ny),
            other => return Err(FvError::mesh_dimension("Grid2D", other.to_string())),
        };
        ensure!(
            field.location() == FieldLocation::Cell && field.rank() == 0,
            FvError::shape_mismatch(format!(
                "图像需要单元标量场, {} 位于 {:?} (rank {})",
                field.name(),
                field.location(),
                field.rank()
            ))
        );
        let full = Array2::from_shape_vec((ny, nx), field.values()?)
            .map_err(|e| FvError::shape_mismatch(e.to_string()))?;

        let x_all: Vec<f64> = (0..nx).map(|i| mesh.cell_center(i)[0]).collect();
        let y_all: Vec<f64> = (0..ny).map(|j| mesh.cell_center(j * nx)[1]).collect();
        let within = |v: f64, lo: Option<f64>, hi: Option<f64>| {
            lo.map_or(true, |lo| v >= lo) && hi.map_or(true, |hi| v <= hi)
        };
        let cols: Vec<usize> = (0..nx)
            .filter(|&i| within(x_all[i], limits.xmin, limits.xmax))
            .collect();
        let rows: Vec<usize> = (0..ny)
            .filter(|&j| within(y_all[j], limits.ymin, limits.ymax))
            .collect();
        if cols.is_empty() || rows.is_empty() {
            return Err(FvError::invalid_input("显示范围内没有单元"));
        }

        let data = full.select(Axis(0), &rows).select(Axis(1), &cols);
        let lo = data.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let data_range = (limits.datamin.unwrap_or(lo), limits.datamax.unwrap_or(hi));
        log::debug!(
            "图像 {}x{} (裁剪自 {}x{}), 色标 {:?}",
            rows.len(),
            cols.len(),
            ny,
            nx,
            data_range
        );
        Ok(GridImage {
            data,
            x: cols.iter().map(|&i| x_all[i]).collect(),
            y: rows.iter().map(|&j| y_all[j]).collect(),
            data_range,
        })
    }

    /// (ny, nx)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_mesh::{Grid1D, Grid2D, Mesh};
    use std::sync::Arc;

    fn grid() -> Arc<dyn Mesh> {
        Arc::new(Grid2D::new(3, 2, 1.0, 0.5).unwrap())
    }

    #[test]
    fn test_reshape_row_major() {
        let mesh = grid();
        let values: Vec<f64> = (0..6).map(f64::from).collect();
        let f = Field::scalar_cell(Arc::clone(&mesh), "phi", values).unwrap();
        let img = GridImage::from_field(&f, &ViewerLimits::default()).unwrap();
        assert_eq!(img.shape(), (2, 3));
        assert_eq!(img.data[[1, 0]], 3.0);
        assert_eq!(img.x, vec![0.5, 1.5, 2.5]);
        assert_eq!(img.y, vec![0.25, 0.75]);
        assert_eq!(img.data_range, (0.0, 5.0));
    }

    #[test]
    fn test_limits_crop() {
        let mesh = grid();
        let values: Vec<f64> = (0..6).map(f64::from).collect();
        let f = Field::scalar_cell(Arc::clone(&mesh), "phi", values).unwrap();
        let limits = ViewerLimits {
            xmin: Some(1.0),
            ymax: Some(0.5),
            datamax: Some(10.0),
            ..Default::default()
        };
        let img = GridImage::from_field(&f, &limits).unwrap();
        assert_eq!(img.shape(), (1, 2));
        assert_eq!(img.data[[0, 0]], 1.0);
        assert_eq!(img.data_range, (1.0, 10.0));
    }

    #[test]
    fn test_requires_grid2d() {
        let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::new(4, 1.0).unwrap());
        let f = Field::scalar_cell(mesh, "phi", 0.0).unwrap();
        let err = GridImage::from_field(&f, &ViewerLimits::default()).unwrap_err();
        assert!(matches!(err, FvError::MeshDimension { .. }));
    }

    #[test]
    fn test_requires_cell_scalar() {
        let mesh = grid();
        let f = Field::face_areas(Arc::clone(&mesh)).unwrap();
        let err = GridImage::from_field(&f, &ViewerLimits::default()).unwrap_err();
        assert!(matches!(err, FvError::ShapeMismatch { .. }));
    }
}

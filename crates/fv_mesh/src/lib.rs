// crates/fv_mesh/src/lib.rs

//! FvTerm 网格层
//!
//! 为离散引擎提供只读的网格接口 [`Mesh`]，以及两个均匀/非均匀结构化网格实现。
//!
//! # 模块概览
//!
//! - [`topology`]: `Mesh` trait、元素类别、面/单元几何记录
//! - [`grid1d`]: 一维网格 [`Grid1D`]
//! - [`grid2d`]: 二维矩形网格 [`Grid2D`]
//!
//! # 编号约定
//!
//! - 每个面恰好有一个 `cell1`；内部面另有 `cell2`，边界面为 `None`
//! - 面法向量从 `cell1` 指向外侧
//! - 边界面的 `cell_distance` 是单元中心到面中心的距离

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod grid1d;
pub mod grid2d;
pub mod topology;

pub use grid1d::Grid1D;
pub use grid2d::Grid2D;
pub use topology::{CellGeometry, ElementKind, FaceGeometry, Mesh, MeshKind};

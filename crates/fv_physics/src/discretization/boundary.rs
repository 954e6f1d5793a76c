// crates/fv_physics/src/discretization/boundary.rs

//! 边界条件
//!
//! 边界条件按边界片名称施加到面上。没有条件的边界面视为零梯度：
//! 扩散通量为零，对流取 cell1 值外推。

use fv_foundation::{ensure, require, FvError, FvResult};
use fv_mesh::Mesh;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个边界面的条件
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BoundaryCondition {
    /// 给定面值 φ_b
    FixedValue(f64),
    /// 给定外法向梯度 ∂φ/∂n
    FixedGradient(f64),
}

impl BoundaryCondition {
    /// 由面相邻单元值与中心距推出的面值
    pub fn face_value(&self, cell_value: f64, distance: f64) -> f64 {
        match *self {
            Self::FixedValue(v) => v,
            Self::FixedGradient(g) => cell_value + g * distance,
        }
    }
}

/// 面到边界条件的映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryConditions {
    by_face: BTreeMap<usize, BoundaryCondition>,
}

impl BoundaryConditions {
    /// 空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 在边界片上施加固定值
    pub fn fixed_value(mut self, mesh: &dyn Mesh, patch: &str, value: f64) -> FvResult<Self> {
        self.apply(mesh, patch, BoundaryCondition::FixedValue(value))?;
        Ok(self)
    }

    /// 在边界片上施加固定梯度
    pub fn fixed_gradient(mut self, mesh: &dyn Mesh, patch: &str, gradient: f64) -> FvResult<Self> {
        self.apply(mesh, patch, BoundaryCondition::FixedGradient(gradient))?;
        Ok(self)
    }

    /// 在边界片上施加条件，后施加的覆盖先施加的
    pub fn apply(&mut self, mesh: &dyn Mesh, patch: &str, bc: BoundaryCondition) -> FvResult<()> {
        let faces = require!(mesh.patch_faces(patch), FvError::unknown_patch(patch));
        self.apply_faces(mesh, &faces, bc)
    }

    /// 在指定面上施加条件
    pub fn apply_faces(
        &mut self,
        mesh: &dyn Mesh,
        faces: &[usize],
        bc: BoundaryCondition,
    ) -> FvResult<()> {
        for &face in faces {
            FvError::check_index("face", face, mesh.n_faces())?;
            ensure!(
                mesh.is_boundary_face(face),
                FvError::invalid_input(format!("面 {} 是内部面, 不能施加边界条件", face))
            );
            self.by_face.insert(face, bc);
        }
        log::debug!("边界条件 {:?} 施加到 {} 个面", bc, faces.len());
        Ok(())
    }

    /// 查询面的条件
    pub fn get(&self, face: usize) -> Option<BoundaryCondition> {
        self.by_face.get(&face).copied()
    }

    /// 已施加条件的面数
    pub fn len(&self) -> usize {
        self.by_face.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.by_face.is_empty()
    }

    /// 遍历 (面, 条件)
    pub fn iter(&self) -> impl Iterator<Item = (usize, BoundaryCondition)> + '_ {
        self.by_face.iter().map(|(&f, &bc)| (f, bc))
    }
}

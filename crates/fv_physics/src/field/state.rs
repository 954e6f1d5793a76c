// crates/fv_physics/src/field/state.rs

//! 场快照
//!
//! 只保存重建存储场所需的内容；网格本身不序列化，重建时挂接到调用方给出的网格。

use super::FieldLocation;
use fv_mesh::MeshKind;
use serde::{Deserialize, Serialize};

/// 场持久化快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    /// 名称
    pub name: String,
    /// 保存时的网格类型
    pub mesh_kind: MeshKind,
    /// 位置
    pub location: FieldLocation,
    /// 元素形状
    pub element_shape: Vec<usize>,
    /// 行主序数值，网格轴在最后
    pub value: Vec<f64>,
    /// 物理单位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

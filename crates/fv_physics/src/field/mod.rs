// crates/fv_physics/src/field/mod.rs

//! 网格场变量
//!
//! [`Field`] 是绑定到网格的数值数组，形状为 `elementShape + meshShape`，
//! 网格轴总在最后。算术、点积与空间导数都返回新的惰性派生场，
//! 只在取值时沿依赖图求值。
//!
//! # 失效机制
//!
//! 每次 `set_value` 都从全局计数器取一个新代号。派生场的代号是其操作数
//! 代号的最大值；缓存代号与当前代号不同即重新计算，因此上游任意修改
//! 都不会读到过期缓存。
//!
//! # 主要类型
//!
//! - [`Field`]: 场句柄，克隆只增加引用计数
//! - [`FieldSpec`]: 构造参数（名称、位置、阶数、元素形状、单位、缓存）
//! - [`Operand`]: 运算的右操作数，非场值会提升为常量场
//! - [`FieldState`]: 持久化快照
//!
//! # 使用示例
//!
//! ```ignore
//! use fv_mesh::Grid2D;
//! use fv_physics::field::{Field, FieldSpec};
//! use std::sync::Arc;
//!
//! let mesh = Arc::new(Grid2D::new(2, 3, 1.0, 1.0)?);
//! let v1 = Field::new(mesh.clone(), FieldSpec::cell("v1").rank(1), vec![2.0, 3.0])?;
//! let s = v1.dot(vec![3.0, 4.0])?;
//! assert_eq!(s.shape(), &[6]);
//! ```

mod ops;
mod state;

pub use ops::{broadcast_shape, dot_shape, BinaryKind};
pub use state::FieldState;

use fv_comm::CommBackend;
use fv_foundation::{ensure, FvError, FvResult};
use fv_mesh::{ElementKind, Mesh};
use ndarray::{Array, ArrayD, Axis, Dimension, IxDyn};
use ops::FieldOp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// 位置与构造参数
// ============================================================================

/// 场所在位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLocation {
    /// 单元中心
    Cell,
    /// 面中心
    Face,
    /// 与网格无关的常量，网格轴长度为 1
    Constant,
}

impl FieldLocation {
    /// 网格轴长度
    pub fn mesh_len(self, mesh: &dyn Mesh) -> usize {
        match self {
            Self::Cell => mesh.shape_for(ElementKind::Cell)[0],
            Self::Face => mesh.shape_for(ElementKind::Face)[0],
            Self::Constant => 1,
        }
    }

    fn combine(self, other: Self, a: &[usize], b: &[usize]) -> FvResult<Self> {
        match (self, other) {
            (Self::Constant, x) | (x, Self::Constant) => Ok(x),
            (x, y) if x == y => Ok(x),
            _ => Err(FvError::broadcast("单元场与面场混合运算", a, b)),
        }
    }
}

/// 场构造参数
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// 名称
    pub name: String,
    /// 位置
    pub location: FieldLocation,
    /// 张量阶数
    pub rank: usize,
    /// 元素形状，缺省为 `rank` 个空间维数
    pub element_shape: Option<Vec<usize>>,
    /// 物理单位
    pub unit: Option<String>,
    /// 派生场是否缓存
    pub cached: bool,
}

impl FieldSpec {
    /// 单元标量场
    pub fn cell(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: FieldLocation::Cell,
            rank: 0,
            element_shape: None,
            unit: None,
            cached: true,
        }
    }

    /// 面标量场
    pub fn face(name: impl Into<String>) -> Self {
        Self {
            location: FieldLocation::Face,
            ..Self::cell(name)
        }
    }

    /// 设置阶数
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// 显式元素形状
    pub fn element_shape(mut self, shape: Vec<usize>) -> Self {
        self.element_shape = Some(shape);
        self
    }

    /// 设置单位
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// 设置缓存开关
    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

/// 运算操作数
#[derive(Debug, Clone)]
pub enum Operand {
    /// 场
    Field(Field),
    /// 原始数组，按常量场处理
    Value(ArrayD<f64>),
}

impl From<Field> for Operand {
    fn from(f: Field) -> Self {
        Self::Field(f)
    }
}

impl From<&Field> for Operand {
    fn from(f: &Field) -> Self {
        Self::Field(f.clone())
    }
}

impl From<f64> for Operand {
    fn from(x: f64) -> Self {
        Self::Value(ndarray::arr0(x).into_dyn())
    }
}

impl From<Vec<f64>> for Operand {
    fn from(v: Vec<f64>) -> Self {
        Self::Value(Array::from(v).into_dyn())
    }
}

impl<D: Dimension> From<Array<f64, D>> for Operand {
    fn from(a: Array<f64, D>) -> Self {
        Self::Value(a.into_dyn())
    }
}

// ============================================================================
// 场节点
// ============================================================================

enum Source {
    Stored,
    Derived(FieldOp),
}

struct Cache {
    value: Option<ArrayD<f64>>,
    stamp: u64,
}

struct FieldNode {
    name: String,
    mesh: Arc<dyn Mesh>,
    location: FieldLocation,
    element_shape: Vec<usize>,
    shape: Vec<usize>,
    unit: Option<String>,
    cached: bool,
    source: Source,
    cache: Mutex<Cache>,
    old: Mutex<Option<Field>>,
}

/// 网格场
#[derive(Clone)]
pub struct Field {
    node: Arc<FieldNode>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.node.name)
            .field("location", &self.node.location)
            .field("shape", &self.node.shape)
            .field("unit", &self.node.unit)
            .field("derived", &matches!(self.node.source, Source::Derived(_)))
            .finish()
    }
}

/// 把初值广播到目标形状；失败时追加一个尾轴再试
fn broadcast_initial(value: &ArrayD<f64>, shape: &[usize]) -> FvResult<ArrayD<f64>> {
    if let Some(v) = value.broadcast(IxDyn(shape)) {
        return Ok(v.to_owned());
    }
    let lifted = value.view().insert_axis(Axis(value.ndim()));
    lifted
        .broadcast(IxDyn(shape))
        .map(|v| v.to_owned())
        .ok_or_else(|| FvError::broadcast("初值", value.shape(), shape))
}

impl Field {
    // ========================================================================
    // 构造
    // ========================================================================

    /// 创建存储场
    ///
    /// `element_shape` 给定时长度必须等于 `rank`，否则返回 `ShapeMismatch`。
    pub fn new(
        mesh: Arc<dyn Mesh>,
        spec: FieldSpec,
        value: impl Into<Operand>,
    ) -> FvResult<Field> {
        let element_shape = match spec.element_shape {
            Some(shape) => {
                ensure!(
                    shape.len() == spec.rank,
                    FvError::shape_mismatch(format!(
                        "elementShape {:?} 的长度与 rank {} 不一致",
                        shape, spec.rank
                    ))
                );
                shape
            }
            None => vec![mesh.dimension(); spec.rank],
        };
        let mut shape = element_shape.clone();
        shape.push(spec.location.mesh_len(&*mesh));

        let raw = match value.into() {
            Operand::Value(v) => v,
            Operand::Field(f) => f.value()?,
        };
        let value = broadcast_initial(&raw, &shape)?;

        Ok(Field {
            node: Arc::new(FieldNode {
                name: spec.name,
                mesh,
                location: spec.location,
                element_shape,
                shape,
                unit: spec.unit,
                cached: spec.cached,
                source: Source::Stored,
                cache: Mutex::new(Cache {
                    value: Some(value),
                    stamp: next_generation(),
                }),
                old: Mutex::new(None),
            }),
        })
    }

    /// 单元标量场
    pub fn scalar_cell(
        mesh: Arc<dyn Mesh>,
        name: impl Into<String>,
        value: impl Into<Operand>,
    ) -> FvResult<Field> {
        Self::new(mesh, FieldSpec::cell(name), value)
    }

    /// 与网格无关的常量场，形状为 `value.shape + [1]`
    pub fn constant(mesh: Arc<dyn Mesh>, value: ArrayD<f64>) -> Field {
        let element_shape = value.shape().to_vec();
        let stored = value.insert_axis(Axis(element_shape.len()));
        let shape = stored.shape().to_vec();
        Field {
            node: Arc::new(FieldNode {
                name: "const".to_string(),
                mesh,
                location: FieldLocation::Constant,
                element_shape,
                shape,
                unit: None,
                cached: true,
                source: Source::Stored,
                cache: Mutex::new(Cache {
                    value: Some(stored),
                    stamp: next_generation(),
                }),
                old: Mutex::new(None),
            }),
        }
    }

    /// 面单位法向量，形状 `[dim, n_faces]`
    pub fn face_normals(mesh: Arc<dyn Mesh>) -> FvResult<Field> {
        let (dim, nf) = (mesh.dimension(), mesh.n_faces());
        let mut data = vec![0.0; dim * nf];
        for face in 0..nf {
            let n = mesh.face_normal(face);
            for d in 0..dim {
                data[d * nf + face] = n[d];
            }
        }
        let value = ArrayD::from_shape_vec(IxDyn(&[dim, nf]), data)
            .map_err(|e| FvError::invalid_input(e.to_string()))?;
        Self::new(mesh, FieldSpec::face("faceNormals").rank(1), value)
    }

    /// 面积，形状 `[n_faces]`
    pub fn face_areas(mesh: Arc<dyn Mesh>) -> FvResult<Field> {
        let areas: Vec<f64> = (0..mesh.n_faces()).map(|f| mesh.face_area(f)).collect();
        Self::new(mesh, FieldSpec::face("faceAreas"), areas)
    }

    /// 单元体积，形状 `[n_cells]`
    pub fn cell_volumes(mesh: Arc<dyn Mesh>) -> FvResult<Field> {
        let volumes: Vec<f64> = (0..mesh.n_cells()).map(|c| mesh.cell_volume(c)).collect();
        Self::new(mesh, FieldSpec::cell("cellVolumes"), volumes)
    }

    fn derived(
        &self,
        name: String,
        location: FieldLocation,
        shape: Vec<usize>,
        op: FieldOp,
    ) -> Field {
        let element_shape = shape[..shape.len() - 1].to_vec();
        Field {
            node: Arc::new(FieldNode {
                name,
                mesh: Arc::clone(&self.node.mesh),
                location,
                element_shape,
                shape,
                unit: None,
                cached: self.node.cached,
                source: Source::Derived(op),
                cache: Mutex::new(Cache {
                    value: None,
                    stamp: 0,
                }),
                old: Mutex::new(None),
            }),
        }
    }

    fn promote(&self, other: impl Into<Operand>) -> FvResult<Field> {
        match other.into() {
            Operand::Field(f) => {
                if !self.same_mesh(&f) {
                    return Err(FvError::invalid_input(format!(
                        "{} 与 {} 不在同一网格上",
                        self.name(),
                        f.name()
                    )));
                }
                Ok(f)
            }
            Operand::Value(v) => Ok(Field::constant(Arc::clone(&self.node.mesh), v)),
        }
    }

    // ========================================================================
    // 属性
    // ========================================================================

    /// 名称
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// 网格
    pub fn mesh(&self) -> &Arc<dyn Mesh> {
        &self.node.mesh
    }

    /// 位置
    pub fn location(&self) -> FieldLocation {
        self.node.location
    }

    /// 完整形状 `elementShape + meshShape`
    pub fn shape(&self) -> &[usize] {
        &self.node.shape
    }

    /// 元素形状
    pub fn element_shape(&self) -> &[usize] {
        &self.node.element_shape
    }

    /// 张量阶数
    pub fn rank(&self) -> usize {
        self.node.element_shape.len()
    }

    /// 物理单位
    pub fn unit(&self) -> Option<&str> {
        self.node.unit.as_deref()
    }

    /// 是否缓存派生值
    pub fn is_cached(&self) -> bool {
        self.node.cached
    }

    /// 是否为派生场
    pub fn is_derived(&self) -> bool {
        matches!(self.node.source, Source::Derived(_))
    }

    fn same_mesh(&self, other: &Field) -> bool {
        self.is_on(&other.node.mesh)
    }

    /// 是否绑定在 `mesh` 这一网格实例上
    pub fn is_on(&self, mesh: &Arc<dyn Mesh>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.node.mesh) as *const (),
            Arc::as_ptr(mesh) as *const (),
        )
    }

    /// 当前代号
    pub fn generation(&self) -> u64 {
        match &self.node.source {
            Source::Stored => self.node.cache.lock().stamp,
            Source::Derived(op) => op
                .operands()
                .iter()
                .map(|f| f.generation())
                .max()
                .unwrap_or(0),
        }
    }

    // ========================================================================
    // 取值与赋值
    // ========================================================================

    /// 求值
    ///
    /// 派生场在未缓存或任一上游代号变化时沿依赖图重新计算。
    pub fn value(&self) -> FvResult<ArrayD<f64>> {
        match &self.node.source {
            Source::Stored => {
                let cache = self.node.cache.lock();
                Ok(cache
                    .value
                    .clone()
                    .unwrap_or_else(|| ArrayD::zeros(IxDyn(&self.node.shape))))
            }
            Source::Derived(op) => {
                let stamp = self.generation();
                if self.node.cached {
                    let cache = self.node.cache.lock();
                    if cache.stamp == stamp {
                        if let Some(v) = &cache.value {
                            return Ok(v.clone());
                        }
                    }
                }
                log::trace!("求值派生场 {}", self.node.name);
                let value = op.evaluate(&*self.node.mesh)?;
                if self.node.cached {
                    let mut cache = self.node.cache.lock();
                    cache.value = Some(value.clone());
                    cache.stamp = stamp;
                }
                Ok(value)
            }
        }
    }

    /// 标量场的值，按网格元素顺序
    pub fn values(&self) -> FvResult<Vec<f64>> {
        if self.rank() != 0 {
            return Err(FvError::shape_mismatch(format!(
                "{} 不是标量场 (rank {})",
                self.name(),
                self.rank()
            )));
        }
        Ok(self.value()?.iter().copied().collect())
    }

    /// 原地赋值
    ///
    /// `mask` 为网格形状的布尔数组时只改写为真的网格元素，并沿所有元素轴广播。
    /// 赋值使依赖本场的所有派生场失效。
    pub fn set_value(&self, value: impl Into<Operand>, mask: Option<&[bool]>) -> FvResult<()> {
        if self.is_derived() {
            return Err(FvError::invalid_input(format!(
                "派生场 {} 不可赋值",
                self.name()
            )));
        }
        let raw = match value.into() {
            Operand::Value(v) => v,
            Operand::Field(f) => f.value()?,
        };
        let incoming = broadcast_initial(&raw, &self.node.shape)?;

        let mut cache = self.node.cache.lock();
        match mask {
            None => cache.value = Some(incoming),
            Some(mask) => {
                let n = *self.node.shape.last().unwrap_or(&1);
                FvError::check_size("where 掩码", n, mask.len())?;
                let mesh_axis = Axis(self.node.shape.len() - 1);
                let mut current = cache
                    .value
                    .take()
                    .unwrap_or_else(|| ArrayD::zeros(IxDyn(&self.node.shape)));
                for (i, &selected) in mask.iter().enumerate() {
                    if selected {
                        current
                            .index_axis_mut(mesh_axis, i)
                            .assign(&incoming.index_axis(mesh_axis, i));
                    }
                }
                cache.value = Some(current);
            }
        }
        cache.stamp = next_generation();
        Ok(())
    }

    // ========================================================================
    // 旧值（瞬态）
    // ========================================================================

    /// 开启旧值记录，旧值初始化为当前值
    pub fn with_old(self) -> FvResult<Field> {
        let old = Field::new(
            Arc::clone(&self.node.mesh),
            FieldSpec {
                name: format!("{}_old", self.name()),
                location: self.node.location,
                rank: self.rank(),
                element_shape: Some(self.node.element_shape.clone()),
                unit: self.node.unit.clone(),
                cached: self.node.cached,
            },
            self.value()?,
        )?;
        *self.node.old.lock() = Some(old);
        Ok(self)
    }

    /// 旧值场
    pub fn old(&self) -> Option<Field> {
        self.node.old.lock().clone()
    }

    /// 用当前值覆盖旧值
    pub fn update_old(&self) -> FvResult<()> {
        match self.old() {
            Some(old) => old.set_value(self.value()?, None),
            None => Err(FvError::invalid_input(format!(
                "{} 未开启旧值记录",
                self.name()
            ))),
        }
    }

    // ========================================================================
    // 惰性运算
    // ========================================================================

    fn binary_op(&self, kind: BinaryKind, other: impl Into<Operand>) -> FvResult<Field> {
        let rhs = self.promote(other)?;
        let shape = broadcast_shape(self.shape(), rhs.shape())
            .ok_or_else(|| FvError::broadcast(kind.symbol(), self.shape(), rhs.shape()))?;
        let location = self
            .location()
            .combine(rhs.location(), self.shape(), rhs.shape())?;
        let name = format!("({} {} {})", self.name(), kind.symbol(), rhs.name());
        Ok(self.derived(
            name,
            location,
            shape,
            FieldOp::Binary {
                kind,
                lhs: self.clone(),
                rhs,
            },
        ))
    }

    /// 逐元素加
    pub fn try_add(&self, other: impl Into<Operand>) -> FvResult<Field> {
        self.binary_op(BinaryKind::Add, other)
    }

    /// 逐元素减
    pub fn try_sub(&self, other: impl Into<Operand>) -> FvResult<Field> {
        self.binary_op(BinaryKind::Sub, other)
    }

    /// 逐元素乘
    pub fn try_mul(&self, other: impl Into<Operand>) -> FvResult<Field> {
        self.binary_op(BinaryKind::Mul, other)
    }

    /// 逐元素除
    pub fn try_div(&self, other: impl Into<Operand>) -> FvResult<Field> {
        self.binary_op(BinaryKind::Div, other)
    }

    /// 取负
    pub fn negate(&self) -> Field {
        self.derived(
            format!("-{}", self.name()),
            self.location(),
            self.shape().to_vec(),
            FieldOp::Neg(self.clone()),
        )
    }

    /// 点积：收缩本场最后一个元素轴与 `other` 第一个元素轴
    ///
    /// 结果阶数为 `rankA + rankB - 2`；任一方为标量时退化为逐元素乘。
    pub fn dot(&self, other: impl Into<Operand>) -> FvResult<Field> {
        let rhs = self.promote(other)?;
        self.dot_fields(self, &rhs)
    }

    /// 反向点积 `other · self`
    pub fn rdot(&self, other: impl Into<Operand>) -> FvResult<Field> {
        let lhs = self.promote(other)?;
        self.dot_fields(&lhs, self)
    }

    fn dot_fields(&self, lhs: &Field, rhs: &Field) -> FvResult<Field> {
        let shape = dot_shape(lhs.shape(), rhs.shape())?;
        let location = lhs
            .location()
            .combine(rhs.location(), lhs.shape(), rhs.shape())?;
        Ok(self.derived(
            format!("{}.dot({})", lhs.name(), rhs.name()),
            location,
            shape,
            FieldOp::Dot {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
        ))
    }

    fn require_location(&self, expected: FieldLocation, operation: &str) -> FvResult<()> {
        if self.location() != expected {
            return Err(FvError::shape_mismatch(format!(
                "{} 需要 {:?} 场, {} 位于 {:?}",
                operation,
                expected,
                self.name(),
                self.location()
            )));
        }
        Ok(())
    }

    /// 单元值插值到面
    pub fn arithmetic_face_value(&self) -> FvResult<Field> {
        self.require_location(FieldLocation::Cell, "arithmetic_face_value")?;
        let mut shape = self.element_shape().to_vec();
        shape.push(self.node.mesh.n_faces());
        Ok(self.derived(
            format!("{}.faceValue", self.name()),
            FieldLocation::Face,
            shape,
            FieldOp::FaceValue(self.clone()),
        ))
    }

    fn vector_derivative(
        &self,
        suffix: &str,
        location: FieldLocation,
        op: FieldOp,
    ) -> FvResult<Field> {
        self.require_location(FieldLocation::Cell, suffix)?;
        if self.rank() != 0 {
            return Err(FvError::shape_mismatch(format!(
                "{} 只接受标量场, {} 的 rank 为 {}",
                suffix,
                self.name(),
                self.rank()
            )));
        }
        let mesh = &self.node.mesh;
        let shape = vec![mesh.dimension(), location.mesh_len(&**mesh)];
        Ok(self.derived(format!("{}.{}", self.name(), suffix), location, shape, op))
    }

    /// 面法向梯度，形状 `[dim, n_faces]`
    pub fn face_grad(&self) -> FvResult<Field> {
        self.vector_derivative(
            "faceGrad",
            FieldLocation::Face,
            FieldOp::FaceGrad(self.clone()),
        )
    }

    /// 单元梯度，形状 `[dim, n_cells]`
    pub fn grad(&self) -> FvResult<Field> {
        self.vector_derivative("grad", FieldLocation::Cell, FieldOp::Grad(self.clone()))
    }

    /// 面向量场的单元散度
    pub fn divergence(&self) -> FvResult<Field> {
        self.require_location(FieldLocation::Face, "divergence")?;
        if self.rank() != 1 || self.element_shape()[0] != self.node.mesh.dimension() {
            return Err(FvError::shape_mismatch(format!(
                "divergence 需要面向量场, {} 的元素形状为 {:?}",
                self.name(),
                self.element_shape()
            )));
        }
        Ok(self.derived(
            format!("{}.divergence", self.name()),
            FieldLocation::Cell,
            vec![self.node.mesh.n_cells()],
            FieldOp::Divergence(self.clone()),
        ))
    }

    // ========================================================================
    // 分布式取值
    // ========================================================================

    /// 汇总各分区的本地值为全局数组
    ///
    /// `local_ids` 选出本分区拥有的网格元素，`global_ids` 给出它们的全局编号。
    /// 单进程时原样返回本地值。
    pub fn global_value(
        &self,
        local_ids: &[usize],
        global_ids: &[usize],
        comm: &dyn CommBackend,
    ) -> FvResult<ArrayD<f64>> {
        let local = self.value()?;
        if comm.num_processes() == 1 {
            return Ok(local);
        }
        FvError::check_size("global_ids", local_ids.len(), global_ids.len())?;
        let mesh_axis = Axis(local.ndim() - 1);
        let n_local = local.shape()[local.ndim() - 1];
        for &id in local_ids {
            FvError::check_index("local_ids", id, n_local)?;
        }

        let all_ids = comm.all_gather_indices(global_ids)?;
        let owned = local.select(mesh_axis, local_ids);
        let all_values = comm.all_gather(&owned.iter().copied().collect::<Vec<_>>())?;

        let n_global = all_ids
            .iter()
            .flat_map(|ids| ids.iter())
            .max()
            .map_or(0, |m| m + 1);
        let element_shape = self.element_shape().to_vec();
        let m: usize = element_shape.iter().product();
        let mut global_shape = element_shape.clone();
        global_shape.push(n_global);
        let mut global = ArrayD::<f64>::zeros(IxDyn(&global_shape));

        for (ids, values) in all_ids.iter().zip(all_values.iter()) {
            FvError::check_size("分区值", m * ids.len(), values.len())?;
            let mut part_shape = element_shape.clone();
            part_shape.push(ids.len());
            let part = ArrayD::from_shape_vec(IxDyn(&part_shape), values.clone())
                .map_err(|e| FvError::invalid_input(e.to_string()))?;
            for (k, &g) in ids.iter().enumerate() {
                global
                    .index_axis_mut(mesh_axis, g)
                    .assign(&part.index_axis(mesh_axis, k));
            }
        }
        log::debug!(
            "{} 全局取值: {} 个分区, {} 个元素",
            self.name(),
            all_ids.len(),
            n_global
        );
        Ok(global)
    }

    // ========================================================================
    // 持久化
    // ========================================================================

    /// 导出快照（派生场会先求值）
    pub fn to_state(&self) -> FvResult<FieldState> {
        let value = self.value()?;
        Ok(FieldState {
            name: self.name().to_string(),
            mesh_kind: self.node.mesh.mesh_kind(),
            location: self.location(),
            element_shape: self.element_shape().to_vec(),
            value: value.iter().copied().collect(),
            unit: self.node.unit.clone(),
        })
    }

    /// 由快照重建并挂接到网格
    pub fn from_state(mesh: Arc<dyn Mesh>, state: FieldState) -> FvResult<Field> {
        if state.mesh_kind != mesh.mesh_kind() {
            log::warn!(
                "场 {} 保存于 {}, 挂接到 {}",
                state.name,
                state.mesh_kind,
                mesh.mesh_kind()
            );
        }
        let mut shape = state.element_shape.clone();
        shape.push(state.location.mesh_len(&*mesh));
        let expected: usize = shape.iter().product();
        FvError::check_size("快照值", expected, state.value.len())?;
        let value = ArrayD::from_shape_vec(IxDyn(&shape), state.value)
            .map_err(|e| FvError::serialization(e.to_string()))?;
        let spec = FieldSpec {
            name: state.name,
            location: state.location,
            rank: state.element_shape.len(),
            element_shape: Some(state.element_shape),
            unit: state.unit,
            cached: true,
        };
        Field::new(mesh, spec, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_comm::{DummyComm, LocalComm};
    use fv_mesh::{Grid1D, Grid2D};
    use ndarray::array;
    use std::time::Duration;

    fn grid() -> Arc<dyn Mesh> {
        Arc::new(Grid2D::new(2, 3, 1.0, 1.0).unwrap())
    }

    #[test]
    fn test_shapes_on_grid2d() {
        let mesh = grid();
        let cell = Field::scalar_cell(mesh.clone(), "phi", 1.0).unwrap();
        assert_eq!(cell.shape(), &[6]);
        assert_eq!(cell.arithmetic_face_value().unwrap().shape(), &[17]);
        assert_eq!(cell.grad().unwrap().shape(), &[2, 6]);
        assert_eq!(cell.face_grad().unwrap().shape(), &[2, 17]);
    }

    #[test]
    fn test_default_element_shape() {
        let mesh = grid();
        let t = Field::new(mesh, FieldSpec::cell("t").rank(2), 0.0).unwrap();
        assert_eq!(t.shape(), &[2, 2, 6]);
        assert_eq!(t.rank(), 2);
    }

    #[test]
    fn test_element_shape_rank_mismatch() {
        let mesh = grid();
        let err = Field::new(
            mesh,
            FieldSpec::cell("bad").rank(2).element_shape(vec![2]),
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, FvError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_initial_value_trailing_axis() {
        let mesh = grid();
        let v = Field::new(mesh, FieldSpec::cell("v").rank(1), vec![2.0, 3.0]).unwrap();
        let value = v.value().unwrap();
        assert_eq!(value.shape(), &[2, 6]);
        assert_eq!(value[[0, 5]], 2.0);
        assert_eq!(value[[1, 0]], 3.0);
    }

    #[test]
    fn test_initial_value_broadcast_error() {
        let mesh = grid();
        let err = Field::new(mesh, FieldSpec::cell("v").rank(1), vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, FvError::Broadcast { .. }));
    }

    #[test]
    fn test_cell_face_mix_is_broadcast_error() {
        let mesh = grid();
        let c = Field::scalar_cell(mesh.clone(), "c", 1.0).unwrap();
        let f = Field::new(mesh, FieldSpec::face("f"), 1.0).unwrap();
        assert!(matches!(c.try_add(&f), Err(FvError::Broadcast { .. })));
    }

    #[test]
    fn test_set_value_invalidates_chain() {
        let mesh = grid();
        let a = Field::scalar_cell(mesh.clone(), "a", 1.0).unwrap();
        let b = a.try_mul(2.0).unwrap().try_add(1.0).unwrap();
        assert_eq!(b.values().unwrap()[0], 3.0);
        a.set_value(5.0, None).unwrap();
        assert_eq!(b.values().unwrap()[0], 11.0);
    }

    #[test]
    fn test_uncached_field_recomputes() {
        let mesh = grid();
        let a = Field::new(mesh, FieldSpec::cell("a").cached(false), 1.0).unwrap();
        let b = a.negate();
        assert!(!b.is_cached());
        assert_eq!(b.values().unwrap()[2], -1.0);
        a.set_value(4.0, None).unwrap();
        assert_eq!(b.values().unwrap()[2], -4.0);
    }

    #[test]
    fn test_set_value_mask_over_element_axes() {
        let mesh = grid();
        let v = Field::new(mesh, FieldSpec::cell("v").rank(1), 0.0).unwrap();
        let mask = [true, false, false, false, false, true];
        v.set_value(vec![7.0, 8.0], Some(&mask)).unwrap();
        let value = v.value().unwrap();
        assert_eq!(value[[0, 0]], 7.0);
        assert_eq!(value[[1, 0]], 8.0);
        assert_eq!(value[[0, 1]], 0.0);
        assert_eq!(value[[1, 5]], 8.0);
    }

    #[test]
    fn test_set_value_on_derived_rejected() {
        let mesh = grid();
        let a = Field::scalar_cell(mesh, "a", 1.0).unwrap();
        assert!(a.negate().set_value(1.0, None).is_err());
    }

    #[test]
    fn test_rdot_reverses_operands() {
        let mesh = grid();
        let t = Field::new(
            mesh,
            FieldSpec::cell("t").rank(2),
            array![[2.0, 3.0], [4.0, 5.0]],
        )
        .unwrap();
        // [2,3]·t = [2*2+3*4, 2*3+3*5]
        let r = t.rdot(vec![2.0, 3.0]).unwrap().value().unwrap();
        assert_eq!(r.shape(), &[2, 6]);
        assert_eq!(r[[0, 0]], 16.0);
        assert_eq!(r[[1, 0]], 21.0);
    }

    #[test]
    fn test_grad_of_linear_field() {
        let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::new(5, 0.2).unwrap());
        let x: Vec<f64> = (0..5).map(|c| mesh.cell(c).center[0]).collect();
        let phi = Field::scalar_cell(mesh, "phi", x).unwrap();
        let g = phi.grad().unwrap().value().unwrap();
        // 内部单元精确
        for c in 1..4 {
            assert!((g[[0, c]] - 1.0).abs() < 1e-12);
        }
        let fg = phi.face_grad().unwrap().value().unwrap();
        assert!((fg[[0, 2]] - 1.0).abs() < 1e-12);
        assert_eq!(fg[[0, 0]], 0.0);
    }

    #[test]
    fn test_divergence_of_uniform_flow() {
        let mesh = grid();
        let u = Field::new(mesh, FieldSpec::face("u").rank(1), vec![1.0, 0.5]).unwrap();
        let div = u.divergence().unwrap().values().unwrap();
        for d in div {
            assert!(d.abs() < 1e-12);
        }
    }

    #[test]
    fn test_old_value_tracking() {
        let mesh = grid();
        let phi = Field::scalar_cell(mesh, "phi", 1.0).unwrap().with_old().unwrap();
        phi.set_value(2.0, None).unwrap();
        let old = phi.old().unwrap();
        assert_eq!(old.values().unwrap()[0], 1.0);
        phi.update_old().unwrap();
        assert_eq!(old.values().unwrap()[0], 2.0);
    }

    #[test]
    fn test_state_round_trip() {
        let mesh = grid();
        let v = Field::new(
            mesh.clone(),
            FieldSpec::cell("velocity").rank(1).unit("m/s"),
            vec![1.0, 2.0],
        )
        .unwrap();
        let state = v.to_state().unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: FieldState = serde_json::from_str(&json).unwrap();
        let restored = Field::from_state(mesh, back).unwrap();
        assert_eq!(restored.name(), "velocity");
        assert_eq!(restored.unit(), Some("m/s"));
        assert_eq!(restored.value().unwrap(), v.value().unwrap());
    }

    #[test]
    fn test_global_value_single_process() {
        let mesh = grid();
        let phi = Field::scalar_cell(mesh, "phi", 3.0).unwrap();
        let g = phi.global_value(&[0, 1], &[4, 5], &DummyComm::new()).unwrap();
        assert_eq!(g.shape(), &[6]);
    }

    #[test]
    fn test_global_value_two_partitions() {
        let results = LocalComm::run(2, Duration::from_secs(5), |comm| {
            // 每个分区一个 3 单元网格，各自拥有前两个单元
            let mesh: Arc<dyn Mesh> = Arc::new(Grid1D::new(3, 1.0)?);
            let rank = comm.process_id();
            let values: Vec<f64> = (0..3).map(|c| (10 * rank + c) as f64).collect();
            let phi = Field::scalar_cell(mesh, "phi", values)?;
            let global_ids = if rank == 0 { vec![0, 1] } else { vec![2, 3] };
            phi.global_value(&[0, 1], &global_ids, comm)
        });
        for r in results {
            let g = r.unwrap();
            assert_eq!(g.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 10.0, 11.0]);
        }
    }
}

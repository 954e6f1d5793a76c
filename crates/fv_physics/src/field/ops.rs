// crates/fv_physics/src/field/ops.rs

//! 场表达式节点与数组内核
//!
//! 派生场持有一个 [`FieldOp`]：操作种类加上操作数场的引用。
//! 求值时先取操作数的值，再调用这里的纯函数内核。
//! 所有数组的最后一个轴都是网格轴。

use super::Field;
use fv_foundation::{FvError, FvResult};
use fv_mesh::Mesh;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

/// 逐元素二元运算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    /// 加
    Add,
    /// 减
    Sub,
    /// 乘
    Mul,
    /// 除
    Div,
}

impl BinaryKind {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    #[inline]
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
        }
    }
}

/// 表达式节点
#[derive(Debug, Clone)]
pub(crate) enum FieldOp {
    Binary {
        kind: BinaryKind,
        lhs: Field,
        rhs: Field,
    },
    Neg(Field),
    Dot {
        lhs: Field,
        rhs: Field,
    },
    /// 单元值到面值的距离加权插值
    FaceValue(Field),
    /// 面法向梯度（向量）
    FaceGrad(Field),
    /// Green-Gauss 单元梯度
    Grad(Field),
    /// 面向量场的单元散度
    Divergence(Field),
}

impl FieldOp {
    pub(crate) fn operands(&self) -> Vec<&Field> {
        match self {
            Self::Binary { lhs, rhs, .. } | Self::Dot { lhs, rhs } => vec![lhs, rhs],
            Self::Neg(a)
            | Self::FaceValue(a)
            | Self::FaceGrad(a)
            | Self::Grad(a)
            | Self::Divergence(a) => vec![a],
        }
    }

    pub(crate) fn evaluate(&self, mesh: &dyn Mesh) -> FvResult<ArrayD<f64>> {
        match self {
            Self::Binary { kind, lhs, rhs } => {
                let k = *kind;
                binary(&lhs.value()?, &rhs.value()?, k.symbol(), |a, b| {
                    k.apply(a, b)
                })
            }
            Self::Neg(a) => Ok(a.value()?.mapv(|x| -x)),
            Self::Dot { lhs, rhs } => dot(&lhs.value()?, &rhs.value()?),
            Self::FaceValue(a) => face_value(&a.value()?, mesh),
            Self::FaceGrad(a) => face_grad(&a.value()?, mesh),
            Self::Grad(a) => grad(&a.value()?, mesh),
            Self::Divergence(a) => divergence(&a.value()?, mesh),
        }
    }
}

// ============================================================================
// 形状推断
// ============================================================================

/// 按右对齐规则求两个形状的广播结果
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let n = a.len().max(b.len());
    let mut out = vec![0; n];
    for i in 0..n {
        let da = if i + a.len() >= n { a[i + a.len() - n] } else { 1 };
        let db = if i + b.len() >= n { b[i + b.len() - n] } else { 1 };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// 点积结果形状
///
/// 任一操作数为标量（只有网格轴）时退化为逐元素乘；否则收缩
/// 左操作数的最后一个元素轴与右操作数的第一个元素轴。
pub fn dot_shape(a: &[usize], b: &[usize]) -> FvResult<Vec<usize>> {
    let (rank_a, rank_b) = (a.len().saturating_sub(1), b.len().saturating_sub(1));
    if a.is_empty() || b.is_empty() {
        return Err(FvError::broadcast("dot", a, b));
    }
    if rank_a == 0 || rank_b == 0 {
        return broadcast_shape(a, b).ok_or_else(|| FvError::broadcast("dot", a, b));
    }
    let expanded = expand_for_dot(a, rank_b);
    let mut full =
        broadcast_shape(&expanded, b).ok_or_else(|| FvError::broadcast("dot", a, b))?;
    full.remove(rank_a - 1);
    Ok(full)
}

/// 在网格轴前插入 `rank_b - 1` 个单位轴
fn expand_for_dot(a: &[usize], rank_b: usize) -> Vec<usize> {
    let mut s = a[..a.len() - 1].to_vec();
    s.extend(std::iter::repeat(1).take(rank_b - 1));
    s.push(a[a.len() - 1]);
    s
}

// ============================================================================
// 数组内核
// ============================================================================

fn binary_views(
    a: ArrayViewD<'_, f64>,
    b: ArrayViewD<'_, f64>,
    operation: &'static str,
    f: impl Fn(f64, f64) -> f64,
) -> FvResult<ArrayD<f64>> {
    let shape = broadcast_shape(a.shape(), b.shape())
        .ok_or_else(|| FvError::broadcast(operation, a.shape(), b.shape()))?;
    let av = a
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| FvError::broadcast(operation, a.shape(), &shape))?;
    let bv = b
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| FvError::broadcast(operation, b.shape(), &shape))?;
    Ok(Zip::from(&av).and(&bv).map_collect(|&x, &y| f(x, y)))
}

/// 广播后的逐元素二元运算
pub fn binary(
    a: &ArrayD<f64>,
    b: &ArrayD<f64>,
    operation: &'static str,
    f: impl Fn(f64, f64) -> f64,
) -> FvResult<ArrayD<f64>> {
    binary_views(a.view(), b.view(), operation, f)
}

/// 元素轴收缩
pub fn dot(a: &ArrayD<f64>, b: &ArrayD<f64>) -> FvResult<ArrayD<f64>> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return Err(FvError::broadcast("dot", a.shape(), b.shape()));
    }
    let (rank_a, rank_b) = (a.ndim() - 1, b.ndim() - 1);
    if rank_a == 0 || rank_b == 0 {
        return binary(a, b, "dot", |x, y| x * y);
    }
    let mut av = a.view();
    for _ in 0..rank_b - 1 {
        let mesh_axis = av.ndim() - 1;
        av = av.insert_axis(Axis(mesh_axis));
    }
    let product = binary_views(av, b.view(), "dot", |x, y| x * y)?;
    Ok(product.sum_axis(Axis(rank_a - 1)))
}

/// 拆出网格轴：返回 (元素形状, 元素数, 网格长度, 行主序数据)
fn split_mesh_axis(a: &ArrayD<f64>) -> (Vec<usize>, usize, usize, Vec<f64>) {
    let shape = a.shape();
    let n = shape.last().copied().unwrap_or(1);
    let elem = shape[..shape.len().saturating_sub(1)].to_vec();
    let m = elem.iter().product();
    (elem, m, n, a.iter().copied().collect())
}

fn assemble(elem: &[usize], n: usize, data: Vec<f64>) -> FvResult<ArrayD<f64>> {
    let mut shape = elem.to_vec();
    shape.push(n);
    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| FvError::invalid_input(format!("重建数组失败: {}", e)))
}

fn check_mesh_len(name: &'static str, expected: usize, actual: usize) -> FvResult<()> {
    FvError::check_size(name, expected, actual)
}

/// 面插值权重：cell1 所占份额
pub(crate) fn interpolation_weight(mesh: &dyn Mesh, face: usize) -> f64 {
    let f = mesh.face(face);
    match f.cell2 {
        None => 1.0,
        Some(c2) => {
            let d1 = distance(&mesh.cell(f.cell1).center, &f.center);
            let d2 = distance(&mesh.cell(c2).center, &f.center);
            if d1 + d2 > 0.0 {
                d2 / (d1 + d2)
            } else {
                0.5
            }
        }
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// 单元值插值到面，边界面取相邻单元值
fn face_value(a: &ArrayD<f64>, mesh: &dyn Mesh) -> FvResult<ArrayD<f64>> {
    let (elem, m, n, data) = split_mesh_axis(a);
    check_mesh_len("单元场网格轴", mesh.n_cells(), n)?;
    let nf = mesh.n_faces();
    let mut out = vec![0.0; m * nf];
    for face in 0..nf {
        let (c1, c2) = mesh.face_cells(face);
        let w = interpolation_weight(mesh, face);
        for k in 0..m {
            let v1 = data[k * n + c1];
            out[k * nf + face] = match c2 {
                Some(c2) => w * v1 + (1.0 - w) * data[k * n + c2],
                None => v1,
            };
        }
    }
    assemble(&elem, nf, out)
}

fn check_scalar(a: &ArrayD<f64>, operation: &str) -> FvResult<()> {
    if a.ndim() != 1 {
        return Err(FvError::shape_mismatch(format!(
            "{} 只接受标量场, 实际形状 {:?}",
            operation,
            a.shape()
        )));
    }
    Ok(())
}

/// 面法向梯度，边界面为零
fn face_grad(a: &ArrayD<f64>, mesh: &dyn Mesh) -> FvResult<ArrayD<f64>> {
    check_scalar(a, "faceGrad")?;
    let (_, _, n, data) = split_mesh_axis(a);
    check_mesh_len("单元场网格轴", mesh.n_cells(), n)?;
    let dim = mesh.dimension();
    let nf = mesh.n_faces();
    let mut out = vec![0.0; dim * nf];
    for face in 0..nf {
        let (c1, c2) = mesh.face_cells(face);
        let Some(c2) = c2 else { continue };
        let d = mesh.cell_distance(face);
        FvError::check_geometry(face, "中心距", d)?;
        let g = (data[c2] - data[c1]) / d;
        let normal = mesh.face_normal(face);
        for (axis, nd) in normal.iter().take(dim).enumerate() {
            out[axis * nf + face] = g * nd;
        }
    }
    assemble(&[dim], nf, out)
}

/// Green-Gauss 梯度
fn grad(a: &ArrayD<f64>, mesh: &dyn Mesh) -> FvResult<ArrayD<f64>> {
    check_scalar(a, "grad")?;
    let faces = face_value(a, mesh)?;
    let dim = mesh.dimension();
    let nc = mesh.n_cells();
    let mut out = vec![0.0; dim * nc];
    for (face, phi) in faces.iter().enumerate() {
        let (c1, c2) = mesh.face_cells(face);
        let area = mesh.face_area(face);
        let normal = mesh.face_normal(face);
        for (axis, nd) in normal.iter().take(dim).enumerate() {
            let flux = phi * nd * area;
            out[axis * nc + c1] += flux;
            if let Some(c2) = c2 {
                out[axis * nc + c2] -= flux;
            }
        }
    }
    divide_by_volume(&mut out, dim, mesh)?;
    assemble(&[dim], nc, out)
}

/// 面向量场的散度
fn divergence(a: &ArrayD<f64>, mesh: &dyn Mesh) -> FvResult<ArrayD<f64>> {
    let dim = mesh.dimension();
    if a.ndim() != 2 || a.shape()[0] != dim {
        return Err(FvError::shape_mismatch(format!(
            "divergence 需要形状 [{}, n_faces] 的面向量场, 实际 {:?}",
            dim,
            a.shape()
        )));
    }
    let (_, _, n, data) = split_mesh_axis(a);
    check_mesh_len("面场网格轴", mesh.n_faces(), n)?;
    let nc = mesh.n_cells();
    let mut out = vec![0.0; nc];
    for face in 0..n {
        let (c1, c2) = mesh.face_cells(face);
        let normal = mesh.face_normal(face);
        let flux: f64 = (0..dim).map(|d| data[d * n + face] * normal[d]).sum::<f64>()
            * mesh.face_area(face);
        out[c1] += flux;
        if let Some(c2) = c2 {
            out[c2] -= flux;
        }
    }
    divide_by_volume(&mut out, 1, mesh)?;
    assemble(&[], nc, out)
}

fn divide_by_volume(out: &mut [f64], m: usize, mesh: &dyn Mesh) -> FvResult<()> {
    let nc = mesh.n_cells();
    for cell in 0..nc {
        let v = mesh.cell_volume(cell);
        if !(v.is_finite() && v > 0.0) {
            return Err(FvError::degenerate_geometry(cell, "单元体积", v));
        }
        for k in 0..m {
            out[k * nc + cell] /= v;
        }
    }
    Ok(())
}

// crates/fv_physics/src/linear_algebra/preconditioner.rs

//! 预条件器
//!
//! 核心操作 `apply`: z = M⁻¹ r。

use super::csr::CsrMatrix;

/// 预条件器 trait
pub trait Preconditioner: Send + Sync {
    /// z = M⁻¹ r
    fn apply(&self, r: &[f64], z: &mut [f64]);

    /// 名称
    fn name(&self) -> &'static str;
}

/// 恒等预条件器
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

/// Jacobi（对角）预条件器
///
/// 对角元绝对值低于阈值的行退化为恒等。
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<f64>,
}

impl JacobiPreconditioner {
    const THRESHOLD: f64 = 1e-14;

    /// 由矩阵对角线构造
    pub fn from_matrix(matrix: &CsrMatrix) -> Self {
        let inv_diag = matrix
            .extract_diagonal()
            .into_iter()
            .map(|d| if d.abs() > Self::THRESHOLD { 1.0 / d } else { 1.0 })
            .collect();
        Self { inv_diag }
    }
}

impl Preconditioner for JacobiPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        for ((zi, ri), di) in z.iter_mut().zip(r).zip(&self.inv_diag) {
            *zi = ri * di;
        }
    }

    fn name(&self) -> &'static str {
        "Jacobi"
    }
}

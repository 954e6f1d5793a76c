// crates/fv_physics/src/linear_algebra/csr.rs

//! 压缩稀疏行（CSR）矩阵
//!
//! 组装器先把各离散项的贡献累加进 [`CsrBuilder`]（每行一个有序映射），
//! 组装结束后一次性压缩成 [`CsrMatrix`]。行对应单元，列对应被耦合的单元。
//!
//! # 特性开关
//!
//! - `parallel`: 启用基于 `rayon` 的并行矩阵-向量乘法
//!
//! # 使用示例
//!
//! ```ignore
//! use fv_physics::linear_algebra::CsrBuilder;
//!
//! let mut builder = CsrBuilder::new_square(3);
//! builder.add(0, 0, -2.0);
//! builder.add(0, 1, 1.0);
//! let matrix = builder.build();
//! assert_eq!(matrix.get(0, 1), 1.0);
//! ```

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// =============================================================================
// 稀疏模式
// =============================================================================

/// CSR 稀疏模式
///
/// 只保存非零元位置，同一行的列索引升序排列。
#[derive(Debug, Clone, PartialEq)]
pub struct CsrPattern {
    n_rows: usize,
    n_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
}

impl CsrPattern {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// 第 `row` 行的列索引
    #[inline]
    pub fn row_indices(&self, row: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[row]..self.row_ptr[row + 1]]
    }

    /// 查找 (row, col) 对应的值索引
    pub fn find_index(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.row_indices(row)
            .binary_search(&col)
            .ok()
            .map(|local| start + local)
    }

    /// (row, col) 是否存在非零元
    pub fn has_entry(&self, row: usize, col: usize) -> bool {
        self.find_index(row, col).is_some()
    }

    /// 稀疏模式是否对称
    pub fn is_symmetric(&self) -> bool {
        (0..self.n_rows).all(|row| {
            self.row_indices(row)
                .iter()
                .all(|&col| col < self.n_rows && self.has_entry(col, row))
        })
    }
}

// =============================================================================
// CSR 矩阵
// =============================================================================

/// CSR 格式稀疏矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pattern: CsrPattern,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// 行数
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.pattern.n_rows
    }

    /// 列数
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.pattern.n_cols
    }

    /// 非零元数量
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 稀疏模式
    #[inline]
    pub fn pattern(&self) -> &CsrPattern {
        &self.pattern
    }

    /// 非零元值
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// (row, col) 的值，不存在返回 0
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.pattern
            .find_index(row, col)
            .map_or(0.0, |idx| self.values[idx])
    }

    /// 第 `row` 行的 `(列, 值)`
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.pattern.row_ptr[row];
        let end = self.pattern.row_ptr[row + 1];
        (start..end).map(move |idx| (self.pattern.col_idx[idx], self.values[idx]))
    }

    /// 对角元，不存在返回 None
    pub fn diagonal_value(&self, row: usize) -> Option<f64> {
        self.pattern
            .find_index(row, row)
            .map(|idx| self.values[idx])
    }

    /// 提取对角线，缺失对角元记为 0
    pub fn extract_diagonal(&self) -> Vec<f64> {
        (0..self.n_rows())
            .map(|i| self.diagonal_value(i).unwrap_or(0.0))
            .collect()
    }

    /// 每行元素和
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_rows())
            .map(|row| self.row(row).map(|(_, v)| v).sum())
            .collect()
    }

    /// 第 `row` 行每个元素乘以 `factors[row]`
    pub fn scale_rows(&mut self, factors: &[f64]) {
        debug_assert_eq!(factors.len(), self.n_rows());
        for (row, &factor) in factors.iter().enumerate() {
            let start = self.pattern.row_ptr[row];
            let end = self.pattern.row_ptr[row + 1];
            for v in &mut self.values[start..end] {
                *v *= factor;
            }
        }
    }

    /// 数值是否对称（容差 `tol`）
    pub fn is_symmetric(&self, tol: f64) -> bool {
        (0..self.n_rows()).all(|row| {
            self.row(row)
                .all(|(col, v)| (v - self.get(col, row)).abs() <= tol)
        })
    }

    /// 转为稠密行主序矩阵
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.n_cols()]; self.n_rows()];
        for (row, dense_row) in dense.iter_mut().enumerate() {
            for (col, v) in self.row(row) {
                dense_row[col] = v;
            }
        }
        dense
    }

    /// 矩阵-向量乘法 y = A * x
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_cols(), "x 长度必须等于矩阵列数");
        debug_assert_eq!(y.len(), self.n_rows(), "y 长度必须等于矩阵行数");

        #[cfg(feature = "parallel")]
        if self.n_rows() > 1000 {
            self.mul_vec_parallel(x, y);
            return;
        }

        for (row, out) in y.iter_mut().enumerate() {
            *out = self.row(row).map(|(col, v)| v * x[col]).sum();
        }
    }

    /// 并行矩阵-向量乘法
    #[cfg(feature = "parallel")]
    pub fn mul_vec_parallel(&self, x: &[f64], y: &mut [f64]) {
        y.par_iter_mut().enumerate().for_each(|(row, out)| {
            *out = self.row(row).map(|(col, v)| v * x[col]).sum();
        });
    }
}

// =============================================================================
// 构建器
// =============================================================================

/// CSR 矩阵构建器
///
/// 重复位置的贡献累加，适合逐面组装。
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<BTreeMap<usize, f64>>,
}

impl CsrBuilder {
    /// 方阵构建器
    #[inline]
    pub fn new_square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// 构建器
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: vec![BTreeMap::new(); n_rows],
        }
    }

    /// 行数
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// 覆盖 (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows && col < self.n_cols, "索引越界");
        self.rows[row].insert(col, value);
    }

    /// 累加到 (row, col)
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows && col < self.n_cols, "索引越界");
        *self.rows[row].entry(col).or_insert(0.0) += value;
    }

    /// 当前值（不存在返回 0）
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row].get(&col).copied().unwrap_or(0.0)
    }

    /// 非零元总数
    #[inline]
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// 压缩为 CSR 矩阵
    pub fn build(self) -> CsrMatrix {
        let nnz = self.nnz();
        let mut row_ptr = Vec::with_capacity(self.n_rows + 1);
        let mut col_idx = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);

        row_ptr.push(0);
        for row_map in self.rows {
            for (col, val) in row_map {
                col_idx.push(col);
                values.push(val);
            }
            row_ptr.push(col_idx.len());
        }

        CsrMatrix {
            pattern: CsrPattern {
                n_rows: self.n_rows,
                n_cols: self.n_cols,
                row_ptr,
                col_idx,
            },
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> CsrMatrix {
        let mut b = CsrBuilder::new_square(n);
        for i in 0..n {
            b.add(i, i, -2.0);
            if i > 0 {
                b.add(i, i - 1, 1.0);
            }
            if i + 1 < n {
                b.add(i, i + 1, 1.0);
            }
        }
        b.build()
    }

    #[test]
    fn test_builder_accumulates() {
        let mut b = CsrBuilder::new_square(2);
        b.add(0, 0, 1.0);
        b.add(0, 0, 2.5);
        b.set(1, 1, 4.0);
        assert_eq!(b.get(0, 0), 3.5);
        let m = b.build();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 0), 3.5);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn test_mul_vec() {
        let m = tridiagonal(4);
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let mut y = vec![0.0; 4];
        m.mul_vec(&x, &mut y);
        assert_eq!(y, vec![0.0, 0.0, 0.0, -5.0]);
    }

    #[test]
    fn test_symmetry_and_row_sums() {
        let m = tridiagonal(5);
        assert!(m.pattern().is_symmetric());
        assert!(m.is_symmetric(1e-14));
        let sums = m.row_sums();
        assert_eq!(sums[0], -1.0);
        assert_eq!(sums[2], 0.0);
    }

    #[test]
    fn test_scale_rows_and_dense() {
        let mut m = tridiagonal(3);
        m.scale_rows(&[1.0, 2.0, 3.0]);
        let d = m.to_dense();
        assert_eq!(d[1], vec![2.0, -4.0, 2.0]);
        assert_eq!(m.extract_diagonal(), vec![-2.0, -4.0, -6.0]);
    }
}

// crates/fv_comm/src/backend.rs

//! 集合通信接口

use fv_foundation::FvResult;
use std::fmt;

/// 集合通信后端
///
/// 实现必须保证：一个 rank 的失败会传播到所有参与者，不会让其他 rank 无限阻塞。
pub trait CommBackend: Send + Sync + fmt::Debug {
    /// 进程总数
    fn num_processes(&self) -> usize;

    /// 当前进程号
    fn process_id(&self) -> usize;

    /// 收集每个 rank 的本地数组，按 rank 顺序返回
    fn all_gather(&self, local: &[f64]) -> FvResult<Vec<Vec<f64>>>;

    /// 收集每个 rank 的索引数组
    fn all_gather_indices(&self, local: &[usize]) -> FvResult<Vec<Vec<usize>>> {
        let as_f64: Vec<f64> = local.iter().map(|&i| i as f64).collect();
        let gathered = self.all_gather(&as_f64)?;
        Ok(gathered
            .into_iter()
            .map(|v| v.into_iter().map(|x| x as usize).collect())
            .collect())
    }

    /// 同步点
    fn barrier(&self) -> FvResult<()> {
        self.all_gather(&[]).map(|_| ())
    }

    /// 收集并按 rank 顺序拼接
    fn all_gather_concat(&self, local: &[f64]) -> FvResult<Vec<f64>> {
        Ok(self.all_gather(local)?.concat())
    }

    /// 是否为多进程
    fn is_parallel(&self) -> bool {
        self.num_processes() > 1
    }

    /// 中止整个通信组，正在等待的 rank 立即失败
    ///
    /// 单进程后端没有可唤醒的对端，缺省什么也不做。
    fn abort(&self, _reason: &str) {}
}

/// 单进程后端
///
/// `num_processes() == 1`，收集操作原样返回本地数据。
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyComm;

impl DummyComm {
    /// 创建单进程后端
    pub fn new() -> Self {
        Self
    }
}

impl CommBackend for DummyComm {
    fn num_processes(&self) -> usize {
        1
    }

    fn process_id(&self) -> usize {
        0
    }

    fn all_gather(&self, local: &[f64]) -> FvResult<Vec<Vec<f64>>> {
        Ok(vec![local.to_vec()])
    }

    fn all_gather_indices(&self, local: &[usize]) -> FvResult<Vec<Vec<usize>>> {
        Ok(vec![local.to_vec()])
    }

    fn barrier(&self) -> FvResult<()> {
        Ok(())
    }
}

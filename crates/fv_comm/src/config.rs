// crates/fv_comm/src/config.rs

//! 并行后端配置
//!
//! 后端在启动时由配置显式指定；请求的后端不可用是启动错误，不会静默回退到单进程。

use crate::backend::{CommBackend, DummyComm};
use crate::local::LocalComm;
use fv_foundation::{FvError, FvResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 后端种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// 单进程
    #[default]
    Single,
    /// 进程内多线程 SPMD 组
    Local,
    /// MPI 分布式
    Mpi,
}

/// 并行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// 后端
    #[serde(default)]
    pub backend: BackendKind,
    /// 进程数（仅 `local` 使用）
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// 集合通信超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_processes() -> usize {
    1
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Single,
            processes: default_processes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ParallelConfig {
    /// 进程内多线程配置
    pub fn local(processes: usize) -> Self {
        Self {
            backend: BackendKind::Local,
            processes,
            ..Default::default()
        }
    }

    /// 集合通信超时
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 启动前检查配置
    pub fn validate(&self) -> FvResult<()> {
        match self.backend {
            BackendKind::Single => Ok(()),
            BackendKind::Local => {
                if self.processes == 0 {
                    return Err(FvError::communication_config("local 后端的 processes 必须 >= 1"));
                }
                if self.timeout_ms == 0 {
                    return Err(FvError::communication_config("timeout_ms 必须 > 0"));
                }
                Ok(())
            }
            BackendKind::Mpi => Err(FvError::communication_config(
                "请求了 mpi 后端, 但当前构建未包含分布式通信库",
            )),
        }
    }
}

/// 按配置创建各 rank 的通信后端
pub fn create_backends(config: &ParallelConfig) -> FvResult<Vec<Arc<dyn CommBackend>>> {
    config.validate()?;
    let backends: Vec<Arc<dyn CommBackend>> = match config.backend {
        BackendKind::Single => vec![Arc::new(DummyComm::new())],
        BackendKind::Local => LocalComm::group(config.processes, config.timeout())?
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn CommBackend>)
            .collect(),
        BackendKind::Mpi => {
            return Err(FvError::communication_config("mpi 后端不可用"));
        }
    };
    log::debug!("并行后端 {:?}: {} 个 rank", config.backend, backends.len());
    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_single() {
        let backends = create_backends(&ParallelConfig::default()).unwrap();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].num_processes(), 1);
    }

    #[test]
    fn test_local_group() {
        let backends = create_backends(&ParallelConfig::local(3)).unwrap();
        assert_eq!(backends.len(), 3);
        for (rank, b) in backends.iter().enumerate() {
            assert_eq!(b.process_id(), rank);
            assert_eq!(b.num_processes(), 3);
        }
    }

    #[test]
    fn test_mpi_is_startup_error() {
        let config = ParallelConfig {
            backend: BackendKind::Mpi,
            ..Default::default()
        };
        assert!(matches!(
            create_backends(&config),
            Err(FvError::CommunicationConfig { .. })
        ));
    }

    #[test]
    fn test_serde_defaults() {
        let config: ParallelConfig = serde_json::from_str(r#"{"backend": "local"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.processes, 1);
        assert_eq!(config.timeout_ms, 30_000);
    }
}

// crates/fv_comm/src/local.rs

//! 进程内 SPMD 通信组
//!
//! `LocalComm::group(n, timeout)` 创建共享同一会合点的 `n` 个 rank，
//! 每个 rank 在自己的线程中运行。集合操作按各 rank 的调用序号配对：
//! 第 k 次调用只与其他 rank 的第 k 次调用会合。
//!
//! # 失败传播
//!
//! - 同一序号上调用了不同种类的集合操作：整个组中止
//! - 等待超过 `timeout`：整个组中止
//! - 任一 rank 调用 [`LocalComm::abort`]：整个组中止
//!
//! 中止后，所有正在等待和之后发起的集合操作都返回 `FvError::Communication`。
//!
//! # 使用示例
//!
//! ```
//! use fv_comm::{CommBackend, LocalComm};
//! use std::time::Duration;
//!
//! let results = LocalComm::run(3, Duration::from_secs(5), |comm| {
//!     let local = [comm.process_id() as f64];
//!     comm.all_gather_concat(&local)
//! });
//! for r in results {
//!     assert_eq!(r.unwrap(), vec![0.0, 1.0, 2.0]);
//! }
//! ```

use crate::backend::CommBackend;
use fv_foundation::{FvError, FvResult};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 集合操作种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collective {
    Gather,
    GatherIndices,
    Barrier,
}

impl Collective {
    fn name(self) -> &'static str {
        match self {
            Self::Gather => "all_gather",
            Self::GatherIndices => "all_gather_indices",
            Self::Barrier => "barrier",
        }
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Values(Vec<f64>),
    Indices(Vec<usize>),
    Empty,
}

/// 一次集合操作的会合状态
#[derive(Debug)]
struct Round {
    kind: Collective,
    slots: Vec<Option<Payload>>,
    arrived: usize,
    departed: usize,
}

impl Round {
    fn new(kind: Collective, size: usize) -> Self {
        Self {
            kind,
            slots: vec![None; size],
            arrived: 0,
            departed: 0,
        }
    }
}

#[derive(Debug, Default)]
struct GroupState {
    rounds: BTreeMap<u64, Round>,
    aborted: Option<String>,
}

/// 组内共享的会合点
#[derive(Debug)]
struct Rendezvous {
    size: usize,
    timeout: Duration,
    state: Mutex<GroupState>,
    cond: Condvar,
}

impl Rendezvous {
    fn abort(&self, state: &mut GroupState, reason: String) {
        if state.aborted.is_none() {
            log::warn!("通信组中止: {}", reason);
            state.aborted = Some(reason);
        }
        self.cond.notify_all();
    }
}

/// 进程内 SPMD 通信后端
pub struct LocalComm {
    rank: usize,
    seq: AtomicU64,
    shared: Arc<Rendezvous>,
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl LocalComm {
    /// 创建 `size` 个共享会合点的通信端，下标即 rank
    pub fn group(size: usize, timeout: Duration) -> FvResult<Vec<LocalComm>> {
        if size == 0 {
            return Err(FvError::communication_config("通信组至少需要一个 rank"));
        }
        let shared = Arc::new(Rendezvous {
            size,
            timeout,
            state: Mutex::new(GroupState::default()),
            cond: Condvar::new(),
        });
        log::debug!("创建进程内通信组: {} 个 rank, 超时 {:?}", size, timeout);
        Ok((0..size)
            .map(|rank| LocalComm {
                rank,
                seq: AtomicU64::new(0),
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    /// 在 `size` 个线程上以 SPMD 方式运行 `f`，按 rank 顺序返回结果
    pub fn run<T, F>(size: usize, timeout: Duration, f: F) -> Vec<FvResult<T>>
    where
        T: Send,
        F: Fn(&LocalComm) -> FvResult<T> + Sync,
    {
        let comms = match Self::group(size, timeout) {
            Ok(c) => c,
            Err(e) => return vec![Err(e)],
        };
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let result = f(comm);
                        if let Err(e) = &result {
                            if !matches!(e, FvError::Communication { .. }) {
                                comm.abort(format!("rank {} 失败: {}", comm.rank, e));
                            }
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(FvError::communication(rank, "rank 线程异常退出"))
                    })
                })
                .collect()
        })
    }

    /// 中止整个通信组，唤醒所有等待者
    pub fn abort(&self, reason: impl Into<String>) {
        let mut state = self.shared.state.lock();
        self.shared.abort(&mut state, reason.into());
    }

    /// 组是否已中止
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().aborted.is_some()
    }

    fn collective(&self, kind: Collective, payload: Payload) -> FvResult<Vec<Payload>> {
        let shared = &*self.shared;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + shared.timeout;
        let mut state = shared.state.lock();

        if let Some(reason) = &state.aborted {
            return Err(FvError::communication(self.rank, reason.clone()));
        }

        let round = state
            .rounds
            .entry(seq)
            .or_insert_with(|| Round::new(kind, shared.size));
        if round.kind != kind {
            let reason = format!(
                "集合操作不匹配: 第 {} 次调用, rank {} 调用 {}, 其他 rank 调用 {}",
                seq,
                self.rank,
                kind.name(),
                round.kind.name()
            );
            shared.abort(&mut state, reason.clone());
            return Err(FvError::communication(self.rank, reason));
        }
        round.slots[self.rank] = Some(payload);
        round.arrived += 1;
        if round.arrived == shared.size {
            shared.cond.notify_all();
        }

        loop {
            if let Some(round) = state.rounds.get_mut(&seq) {
                if round.arrived == shared.size {
                    let gathered: Vec<Payload> = round
                        .slots
                        .iter()
                        .map(|s| s.clone().unwrap_or(Payload::Empty))
                        .collect();
                    round.departed += 1;
                    if round.departed == shared.size {
                        state.rounds.remove(&seq);
                    }
                    return Ok(gathered);
                }
            }
            if let Some(reason) = &state.aborted {
                return Err(FvError::communication(self.rank, reason.clone()));
            }
            if shared.cond.wait_until(&mut state, deadline).timed_out() {
                let reason = format!(
                    "{} 等待超时 ({:?}), 第 {} 次调用, rank {}",
                    kind.name(),
                    shared.timeout,
                    seq,
                    self.rank
                );
                shared.abort(&mut state, reason.clone());
                return Err(FvError::communication(self.rank, reason));
            }
        }
    }
}

impl CommBackend for LocalComm {
    fn num_processes(&self) -> usize {
        self.shared.size
    }

    fn process_id(&self) -> usize {
        self.rank
    }

    fn all_gather(&self, local: &[f64]) -> FvResult<Vec<Vec<f64>>> {
        let gathered = self.collective(Collective::Gather, Payload::Values(local.to_vec()))?;
        Ok(gathered
            .into_iter()
            .map(|p| match p {
                Payload::Values(v) => v,
                _ => Vec::new(),
            })
            .collect())
    }

    fn all_gather_indices(&self, local: &[usize]) -> FvResult<Vec<Vec<usize>>> {
        let gathered =
            self.collective(Collective::GatherIndices, Payload::Indices(local.to_vec()))?;
        Ok(gathered
            .into_iter()
            .map(|p| match p {
                Payload::Indices(v) => v,
                _ => Vec::new(),
            })
            .collect())
    }

    fn barrier(&self) -> FvResult<()> {
        self.collective(Collective::Barrier, Payload::Empty)
            .map(|_| ())
    }

    fn abort(&self, reason: &str) {
        let mut state = self.shared.state.lock();
        self.shared.abort(&mut state, reason.to_string());
    }
}

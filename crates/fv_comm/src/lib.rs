// crates/fv_comm/src/lib.rs

//! FvTerm 通信层
//!
//! 每个网格分区对应一个进程（rank），分区之间只通过同步集合通信交换数据。
//! 通信后端在启动时由宿主程序显式选择并注入，不做运行期探测。
//!
//! # 模块概览
//!
//! - [`backend`]: [`CommBackend`] trait 与单进程 [`DummyComm`]
//! - [`local`]: 进程内 SPMD 组 [`LocalComm`]，每个 rank 一个线程
//! - [`config`]: [`ParallelConfig`] 与后端工厂 [`create_backends`]
//!
//! # SPMD 约束
//!
//! 所有 rank 必须以相同顺序调用相同的集合操作。违反约束、超时或某个
//! rank 中止时，组内每个 rank 都会收到 `FvError::Communication`。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod local;

pub use backend::{CommBackend, DummyComm};
pub use config::{create_backends, BackendKind, ParallelConfig};
pub use local::LocalComm;

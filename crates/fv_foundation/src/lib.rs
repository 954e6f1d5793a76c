// crates/fv_foundation/src/lib.rs

//! FvTerm Foundation Layer
//!
//! 基础层，提供整个工作区共享的错误类型与校验工具。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 [`FvError`] 与 `ensure!` / `require!` 宏
//!
//! # 示例
//!
//! ```
//! use fv_foundation::{FvError, FvResult};
//!
//! fn face_area(area: f64) -> FvResult<f64> {
//!     FvError::check_geometry(0, "面积", area)?;
//!     Ok(area)
//! }
//!
//! assert!(face_area(1.0).is_ok());
//! assert!(face_area(0.0).is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::{FvError, FvResult};

/// 预导入模块
pub mod prelude {
    pub use crate::error::{FvError, FvResult};
    pub use crate::{ensure, require};
}

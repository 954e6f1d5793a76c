// apps/fv_cli/src/commands/mod.rs

//! 子命令

pub mod run;
pub mod schemes;
pub mod validate;

// apps/fv_cli/src/main.rs

//! FvTerm 命令行界面
//!
//! 读取 JSON 算例，组装并求解有限体积方程。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// FvTerm 有限体积离散与求解工具
#[derive(Parser)]
#[command(name = "fv_cli")]
#[command(author = "FvTerm Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Finite-volume term discretization and solve", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行算例
    Run(commands::run::RunArgs),
    /// 验证算例配置
    Validate(commands::validate::ValidateArgs),
    /// 列出对流格式
    Schemes(commands::schemes::SchemesArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // 库层的 log 记录经 tracing-log 桥接到同一订阅器
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("初始化日志失败: {}", e))?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Schemes(args) => commands::schemes::execute(args),
    }
}

// apps/fv_cli/src/commands/run.rs

//! 运行算例命令
//!
//! 稳态算例按 `sweeps` 次扫描求解；瞬态算例每步先把当前值存为旧值再求解。
//! `local` 后端下每个 rank 运行同一算例，结束时用 all-gather 核对各 rank 结果一致。

use anyhow::{bail, Context, Result};
use clap::Args;
use fv_comm::{create_backends, CommBackend};
use fv_config::CaseConfig;
use fv_mesh::{Mesh, MeshKind};
use fv_physics::discretization::{Assembler, AssemblyContext};
use fv_physics::field::Field;
use fv_physics::linear_algebra::create_solver;
use fv_physics::viewer::{GridImage, ViewerLimits};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// 算例配置文件
    #[arg(short, long)]
    pub config: PathBuf,

    /// 单元值 CSV 输出路径（覆盖配置中的 output.csv）
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// 单个 rank 的求解结果
pub struct CaseResult {
    /// 网格
    pub mesh: Arc<dyn Mesh>,
    /// 最终单元值
    pub values: Vec<f64>,
    /// 最后一次求解前的全局残差
    pub last_residual: f64,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== FvTerm 算例启动 ===");
    let config = CaseConfig::from_file(&args.config)
        .with_context(|| format!("加载算例失败: {}", args.config.display()))?;
    info!("算例: {}, 网格: {:?}", config.name, config.mesh);

    let backends = create_backends(&config.parallel).context("创建并行后端失败")?;
    let start = Instant::now();
    let result = if backends.len() == 1 {
        run_case(&config, Arc::clone(&backends[0]))?
    } else {
        run_spmd(&config, backends)?
    };
    info!(
        "=== 完成: 残差 {:.3e}, 耗时 {:.2} s ===",
        result.last_residual,
        start.elapsed().as_secs_f64()
    );

    summarize(&result);

    let output = args.output.or_else(|| config.output.csv.clone());
    if let Some(path) = output {
        write_csv(&path, &*result.mesh, &result.values)
            .with_context(|| format!("写出 CSV 失败: {}", path.display()))?;
        info!("单元值已写入 {}", path.display());
    }
    Ok(())
}

/// 在给定通信后端上运行算例
pub fn run_case(config: &CaseConfig, comm: Arc<dyn CommBackend>) -> Result<CaseResult> {
    let rank = comm.process_id();
    let mesh = config.build_mesh().context("构建网格失败")?;
    let bcs = config
        .build_boundaries(&*mesh)
        .context("施加边界条件失败")?;
    let equation = config
        .build_equation()?
        .with_assembler(Assembler::new(config.assembler).with_comm(comm));
    let mut solver = create_solver(&config.solver);
    info!(
        "rank {}: {} 个单元, {} 个面, {} 项, 求解器 {}",
        rank,
        mesh.n_cells(),
        mesh.n_faces(),
        equation.terms().len(),
        solver.name()
    );

    let mut phi = Field::scalar_cell(Arc::clone(&mesh), "phi", config.initial_value)?;
    let mut last_residual = 0.0;
    match &config.time {
        Some(time) => {
            phi = phi.with_old()?;
            let ctx = AssemblyContext::with_dt(time.dt);
            for step in 1..=time.steps {
                phi.update_old()?;
                let report = equation
                    .solve(&phi, &bcs, &mut *solver, &ctx)
                    .with_context(|| format!("第 {} 步求解失败", step))?;
                last_residual = report.initial_residual;
                if rank == 0 {
                    info!(
                        "step {}: t={:.4}, 残差 {:.3e} -> {:.3e}",
                        step,
                        step as f64 * time.dt,
                        report.initial_residual,
                        report.final_residual
                    );
                }
            }
        }
        None => {
            let ctx = AssemblyContext::steady();
            for sweep in 1..=config.sweeps {
                last_residual = equation
                    .sweep(&phi, &bcs, &mut *solver, &ctx)
                    .with_context(|| format!("第 {} 次扫描失败", sweep))?;
                if rank == 0 {
                    info!("sweep {}: 残差 {:.3e}", sweep, last_residual);
                }
            }
        }
    }

    Ok(CaseResult {
        mesh,
        values: phi.values()?,
        last_residual,
    })
}

/// 每个 rank 一个线程运行算例，并核对结果
fn run_spmd(config: &CaseConfig, backends: Vec<Arc<dyn CommBackend>>) -> Result<CaseResult> {
    let n = backends.len();
    let mut results: Vec<Result<CaseResult>> = std::thread::scope(|scope| {
        let handles: Vec<_> = backends
            .into_iter()
            .map(|comm| {
                scope.spawn(move || {
                    let outcome = run_and_compare(config, &comm);
                    if let Err(e) = &outcome {
                        comm.abort(&format!("rank {} 失败: {:#}", comm.process_id(), e));
                    }
                    outcome
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("rank 线程异常退出")))
            })
            .collect()
    });
    if results.iter().any(|r| r.is_err()) {
        let first = results
            .into_iter()
            .find_map(|r| r.err())
            .unwrap_or_else(|| anyhow::anyhow!("未知错误"));
        return Err(first);
    }
    info!("{} 个 rank 结果一致", n);
    results.swap_remove(0)
}

/// 运行算例后收集所有 rank 的解，与本 rank 比较
fn run_and_compare(config: &CaseConfig, comm: &Arc<dyn CommBackend>) -> Result<CaseResult> {
    let result = run_case(config, Arc::clone(comm))?;
    let gathered = comm.all_gather(&result.values)?;
    let deviation = gathered
        .iter()
        .flat_map(|v| v.iter().zip(&result.values).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max);
    if deviation > 1e-12 {
        bail!(
            "rank {} 与其他 rank 结果不一致 (最大偏差 {:.3e})",
            comm.process_id(),
            deviation
        );
    }
    Ok(result)
}

fn summarize(result: &CaseResult) {
    let (lo, hi) = result
        .values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    info!("单元值范围 [{:.6}, {:.6}]", lo, hi);

    if let MeshKind::Grid2D { .. } = result.mesh.mesh_kind() {
        let phi = match Field::scalar_cell(Arc::clone(&result.mesh), "phi", result.values.clone()) {
            Ok(f) => f,
            Err(e) => {
                warn!("无法生成图像数据: {}", e);
                return;
            }
        };
        match GridImage::from_field(&phi, &ViewerLimits::default()) {
            Ok(img) => {
                let (ny, nx) = img.shape();
                info!("图像 {}x{}, 色标 {:?}", ny, nx, img.data_range);
            }
            Err(e) => warn!("无法生成图像数据: {}", e),
        }
    }
}

/// 写出 `cell,x,y,value`
pub fn write_csv(path: &Path, mesh: &dyn Mesh, values: &[f64]) -> Result<()> {
    let mut out = String::from("cell,x,y,value\n");
    for (cell, v) in values.iter().enumerate() {
        let c = mesh.cell_center(cell);
        writeln!(out, "{},{},{},{}", cell, c[0], c[1], v)?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_comm::{DummyComm, ParallelConfig};

    const CASE: &str = r#"{
        "mesh": { "kind": "grid2d", "nx": 4, "ny": 3, "dx": 0.25, "dy": 0.25 },
        "initial_value": 0.0,
        "equation": { "diffusion": 0.1 },
        "time": { "dt": 0.05, "steps": 3 },
        "boundaries": [
            { "patch": "left", "condition": { "kind": "fixed_value", "value": 1.0 } }
        ]
    }"#;

    #[test]
    fn test_run_case_single() {
        let config = CaseConfig::from_json_str(CASE).unwrap();
        let result = run_case(&config, Arc::new(DummyComm::new())).unwrap();
        assert_eq!(result.values.len(), 12);
        // 热量从左边界进入
        assert!(result.values[0] > result.values[3]);
        assert!(result.values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_run_spmd_ranks_agree() {
        let mut config = CaseConfig::from_json_str(CASE).unwrap();
        config.parallel = ParallelConfig::local(3);
        let backends = create_backends(&config.parallel).unwrap();
        let result = run_spmd(&config, backends).unwrap();
        assert_eq!(result.values.len(), 12);
    }

    #[test]
    fn test_write_csv() {
        let config = CaseConfig::from_json_str(CASE).unwrap();
        let mesh = config.build_mesh().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("phi.csv");
        write_csv(&path, &*mesh, &[1.5; 12]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "cell,x,y,value");
        assert_eq!(lines[1], "0,0.125,0.125,1.5");
    }
}

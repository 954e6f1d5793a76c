// crates/fv_config/src/case.rs

//! 算例配置
//!
//! 一个 JSON 文件描述完整算例：网格、初值、方程各项、边界条件、
//! 时间推进、线性求解器与并行后端。
//!
//! ```json
//! {
//!   "mesh": { "kind": "grid1d", "nx": 50, "dx": 0.02 },
//!   "equation": {
//!     "diffusion": 1.0,
//!     "convection": { "velocity": [5.0], "scheme": "exponential" }
//!   },
//!   "boundaries": [
//!     { "patch": "left", "condition": { "kind": "fixed_value", "value": 1.0 } }
//!   ]
//! }
//! ```

use crate::error::ConfigError;
use fv_comm::ParallelConfig;
use fv_foundation::FvResult;
use fv_mesh::{Grid1D, Grid2D, Mesh};
use fv_physics::discretization::{
    AssemblerConfig, AssemblyRole, BoundaryCondition, BoundaryConditions, Equation, SchemeKind,
    Term,
};
use fv_physics::linear_algebra::SolverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// 各节
// ============================================================================

/// 网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshConfig {
    /// 一维均匀网格
    Grid1d {
        /// 单元数
        nx: usize,
        /// 单元长度
        dx: f64,
    },
    /// 二维均匀矩形网格
    Grid2d {
        /// x 方向单元数
        nx: usize,
        /// y 方向单元数
        ny: usize,
        /// x 方向单元长度
        dx: f64,
        /// y 方向单元长度
        dy: f64,
    },
}

impl MeshConfig {
    /// 空间维数
    pub fn dimension(&self) -> usize {
        match self {
            Self::Grid1d { .. } => 1,
            Self::Grid2d { .. } => 2,
        }
    }

    /// 构建网格
    pub fn build(&self) -> FvResult<Arc<dyn Mesh>> {
        Ok(match *self {
            Self::Grid1d { nx, dx } => Arc::new(Grid1D::new(nx, dx)?),
            Self::Grid2d { nx, ny, dx, dy } => Arc::new(Grid2D::new(nx, ny, dx, dy)?),
        })
    }
}

fn default_scheme() -> String {
    "upwind".to_string()
}

/// 对流项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvectionConfig {
    /// 常速度向量，长度等于网格维数
    pub velocity: Vec<f64>,
    /// 格式名称（接受别名，如 `uds`、`cds`、`power-law`）
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// 显式或隐式
    #[serde(default)]
    pub role: AssemblyRole,
}

impl ConvectionConfig {
    /// 解析格式
    pub fn scheme_kind(&self) -> Result<SchemeKind, ConfigError> {
        SchemeKind::from_str(&self.scheme).map_err(|e| {
            ConfigError::invalid("equation.convection.scheme", &self.scheme, e.to_string())
        })
    }
}

/// 方程 `ρ ∂φ/∂t + ∇·(uφ) = ∇·(Γ∇φ) - S_p φ + S`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquationConfig {
    /// 扩散系数 Γ
    #[serde(default)]
    pub diffusion: Option<f64>,
    /// 对流项
    #[serde(default)]
    pub convection: Option<ConvectionConfig>,
    /// 线性汇项系数 S_p
    #[serde(default)]
    pub implicit_source: Option<f64>,
    /// 常源项 S
    #[serde(default)]
    pub source: Option<f64>,
}

fn default_density() -> f64 {
    1.0
}

/// 时间推进
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    /// 时间步长
    pub dt: f64,
    /// 步数
    pub steps: usize,
    /// 瞬态项系数 ρ
    #[serde(default = "default_density")]
    pub density: f64,
}

/// 一个边界片上的条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// 边界片名称
    pub patch: String,
    /// 条件
    pub condition: BoundaryCondition,
}

/// 输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 单元值 CSV 路径
    #[serde(default)]
    pub csv: Option<PathBuf>,
}

// ============================================================================
// 算例
// ============================================================================

fn default_name() -> String {
    "case".to_string()
}

/// 完整算例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    /// 算例名称
    #[serde(default = "default_name")]
    pub name: String,
    /// 网格
    pub mesh: MeshConfig,
    /// 初值
    #[serde(default)]
    pub initial_value: f64,
    /// 方程
    #[serde(default)]
    pub equation: EquationConfig,
    /// 时间推进，缺省为稳态
    #[serde(default)]
    pub time: Option<TimeConfig>,
    /// 稳态问题的扫描次数
    #[serde(default = "default_sweeps")]
    pub sweeps: usize,
    /// 边界条件
    #[serde(default)]
    pub boundaries: Vec<BoundaryConfig>,
    /// 组装器
    #[serde(default)]
    pub assembler: AssemblerConfig,
    /// 线性求解器
    #[serde(default)]
    pub solver: SolverConfig,
    /// 并行后端
    #[serde(default)]
    pub parallel: ParallelConfig,
    /// 输出
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_sweeps() -> usize {
    1
}

impl CaseConfig {
    /// 从文件加载并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&content)?;
        log::debug!("加载算例 {} ({})", config.name, path.as_ref().display());
        Ok(config)
    }

    /// 从 JSON 字符串解析并校验
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: CaseConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mesh {
            MeshConfig::Grid1d { nx, dx } => {
                positive_count("mesh.nx", nx)?;
                positive("mesh.dx", dx)?;
            }
            MeshConfig::Grid2d { nx, ny, dx, dy } => {
                positive_count("mesh.nx", nx)?;
                positive_count("mesh.ny", ny)?;
                positive("mesh.dx", dx)?;
                positive("mesh.dy", dy)?;
            }
        }

        let eq = &self.equation;
        if let Some(gamma) = eq.diffusion {
            non_negative("equation.diffusion", gamma)?;
        }
        let mut implicit = eq.diffusion.is_some() || eq.implicit_source.is_some();
        if let Some(conv) = &eq.convection {
            let dim = self.mesh.dimension();
            if conv.velocity.len() != dim {
                return Err(ConfigError::invalid(
                    "equation.convection.velocity",
                    format!("{:?}", conv.velocity),
                    format!("长度必须等于网格维数 {}", dim),
                ));
            }
            let kind = conv.scheme_kind()?;
            if kind.uses_peclet() && eq.diffusion.is_none() {
                log::warn!("格式 {} 没有扩散系数, 退化为迎风", kind);
            }
            implicit |= conv.role == AssemblyRole::Implicit;
        }

        if let Some(time) = &self.time {
            positive("time.dt", time.dt)?;
            positive_count("time.steps", time.steps)?;
            positive("time.density", time.density)?;
            implicit = true;
        } else {
            positive_count("sweeps", self.sweeps)?;
        }
        if !implicit {
            return Err(ConfigError::invalid(
                "equation",
                "-",
                "至少需要一个隐式项（扩散、隐式对流、隐式源或瞬态）",
            ));
        }

        let patches: &[&str] = match self.mesh {
            MeshConfig::Grid1d { .. } => &["left", "right"],
            MeshConfig::Grid2d { .. } => &["bottom", "top", "left", "right"],
        };
        for bc in &self.boundaries {
            if !patches.contains(&bc.patch.as_str()) {
                return Err(ConfigError::invalid(
                    "boundaries.patch",
                    &bc.patch,
                    format!("可用边界片: {:?}", patches),
                ));
            }
        }

        positive("solver.rtol", self.solver.rtol)?;
        positive_count("solver.max_iter", self.solver.max_iter)?;
        non_negative(
            "assembler.geometry_tolerance",
            self.assembler.geometry_tolerance,
        )?;
        self.parallel.validate().map_err(|e| {
            ConfigError::invalid(
                "parallel.backend",
                format!("{:?}", self.parallel.backend),
                e.to_string(),
            )
        })?;
        Ok(())
    }

    /// 构建网格
    pub fn build_mesh(&self) -> FvResult<Arc<dyn Mesh>> {
        self.mesh.build()
    }

    /// 构建边界条件
    pub fn build_boundaries(&self, mesh: &dyn Mesh) -> FvResult<BoundaryConditions> {
        let mut bcs = BoundaryConditions::new();
        for bc in &self.boundaries {
            bcs.apply(mesh, &bc.patch, bc.condition)?;
        }
        Ok(bcs)
    }

    /// 构建方程 `ρ∂φ/∂t + ∇·(uφ) - ∇·(Γ∇φ) + S_p φ = S`
    pub fn build_equation(&self) -> Result<Equation, ConfigError> {
        let eq = &self.equation;
        let mut equation = Equation::new();
        if let Some(time) = &self.time {
            equation = equation.term(Term::transient(time.density));
        }
        if let Some(conv) = &eq.convection {
            let mut term = Term::convection(conv.velocity.clone(), conv.scheme_kind()?)
                .with_role(conv.role);
            if let Some(gamma) = eq.diffusion {
                term = term.with_peclet_diffusion(gamma);
            }
            equation = equation + term;
        }
        if let Some(gamma) = eq.diffusion {
            equation = equation - Term::diffusion(gamma);
        }
        if let Some(sp) = eq.implicit_source {
            equation = equation + Term::implicit_source(sp);
        }
        if let Some(s) = eq.source {
            equation = equation.with_source(s);
        }
        Ok(equation)
    }
}

fn positive(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "必须为正"))
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "不能为负"))
    }
}

fn positive_count(key: &str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, value, "必须 >= 1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_comm::BackendKind;
    use fv_physics::discretization::AssemblyContext;
    use fv_physics::field::Field;
    use fv_physics::linear_algebra::{create_solver, SolverKind};
    use std::io::Write;

    const STEADY: &str = r#"{
        "name": "conv-diff",
        "mesh": { "kind": "grid1d", "nx": 20, "dx": 0.05 },
        "equation": {
            "diffusion": 1.0,
            "convection": { "velocity": [2.0], "scheme": "power-law" }
        },
        "boundaries": [
            { "patch": "left", "condition": { "kind": "fixed_value", "value": 1.0 } },
            { "patch": "right", "condition": { "kind": "fixed_value", "value": 0.0 } }
        ],
        "solver": { "kind": "dense_lu" }
    }"#;

    #[test]
    fn test_defaults() {
        let config = CaseConfig::from_json_str(STEADY).unwrap();
        assert_eq!(config.name, "conv-diff");
        assert_eq!(config.sweeps, 1);
        assert!(config.time.is_none());
        assert_eq!(config.solver.kind, SolverKind::DenseLu);
        assert_eq!(config.solver.rtol, 1e-10);
        assert_eq!(config.parallel.backend, BackendKind::Single);
        let conv = config.equation.convection.as_ref().unwrap();
        assert_eq!(conv.scheme_kind().unwrap(), SchemeKind::PowerLaw);
        assert_eq!(conv.role, AssemblyRole::Implicit);
    }

    #[test]
    fn test_build_and_solve() {
        let config = CaseConfig::from_json_str(STEADY).unwrap();
        let mesh = config.build_mesh().unwrap();
        let bcs = config.build_boundaries(&*mesh).unwrap();
        let eq = config.build_equation().unwrap();
        assert_eq!(eq.terms().len(), 2);
        let phi = Field::scalar_cell(Arc::clone(&mesh), "phi", config.initial_value).unwrap();
        let mut solver = create_solver(&config.solver);
        let report = eq
            .solve(&phi, &bcs, &mut *solver, &AssemblyContext::steady())
            .unwrap();
        assert!(report.final_residual < 1e-10);
        let values = phi.values().unwrap();
        assert!(values[0] > values[19]);
    }

    #[test]
    fn test_file_round_trip() {
        let config = CaseConfig::from_json_str(STEADY).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.json");
        config.save_to_file(&path).unwrap();
        let loaded = CaseConfig::from_file(&path).unwrap();
        assert_eq!(loaded.mesh, config.mesh);
        assert_eq!(loaded.boundaries, config.boundaries);
        assert_eq!(loaded.equation, config.equation);
    }

    #[test]
    fn test_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"mesh\": ").unwrap();
        assert!(matches!(
            CaseConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CaseConfig::from_file("/nonexistent/case.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            r#"{"mesh": {"kind": "grid1d", "nx": 0, "dx": 1.0}, "equation": {"diffusion": 1.0}}"#,
            r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0}, "equation": {"convection": {"velocity": [1.0, 0.0]}}}"#,
            r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0}, "equation": {"convection": {"velocity": [1.0], "scheme": "quick"}}}"#,
            r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0}, "equation": {"convection": {"velocity": [1.0], "role": "explicit"}}}"#,
            r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0}, "equation": {"diffusion": 1.0}, "boundaries": [{"patch": "top", "condition": {"kind": "fixed_value", "value": 0.0}}]}"#,
            r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0}, "equation": {"diffusion": 1.0}, "time": {"dt": 0.0, "steps": 3}}"#,
        ];
        for json in cases {
            assert!(
                matches!(CaseConfig::from_json_str(json), Err(ConfigError::InvalidValue { .. })),
                "{}",
                json
            );
        }
    }

    #[test]
    fn test_mpi_rejected_at_startup() {
        let json = r#"{"mesh": {"kind": "grid2d", "nx": 2, "ny": 2, "dx": 1.0, "dy": 1.0},
                       "equation": {"diffusion": 1.0}, "parallel": {"backend": "mpi"}}"#;
        let err = CaseConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("mpi"));
    }

    #[test]
    fn test_demo_cases_are_valid() {
        for json in [
            include_str!("../../../demos/convection_diffusion_1d.json"),
            include_str!("../../../demos/transient_diffusion_2d.json"),
        ] {
            let config = CaseConfig::from_json_str(json).unwrap();
            assert!(config.output.csv.is_some());
            config.build_equation().unwrap();
        }
    }

    #[test]
    fn test_explicit_convection_with_time_stepping() {
        let json = r#"{"mesh": {"kind": "grid1d", "nx": 4, "dx": 1.0},
                       "equation": {"convection": {"velocity": [1.0], "role": "explicit"}},
                       "time": {"dt": 0.1, "steps": 2}}"#;
        let config = CaseConfig::from_json_str(json).unwrap();
        let eq = config.build_equation().unwrap();
        assert_eq!(eq.terms()[1].term.role(), AssemblyRole::Explicit);
    }
}

// crates/fv_physics/src/discretization/scheme.rs

//! 对流插值格式
//!
//! 每个格式是面 Peclet 数 `P = F / D` 的纯函数，给出面值中 cell1 的份额 α：
//! `φ_f = α φ_1 + (1 - α) φ_2`。`P` 与面通量 `F` 同号；没有扩散时 `P = ±∞`，
//! `F = 0` 时 `P = 0`。

use fv_foundation::FvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 对流格式策略
pub trait ConvectionScheme: Send + Sync + fmt::Debug {
    /// cell1 份额
    fn alpha(&self, peclet: f64) -> f64;

    /// 种类
    fn kind(&self) -> SchemeKind;
}

/// 一阶迎风：通量非负时 cell1 为上游
#[derive(Debug, Clone, Copy, Default)]
pub struct UpwindScheme;

impl ConvectionScheme for UpwindScheme {
    fn alpha(&self, peclet: f64) -> f64 {
        if peclet >= 0.0 {
            1.0
        } else {
            0.0
        }
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Upwind
    }
}

/// 中心差分
#[derive(Debug, Clone, Copy, Default)]
pub struct CentralDifferenceScheme;

impl ConvectionScheme for CentralDifferenceScheme {
    fn alpha(&self, _peclet: f64) -> f64 {
        0.5
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Central
    }
}

/// 指数格式（一维精确解）
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialScheme;

impl ConvectionScheme for ExponentialScheme {
    fn alpha(&self, p: f64) -> f64 {
        if p.is_infinite() {
            return if p > 0.0 { 1.0 } else { 0.0 };
        }
        if p.abs() < 1e-8 {
            // 泰勒展开 1/2 + P/12
            return 0.5 + p / 12.0;
        }
        if p > 700.0 {
            return 1.0 - 1.0 / p;
        }
        (p - 1.0) / p + 1.0 / p.exp_m1()
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Exponential
    }
}

/// 混合格式
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridScheme;

impl ConvectionScheme for HybridScheme {
    fn alpha(&self, p: f64) -> f64 {
        if p > 2.0 {
            1.0 - 1.0 / p
        } else if p < -2.0 {
            -1.0 / p
        } else {
            0.5
        }
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Hybrid
    }
}

/// Patankar 幂律格式
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerLawScheme;

impl ConvectionScheme for PowerLawScheme {
    fn alpha(&self, p: f64) -> f64 {
        if p > 10.0 {
            1.0 - 1.0 / p
        } else if p > 0.0 {
            ((p - 1.0) + (1.0 - p / 10.0).powi(5)) / p
        } else if p == 0.0 {
            0.5
        } else if p >= -10.0 {
            ((1.0 + p / 10.0).powi(5) - 1.0) / p
        } else {
            -1.0 / p
        }
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::PowerLaw
    }
}

/// 格式种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    /// 一阶迎风
    #[default]
    Upwind,
    /// 中心差分
    Central,
    /// 指数
    Exponential,
    /// 混合
    Hybrid,
    /// 幂律
    PowerLaw,
}

impl SchemeKind {
    /// 全部种类
    pub const ALL: [SchemeKind; 5] = [
        Self::Upwind,
        Self::Central,
        Self::Exponential,
        Self::Hybrid,
        Self::PowerLaw,
    ];

    /// 名称
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upwind => "upwind",
            Self::Central => "central",
            Self::Exponential => "exponential",
            Self::Hybrid => "hybrid",
            Self::PowerLaw => "power_law",
        }
    }

    /// 创建策略对象
    pub fn build(self) -> Arc<dyn ConvectionScheme> {
        match self {
            Self::Upwind => Arc::new(UpwindScheme),
            Self::Central => Arc::new(CentralDifferenceScheme),
            Self::Exponential => Arc::new(ExponentialScheme),
            Self::Hybrid => Arc::new(HybridScheme),
            Self::PowerLaw => Arc::new(PowerLawScheme),
        }
    }

    /// 是否依赖 Peclet 数（需要扩散系数）
    pub fn uses_peclet(self) -> bool {
        matches!(self, Self::Exponential | Self::Hybrid | Self::PowerLaw)
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemeKind {
    type Err = FvError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "upwind" | "uds" | "first_order_upwind" | "first-order-upwind" => Ok(Self::Upwind),
            "central" | "cds" | "central_difference" | "central-difference" => Ok(Self::Central),
            "exponential" | "exp" => Ok(Self::Exponential),
            "hybrid" => Ok(Self::Hybrid),
            "power_law" | "power-law" | "powerlaw" => Ok(Self::PowerLaw),
            _ => Err(FvError::invalid_input(format!("未知对流格式: {}", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PECLETS: [f64; 9] = [-50.0, -10.0, -3.0, -0.5, 0.0, 0.5, 3.0, 10.0, 50.0];

    #[test]
    fn test_upwind_selects_by_sign() {
        let s = UpwindScheme;
        assert_eq!(s.alpha(2.0), 1.0);
        assert_eq!(s.alpha(0.0), 1.0);
        assert_eq!(s.alpha(-0.0), 1.0);
        assert_eq!(s.alpha(-1e-12), 0.0);
        assert_eq!(s.alpha(f64::INFINITY), 1.0);
        assert_eq!(s.alpha(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_alpha_bounded() {
        for kind in SchemeKind::ALL {
            let s = kind.build();
            for p in PECLETS {
                let a = s.alpha(p);
                assert!((0.0..=1.0).contains(&a), "{} alpha({}) = {}", kind, p, a);
            }
        }
    }

    #[test]
    fn test_peclet_schemes_limits() {
        for kind in [SchemeKind::Exponential, SchemeKind::Hybrid, SchemeKind::PowerLaw] {
            let s = kind.build();
            assert!((s.alpha(0.0) - 0.5).abs() < 1e-6, "{}", kind);
            assert!(s.alpha(1e3) > 0.99, "{}", kind);
            assert!(s.alpha(-1e3) < 0.01, "{}", kind);
        }
    }

    #[test]
    fn test_infinite_peclet_is_pure_upwind() {
        for kind in SchemeKind::ALL {
            if kind == SchemeKind::Central {
                continue;
            }
            let s = kind.build();
            assert_eq!(s.alpha(f64::INFINITY), 1.0, "{}", kind);
            assert_eq!(s.alpha(f64::NEG_INFINITY), 0.0, "{}", kind);
        }
    }

    #[test]
    fn test_exponential_symmetry() {
        // α(P) + α(-P) = 1
        let s = ExponentialScheme;
        for p in [0.1, 1.0, 5.0, 20.0] {
            assert!((s.alpha(p) + s.alpha(-p) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hybrid_branches() {
        let s = HybridScheme;
        assert_eq!(s.alpha(1.5), 0.5);
        assert!((s.alpha(4.0) - 0.75).abs() < 1e-14);
        assert!((s.alpha(-4.0) - 0.25).abs() < 1e-14);
    }

    #[test]
    fn test_scheme_from_str_parses_aliases() {
        assert_eq!("upwind".parse::<SchemeKind>().unwrap(), SchemeKind::Upwind);
        assert_eq!("UDS".parse::<SchemeKind>().unwrap(), SchemeKind::Upwind);
        assert_eq!("cds".parse::<SchemeKind>().unwrap(), SchemeKind::Central);
        assert_eq!("power-law".parse::<SchemeKind>().unwrap(), SchemeKind::PowerLaw);
        assert!("quick".parse::<SchemeKind>().is_err());
        for kind in SchemeKind::ALL {
            assert_eq!(kind.as_str().parse::<SchemeKind>().unwrap(), kind);
            assert_eq!(kind.build().kind(), kind);
        }
    }
}

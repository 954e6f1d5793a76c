// apps/fv_cli/src/commands/schemes.rs

//! 列出对流格式及其 α(P) 取样值

use anyhow::Result;
use clap::Args;
use fv_physics::discretization::SchemeKind;

/// 格式列表参数
#[derive(Args)]
pub struct SchemesArgs {
    /// 取样的 Peclet 数
    #[arg(short, long, value_delimiter = ',', default_values_t = vec![-10.0, -1.0, 0.0, 1.0, 10.0])]
    pub peclet: Vec<f64>,
}

/// 执行格式列表命令
pub fn execute(args: SchemesArgs) -> Result<()> {
    print!("{}", render(&args.peclet));
    Ok(())
}

fn render(peclets: &[f64]) -> String {
    let mut out = format!("{:<12} {:<6}", "scheme", "peclet");
    for p in peclets {
        out.push_str(&format!(" {:>9}", format!("P={}", p)));
    }
    out.push('\n');
    for kind in SchemeKind::ALL {
        let scheme = kind.build();
        out.push_str(&format!(
            "{:<12} {:<6}",
            kind.as_str(),
            if kind.uses_peclet() { "yes" } else { "no" }
        ));
        for &p in peclets {
            out.push_str(&format!(" {:>9.4}", scheme.alpha(p)));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_scheme() {
        let text = render(&[-1.0, 1.0]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + SchemeKind::ALL.len());
        assert!(lines[1].starts_with("upwind"));
        assert!(lines[1].ends_with("0.0000    1.0000"));
        assert!(text.contains("power_law"));
    }
}

mod config;
mod scenario;
mod shutdown;

use config::DemoCfg;
use scenario::{Report, Scenario};
use shutdown::ShutdownGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: tether [all|values|cancel|timeout|deadline|leak]...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = DemoCfg::from_env();
    init_tracing(&cfg);
    for (key, value, desc) in cfg.to_entries() {
        tracing::debug!(key, value = %value, desc, "config");
    }

    let selected = parse_args(std::env::args().skip(1))?;

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();
    let root = shutdown.context();

    let mut failed = 0usize;
    for scenario in selected {
        if root.is_cancelled() {
            tracing::warn!(scenario = scenario.name(), "shutdown requested, skipping");
            break;
        }
        tracing::info!(scenario = scenario.name(), "running");
        let report = scenario.run(&root, &cfg).await?;
        if !report.passed {
            failed += 1;
        }
        print_report(&report, cfg.log_json)?;
    }
    shutdown.release();

    if failed > 0 {
        anyhow::bail!("{failed} scenario(s) failed");
    }
    Ok(())
}

fn init_tracing(cfg: &DemoCfg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = cfg
        .log_json
        .then(|| fmt::layer().json().with_target(true).with_writer(std::io::stderr));
    let plain = (!cfg.log_json).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<Vec<Scenario>> {
    let mut selected = Vec::new();
    for arg in args {
        match arg.as_str() {
            "all" => selected.extend(Scenario::ALL),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            name => selected.push(name.parse::<Scenario>().map_err(|e| e.context(USAGE))?),
        }
    }
    if selected.is_empty() {
        selected.extend(Scenario::ALL);
    }
    Ok(selected)
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn no_args_runs_everything() {
        assert_eq!(parse_args(args(&[])).unwrap(), Scenario::ALL.to_vec());
    }

    #[test]
    fn named_scenarios_keep_order() {
        let got = parse_args(args(&["timeout", "values"])).unwrap();
        assert_eq!(got, vec![Scenario::Timeout, Scenario::Values]);
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        assert!(parse_args(args(&["bogus"])).is_err());
    }
}

#[path = "experiments/assays.rs"]
mod assays;
#[path = "experiments/close_far.rs"]
mod close_far;

use hipsleep::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }

    let cfg = match load_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    let result = match args.get(1).map(String::as_str) {
        None | Some("--config") | Some("close") => {
            close_far::run(cfg, true, &StopHandle::new()).map(|_| ())
        }
        Some("far") => close_far::run(cfg, false, &StopHandle::new()).map(|_| ()),
        Some("assays") => assays::run(cfg),
        Some("config") => cfg.to_json_pretty().map(|s| println!("{s}")),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

/// `--config <path>` anywhere on the command line; compact defaults otherwise.
fn load_config(args: &[String]) -> Result<SimConfig> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .ok_or(ConfigError::Invalid("--config needs a path"))?;
            let cfg = SimConfig::load_json(path)?;
            info!(%path, seed = cfg.seed, "config loaded");
            Ok(cfg)
        }
        None => Ok(SimConfig::compact()),
    }
}

fn print_help() {
    println!("hipsleep (cortical-hippocampal sleep consolidation simulator)");
    println!("usage:");
    println!("  cargo run                      close (related) pairs protocol");
    println!("  cargo run -- far               far (unrelated) pairs protocol");
    println!("  cargo run -- assays            alpha-cycle self checks");
    println!("  cargo run -- config            print the effective config as JSON");
    println!("  cargo run -- <cmd> --config <path.json>");
    println!("  RUST_LOG=debug cargo run       per-trial logging");
}

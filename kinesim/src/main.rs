use kinesim::{ConsoleSink, Scenario, ScenarioConfig};
use kinesim::{bench_adaptive, bench_surface_force};

use clap::Parser;
use anyhow::{Context, Result};

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, default_value = "bouncing_marble.yaml")]
    file_name: String,

    /// Record the run to this file instead of printing it
    #[arg(long)]
    preprocess: Option<PathBuf>,

    /// Print a line every N ticks
    #[arg(long, default_value_t = 10)]
    every: usize,

    /// Run the timing benchmarks and exit
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let file = File::open(&config_path).with_context(|| format!("opening {}", config_path.display()))?;
    let reader = BufReader::new(file);
    let scenario_cfg: ScenarioConfig = serde_yaml::from_reader(reader)?;

    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.bench {
        bench_surface_force()?;
        bench_adaptive()?;
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let mut scenario = Scenario::build_scenario(scenario_cfg)?;

    if let Some(out) = args.preprocess {
        let ticks = scenario.preprocess(&out)?;
        println!("wrote {ticks} ticks to {}", out.display());
        return Ok(());
    }

    let summary = scenario.run(&mut ConsoleSink::new(args.every))?;
    println!(
        "{} ticks, t = {:.5}{}",
        summary.ticks,
        summary.final_time,
        if summary.halted { " (stopped)" } else { "" }
    );

    Ok(())
}

// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MeGASampler CLI
//!
//! Reads an SMT-LIB 2 formula over QF_LIA/QF_ALIA and writes unique
//! satisfying samples, one per line, to `<input>.samples`.

use anyhow::Context;
use clap::Parser;
use megasampler::driver::{MegaSampler, SamplerConfig};
use megasampler::oracle::Z3Oracle;
use megasampler::preprocess::preprocess;
use megasampler::smtlib::parse_script;
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "megasampler")]
#[command(about = "Uniform-ish sampler for QF_LIA/QF_ALIA formulas", long_about = None)]
#[command(version)]
struct Cli {
    /// Input formula in SMT-LIB 2 format
    input: PathBuf,

    /// Global unique-sample cap
    #[arg(short = 'n', long = "max-samples", default_value_t = 1_000_000)]
    max_samples: u64,

    /// Wall-clock budget in seconds
    #[arg(short = 't', long = "max-time", default_value_t = 3600)]
    max_time: u64,

    /// Unique-sample cap per epoch
    #[arg(long = "epoch-samples", default_value_t = 100_000)]
    epoch_samples: u64,

    /// Time budget per epoch, in seconds
    #[arg(long = "epoch-time", default_value_t = 600)]
    epoch_time: u64,

    /// Bitvector sampling strategy (handled by the smtsampler backend)
    #[arg(long)]
    smtbit: bool,

    /// Bitvector sampling strategy (handled by the smtsampler backend)
    #[arg(long)]
    smtbv: bool,

    /// SAT sampling strategy (handled by the smtsampler backend)
    #[arg(long)]
    sat: bool,

    /// Add a blocking constraint per sampled box
    #[arg(long)]
    blocking: bool,

    /// Track and report interval-box statistics
    #[arg(long = "interval-size")]
    interval_size: bool,

    /// Disable the round cap in the sampling loop
    #[arg(long = "exhaust-epoch")]
    exhaust_epoch: bool,

    /// Emit trace output to stderr
    #[arg(long)]
    debug: bool,

    /// Rate-control threshold of the sampling loop
    #[arg(long = "min-rate", default_value_t = 0.05)]
    min_rate: f64,

    /// PRNG seed (wall-clock time when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Write a JSON run report to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Samples output path (defaults to <input>.samples)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Solver executable
    #[arg(long = "z3", default_value = "z3")]
    z3: String,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if cli.smtbit || cli.smtbv || cli.sat {
        eprintln!("bitvector and SAT strategies are handled by the smtsampler backend");
        process::exit(1);
    }

    match run(&cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let content = fs::read_to_string(&cli.input)
        .with_context(|| format!("cannot read {}", cli.input.display()))?;
    let file_name = cli.input.display().to_string();
    let script = parse_script(&content, &file_name)
        .with_context(|| format!("cannot parse {}", file_name))?;
    let pre = preprocess(&script.formula(), &script.declarations)
        .context("preprocessing failed")?;

    let output_path = cli.output.clone().unwrap_or_else(|| {
        let mut path = cli.input.clone().into_os_string();
        path.push(".samples");
        PathBuf::from(path)
    });
    let output = fs::File::create(&output_path)
        .with_context(|| format!("cannot create {}", output_path.display()))?;

    let oracle = Z3Oracle::new(cli.z3.clone(), pre.variables.clone());
    let config = SamplerConfig {
        max_samples: cli.max_samples,
        max_time: Duration::from_secs(cli.max_time),
        max_epoch_samples: cli.epoch_samples,
        max_epoch_time: Duration::from_secs(cli.epoch_time),
        min_rate: cli.min_rate,
        blocking: cli.blocking,
        exhaust_epoch: cli.exhaust_epoch,
        track_interval_size: cli.interval_size,
        seed: cli.seed,
        ..Default::default()
    };
    let mut sampler = MegaSampler::new(
        pre,
        Box::new(oracle),
        Box::new(BufWriter::new(output)),
        config,
    );

    let stats = sampler.run().context("sampling run failed")?;
    println!(
        "{} unique samples over {} epochs -> {}",
        stats.unique_valid_samples,
        stats.epochs,
        output_path.display()
    );
    if let Some(report) = &cli.json {
        sampler
            .write_json_report(report)
            .with_context(|| format!("cannot write {}", report.display()))?;
    }
    Ok(())
}

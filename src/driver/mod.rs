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

//! The epoch loop
//!
//! Owns the PRNG, the time and sample budgets, the per-category timers and
//! the uniqueness set. Per epoch: biased seed query, implicant extraction,
//! array-equality rewriting, strengthening, box sampling, and optionally a
//! blocking constraint on the oracle.

use crate::error::SamplerError;
use crate::expr::{Expr, Sort};
use crate::implicant::extract_implicant;
use crate::oracle::{ConcreteModel, Oracle, SatResult};
use crate::preprocess::Preprocessed;
use crate::sampling::{blocking_constraint, sample_box, SamplingParams};
use crate::strengthen::strengthen;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Soft seed-bias values are drawn from this symmetric window
const SOFT_VALUE_WINDOW: i64 = 1024;

/// Run limits and sampling knobs
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Global unique-sample cap
    pub max_samples: u64,
    /// Wall-clock budget
    pub max_time: Duration,
    /// Unique-sample cap per epoch
    pub max_epoch_samples: u64,
    /// Time budget per epoch
    pub max_epoch_time: Duration,
    /// Floor for the adaptive round budget
    pub base_rounds: u64,
    /// Rate-control threshold of the sampling loop
    pub min_rate: f64,
    /// Block each epoch's box on the oracle
    pub blocking: bool,
    /// Disable the sampling round cap
    pub exhaust_epoch: bool,
    /// Track interval-box sizes for the report
    pub track_interval_size: bool,
    /// PRNG seed; wall-clock time when absent
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_samples: 1_000_000,
            max_time: Duration::from_secs(3600),
            max_epoch_samples: 100_000,
            max_epoch_time: Duration::from_secs(600),
            base_rounds: 10,
            min_rate: 0.05,
            blocking: false,
            exhaust_epoch: false,
            track_interval_size: false,
            seed: None,
        }
    }
}

/// Aggregated run statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub epochs: u64,
    pub total_samples: u64,
    pub valid_samples: u64,
    pub unique_valid_samples: u64,
    /// Epochs whose interval box had no finite size
    pub infinite_intervals: u64,
    pub average_interval_size: f64,
    #[serde(skip)]
    sum_interval_size: f64,
    #[serde(skip)]
    finite_boxes: u64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(rename = "method name")]
    method_name: &'a str,
    epochs: u64,
    #[serde(rename = "total samples")]
    total_samples: u64,
    #[serde(rename = "valid samples")]
    valid_samples: u64,
    #[serde(rename = "unique valid samples")]
    unique_valid_samples: u64,
    #[serde(rename = "infinite intervals")]
    infinite_intervals: u64,
    #[serde(rename = "average interval size")]
    average_interval_size: f64,
    #[serde(rename = "time")]
    times: BTreeMap<String, f64>,
}

enum EpochOutcome {
    /// Keep looping
    Continue,
    /// Unsat or unknown seed query; the run ends successfully
    Exhausted,
}

/// The sampler driver
pub struct MegaSampler {
    config: SamplerConfig,
    pre: Preprocessed,
    oracle: Box<dyn Oracle>,
    output: Box<dyn Write>,
    rng: StdRng,
    samples: HashSet<String>,
    stats: RunStats,
    timers: HashMap<String, Duration>,
    exit_flag: Arc<AtomicBool>,
    start: Instant,
}

impl MegaSampler {
    /// Build a driver over a preprocessed formula. The normalized formula
    /// is asserted on the oracle as the base hard constraint.
    pub fn new(
        pre: Preprocessed,
        mut oracle: Box<dyn Oracle>,
        output: Box<dyn Write>,
        config: SamplerConfig,
    ) -> Self {
        oracle.add_hard(pre.formula.clone());
        let seed = config.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        debug!("PRNG seed: {}", seed);
        Self {
            config,
            pre,
            oracle,
            output,
            rng: StdRng::seed_from_u64(seed),
            samples: HashSet::new(),
            stats: RunStats::default(),
            timers: HashMap::new(),
            exit_flag: Arc::new(AtomicBool::new(false)),
            start: Instant::now(),
        }
    }

    /// Cooperative cancellation: setting the flag makes the next budget
    /// check stop the run cleanly.
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit_flag.clone()
    }

    pub fn unique_samples(&self) -> &HashSet<String> {
        &self.samples
    }

    pub fn accumulated_time(&self, category: &str) -> Duration {
        self.timers.get(category).copied().unwrap_or(Duration::ZERO)
    }

    fn accumulate(&mut self, category: &str, elapsed: Duration) {
        *self.timers.entry(category.to_string()).or_default() += elapsed;
    }

    fn time_limit_reached(&self) -> bool {
        self.start.elapsed() >= self.config.max_time || self.exit_flag.load(Ordering::Relaxed)
    }

    /// Run epochs until a budget expires or the oracle runs dry
    pub fn run(&mut self) -> Result<RunStats, SamplerError> {
        info!(
            "starting: {} int vars, {} arrays, {} bool vars, formula depth {}",
            self.pre.stats.num_ints,
            self.pre.stats.num_arrays,
            self.pre.stats.num_bools,
            self.pre.stats.depth
        );
        loop {
            if self.time_limit_reached() {
                info!("stopping: time budget expired");
                break;
            }
            if self.samples.len() as u64 >= self.config.max_samples {
                info!("stopping: sample budget reached");
                break;
            }
            match self.epoch()? {
                EpochOutcome::Continue => {}
                EpochOutcome::Exhausted => break,
            }
        }
        self.output.flush()?;
        self.stats.unique_valid_samples = self.samples.len() as u64;
        self.stats.average_interval_size = if self.stats.finite_boxes == 0 {
            0.0
        } else {
            self.stats.sum_interval_size / self.stats.finite_boxes as f64
        };
        info!(
            "finished: {} epochs, {} unique samples",
            self.stats.epochs,
            self.stats.unique_valid_samples
        );
        Ok(self.stats)
    }

    fn epoch(&mut self) -> Result<EpochOutcome, SamplerError> {
        let seed = {
            let started = Instant::now();
            let seed = self.seed_model()?;
            self.accumulate("solving", started.elapsed());
            match seed {
                Some(seed) => seed,
                None => {
                    info!("stopping: no further seed model");
                    return Ok(EpochOutcome::Exhausted);
                }
            }
        };
        self.stats.epochs += 1;
        self.pre.graph.reset_epoch();

        let started = Instant::now();
        let literals = extract_implicant(&self.pre.formula, &seed, &mut self.rng)?;
        debug!("implicant has {} literals", literals.len());
        let literals = crate::arrays::rewrite_array_equalities(
            literals,
            &mut self.pre.graph,
            &seed,
        )?;
        self.accumulate("rewriting", started.elapsed());

        let started = Instant::now();
        let outcome = strengthen(&literals, &seed);
        self.accumulate("strengthening", started.elapsed());
        if outcome.skipped > 0 {
            debug!("{} literals skipped during strengthening", outcome.skipped);
        }
        if outcome.map.has_bottom() {
            warn!("discarding epoch: interval box is empty");
            return Ok(EpochOutcome::Continue);
        }

        if self.config.track_interval_size {
            match outcome.map.size() {
                Ok(size) => {
                    self.stats.sum_interval_size += size as f64;
                    self.stats.finite_boxes += 1;
                }
                Err(_) => self.stats.infinite_intervals += 1,
            }
        } else if outcome.map.is_infinite() {
            self.stats.infinite_intervals += 1;
        }

        let params = SamplingParams {
            base_rounds: self.config.base_rounds,
            max_samples: self.config.max_samples,
            epoch_samples: self.config.max_epoch_samples,
            min_rate: self.config.min_rate,
            exhaust: self.config.exhaust_epoch,
            blocking: self.config.blocking,
        };
        let deadline = {
            let global = self.start + self.config.max_time;
            let epoch = Instant::now() + self.config.max_epoch_time;
            global.min(epoch)
        };
        let exit_flag = self.exit_flag.clone();
        let should_stop = move || {
            Instant::now() >= deadline || exit_flag.load(Ordering::Relaxed)
        };

        let started = Instant::now();
        let sampled = {
            let output = &mut self.output;
            sample_box(
                &outcome.map,
                &seed,
                &self.pre.variables,
                &params,
                &mut self.rng,
                &mut self.samples,
                &mut |line| writeln!(output, "{}", line),
                &should_stop,
            )?
        };
        self.accumulate("sampling", started.elapsed());
        debug!(
            "epoch {}: {} tried, {} valid, {} unique over {} rounds",
            self.stats.epochs, sampled.tried, sampled.valid, sampled.unique, sampled.rounds
        );
        self.stats.total_samples += sampled.tried;
        self.stats.valid_samples += sampled.valid;

        if self.config.blocking {
            if let Some(constraint) = blocking_constraint(&outcome.map) {
                self.oracle.add_hard(constraint);
            }
        }
        Ok(EpochOutcome::Continue)
    }

    /// Query the oracle for a seed model, biased toward a random corner of
    /// the space by soft constraints; on an unknown answer the biased query
    /// is dropped and the plain formula is tried once more.
    fn seed_model(&mut self) -> Result<Option<ConcreteModel>, SamplerError> {
        self.oracle.push();
        self.choose_random_assignment();
        let mut result = self.oracle.check()?;
        if result == SatResult::Unknown {
            warn!("biased query timed out, retrying without soft constraints");
            self.oracle.pop();
            self.oracle.push();
            result = self.oracle.check()?;
        }
        let model = if result == SatResult::Sat {
            self.oracle.get_model().cloned()
        } else {
            None
        };
        self.oracle.pop();
        Ok(model)
    }

    /// One soft equality per integer variable, one soft polarity per
    /// boolean; arrays are left to the solver
    fn choose_random_assignment(&mut self) {
        for (name, sort) in &self.pre.variables {
            match sort {
                Sort::Int => {
                    let value = self.rng.gen_range(-SOFT_VALUE_WINDOW..=SOFT_VALUE_WINDOW);
                    self.oracle
                        .add_soft(Expr::eq(Expr::int_var(name.clone()), Expr::Int(value)), 1);
                }
                Sort::Bool => {
                    let var = Expr::bool_var(name.clone());
                    let soft = if self.rng.gen::<bool>() {
                        var
                    } else {
                        Expr::not(var)
                    };
                    self.oracle.add_soft(soft, 1);
                }
                Sort::Array => {}
            }
        }
    }

    /// Write the JSON run report
    pub fn write_json_report(&self, path: &Path) -> Result<(), SamplerError> {
        let mut times = BTreeMap::new();
        times.insert("total".to_string(), self.start.elapsed().as_secs_f64());
        for (category, duration) in &self.timers {
            times.insert(category.clone(), duration.as_secs_f64());
        }
        let report = JsonReport {
            method_name: "megasampler",
            epochs: self.stats.epochs,
            total_samples: self.stats.total_samples,
            valid_samples: self.stats.valid_samples,
            unique_valid_samples: self.stats.unique_valid_samples,
            infinite_intervals: self.stats.infinite_intervals,
            average_interval_size: self.stats.average_interval_size,
            times,
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &report)
            .map_err(|e| SamplerError::SolverFailure {
                reason: format!("cannot write report: {}", e),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;

    use std::sync::Mutex;

    /// Replays a fixed sequence of seed models
    struct ScriptedOracle {
        models: Vec<ConcreteModel>,
        position: usize,
        hard: Arc<Mutex<Vec<Expr>>>,
        frames: Vec<usize>,
    }

    impl ScriptedOracle {
        fn new(models: Vec<ConcreteModel>) -> Self {
            Self {
                models,
                position: 0,
                hard: Arc::default(),
                frames: Vec::new(),
            }
        }

        /// Handle for inspecting recorded hard constraints after the
        /// oracle has been moved into the driver
        fn shared_hard(&self) -> Arc<Mutex<Vec<Expr>>> {
            self.hard.clone()
        }
    }

    impl Oracle for ScriptedOracle {
        fn check(&mut self) -> Result<SatResult, SamplerError> {
            if self.position < self.models.len() {
                Ok(SatResult::Sat)
            } else {
                Ok(SatResult::Unsat)
            }
        }

        fn get_model(&self) -> Option<&ConcreteModel> {
            self.models.get(self.position)
        }

        fn add_hard(&mut self, constraint: Expr) {
            self.hard.lock().unwrap().push(constraint);
        }

        fn add_soft(&mut self, _constraint: Expr, _weight: u32) {}

        fn push(&mut self) {
            self.frames.push(self.hard.lock().unwrap().len());
        }

        fn pop(&mut self) {
            // a completed push/pop cycle consumes one scripted model
            if let Some(len) = self.frames.pop() {
                self.hard.lock().unwrap().truncate(len);
            }
            self.position += 1;
        }
    }

    fn int_model(values: &[(&str, i64)]) -> ConcreteModel {
        let mut model = ConcreteModel::new();
        for (name, value) in values {
            model.ints.insert(name.to_string(), *value);
        }
        model
    }

    fn build_sampler(
        formula: Expr,
        declarations: Vec<(String, Sort)>,
        models: Vec<ConcreteModel>,
        config: SamplerConfig,
    ) -> MegaSampler {
        let pre = preprocess(&formula, &declarations).unwrap();
        MegaSampler::new(
            pre,
            Box::new(ScriptedOracle::new(models)),
            Box::new(std::io::sink()),
            config,
        )
    }

    #[test]
    fn test_run_samples_simple_range() {
        let x = Expr::int_var("x");
        let formula = Expr::And(vec![
            Expr::ge(x.clone(), Expr::Int(0)),
            Expr::le(x, Expr::Int(10)),
        ]);
        let mut sampler = build_sampler(
            formula,
            vec![("x".to_string(), Sort::Int)],
            vec![int_model(&[("x", 5)])],
            SamplerConfig {
                seed: Some(7),
                ..Default::default()
            },
        );
        let stats = sampler.run().unwrap();
        assert_eq!(stats.epochs, 1);
        assert_eq!(stats.unique_valid_samples, 11);
    }

    #[test]
    fn test_run_stops_at_sample_cap() {
        let x = Expr::int_var("x");
        let formula = Expr::And(vec![
            Expr::ge(x.clone(), Expr::Int(0)),
            Expr::le(x, Expr::Int(1000)),
        ]);
        let mut sampler = build_sampler(
            formula,
            vec![("x".to_string(), Sort::Int)],
            vec![int_model(&[("x", 5)]), int_model(&[("x", 600)])],
            SamplerConfig {
                max_samples: 20,
                seed: Some(7),
                ..Default::default()
            },
        );
        let stats = sampler.run().unwrap();
        assert_eq!(stats.unique_valid_samples, 20);
    }

    #[test]
    fn test_prng_determinism_with_fixed_oracle_trace() {
        let x = Expr::int_var("x");
        let y = Expr::int_var("y");
        let formula = Expr::And(vec![
            Expr::ge(x.clone(), Expr::Int(-50)),
            Expr::le(x, Expr::Int(50)),
            Expr::ge(y.clone(), Expr::Int(-50)),
            Expr::le(y, Expr::Int(50)),
        ]);
        let run_once = || {
            let mut sampler = build_sampler(
                formula.clone(),
                vec![("x".to_string(), Sort::Int), ("y".to_string(), Sort::Int)],
                vec![int_model(&[("x", 1), ("y", 2)])],
                SamplerConfig {
                    max_samples: 50,
                    seed: Some(42),
                    ..Default::default()
                },
            );
            sampler.run().unwrap();
            let mut lines: Vec<String> =
                sampler.unique_samples().iter().cloned().collect();
            lines.sort();
            lines
        };
        assert_eq!(run_once(), run_once());
    }

    #[test]
    fn test_blocking_adds_hard_constraints() {
        let x = Expr::int_var("x");
        let formula = Expr::And(vec![
            Expr::ge(x.clone(), Expr::Int(0)),
            Expr::le(x, Expr::Int(3)),
        ]);
        let pre = preprocess(&formula, &[("x".to_string(), Sort::Int)]).unwrap();
        let oracle = ScriptedOracle::new(vec![int_model(&[("x", 1)])]);
        let hard = oracle.shared_hard();
        let mut sampler = MegaSampler::new(
            pre,
            Box::new(oracle),
            Box::new(std::io::sink()),
            SamplerConfig {
                blocking: true,
                seed: Some(3),
                ..Default::default()
            },
        );
        sampler.run().unwrap();
        // base formula plus one blocking box
        let recorded = hard.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(matches!(recorded[1], Expr::Not(_)));
    }

    #[test]
    fn test_exit_flag_stops_the_run() {
        let x = Expr::int_var("x");
        let formula = Expr::ge(x, Expr::Int(0));
        let mut sampler = build_sampler(
            formula,
            vec![("x".to_string(), Sort::Int)],
            vec![int_model(&[("x", 0)]), int_model(&[("x", 1)])],
            SamplerConfig {
                seed: Some(1),
                ..Default::default()
            },
        );
        sampler.exit_flag().store(true, Ordering::Relaxed);
        let stats = sampler.run().unwrap();
        assert_eq!(stats.epochs, 0);
    }
}

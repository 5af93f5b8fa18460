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

//! Interval-box sampling
//!
//! Draws points from an interval box with an adaptive round budget and a
//! per-round rate check. A draw assigns the plain integer dimensions first,
//! then the select-term dimensions in a fixed order; clashing array cells
//! reject the draw. Unique samples are emitted as canonical lines.

use crate::expr::{Expr, Sort};
use crate::interval::IntervalMap;
use crate::model::Model;
use crate::oracle::ConcreteModel;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::io;

/// Draws attempted per round
pub const MAX_SAMPLES_PER_ROUND: u64 = 100;

/// Divisor tying the round budget to the global sample cap
const ROUNDS_PER_MAX_SAMPLES: u64 = 128;

/// Knobs of one sampling epoch
#[derive(Debug, Clone)]
pub struct SamplingParams {
    /// Floor for the adaptive round budget
    pub base_rounds: u64,
    /// Global unique-sample cap of the whole run
    pub max_samples: u64,
    /// Unique-sample cap of this epoch
    pub epoch_samples: u64,
    /// Stop when a round's unique/tried ratio drops below this
    pub min_rate: f64,
    /// Disable the round cap (the epoch cap still applies)
    pub exhaust: bool,
    pub blocking: bool,
}

/// Counters of one sampling epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingOutcome {
    pub tried: u64,
    pub valid: u64,
    pub unique: u64,
    pub rounds: u64,
}

/// Adaptive round budget: wide and infinite dimensions buy more rounds
fn round_budget(map: &IntervalMap, params: &SamplingParams) -> u64 {
    let mut coefficient: f64 = 1.0;
    for (_, interval) in map.iter() {
        let factor = match interval.width() {
            Err(_) => 4.0,
            Ok(width) => 1.0 + (1.0 + (1.0 + width as f64).log2()).log2(),
        };
        coefficient *= factor;
    }
    let mut budget = coefficient.floor() as u64;
    if params.blocking {
        budget += map.len() as u64;
    }
    budget
        .max(params.base_rounds)
        .min((params.max_samples / ROUNDS_PER_MAX_SAMPLES).max(1))
}

/// Draw points from the box until a stop condition fires
///
/// `should_stop` is polled between draws and covers the caller's time
/// budget and cancellation flag; the global cap is checked against
/// `samples` directly.
#[allow(clippy::too_many_arguments)]
pub fn sample_box(
    map: &IntervalMap,
    seed: &ConcreteModel,
    declarations: &[(String, Sort)],
    params: &SamplingParams,
    rng: &mut StdRng,
    samples: &mut HashSet<String>,
    emit: &mut dyn FnMut(&str) -> io::Result<()>,
    should_stop: &dyn Fn() -> bool,
) -> io::Result<SamplingOutcome> {
    let mut outcome = SamplingOutcome {
        rounds: 1,
        ..Default::default()
    };
    if map.is_empty() {
        return Ok(outcome);
    }

    // fixed draw order: plain variables by name, then select-terms from
    // innermost to outermost with a stable tie-break
    let mut int_keys: Vec<(&Expr, String)> = Vec::new();
    let mut select_keys: Vec<(&Expr, usize, String)> = Vec::new();
    for key in map.keys() {
        match key {
            Expr::IntVar(name) => int_keys.push((key, name.clone())),
            other => select_keys.push((other, other.select_depth(), other.to_string())),
        }
    }
    int_keys.sort_by(|a, b| a.1.cmp(&b.1));
    select_keys.sort_by(|a, b| (a.1, &a.2).cmp(&(b.1, &b.2)));

    let max_rounds = round_budget(map, params);
    'rounds: loop {
        let mut round_tried = 0u64;
        let mut round_unique = 0u64;
        for _ in 0..MAX_SAMPLES_PER_ROUND {
            if should_stop()
                || outcome.unique >= params.epoch_samples
                || samples.len() as u64 >= params.max_samples
            {
                break 'rounds;
            }
            round_tried += 1;
            outcome.tried += 1;
            let store = match draw(map, seed, declarations, &int_keys, &select_keys, rng) {
                Some(store) => store,
                None => continue,
            };
            outcome.valid += 1;
            let line = store.to_line(declarations);
            if samples.insert(line.clone()) {
                emit(&line)?;
                outcome.unique += 1;
                round_unique += 1;
            }
        }

        let rate = if round_tried == 0 {
            0.0
        } else {
            round_unique as f64 / round_tried as f64
        };
        if rate < params.min_rate {
            break;
        }
        if !params.exhaust && outcome.rounds >= max_rounds {
            break;
        }
        outcome.rounds += 1;
    }
    Ok(outcome)
}

/// One draw; `None` when a select-term clashes with an already assigned
/// array cell outside its interval, or an index cannot be evaluated
fn draw(
    map: &IntervalMap,
    seed: &ConcreteModel,
    declarations: &[(String, Sort)],
    int_keys: &[(&Expr, String)],
    select_keys: &[(&Expr, usize, String)],
    rng: &mut StdRng,
) -> Option<Model> {
    let mut store = Model::new();
    for (key, name) in int_keys {
        let value = map.get(key).expect("key from this map").random_in_range(rng);
        store.add_int_assignment(name, value);
    }
    for (key, _, _) in select_keys {
        let (array, index) = match key {
            Expr::Select(array, index) => (array, index),
            _ => return None,
        };
        let array_name = match array.as_ref() {
            Expr::ArrayVar(name) => name.as_str(),
            _ => return None,
        };
        let interval = map.get(key).expect("key from this map");
        let index_value = store.eval_int_completing(index, seed)?;
        match store.eval_array_var(array_name, index_value) {
            Some(existing) => {
                // committed earlier in this draw; valid only if it already
                // satisfies this term's interval
                if !interval.is_in_range(existing) {
                    return None;
                }
            }
            None => {
                let value = interval.random_in_range(rng);
                store.add_array_assignment(array_name, index_value, value);
            }
        }
    }
    // dimensions the box does not constrain keep the seed model's values
    for (name, sort) in declarations {
        if *sort == Sort::Int && store.eval_int_var(name).is_none() {
            store.add_int_assignment(name, seed.int_value(name));
        }
    }
    Some(store)
}

/// The negated box, for blocking already-sampled regions. Infinite sides
/// contribute no bound; a fully unbounded box yields no constraint.
pub fn blocking_constraint(map: &IntervalMap) -> Option<Expr> {
    let mut keys: Vec<&Expr> = map.keys().collect();
    keys.sort_by_key(|k| k.to_string());
    let mut bounds = Vec::new();
    for key in keys {
        let interval = map.get(key).expect("key from this map");
        if !interval.is_low_minf() {
            bounds.push(Expr::ge(key.clone(), Expr::Int(interval.low())));
        }
        if !interval.is_high_inf() {
            bounds.push(Expr::le(key.clone(), Expr::Int(interval.high())));
        }
    }
    if bounds.is_empty() {
        return None;
    }
    let conjunction = if bounds.len() == 1 {
        bounds.into_iter().next().unwrap()
    } else {
        Expr::And(bounds)
    };
    Some(Expr::not(conjunction))
}

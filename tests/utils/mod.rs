//! Shared helpers for integration tests: a scripted oracle that replays a
//! fixed sequence of seed models, and sample-line replay checks.

use megasampler::error::SamplerError;
use megasampler::expr::Expr;
use megasampler::oracle::{ConcreteModel, Oracle, SatResult};
use std::collections::BTreeMap;

/// Oracle that replays canned models, then answers unsat
pub struct ScriptedOracle {
    models: Vec<ConcreteModel>,
    position: usize,
    frames: usize,
}

impl ScriptedOracle {
    pub fn new(models: Vec<ConcreteModel>) -> Self {
        Self {
            models,
            position: 0,
            frames: 0,
        }
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

    fn add_hard(&mut self, _constraint: Expr) {}

    fn add_soft(&mut self, _constraint: Expr, _weight: u32) {}

    fn push(&mut self) {
        self.frames += 1;
    }

    fn pop(&mut self) {
        self.frames -= 1;
        // one completed query per epoch consumes one scripted model
        self.position += 1;
    }
}

/// Build a seed model from integer and array assignments
pub fn seed_model(
    ints: &[(&str, i64)],
    arrays: &[(&str, &[(i64, i64)])],
) -> ConcreteModel {
    let mut model = ConcreteModel::new();
    for (name, value) in ints {
        model.ints.insert(name.to_string(), *value);
    }
    for (name, cells) in arrays {
        let func = model.arrays.entry(name.to_string()).or_default();
        for (index, value) in *cells {
            func.entries.insert(*index, *value);
        }
    }
    model
}

/// Parse a canonical sample line back into assignments
pub fn parse_sample_line(
    line: &str,
) -> (BTreeMap<String, i64>, BTreeMap<String, BTreeMap<i64, i64>>) {
    let mut ints = BTreeMap::new();
    let mut arrays: BTreeMap<String, BTreeMap<i64, i64>> = BTreeMap::new();
    for part in line.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once(':').expect("key:value");
        let value: i64 = value.parse().expect("integer value");
        if let Some((array, index)) = key.split_once('[') {
            let index: i64 = index
                .strip_suffix(']')
                .expect("closing bracket")
                .parse()
                .expect("integer index");
            arrays.entry(array.to_string()).or_default().insert(index, value);
        } else {
            ints.insert(key.to_string(), value);
        }
    }
    (ints, arrays)
}

/// Check a sample against the original formula by replaying it over the
/// seed model (dimensions the sample leaves open keep their seed values)
pub fn replay_satisfies(formula: &Expr, seed: &ConcreteModel, line: &str) -> bool {
    let (ints, arrays) = parse_sample_line(line);
    let mut concrete = seed.clone();
    for (name, value) in ints {
        concrete.ints.insert(name, value);
    }
    for (name, cells) in arrays {
        let func = concrete.arrays.entry(name).or_default();
        for (index, value) in cells {
            func.entries.insert(index, value);
        }
    }
    concrete.eval_bool(formula).expect("formula evaluates")
}

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

//! One-time formula preprocessing
//!
//! Normalizes comparisons (`arith_lhs`), blasts selects over stores,
//! converts to negation normal form, renames solver-internal names and
//! builds the array-equality graph. All rewrites are idempotent and
//! equivalence-preserving.

use crate::arrays::{build_graph, ArrayEqualityGraph};
use crate::error::SamplerError;
use crate::expr::{Expr, Sort};

/// Prefix given to solver-internal fresh names so downstream code can tell
/// them apart from user variables
const INTERNAL_PREFIX: &str = "z3name!";
const RENAMED_PREFIX: &str = "mega!";

/// Counts gathered from the declarations and the formula tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormulaStats {
    pub num_ints: usize,
    pub num_bools: usize,
    pub num_arrays: usize,
    pub num_nodes: usize,
    pub depth: usize,
}

/// Output of preprocessing, fixed for the rest of the run
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// The normalized formula
    pub formula: Expr,
    /// Declared variables with their sorts, in declaration order
    pub variables: Vec<(String, Sort)>,
    pub graph: ArrayEqualityGraph,
    pub stats: FormulaStats,
}

/// Run the full preprocessing pipeline
pub fn preprocess(
    formula: &Expr,
    declarations: &[(String, Sort)],
) -> Result<Preprocessed, SamplerError> {
    let normalized = arith_lhs(formula);
    let blasted = blast_select_store(&normalized);
    let nnf = to_nnf(&blasted, true);
    let renamed = rename_internal(&nnf);
    let graph = build_graph(&renamed)?;

    let variables: Vec<(String, Sort)> = declarations
        .iter()
        .map(|(name, sort)| (rename_name(name), *sort))
        .collect();
    let stats = formula_stats(&renamed, &variables);

    Ok(Preprocessed {
        formula: renamed,
        variables,
        graph,
        stats,
    })
}

fn rename_name(name: &str) -> String {
    if name.starts_with(INTERNAL_PREFIX) {
        format!("{}{}", RENAMED_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Prefix solver-internal `z3name!` artifacts with a stable marker
pub fn rename_internal(formula: &Expr) -> Expr {
    formula.rename_vars(&|name| {
        name.starts_with(INTERNAL_PREFIX)
            .then(|| format!("{}{}", RENAMED_PREFIX, name))
    })
}

/// Move every arithmetic term of a comparison to the left-hand side; the
/// right-hand side becomes the collected numeric constant
pub fn arith_lhs(formula: &Expr) -> Expr {
    match formula {
        Expr::And(args) => Expr::And(args.iter().map(arith_lhs).collect()),
        Expr::Or(args) => Expr::Or(args.iter().map(arith_lhs).collect()),
        Expr::Not(a) => Expr::not(arith_lhs(a)),
        Expr::Implies(a, b) => Expr::implies(arith_lhs(a), arith_lhs(b)),
        Expr::Ite(c, t, e) if t.sort() == Sort::Bool => {
            Expr::ite(arith_lhs(c), arith_lhs(t), arith_lhs(e))
        }
        Expr::Le(a, b) => normalize_comparison(formula, a, b, Expr::le),
        Expr::Lt(a, b) => normalize_comparison(formula, a, b, Expr::lt),
        Expr::Ge(a, b) => normalize_comparison(formula, a, b, Expr::ge),
        Expr::Gt(a, b) => normalize_comparison(formula, a, b, Expr::gt),
        Expr::Eq(a, b) if a.sort() == Sort::Int => {
            normalize_comparison(formula, a, b, Expr::eq)
        }
        Expr::Ne(a, b) if a.sort() == Sort::Int => {
            normalize_comparison(formula, a, b, Expr::ne)
        }
        _ => formula.clone(),
    }
}

fn normalize_comparison(
    original: &Expr,
    lhs: &Expr,
    rhs: &Expr,
    build: fn(Expr, Expr) -> Expr,
) -> Expr {
    let mut constant: i128 = 0;
    let mut terms = Vec::new();
    collect_addends(lhs, 1, &mut constant, &mut terms);
    collect_addends(rhs, -1, &mut constant, &mut terms);

    // lhs op rhs  <=>  sum(terms) op -constant
    let rhs_value = -constant;
    if i64::try_from(rhs_value).is_err() {
        return original.clone();
    }
    let new_rhs = Expr::Int(rhs_value as i64);
    match terms.len() {
        0 => {
            let holds = match original {
                Expr::Le(..) => 0 <= rhs_value,
                Expr::Lt(..) => 0 < rhs_value,
                Expr::Ge(..) => 0 >= rhs_value,
                Expr::Gt(..) => 0 > rhs_value,
                Expr::Eq(..) => 0 == rhs_value,
                _ => 0 != rhs_value,
            };
            Expr::Bool(holds)
        }
        1 => build(terms.into_iter().next().unwrap(), new_rhs),
        _ => build(Expr::Add(terms), new_rhs),
    }
}

fn collect_addends(term: &Expr, sign: i64, constant: &mut i128, terms: &mut Vec<Expr>) {
    match term {
        Expr::Int(v) => *constant += sign as i128 * *v as i128,
        Expr::Add(args) => {
            for arg in args {
                collect_addends(arg, sign, constant, terms);
            }
        }
        Expr::Sub(a, b) => {
            collect_addends(a, sign, constant, terms);
            collect_addends(b, -sign, constant, terms);
        }
        Expr::Neg(a) => collect_addends(a, -sign, constant, terms),
        other => {
            if let Some(v) = other.as_numeral() {
                *constant += sign as i128 * v as i128;
            } else if sign > 0 {
                terms.push(other.clone());
            } else {
                terms.push(Expr::neg(other.clone()));
            }
        }
    }
}

/// Rewrite `select(store(a,i,v), j)` into `ite(i=j, v, select(a,j))`,
/// folding the guard when it is decided syntactically
pub fn blast_select_store(formula: &Expr) -> Expr {
    let rebuilt = match formula {
        Expr::Int(_)
        | Expr::Bool(_)
        | Expr::IntVar(_)
        | Expr::BoolVar(_)
        | Expr::ArrayVar(_) => formula.clone(),
        Expr::Add(args) => Expr::Add(args.iter().map(blast_select_store).collect()),
        Expr::Mul(args) => Expr::Mul(args.iter().map(blast_select_store).collect()),
        Expr::And(args) => Expr::And(args.iter().map(blast_select_store).collect()),
        Expr::Or(args) => Expr::Or(args.iter().map(blast_select_store).collect()),
        Expr::Sub(a, b) => Expr::sub(blast_select_store(a), blast_select_store(b)),
        Expr::Neg(a) => Expr::neg(blast_select_store(a)),
        Expr::Not(a) => Expr::not(blast_select_store(a)),
        Expr::Select(a, i) => {
            return blast_select(blast_select_store(a), blast_select_store(i))
        }
        Expr::Store(a, i, v) => Expr::store(
            blast_select_store(a),
            blast_select_store(i),
            blast_select_store(v),
        ),
        Expr::Eq(a, b) => Expr::eq(blast_select_store(a), blast_select_store(b)),
        Expr::Ne(a, b) => Expr::ne(blast_select_store(a), blast_select_store(b)),
        Expr::Lt(a, b) => Expr::lt(blast_select_store(a), blast_select_store(b)),
        Expr::Le(a, b) => Expr::le(blast_select_store(a), blast_select_store(b)),
        Expr::Gt(a, b) => Expr::gt(blast_select_store(a), blast_select_store(b)),
        Expr::Ge(a, b) => Expr::ge(blast_select_store(a), blast_select_store(b)),
        Expr::Implies(a, b) => Expr::implies(blast_select_store(a), blast_select_store(b)),
        Expr::Ite(c, t, e) => Expr::ite(
            blast_select_store(c),
            blast_select_store(t),
            blast_select_store(e),
        ),
    };
    rebuilt
}

fn blast_select(array: Expr, index: Expr) -> Expr {
    match array {
        Expr::Store(base, write_index, value) => {
            if *write_index == index {
                return *value;
            }
            match (write_index.as_numeral(), index.as_numeral()) {
                (Some(_), Some(_)) => blast_select(*base, index),
                _ => Expr::ite(
                    Expr::eq(*write_index.clone(), index.clone()),
                    *value,
                    blast_select(*base, index),
                ),
            }
        }
        other => Expr::select(other, index),
    }
}

/// Negation normal form: negations pushed to atoms, `=>` and boolean `ite`
/// expanded, nested conjunctions and disjunctions flattened
pub fn to_nnf(formula: &Expr, polarity: bool) -> Expr {
    match formula {
        Expr::Not(a) => to_nnf(a, !polarity),
        Expr::And(args) => {
            let children: Vec<Expr> = args.iter().map(|a| to_nnf(a, polarity)).collect();
            if polarity {
                flatten_and(children)
            } else {
                flatten_or(children)
            }
        }
        Expr::Or(args) => {
            let children: Vec<Expr> = args.iter().map(|a| to_nnf(a, polarity)).collect();
            if polarity {
                flatten_or(children)
            } else {
                flatten_and(children)
            }
        }
        Expr::Implies(a, b) => {
            let expanded = Expr::Or(vec![Expr::not(a.as_ref().clone()), b.as_ref().clone()]);
            to_nnf(&expanded, polarity)
        }
        Expr::Ite(c, t, e) if t.sort() == Sort::Bool => {
            let expanded = Expr::And(vec![
                Expr::Or(vec![Expr::not(c.as_ref().clone()), t.as_ref().clone()]),
                Expr::Or(vec![c.as_ref().clone(), e.as_ref().clone()]),
            ]);
            to_nnf(&expanded, polarity)
        }
        atom => {
            if polarity {
                atom.clone()
            } else {
                negate_atom(atom)
            }
        }
    }
}

fn negate_atom(atom: &Expr) -> Expr {
    match atom {
        Expr::Bool(b) => Expr::Bool(!b),
        Expr::Lt(a, b) => Expr::ge(a.as_ref().clone(), b.as_ref().clone()),
        Expr::Le(a, b) => Expr::gt(a.as_ref().clone(), b.as_ref().clone()),
        Expr::Gt(a, b) => Expr::le(a.as_ref().clone(), b.as_ref().clone()),
        Expr::Ge(a, b) => Expr::lt(a.as_ref().clone(), b.as_ref().clone()),
        Expr::Eq(a, b) if a.sort() == Sort::Int => {
            Expr::ne(a.as_ref().clone(), b.as_ref().clone())
        }
        Expr::Ne(a, b) if a.sort() == Sort::Int => {
            Expr::eq(a.as_ref().clone(), b.as_ref().clone())
        }
        other => Expr::not(other.clone()),
    }
}

fn flatten_and(children: Vec<Expr>) -> Expr {
    let mut flat = Vec::new();
    for child in children {
        match child {
            Expr::And(inner) => flat.extend(inner),
            Expr::Bool(true) => {}
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expr::Bool(true),
        1 => flat.into_iter().next().unwrap(),
        _ => Expr::And(flat),
    }
}

fn flatten_or(children: Vec<Expr>) -> Expr {
    let mut flat = Vec::new();
    for child in children {
        match child {
            Expr::Or(inner) => flat.extend(inner),
            Expr::Bool(false) => {}
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expr::Bool(false),
        1 => flat.into_iter().next().unwrap(),
        _ => Expr::Or(flat),
    }
}

fn formula_stats(formula: &Expr, variables: &[(String, Sort)]) -> FormulaStats {
    let mut stats = FormulaStats::default();
    for (_, sort) in variables {
        match sort {
            Sort::Int => stats.num_ints += 1,
            Sort::Bool => stats.num_bools += 1,
            Sort::Array => stats.num_arrays += 1,
        }
    }
    formula.visit(&mut |_| stats.num_nodes += 1);
    stats.depth = depth_of(formula);
    stats
}

fn depth_of(formula: &Expr) -> usize {
    formula
        .children()
        .iter()
        .map(|c| depth_of(c))
        .max()
        .map_or(0, |d| d + 1)
}

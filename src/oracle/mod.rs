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

//! SMT oracle: the solver contract and an external-process implementation
//!
//! The engine only ever sees the `Oracle` trait and the `ConcreteModel` it
//! returns. `Z3Oracle` speaks SMT-LIB 2 to a `z3` child process; the model
//! answer is decoded with the shared S-expression reader.

use crate::error::SamplerError;
use crate::expr::{Expr, Sort};
use crate::smtlib::{parse_sexprs, SExpr, SExprKind};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::process::{Command, Stdio};

/// Default per-call solver timeout, in milliseconds
pub const SOLVER_TIMEOUT_MS: u64 = 50_000;

/// Outcome of a satisfiability query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

/// A finite integer function: explicit entries over a constant default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayFunc {
    pub entries: BTreeMap<i64, i64>,
    pub default: i64,
}

impl ArrayFunc {
    pub fn constant(default: i64) -> Self {
        Self {
            entries: BTreeMap::new(),
            default,
        }
    }

    pub fn get(&self, index: i64) -> i64 {
        self.entries.get(&index).copied().unwrap_or(self.default)
    }

    /// Drop entries equal to the default so structurally different
    /// store-chains with the same semantics compare equal
    fn normalized(mut self) -> Self {
        self.entries.retain(|_, v| *v != self.default);
        self
    }
}

/// A complete assignment returned by the solver
///
/// Evaluation is total: symbols the solver left out are completed with
/// default values (0, false, the constant-0 array), matching solver-side
/// model completion.
#[derive(Debug, Clone, Default)]
pub struct ConcreteModel {
    pub ints: HashMap<String, i64>,
    pub bools: HashMap<String, bool>,
    pub arrays: HashMap<String, ArrayFunc>,
}

impl ConcreteModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int_value(&self, name: &str) -> i64 {
        self.ints.get(name).copied().unwrap_or(0)
    }

    pub fn bool_value(&self, name: &str) -> bool {
        self.bools.get(name).copied().unwrap_or(false)
    }

    pub fn array_value(&self, name: &str, index: i64) -> i64 {
        self.arrays
            .get(name)
            .map(|f| f.get(index))
            .unwrap_or(0)
    }

    fn overflow(term: &Expr) -> SamplerError {
        SamplerError::EvalOverflow {
            term: term.to_string(),
        }
    }

    /// Total integer evaluation
    pub fn eval_int(&self, term: &Expr) -> Result<i64, SamplerError> {
        match term {
            Expr::Int(v) => Ok(*v),
            Expr::IntVar(name) => Ok(self.int_value(name)),
            Expr::Add(args) => {
                let mut sum: i64 = 0;
                for arg in args {
                    sum = sum
                        .checked_add(self.eval_int(arg)?)
                        .ok_or_else(|| Self::overflow(term))?;
                }
                Ok(sum)
            }
            Expr::Mul(args) => {
                let mut product: i64 = 1;
                for arg in args {
                    product = product
                        .checked_mul(self.eval_int(arg)?)
                        .ok_or_else(|| Self::overflow(term))?;
                }
                Ok(product)
            }
            Expr::Sub(a, b) => self
                .eval_int(a)?
                .checked_sub(self.eval_int(b)?)
                .ok_or_else(|| Self::overflow(term)),
            Expr::Neg(a) => self
                .eval_int(a)?
                .checked_neg()
                .ok_or_else(|| Self::overflow(term)),
            Expr::Select(array, index) => {
                let index = self.eval_int(index)?;
                self.eval_select(array, index)
            }
            Expr::Ite(cond, then_branch, else_branch) => {
                if self.eval_bool(cond)? {
                    self.eval_int(then_branch)
                } else {
                    self.eval_int(else_branch)
                }
            }
            other => Err(SamplerError::SortError {
                term: other.to_string(),
                expected: "integer".to_string(),
            }),
        }
    }

    fn eval_select(&self, array: &Expr, index: i64) -> Result<i64, SamplerError> {
        match array {
            Expr::ArrayVar(name) => Ok(self.array_value(name, index)),
            Expr::Store(base, write_index, value) => {
                if self.eval_int(write_index)? == index {
                    self.eval_int(value)
                } else {
                    self.eval_select(base, index)
                }
            }
            Expr::Ite(cond, then_branch, else_branch) => {
                if self.eval_bool(cond)? {
                    self.eval_select(then_branch, index)
                } else {
                    self.eval_select(else_branch, index)
                }
            }
            other => Err(SamplerError::SortError {
                term: other.to_string(),
                expected: "array".to_string(),
            }),
        }
    }

    /// The finite function denoted by an array-sorted term
    pub fn eval_array(&self, term: &Expr) -> Result<ArrayFunc, SamplerError> {
        match term {
            Expr::ArrayVar(name) => Ok(self
                .arrays
                .get(name)
                .cloned()
                .unwrap_or_default()),
            Expr::Store(base, index, value) => {
                let mut func = self.eval_array(base)?;
                func.entries
                    .insert(self.eval_int(index)?, self.eval_int(value)?);
                Ok(func)
            }
            Expr::Ite(cond, then_branch, else_branch) => {
                if self.eval_bool(cond)? {
                    self.eval_array(then_branch)
                } else {
                    self.eval_array(else_branch)
                }
            }
            other => Err(SamplerError::SortError {
                term: other.to_string(),
                expected: "array".to_string(),
            }),
        }
    }

    /// Total boolean evaluation
    pub fn eval_bool(&self, term: &Expr) -> Result<bool, SamplerError> {
        match term {
            Expr::Bool(b) => Ok(*b),
            Expr::BoolVar(name) => Ok(self.bool_value(name)),
            Expr::Not(a) => Ok(!self.eval_bool(a)?),
            Expr::And(args) => {
                for arg in args {
                    if !self.eval_bool(arg)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or(args) => {
                for arg in args {
                    if self.eval_bool(arg)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Implies(a, b) => Ok(!self.eval_bool(a)? || self.eval_bool(b)?),
            Expr::Lt(a, b) => Ok(self.eval_int(a)? < self.eval_int(b)?),
            Expr::Le(a, b) => Ok(self.eval_int(a)? <= self.eval_int(b)?),
            Expr::Gt(a, b) => Ok(self.eval_int(a)? > self.eval_int(b)?),
            Expr::Ge(a, b) => Ok(self.eval_int(a)? >= self.eval_int(b)?),
            Expr::Eq(a, b) => self.eval_equality(a, b),
            Expr::Ne(a, b) => Ok(!self.eval_equality(a, b)?),
            Expr::Ite(cond, then_branch, else_branch) => {
                if self.eval_bool(cond)? {
                    self.eval_bool(then_branch)
                } else {
                    self.eval_bool(else_branch)
                }
            }
            other => Err(SamplerError::SortError {
                term: other.to_string(),
                expected: "boolean".to_string(),
            }),
        }
    }

    fn eval_equality(&self, a: &Expr, b: &Expr) -> Result<bool, SamplerError> {
        match a.sort() {
            Sort::Int => Ok(self.eval_int(a)? == self.eval_int(b)?),
            Sort::Bool => Ok(self.eval_bool(a)? == self.eval_bool(b)?),
            Sort::Array => {
                Ok(self.eval_array(a)?.normalized() == self.eval_array(b)?.normalized())
            }
        }
    }
}

/// The solver contract used by the driver
///
/// `check` solves the current hard constraints together with any pending
/// soft constraints; `push`/`pop` scope both kinds.
pub trait Oracle {
    fn check(&mut self) -> Result<SatResult, SamplerError>;

    /// Model of the last `Sat` answer
    fn get_model(&self) -> Option<&ConcreteModel>;

    fn add_hard(&mut self, constraint: Expr);

    fn add_soft(&mut self, constraint: Expr, weight: u32);

    fn push(&mut self);

    fn pop(&mut self);
}

/// Oracle implementation backed by an external `z3` executable
pub struct Z3Oracle {
    path: String,
    timeout_ms: u64,
    declarations: Vec<(String, Sort)>,
    hard: Vec<Expr>,
    soft: Vec<(Expr, u32)>,
    frames: Vec<(usize, usize)>,
    last_model: Option<ConcreteModel>,
}

impl Z3Oracle {
    pub fn new(path: impl Into<String>, declarations: Vec<(String, Sort)>) -> Self {
        Self {
            path: path.into(),
            timeout_ms: SOLVER_TIMEOUT_MS,
            declarations,
            hard: Vec::new(),
            soft: Vec::new(),
            frames: Vec::new(),
            last_model: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The SMT-LIB script for the current constraint state
    fn script(&self) -> String {
        let mut out = String::new();
        out.push_str("(set-option :produce-models true)\n");
        out.push_str(&format!("(set-option :timeout {})\n", self.timeout_ms));
        for (name, sort) in &self.declarations {
            out.push_str(&format!("(declare-fun {} () {})\n", name, sort));
        }
        for constraint in &self.hard {
            out.push_str(&format!("(assert {})\n", constraint));
        }
        for (constraint, weight) in &self.soft {
            out.push_str(&format!("(assert-soft {} :weight {})\n", constraint, weight));
        }
        out.push_str("(check-sat)\n(get-model)\n");
        out
    }

    fn run_solver(&self, script: &str) -> Result<String, SamplerError> {
        let mut child = Command::new(&self.path)
            .arg("-smt2")
            .arg("-in")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SamplerError::SolverUnavailable {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        child
            .stdin
            .as_mut()
            .expect("stdin was piped")
            .write_all(script.as_bytes())?;
        let output = child.wait_with_output()?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Oracle for Z3Oracle {
    fn check(&mut self) -> Result<SatResult, SamplerError> {
        self.last_model = None;
        let response = self.run_solver(&self.script())?;
        let sexprs = parse_sexprs(&response, "<solver>").map_err(|e| {
            SamplerError::SolverFailure {
                reason: format!("unreadable solver response: {}", e),
            }
        })?;
        let verdict = sexprs
            .first()
            .and_then(|s| s.as_symbol())
            .ok_or_else(|| SamplerError::SolverFailure {
                reason: format!("no verdict in solver response: {}", response.trim()),
            })?;
        match verdict {
            "sat" => {
                let model_sexpr =
                    sexprs
                        .get(1)
                        .ok_or_else(|| SamplerError::SolverFailure {
                            reason: "sat answer without a model".to_string(),
                        })?;
                self.last_model = Some(decode_model(model_sexpr)?);
                Ok(SatResult::Sat)
            }
            "unsat" => Ok(SatResult::Unsat),
            "unknown" | "timeout" => Ok(SatResult::Unknown),
            other => Err(SamplerError::SolverFailure {
                reason: format!("unexpected solver verdict '{}'", other),
            }),
        }
    }

    fn get_model(&self) -> Option<&ConcreteModel> {
        self.last_model.as_ref()
    }

    fn add_hard(&mut self, constraint: Expr) {
        self.hard.push(constraint);
    }

    fn add_soft(&mut self, constraint: Expr, weight: u32) {
        self.soft.push((constraint, weight));
    }

    fn push(&mut self) {
        self.frames.push((self.hard.len(), self.soft.len()));
    }

    fn pop(&mut self) {
        if let Some((hard_len, soft_len)) = self.frames.pop() {
            self.hard.truncate(hard_len);
            self.soft.truncate(soft_len);
        }
    }
}

/// Decode the `(model ...)` / `(...)` answer of `get-model`
pub fn decode_model(sexpr: &SExpr) -> Result<ConcreteModel, SamplerError> {
    let mut items = sexpr
        .as_list()
        .ok_or_else(|| SamplerError::SolverFailure {
            reason: "model answer is not a list".to_string(),
        })?;
    // older solvers wrap the definitions in a leading `model` symbol
    if items.first().and_then(|i| i.as_symbol()) == Some("model") {
        items = &items[1..];
    }

    let mut defs: HashMap<String, &SExpr> = HashMap::new();
    let mut funcs: HashMap<String, &SExpr> = HashMap::new();
    let mut typed: Vec<(String, Sort, &SExpr)> = Vec::new();

    for item in items {
        let parts = match item.as_list() {
            Some(parts) if parts.len() == 5 => parts,
            _ => continue,
        };
        if parts[0].as_symbol() != Some("define-fun") {
            continue;
        }
        let name = match parts[1].as_symbol() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let params = parts[2].as_list().unwrap_or(&[]);
        if !params.is_empty() {
            // interpretation function referenced through as-array
            funcs.insert(name, &parts[4]);
            continue;
        }
        let sort = match crate::smtlib::parser::parse_sort(&parts[3]) {
            Ok(sort) => sort,
            Err(_) => continue,
        };
        defs.insert(name.clone(), &parts[4]);
        typed.push((name, sort, &parts[4]));
    }

    let mut model = ConcreteModel::new();
    for (name, sort, body) in typed {
        match sort {
            Sort::Int => {
                model.ints.insert(name, decode_int(body)?);
            }
            Sort::Bool => {
                model.bools.insert(name, decode_bool(body)?);
            }
            Sort::Array => {
                let func = decode_array(body, &defs, &funcs)?;
                model.arrays.insert(name, func);
            }
        }
    }
    Ok(model)
}

fn decode_failure(sexpr: &SExpr, expected: &str) -> SamplerError {
    SamplerError::SolverFailure {
        reason: format!("cannot decode model value (expected {}) at {}", expected, sexpr.location),
    }
}

fn decode_int(sexpr: &SExpr) -> Result<i64, SamplerError> {
    if let Some(v) = sexpr.as_numeral() {
        return Ok(v);
    }
    if let Some(items) = sexpr.as_list() {
        if items.len() == 2 && items[0].as_symbol() == Some("-") {
            return decode_int(&items[1])?
                .checked_neg()
                .ok_or_else(|| decode_failure(sexpr, "integer"));
        }
    }
    Err(decode_failure(sexpr, "integer"))
}

fn decode_bool(sexpr: &SExpr) -> Result<bool, SamplerError> {
    match sexpr.as_symbol() {
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        _ => Err(decode_failure(sexpr, "boolean")),
    }
}

fn decode_array(
    sexpr: &SExpr,
    defs: &HashMap<String, &SExpr>,
    funcs: &HashMap<String, &SExpr>,
) -> Result<ArrayFunc, SamplerError> {
    match &sexpr.kind {
        // an alias for another defined array constant
        SExprKind::Symbol(name) => match defs.get(name) {
            Some(body) => decode_array(body, defs, funcs),
            None => Err(decode_failure(sexpr, "array")),
        },
        SExprKind::List(items) => {
            let head = items.first();
            if let Some(head_symbol) = head.and_then(|h| h.as_symbol()) {
                match head_symbol {
                    "store" if items.len() == 4 => {
                        let mut func = decode_array(&items[1], defs, funcs)?;
                        func.entries
                            .insert(decode_int(&items[2])?, decode_int(&items[3])?);
                        return Ok(func);
                    }
                    "_" if items.len() == 3
                        && items[1].as_symbol() == Some("as-array") =>
                    {
                        let name = items[2]
                            .as_symbol()
                            .ok_or_else(|| decode_failure(sexpr, "function name"))?;
                        let body = funcs
                            .get(name)
                            .ok_or_else(|| decode_failure(sexpr, "function body"))?;
                        return decode_ite_chain(body);
                    }
                    "lambda" if items.len() == 3 => {
                        return decode_ite_chain(&items[2]);
                    }
                    _ => {}
                }
            }
            // ((as const (Array Int Int)) default)
            if items.len() == 2 {
                if let Some(as_parts) = items[0].as_list() {
                    if as_parts.first().and_then(|p| p.as_symbol()) == Some("as") {
                        return Ok(ArrayFunc::constant(decode_int(&items[1])?));
                    }
                }
            }
            Err(decode_failure(sexpr, "array"))
        }
        _ => Err(decode_failure(sexpr, "array")),
    }
}

/// `(ite (= x!0 i) v rest)` chains from function interpretations
fn decode_ite_chain(sexpr: &SExpr) -> Result<ArrayFunc, SamplerError> {
    if let Ok(default) = decode_int(sexpr) {
        return Ok(ArrayFunc::constant(default));
    }
    let items = sexpr
        .as_list()
        .ok_or_else(|| decode_failure(sexpr, "ite chain"))?;
    if items.len() != 4 || items[0].as_symbol() != Some("ite") {
        return Err(decode_failure(sexpr, "ite chain"));
    }
    let guard = items[1]
        .as_list()
        .filter(|g| g.len() == 3 && g[0].as_symbol() == Some("="))
        .ok_or_else(|| decode_failure(&items[1], "equality guard"))?;
    let index = decode_int(&guard[2])?;
    let value = decode_int(&items[2])?;
    let mut func = decode_ite_chain(&items[3])?;
    func.entries.insert(index, value);
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtlib::parse_sexprs;

    fn model_of(response: &str) -> ConcreteModel {
        let sexprs = parse_sexprs(response, "<test>").unwrap();
        decode_model(&sexprs[0]).unwrap()
    }

    #[test]
    fn test_decode_int_and_bool_values() {
        let model = model_of(
            "((define-fun x () Int 5)\n\
              (define-fun y () Int (- 3))\n\
              (define-fun b () Bool true))",
        );
        assert_eq!(model.int_value("x"), 5);
        assert_eq!(model.int_value("y"), -3);
        assert!(model.bool_value("b"));
    }

    #[test]
    fn test_decode_store_chain_array() {
        let model = model_of(
            "(model (define-fun a () (Array Int Int)\n\
               (store (store ((as const (Array Int Int)) 0) 1 5) 2 7)))",
        );
        assert_eq!(model.array_value("a", 1), 5);
        assert_eq!(model.array_value("a", 2), 7);
        assert_eq!(model.array_value("a", 99), 0);
    }

    #[test]
    fn test_decode_as_array_function() {
        let model = model_of(
            "((define-fun a () (Array Int Int) (_ as-array k!0))\n\
              (define-fun k!0 ((x!0 Int)) Int (ite (= x!0 1) 5 7)))",
        );
        assert_eq!(model.array_value("a", 1), 5);
        assert_eq!(model.array_value("a", 3), 7);
    }

    #[test]
    fn test_eval_int_expressions() {
        let mut model = ConcreteModel::new();
        model.ints.insert("x".to_string(), 3);
        model.ints.insert("y".to_string(), -2);
        let e = Expr::add(vec![
            Expr::int_var("x"),
            Expr::mul(vec![Expr::Int(4), Expr::int_var("y")]),
        ]);
        assert_eq!(model.eval_int(&e).unwrap(), -5);
        // completion: missing symbols evaluate to zero
        assert_eq!(model.eval_int(&Expr::int_var("z")).unwrap(), 0);
    }

    #[test]
    fn test_eval_select_through_stores() {
        let mut model = ConcreteModel::new();
        model.ints.insert("i".to_string(), 1);
        let term = Expr::select(
            Expr::store(Expr::array_var("a"), Expr::int_var("i"), Expr::Int(9)),
            Expr::Int(1),
        );
        assert_eq!(model.eval_int(&term).unwrap(), 9);
    }

    #[test]
    fn test_eval_array_equality_modulo_defaults() {
        let mut model = ConcreteModel::new();
        model.arrays.insert("a".to_string(), ArrayFunc::constant(0));
        // store a value equal to the default: still equal to the plain array
        let lhs = Expr::store(Expr::array_var("a"), Expr::Int(3), Expr::Int(0));
        let eq = Expr::eq(lhs, Expr::array_var("a"));
        assert!(model.eval_bool(&eq).unwrap());
    }

    #[test]
    fn test_eval_overflow_is_reported() {
        let mut model = ConcreteModel::new();
        model.ints.insert("x".to_string(), i64::MAX);
        let e = Expr::add(vec![Expr::int_var("x"), Expr::Int(1)]);
        assert!(matches!(
            model.eval_int(&e),
            Err(SamplerError::EvalOverflow { .. })
        ));
    }

    #[test]
    fn test_push_pop_scopes_constraints() {
        let mut oracle = Z3Oracle::new("z3", vec![("x".to_string(), Sort::Int)]);
        oracle.add_hard(Expr::ge(Expr::int_var("x"), Expr::Int(0)));
        oracle.push();
        oracle.add_hard(Expr::le(Expr::int_var("x"), Expr::Int(5)));
        oracle.add_soft(Expr::eq(Expr::int_var("x"), Expr::Int(3)), 1);
        assert!(oracle.script().contains("assert-soft"));
        oracle.pop();
        let script = oracle.script();
        assert!(script.contains("(assert (>= x 0))"));
        assert!(!script.contains("(<= x 5)"));
        assert!(!script.contains("assert-soft"));
    }
}

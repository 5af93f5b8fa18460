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

//! Per-draw sample store
//!
//! A partial assignment built up while one sample is drawn: integers per
//! name, sparse index -> value maps per array name. Writes are monotone
//! within one sample; a second write to the same slot is refused so the
//! caller can detect clashes.

use crate::expr::{Expr, Sort};
use crate::oracle::ConcreteModel;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Model {
    ints: BTreeMap<String, i64>,
    arrays: BTreeMap<String, BTreeMap<i64, i64>>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the variable was not previously assigned
    pub fn add_int_assignment(&mut self, var: &str, value: i64) -> bool {
        if self.ints.contains_key(var) {
            return false;
        }
        self.ints.insert(var.to_string(), value);
        true
    }

    /// True iff array[index] was not previously assigned
    pub fn add_array_assignment(&mut self, array: &str, index: i64, value: i64) -> bool {
        let cells = self.arrays.entry(array.to_string()).or_default();
        if cells.contains_key(&index) {
            return false;
        }
        cells.insert(index, value);
        true
    }

    pub fn eval_int_var(&self, var: &str) -> Option<i64> {
        self.ints.get(var).copied()
    }

    pub fn eval_array_var(&self, array: &str, index: i64) -> Option<i64> {
        self.arrays.get(array)?.get(&index).copied()
    }

    /// Partial integer evaluation; `None` when an unassigned variable or
    /// array cell is reached, or the arithmetic overflows
    pub fn eval_int(&self, term: &Expr) -> Option<i64> {
        match term {
            Expr::Int(v) => Some(*v),
            Expr::IntVar(name) => self.eval_int_var(name),
            Expr::Add(args) => {
                let mut sum: i64 = 0;
                for arg in args {
                    sum = sum.checked_add(self.eval_int(arg)?)?;
                }
                Some(sum)
            }
            Expr::Mul(args) => {
                let mut product: i64 = 1;
                for arg in args {
                    product = product.checked_mul(self.eval_int(arg)?)?;
                }
                Some(product)
            }
            Expr::Sub(a, b) => self.eval_int(a)?.checked_sub(self.eval_int(b)?),
            Expr::Neg(a) => self.eval_int(a)?.checked_neg(),
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
            _ => None,
        }
    }

    fn eval_select(&self, array: &Expr, index: i64) -> Option<i64> {
        match array {
            Expr::ArrayVar(name) => self.eval_array_var(name, index),
            Expr::Store(base, write_index, value) => {
                if self.eval_int(write_index)? == index {
                    self.eval_int(value)
                } else {
                    self.eval_select(base, index)
                }
            }
            _ => None,
        }
    }

    fn eval_bool(&self, term: &Expr) -> Option<bool> {
        match term {
            Expr::Bool(b) => Some(*b),
            Expr::Not(a) => Some(!self.eval_bool(a)?),
            Expr::Lt(a, b) => Some(self.eval_int(a)? < self.eval_int(b)?),
            Expr::Le(a, b) => Some(self.eval_int(a)? <= self.eval_int(b)?),
            Expr::Gt(a, b) => Some(self.eval_int(a)? > self.eval_int(b)?),
            Expr::Ge(a, b) => Some(self.eval_int(a)? >= self.eval_int(b)?),
            Expr::Eq(a, b) if a.sort() == Sort::Int => {
                Some(self.eval_int(a)? == self.eval_int(b)?)
            }
            Expr::Ne(a, b) if a.sort() == Sort::Int => {
                Some(self.eval_int(a)? != self.eval_int(b)?)
            }
            _ => None,
        }
    }

    /// Integer evaluation that completes missing variables and array cells
    /// from the epoch's seed model, recording each completion in the store.
    pub fn eval_int_completing(&mut self, term: &Expr, seed: &ConcreteModel) -> Option<i64> {
        match term {
            Expr::Int(v) => Some(*v),
            Expr::IntVar(name) => {
                if let Some(value) = self.eval_int_var(name) {
                    return Some(value);
                }
                let value = seed.int_value(name);
                self.add_int_assignment(name, value);
                Some(value)
            }
            Expr::Add(args) => {
                let mut sum: i64 = 0;
                for arg in args {
                    sum = sum.checked_add(self.eval_int_completing(arg, seed)?)?;
                }
                Some(sum)
            }
            Expr::Mul(args) => {
                let mut product: i64 = 1;
                for arg in args {
                    product = product.checked_mul(self.eval_int_completing(arg, seed)?)?;
                }
                Some(product)
            }
            Expr::Sub(a, b) => self
                .eval_int_completing(a, seed)?
                .checked_sub(self.eval_int_completing(b, seed)?),
            Expr::Neg(a) => self.eval_int_completing(a, seed)?.checked_neg(),
            Expr::Select(array, index) => {
                let index = self.eval_int_completing(index, seed)?;
                match array.as_ref() {
                    Expr::ArrayVar(name) => {
                        if let Some(value) = self.eval_array_var(name, index) {
                            return Some(value);
                        }
                        let value = seed.array_value(name, index);
                        self.add_array_assignment(name, index, value);
                        Some(value)
                    }
                    _ => None,
                }
            }
            Expr::Ite(cond, then_branch, else_branch) => {
                if self.eval_bool_completing(cond, seed)? {
                    self.eval_int_completing(then_branch, seed)
                } else {
                    self.eval_int_completing(else_branch, seed)
                }
            }
            _ => None,
        }
    }

    fn eval_bool_completing(&mut self, term: &Expr, seed: &ConcreteModel) -> Option<bool> {
        match term {
            Expr::Bool(b) => Some(*b),
            Expr::BoolVar(name) => Some(seed.bool_value(name)),
            Expr::Not(a) => Some(!self.eval_bool_completing(a, seed)?),
            Expr::Lt(a, b) => {
                Some(self.eval_int_completing(a, seed)? < self.eval_int_completing(b, seed)?)
            }
            Expr::Le(a, b) => {
                Some(self.eval_int_completing(a, seed)? <= self.eval_int_completing(b, seed)?)
            }
            Expr::Gt(a, b) => {
                Some(self.eval_int_completing(a, seed)? > self.eval_int_completing(b, seed)?)
            }
            Expr::Ge(a, b) => {
                Some(self.eval_int_completing(a, seed)? >= self.eval_int_completing(b, seed)?)
            }
            Expr::Eq(a, b) if a.sort() == Sort::Int => {
                Some(self.eval_int_completing(a, seed)? == self.eval_int_completing(b, seed)?)
            }
            Expr::Ne(a, b) if a.sort() == Sort::Int => {
                Some(self.eval_int_completing(a, seed)? != self.eval_int_completing(b, seed)?)
            }
            _ => None,
        }
    }

    /// Canonical one-line form: integer variables in declared order, then
    /// array cells per declared array in ascending index order.
    pub fn to_line(&self, declarations: &[(String, Sort)]) -> String {
        let mut parts = Vec::new();
        for (name, sort) in declarations {
            if *sort == Sort::Int {
                if let Some(value) = self.ints.get(name) {
                    parts.push(format!("{}:{}", name, value));
                }
            }
        }
        for (name, sort) in declarations {
            if *sort == Sort::Array {
                if let Some(cells) = self.arrays.get(name) {
                    for (index, value) in cells {
                        parts.push(format!("{}[{}]:{}", name, index, value));
                    }
                }
            }
        }
        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_are_monotone() {
        let mut model = Model::new();
        assert!(model.add_int_assignment("x", 1));
        assert!(!model.add_int_assignment("x", 2));
        assert_eq!(model.eval_int_var("x"), Some(1));

        assert!(model.add_array_assignment("a", 0, 5));
        assert!(!model.add_array_assignment("a", 0, 6));
        assert!(model.add_array_assignment("a", 1, 6));
        assert_eq!(model.eval_array_var("a", 0), Some(5));
    }

    #[test]
    fn test_partial_eval_stops_at_unassigned() {
        let mut model = Model::new();
        model.add_int_assignment("x", 4);
        let known = Expr::add(vec![Expr::int_var("x"), Expr::Int(1)]);
        let unknown = Expr::add(vec![Expr::int_var("y"), Expr::Int(1)]);
        assert_eq!(model.eval_int(&known), Some(5));
        assert_eq!(model.eval_int(&unknown), None);
    }

    #[test]
    fn test_completion_pulls_from_seed_and_records() {
        let mut seed = ConcreteModel::new();
        seed.ints.insert("i".to_string(), 2);
        let mut model = Model::new();
        let value = model.eval_int_completing(&Expr::int_var("i"), &seed);
        assert_eq!(value, Some(2));
        // the completion is now a committed part of the sample
        assert_eq!(model.eval_int_var("i"), Some(2));
    }

    #[test]
    fn test_to_line_uses_declaration_order() {
        let declarations = vec![
            ("y".to_string(), Sort::Int),
            ("x".to_string(), Sort::Int),
            ("a".to_string(), Sort::Array),
        ];
        let mut model = Model::new();
        model.add_int_assignment("x", 1);
        model.add_int_assignment("y", -2);
        model.add_array_assignment("a", 3, 7);
        model.add_array_assignment("a", 0, 5);
        assert_eq!(model.to_line(&declarations), "y:-2;x:1;a[0]:5;a[3]:7");
    }
}

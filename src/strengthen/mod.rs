//! Literal strengthening
//!
//! Turns each implicant literal into interval tightenings over integer
//! variables and select-terms, under the concrete values of the epoch's
//! seed model. Every rule produces bounds entailed by the literal given the
//! observed sign pattern, so any point drawn from the resulting box
//! satisfies the literal. Literals no rule covers are skipped and counted;
//! the box stays sound, only looser.

use crate::error::{SamplerError, StrengthenError};
use crate::expr::Expr;
use crate::interval::IntervalMap;
use crate::oracle::ConcreteModel;
use log::debug;
use std::collections::HashMap;

/// Normalized comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Le,
    Ge,
    Eq,
}

fn reverse(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Ge => CmpOp::Le,
        CmpOp::Eq => CmpOp::Eq,
    }
}

/// Result of strengthening a literal list
#[derive(Debug)]
pub struct StrengthenOutcome {
    pub map: IntervalMap,
    /// Literals skipped because no rule covered them
    pub skipped: usize,
}

/// Strengthen every literal; unsupported literals are skipped per literal
pub fn strengthen(literals: &[Expr], seed: &ConcreteModel) -> StrengthenOutcome {
    let mut strengthener = Strengthener::new(seed);
    let mut skipped = 0;
    for literal in literals {
        debug!("strengthening literal: {}", literal);
        if let Err(reason) = strengthener.literal(literal) {
            debug!("skipping literal {}: {}", literal, reason);
            skipped += 1;
        }
    }
    StrengthenOutcome {
        map: strengthener.map,
        skipped,
    }
}

struct Strengthener<'a> {
    seed: &'a ConcreteModel,
    map: IntervalMap,
    /// array name -> concrete index value -> index expressions that alias
    /// the same cell under the seed model
    classes: HashMap<String, HashMap<i64, Vec<Expr>>>,
}

impl<'a> Strengthener<'a> {
    fn new(seed: &'a ConcreteModel) -> Self {
        Self {
            seed,
            map: IntervalMap::new(),
            classes: HashMap::new(),
        }
    }

    fn eval(&self, term: &Expr) -> Result<i64, StrengthenError> {
        self.seed.eval_int(term).map_err(|e| match e {
            SamplerError::EvalOverflow { .. } => StrengthenError::Overflow,
            _ => StrengthenError::NoRuleForStrengthening,
        })
    }

    fn literal(&mut self, literal: &Expr) -> Result<(), StrengthenError> {
        match literal {
            // boolean constants and variables carry no interval information
            Expr::Bool(_) | Expr::BoolVar(_) => Ok(()),
            Expr::Not(arg) => match arg.as_ref() {
                Expr::Bool(_) | Expr::BoolVar(_) => Ok(()),
                other => self.literal(&negate_condition(other)?),
            },
            Expr::Ne(lhs, rhs) => {
                // resolve the disequality to the strict side the model took
                if self.eval(lhs)? < self.eval(rhs)? {
                    self.literal(&Expr::lt(lhs.as_ref().clone(), rhs.as_ref().clone()))
                } else {
                    self.literal(&Expr::gt(lhs.as_ref().clone(), rhs.as_ref().clone()))
                }
            }
            Expr::Lt(lhs, rhs) => {
                let bound = self.eval(rhs)?.checked_sub(1).ok_or(StrengthenError::Overflow)?;
                self.enter(lhs, bound, CmpOp::Le)
            }
            Expr::Gt(lhs, rhs) => {
                let bound = self.eval(rhs)?.checked_add(1).ok_or(StrengthenError::Overflow)?;
                self.enter(lhs, bound, CmpOp::Ge)
            }
            Expr::Le(lhs, rhs) => {
                let bound = self.eval(rhs)?;
                self.enter(lhs, bound, CmpOp::Le)
            }
            Expr::Ge(lhs, rhs) => {
                let bound = self.eval(rhs)?;
                self.enter(lhs, bound, CmpOp::Ge)
            }
            Expr::Eq(lhs, rhs) => {
                let bound = self.eval(rhs)?;
                self.enter(lhs, bound, CmpOp::Eq)
            }
            _ => Err(StrengthenError::NoRuleForStrengthening),
        }
    }

    fn enter(&mut self, lhs: &Expr, rhs_value: i64, op: CmpOp) -> Result<(), StrengthenError> {
        let lhs_value = self.eval(lhs)?;
        self.comparison(lhs, lhs_value, rhs_value, op)
    }

    /// Dispatch on the shape of the left-hand side
    fn comparison(
        &mut self,
        lhs: &Expr,
        lhs_value: i64,
        rhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        if lhs.as_numeral().is_some() {
            return Ok(());
        }
        match lhs {
            Expr::IntVar(_) | Expr::Select(..) => self.add_interval_wrapper(lhs, rhs_value, op),
            Expr::Neg(arg) => {
                let arg_value = lhs_value.checked_neg().ok_or(StrengthenError::Overflow)?;
                let bound = rhs_value.checked_neg().ok_or(StrengthenError::Overflow)?;
                self.comparison(arg, arg_value, bound, reverse(op))
            }
            Expr::Add(args) => self.addition(args, lhs_value, rhs_value, op),
            Expr::Sub(a, b) => {
                let as_sum = Expr::Add(vec![a.as_ref().clone(), Expr::neg(b.as_ref().clone())]);
                self.comparison(&as_sum, lhs_value, rhs_value, op)
            }
            Expr::Mul(args) => self.multiplication(args, lhs_value, rhs_value, op),
            _ => Err(StrengthenError::NoRuleForStrengthening),
        }
    }

    fn addition(
        &mut self,
        args: &[Expr],
        lhs_value: i64,
        rhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        let mut constants_sum: i64 = 0;
        let mut constants_count = 0usize;
        let mut others: Vec<(&Expr, i64)> = Vec::new();
        for arg in args {
            if let Some(v) = arg.as_numeral() {
                constants_sum = constants_sum
                    .checked_add(v)
                    .ok_or(StrengthenError::Overflow)?;
                constants_count += 1;
            } else {
                others.push((arg, self.eval(arg)?));
            }
        }

        if constants_count > 0 {
            if others.is_empty() {
                return Ok(());
            }
            let new_rhs = rhs_value
                .checked_sub(constants_sum)
                .ok_or(StrengthenError::Overflow)?;
            let new_lhs_value = lhs_value
                .checked_sub(constants_sum)
                .ok_or(StrengthenError::Overflow)?;
            if others.len() == 1 {
                return self.comparison(others[0].0, others[0].1, new_rhs, op);
            }
            let sum = Expr::Add(others.iter().map(|(e, _)| (*e).clone()).collect());
            return self.comparison(&sum, new_lhs_value, new_rhs, op);
        }

        match op {
            CmpOp::Eq => {
                for (arg, value) in others {
                    self.comparison(arg, value, value, CmpOp::Eq)?;
                }
                Ok(())
            }
            CmpOp::Le => {
                // distribute the slack rhs - lhs across the addends
                let diff = rhs_value
                    .checked_sub(lhs_value)
                    .ok_or(StrengthenError::Overflow)?;
                debug_assert!(diff >= 0);
                let count = others.len() as i64;
                let base = diff / count;
                let extra = diff % count;
                for (i, (arg, value)) in others.iter().enumerate() {
                    let share = base + if (i as i64) < extra { 1 } else { 0 };
                    let bound = value.checked_add(share).ok_or(StrengthenError::Overflow)?;
                    self.comparison(arg, *value, bound, CmpOp::Le)?;
                }
                Ok(())
            }
            CmpOp::Ge => {
                let diff = lhs_value
                    .checked_sub(rhs_value)
                    .ok_or(StrengthenError::Overflow)?;
                debug_assert!(diff >= 0);
                let count = others.len() as i64;
                let base = diff / count;
                let extra = diff % count;
                for (i, (arg, value)) in others.iter().enumerate() {
                    let share = base + if (i as i64) < extra { 1 } else { 0 };
                    let bound = value.checked_sub(share).ok_or(StrengthenError::Overflow)?;
                    self.comparison(arg, *value, bound, CmpOp::Ge)?;
                }
                Ok(())
            }
        }
    }

    fn multiplication(
        &mut self,
        args: &[Expr],
        lhs_value: i64,
        rhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        let mut constants_product: i64 = 1;
        let mut constants_count = 0usize;
        let mut others: Vec<(&Expr, i64)> = Vec::new();
        let mut others_product: i64 = 1;
        for arg in args {
            if let Some(v) = arg.as_numeral() {
                constants_product = constants_product
                    .checked_mul(v)
                    .ok_or(StrengthenError::Overflow)?;
                constants_count += 1;
            } else {
                let value = self.eval(arg)?;
                others_product = others_product
                    .checked_mul(value)
                    .ok_or(StrengthenError::Overflow)?;
                others.push((arg, value));
            }
        }

        if constants_count > 0 {
            if others.is_empty() {
                return Ok(());
            }
            let product = if others.len() == 1 {
                others[0].0.clone()
            } else {
                Expr::Mul(others.iter().map(|(e, _)| (*e).clone()).collect())
            };
            self.mul_by_constant(&product, others_product, constants_product, rhs_value, op)
        } else {
            self.mul_without_constants(&others, lhs_value, op)
        }
    }

    fn mul_by_constant(
        &mut self,
        factor: &Expr,
        factor_value: i64,
        constant: i64,
        rhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        if constant == 0 {
            // 0 * e op rhs restricts nothing
            return Ok(());
        }
        let op = if constant < 0 { reverse(op) } else { op };
        let mut new_rhs = rhs_value / constant;
        let remainder = rhs_value % constant;
        if op == CmpOp::Eq {
            // equality survives division only when it is exact
            if remainder != 0 {
                return Ok(());
            }
            return self.comparison(factor, factor_value, new_rhs, CmpOp::Eq);
        }
        // correct the truncated quotient toward the safe side
        let rounded_down = ((rhs_value >= 0) ^ (constant < 0)) && remainder != 0;
        let rounded_up = !((rhs_value >= 0) ^ (constant < 0)) && remainder != 0;
        if rounded_down && op == CmpOp::Ge {
            new_rhs = new_rhs.checked_add(1).ok_or(StrengthenError::Overflow)?;
        }
        if rounded_up && op == CmpOp::Le {
            new_rhs = new_rhs.checked_sub(1).ok_or(StrengthenError::Overflow)?;
        }
        self.comparison(factor, factor_value, new_rhs, op)
    }

    /// Pin each factor between zero and its observed value (or its value
    /// and infinity) so the product keeps its sign pattern and its
    /// magnitude ordering relative to the bound
    fn mul_without_constants(
        &mut self,
        factors: &[(&Expr, i64)],
        lhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        if op == CmpOp::Eq {
            for (factor, value) in factors {
                self.comparison(factor, *value, *value, CmpOp::Eq)?;
            }
            return Ok(());
        }
        let shrink = (op == CmpOp::Le && lhs_value >= 0) || (op == CmpOp::Ge && lhs_value <= 0);
        let grow = (op == CmpOp::Le && lhs_value <= 0) || (op == CmpOp::Ge && lhs_value >= 0);
        if shrink {
            for (factor, value) in factors {
                if *value >= 0 {
                    self.comparison(factor, *value, *value, CmpOp::Le)?;
                    self.comparison(factor, *value, 0, CmpOp::Ge)?;
                } else {
                    self.comparison(factor, *value, *value, CmpOp::Ge)?;
                    self.comparison(factor, *value, 0, CmpOp::Le)?;
                }
            }
            Ok(())
        } else if grow {
            for (factor, value) in factors {
                if *value >= 0 {
                    self.comparison(factor, *value, *value, CmpOp::Ge)?;
                } else {
                    self.comparison(factor, *value, *value, CmpOp::Le)?;
                }
            }
            Ok(())
        } else {
            Err(StrengthenError::NoRuleForStrengthening)
        }
    }

    /// Atom-level update. Select-terms that alias the same concrete cell
    /// share one interval through the equivalence class of their indices.
    fn add_interval_wrapper(
        &mut self,
        lhs: &Expr,
        rhs_value: i64,
        op: CmpOp,
    ) -> Result<(), StrengthenError> {
        let (array, index) = match lhs {
            Expr::Select(array, index) => (array, index),
            Expr::IntVar(_) => {
                self.add_interval(lhs.clone(), rhs_value, op);
                return Ok(());
            }
            _ => return Err(StrengthenError::NoRuleForStrengthening),
        };
        let array_name = match array.as_ref() {
            Expr::ArrayVar(name) => name.clone(),
            _ => return Err(StrengthenError::NoRuleForStrengthening),
        };
        let index_value = self.eval(index)?;

        let class = self
            .classes
            .entry(array_name)
            .or_default()
            .entry(index_value)
            .or_default();
        let is_member = class.contains(index);
        let first_member = class.first().cloned();
        if !is_member {
            class.push(index.as_ref().clone());
        }
        let members = class.clone();

        if let (false, Some(member)) = (is_member, first_member) {
            // a known alias for this cell: start from its interval
            let alias_key = Expr::select(array.as_ref().clone(), member);
            let interval = self.map.get(&alias_key).copied().unwrap_or_default();
            self.map.insert(lhs.clone(), interval);
        }
        for member in members {
            let key = Expr::select(array.as_ref().clone(), member);
            self.add_interval(key, rhs_value, op);
        }
        Ok(())
    }

    fn add_interval(&mut self, key: Expr, rhs_value: i64, op: CmpOp) {
        let interval = self.map.entry(key);
        match op {
            CmpOp::Ge => interval.set_lower_bound(rhs_value),
            CmpOp::Le => interval.set_upper_bound(rhs_value),
            CmpOp::Eq => {
                interval.set_lower_bound(rhs_value);
                interval.set_upper_bound(rhs_value);
            }
        }
    }
}

fn negate_condition(condition: &Expr) -> Result<Expr, StrengthenError> {
    match condition {
        Expr::Le(a, b) => Ok(Expr::gt(a.as_ref().clone(), b.as_ref().clone())),
        Expr::Lt(a, b) => Ok(Expr::ge(a.as_ref().clone(), b.as_ref().clone())),
        Expr::Ge(a, b) => Ok(Expr::lt(a.as_ref().clone(), b.as_ref().clone())),
        Expr::Gt(a, b) => Ok(Expr::le(a.as_ref().clone(), b.as_ref().clone())),
        Expr::Eq(a, b) => Ok(Expr::ne(a.as_ref().clone(), b.as_ref().clone())),
        Expr::Ne(a, b) => Ok(Expr::eq(a.as_ref().clone(), b.as_ref().clone())),
        _ => Err(StrengthenError::NoRuleForStrengthening),
    }
}

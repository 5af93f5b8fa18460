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

//! Expression trees over linear integer arithmetic with arrays
//!
//! Immutable tagged trees with structural equality and hashing, so an
//! expression can key a hash map directly. Rendering follows SMT-LIB 2
//! concrete syntax, which doubles as the stable string form used for
//! adjacency keys and deterministic orderings.

use std::fmt;

/// Sort of an expression: the three sorts the engine handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Int,
    Bool,
    /// Arrays are always Int -> Int
    Array,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "Int"),
            Sort::Bool => write!(f, "Bool"),
            Sort::Array => write!(f, "(Array Int Int)"),
        }
    }
}

/// An expression over LIA + arrays
///
/// `Add`, `Mul`, `And` and `Or` are n-ary like their SMT-LIB counterparts;
/// everything else is unary or binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Integer constant
    Int(i64),

    /// Boolean constant
    Bool(bool),

    /// Integer variable
    IntVar(String),

    /// Boolean variable
    BoolVar(String),

    /// Array variable (Int -> Int)
    ArrayVar(String),

    /// n-ary addition
    Add(Vec<Expr>),

    /// n-ary multiplication
    Mul(Vec<Expr>),

    /// Binary subtraction
    Sub(Box<Expr>, Box<Expr>),

    /// Unary minus
    Neg(Box<Expr>),

    /// Array read
    Select(Box<Expr>, Box<Expr>),

    /// Array write
    Store(Box<Expr>, Box<Expr>, Box<Expr>),

    /// Equality (int or array sides)
    Eq(Box<Expr>, Box<Expr>),

    /// Disequality
    Ne(Box<Expr>, Box<Expr>),

    /// Comparisons over integers
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),

    /// n-ary conjunction
    And(Vec<Expr>),

    /// n-ary disjunction
    Or(Vec<Expr>),

    /// Negation
    Not(Box<Expr>),

    /// Implication
    Implies(Box<Expr>, Box<Expr>),

    /// If-then-else (branches of any one sort)
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn int_var(name: impl Into<String>) -> Self {
        Expr::IntVar(name.into())
    }

    pub fn bool_var(name: impl Into<String>) -> Self {
        Expr::BoolVar(name.into())
    }

    pub fn array_var(name: impl Into<String>) -> Self {
        Expr::ArrayVar(name.into())
    }

    pub fn add(args: Vec<Expr>) -> Self {
        Expr::Add(args)
    }

    pub fn mul(args: Vec<Expr>) -> Self {
        Expr::Mul(args)
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Sub(Box::new(a), Box::new(b))
    }

    pub fn neg(a: Expr) -> Self {
        Expr::Neg(Box::new(a))
    }

    pub fn select(array: Expr, index: Expr) -> Self {
        Expr::Select(Box::new(array), Box::new(index))
    }

    pub fn store(array: Expr, index: Expr, value: Expr) -> Self {
        Expr::Store(Box::new(array), Box::new(index), Box::new(value))
    }

    pub fn eq(a: Expr, b: Expr) -> Self {
        Expr::Eq(Box::new(a), Box::new(b))
    }

    pub fn ne(a: Expr, b: Expr) -> Self {
        Expr::Ne(Box::new(a), Box::new(b))
    }

    pub fn lt(a: Expr, b: Expr) -> Self {
        Expr::Lt(Box::new(a), Box::new(b))
    }

    pub fn le(a: Expr, b: Expr) -> Self {
        Expr::Le(Box::new(a), Box::new(b))
    }

    pub fn gt(a: Expr, b: Expr) -> Self {
        Expr::Gt(Box::new(a), Box::new(b))
    }

    pub fn ge(a: Expr, b: Expr) -> Self {
        Expr::Ge(Box::new(a), Box::new(b))
    }

    pub fn and(args: Vec<Expr>) -> Self {
        Expr::And(args)
    }

    pub fn or(args: Vec<Expr>) -> Self {
        Expr::Or(args)
    }

    pub fn not(a: Expr) -> Self {
        Expr::Not(Box::new(a))
    }

    pub fn implies(a: Expr, b: Expr) -> Self {
        Expr::Implies(Box::new(a), Box::new(b))
    }

    pub fn ite(cond: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Expr::Ite(Box::new(cond), Box::new(then_branch), Box::new(else_branch))
    }

    /// Sort of this expression
    pub fn sort(&self) -> Sort {
        match self {
            Expr::Int(_)
            | Expr::IntVar(_)
            | Expr::Add(_)
            | Expr::Mul(_)
            | Expr::Sub(..)
            | Expr::Neg(_)
            | Expr::Select(..) => Sort::Int,
            Expr::Bool(_)
            | Expr::BoolVar(_)
            | Expr::Eq(..)
            | Expr::Ne(..)
            | Expr::Lt(..)
            | Expr::Le(..)
            | Expr::Gt(..)
            | Expr::Ge(..)
            | Expr::And(_)
            | Expr::Or(_)
            | Expr::Not(_)
            | Expr::Implies(..) => Sort::Bool,
            Expr::ArrayVar(_) | Expr::Store(..) => Sort::Array,
            Expr::Ite(_, then_branch, _) => then_branch.sort(),
        }
    }

    /// Integer value if this is a numeral, possibly under a chain of
    /// unary minuses
    pub fn as_numeral(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            Expr::Neg(inner) => inner.as_numeral().and_then(i64::checked_neg),
            _ => None,
        }
    }

    pub fn as_bool_const(&self) -> Option<bool> {
        match self {
            Expr::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of a variable of any sort
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::IntVar(n) | Expr::BoolVar(n) | Expr::ArrayVar(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        self.var_name().is_some()
    }

    /// True for an equality whose two sides are array-sorted
    pub fn is_array_equality(&self) -> bool {
        match self {
            Expr::Eq(a, b) => a.sort() == Sort::Array && b.sort() == Sort::Array,
            _ => false,
        }
    }

    /// True for a comparison atom over integer sides
    pub fn is_int_comparison(&self) -> bool {
        match self {
            Expr::Lt(a, _) | Expr::Le(a, _) | Expr::Gt(a, _) | Expr::Ge(a, _) => {
                a.sort() == Sort::Int
            }
            Expr::Eq(a, _) | Expr::Ne(a, _) => a.sort() == Sort::Int,
            _ => false,
        }
    }

    /// Immediate children, in operand order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Int(_)
            | Expr::Bool(_)
            | Expr::IntVar(_)
            | Expr::BoolVar(_)
            | Expr::ArrayVar(_) => Vec::new(),
            Expr::Add(args) | Expr::Mul(args) | Expr::And(args) | Expr::Or(args) => {
                args.iter().collect()
            }
            Expr::Neg(a) | Expr::Not(a) => vec![a],
            Expr::Sub(a, b)
            | Expr::Select(a, b)
            | Expr::Eq(a, b)
            | Expr::Ne(a, b)
            | Expr::Lt(a, b)
            | Expr::Le(a, b)
            | Expr::Gt(a, b)
            | Expr::Ge(a, b)
            | Expr::Implies(a, b) => vec![a, b],
            Expr::Store(a, b, c) | Expr::Ite(a, b, c) => vec![a, b, c],
        }
    }

    /// Pre-order walk over the whole tree
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Number of `select` nodes in the tree, used to order select-term
    /// draws from innermost to outermost
    pub fn select_depth(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |e| {
            if matches!(e, Expr::Select(..)) {
                count += 1;
            }
        });
        count
    }

    /// Rebuild the tree with every variable name passed through `rename`
    pub fn rename_vars(&self, rename: &impl Fn(&str) -> Option<String>) -> Expr {
        let renamed = |name: &String| rename(name).unwrap_or_else(|| name.clone());
        match self {
            Expr::Int(_) | Expr::Bool(_) => self.clone(),
            Expr::IntVar(n) => Expr::IntVar(renamed(n)),
            Expr::BoolVar(n) => Expr::BoolVar(renamed(n)),
            Expr::ArrayVar(n) => Expr::ArrayVar(renamed(n)),
            Expr::Add(args) => Expr::Add(args.iter().map(|a| a.rename_vars(rename)).collect()),
            Expr::Mul(args) => Expr::Mul(args.iter().map(|a| a.rename_vars(rename)).collect()),
            Expr::And(args) => Expr::And(args.iter().map(|a| a.rename_vars(rename)).collect()),
            Expr::Or(args) => Expr::Or(args.iter().map(|a| a.rename_vars(rename)).collect()),
            Expr::Sub(a, b) => Expr::sub(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Neg(a) => Expr::neg(a.rename_vars(rename)),
            Expr::Not(a) => Expr::not(a.rename_vars(rename)),
            Expr::Select(a, b) => Expr::select(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Store(a, b, c) => Expr::store(
                a.rename_vars(rename),
                b.rename_vars(rename),
                c.rename_vars(rename),
            ),
            Expr::Eq(a, b) => Expr::eq(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Ne(a, b) => Expr::ne(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Lt(a, b) => Expr::lt(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Le(a, b) => Expr::le(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Gt(a, b) => Expr::gt(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Ge(a, b) => Expr::ge(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Implies(a, b) => Expr::implies(a.rename_vars(rename), b.rename_vars(rename)),
            Expr::Ite(a, b, c) => Expr::ite(
                a.rename_vars(rename),
                b.rename_vars(rename),
                c.rename_vars(rename),
            ),
        }
    }
}

fn write_numeral(f: &mut fmt::Formatter<'_>, v: i64) -> fmt::Result {
    if v < 0 {
        // i64::MIN has no positive counterpart, go through i128
        write!(f, "(- {})", -(v as i128))
    } else {
        write!(f, "{}", v)
    }
}

fn write_nary(f: &mut fmt::Formatter<'_>, op: &str, args: &[Expr]) -> fmt::Result {
    write!(f, "({}", op)?;
    for arg in args {
        write!(f, " {}", arg)?;
    }
    write!(f, ")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write_numeral(f, *v),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::IntVar(n) | Expr::BoolVar(n) | Expr::ArrayVar(n) => write!(f, "{}", n),
            Expr::Add(args) => write_nary(f, "+", args),
            Expr::Mul(args) => write_nary(f, "*", args),
            Expr::Sub(a, b) => write!(f, "(- {} {})", a, b),
            Expr::Neg(a) => write!(f, "(- {})", a),
            Expr::Select(a, i) => write!(f, "(select {} {})", a, i),
            Expr::Store(a, i, v) => write!(f, "(store {} {} {})", a, i, v),
            Expr::Eq(a, b) => write!(f, "(= {} {})", a, b),
            Expr::Ne(a, b) => write!(f, "(distinct {} {})", a, b),
            Expr::Lt(a, b) => write!(f, "(< {} {})", a, b),
            Expr::Le(a, b) => write!(f, "(<= {} {})", a, b),
            Expr::Gt(a, b) => write!(f, "(> {} {})", a, b),
            Expr::Ge(a, b) => write!(f, "(>= {} {})", a, b),
            Expr::And(args) => write_nary(f, "and", args),
            Expr::Or(args) => write_nary(f, "or", args),
            Expr::Not(a) => write!(f, "(not {})", a),
            Expr::Implies(a, b) => write!(f, "(=> {} {})", a, b),
            Expr::Ite(c, t, e) => write!(f, "(ite {} {} {})", c, t, e),
        }
    }
}

//! Parsing for SMT-LIB 2 scripts
//!
//! A generic S-expression reader feeds a recursive-descent command parser
//! that produces the declaration inventory and assertion conjunction. The
//! reader alone is reused by the oracle to decode solver responses.

use crate::error::{ParseError, SourceLocation};
use crate::expr::{Expr, Sort};
use crate::smtlib::lexer::{Lexer, Token, TokenType};
use std::collections::HashMap;

/// A parsed S-expression with the location of its first token
#[derive(Debug, Clone)]
pub struct SExpr {
    pub kind: SExprKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum SExprKind {
    Numeral(i64),
    Symbol(String),
    Keyword(String),
    StringLit(String),
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            SExprKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_numeral(&self) -> Option<i64> {
        match &self.kind {
            SExprKind::Numeral(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match &self.kind {
            SExprKind::List(items) => Some(items),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match &self.kind {
            SExprKind::Numeral(v) => v.to_string(),
            SExprKind::Symbol(s) => s.clone(),
            SExprKind::Keyword(k) => format!(":{}", k),
            SExprKind::StringLit(s) => format!("\"{}\"", s),
            SExprKind::List(_) => "(...)".to_string(),
        }
    }
}

/// Read every top-level S-expression in `input`
pub fn parse_sexprs(input: &str, file_name: &str) -> Result<Vec<SExpr>, ParseError> {
    let tokens = Lexer::new(input, file_name.to_string()).tokenize()?;
    let mut reader = SExprReader {
        tokens,
        position: 0,
    };
    let mut result = Vec::new();
    while !reader.at_eof() {
        result.push(reader.read()?);
    }
    Ok(result)
}

struct SExprReader {
    tokens: Vec<Token>,
    position: usize,
}

impl SExprReader {
    fn at_eof(&self) -> bool {
        matches!(self.tokens[self.position].token_type, TokenType::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.tokens[self.position].clone();
        if !matches!(token.token_type, TokenType::Eof) {
            self.position += 1;
        }
        token
    }

    fn read(&mut self) -> Result<SExpr, ParseError> {
        let token = self.next();
        let location = token.location.clone();
        let kind = match token.token_type {
            TokenType::Numeral(v) => SExprKind::Numeral(v),
            TokenType::Symbol(s) => SExprKind::Symbol(s),
            TokenType::Keyword(k) => SExprKind::Keyword(k),
            TokenType::StringLit(s) => SExprKind::StringLit(s),
            TokenType::LeftParen => {
                let mut items = Vec::new();
                loop {
                    match self.tokens[self.position].token_type {
                        TokenType::RightParen => {
                            self.position += 1;
                            break;
                        }
                        TokenType::Eof => {
                            return Err(ParseError::UnexpectedEof {
                                expected: ")".to_string(),
                            })
                        }
                        _ => items.push(self.read()?),
                    }
                }
                SExprKind::List(items)
            }
            TokenType::RightParen => {
                return Err(ParseError::UnexpectedToken {
                    found: ")".to_string(),
                    expected: "term".to_string(),
                    location,
                })
            }
            TokenType::Eof => {
                return Err(ParseError::UnexpectedEof {
                    expected: "term".to_string(),
                })
            }
        };
        Ok(SExpr { kind, location })
    }
}

/// A parsed SMT-LIB script: declared variables in order, plus assertions
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub declarations: Vec<(String, Sort)>,
    pub assertions: Vec<Expr>,
}

impl Script {
    /// The conjunction of every `assert` command
    pub fn formula(&self) -> Expr {
        match self.assertions.len() {
            0 => Expr::Bool(true),
            1 => self.assertions[0].clone(),
            _ => Expr::And(self.assertions.clone()),
        }
    }
}

/// Parse a complete SMT-LIB 2 script over QF_LIA / QF_ALIA
pub fn parse_script(input: &str, file_name: &str) -> Result<Script, ParseError> {
    let commands = parse_sexprs(input, file_name)?;
    let mut script = Script::default();
    let mut sorts: HashMap<String, Sort> = HashMap::new();

    for command in &commands {
        let items = command.as_list().ok_or_else(|| ParseError::UnexpectedToken {
            found: command.describe(),
            expected: "command".to_string(),
            location: command.location.clone(),
        })?;
        let head = items
            .first()
            .and_then(|h| h.as_symbol())
            .ok_or_else(|| ParseError::UnexpectedToken {
                found: command.describe(),
                expected: "command name".to_string(),
                location: command.location.clone(),
            })?;

        match head {
            "set-logic" | "set-info" | "set-option" | "check-sat" | "get-model" | "exit" => {}
            "declare-fun" => {
                expect_arity(items, 4, command)?;
                let name = symbol_of(&items[1])?;
                let params = items[2].as_list().ok_or_else(|| unexpected(&items[2], "()"))?;
                if !params.is_empty() {
                    return Err(ParseError::UnsupportedCommand {
                        command: "declare-fun with arguments".to_string(),
                        location: command.location.clone(),
                    });
                }
                let sort = parse_sort(&items[3])?;
                sorts.insert(name.clone(), sort);
                script.declarations.push((name, sort));
            }
            "declare-const" => {
                expect_arity(items, 3, command)?;
                let name = symbol_of(&items[1])?;
                let sort = parse_sort(&items[2])?;
                sorts.insert(name.clone(), sort);
                script.declarations.push((name, sort));
            }
            "assert" => {
                expect_arity(items, 2, command)?;
                let mut ctx = TermContext {
                    sorts: &sorts,
                    lets: Vec::new(),
                };
                script.assertions.push(to_expr(&items[1], &mut ctx)?);
            }
            other => {
                return Err(ParseError::UnsupportedCommand {
                    command: other.to_string(),
                    location: command.location.clone(),
                })
            }
        }
    }
    Ok(script)
}

fn expect_arity(items: &[SExpr], arity: usize, command: &SExpr) -> Result<(), ParseError> {
    if items.len() != arity {
        return Err(ParseError::UnexpectedToken {
            found: format!("{} arguments", items.len() - 1),
            expected: format!("{} arguments", arity - 1),
            location: command.location.clone(),
        });
    }
    Ok(())
}

fn symbol_of(sexpr: &SExpr) -> Result<String, ParseError> {
    sexpr
        .as_symbol()
        .map(|s| s.to_string())
        .ok_or_else(|| unexpected(sexpr, "symbol"))
}

fn unexpected(sexpr: &SExpr, expected: &str) -> ParseError {
    ParseError::UnexpectedToken {
        found: sexpr.describe(),
        expected: expected.to_string(),
        location: sexpr.location.clone(),
    }
}

/// Parse `Int`, `Bool` or `(Array Int Int)`
pub fn parse_sort(sexpr: &SExpr) -> Result<Sort, ParseError> {
    if let Some(symbol) = sexpr.as_symbol() {
        return match symbol {
            "Int" => Ok(Sort::Int),
            "Bool" => Ok(Sort::Bool),
            other => Err(ParseError::UnsupportedSort {
                sort: other.to_string(),
                location: sexpr.location.clone(),
            }),
        };
    }
    if let Some(items) = sexpr.as_list() {
        let is_int_array = items.len() == 3
            && items[0].as_symbol() == Some("Array")
            && items[1].as_symbol() == Some("Int")
            && items[2].as_symbol() == Some("Int");
        if is_int_array {
            return Ok(Sort::Array);
        }
    }
    Err(ParseError::UnsupportedSort {
        sort: sexpr.describe(),
        location: sexpr.location.clone(),
    })
}

struct TermContext<'a> {
    sorts: &'a HashMap<String, Sort>,
    /// Innermost-last stack of `let` binding frames
    lets: Vec<HashMap<String, Expr>>,
}

impl TermContext<'_> {
    fn lookup(&self, name: &str) -> Option<Expr> {
        for frame in self.lets.iter().rev() {
            if let Some(bound) = frame.get(name) {
                return Some(bound.clone());
            }
        }
        match self.sorts.get(name)? {
            Sort::Int => Some(Expr::int_var(name)),
            Sort::Bool => Some(Expr::bool_var(name)),
            Sort::Array => Some(Expr::array_var(name)),
        }
    }
}

fn to_expr(sexpr: &SExpr, ctx: &mut TermContext) -> Result<Expr, ParseError> {
    match &sexpr.kind {
        SExprKind::Numeral(v) => Ok(Expr::Int(*v)),
        SExprKind::Symbol(name) => match name.as_str() {
            "true" => Ok(Expr::Bool(true)),
            "false" => Ok(Expr::Bool(false)),
            _ => ctx.lookup(name).ok_or_else(|| ParseError::UnknownSymbol {
                symbol: name.clone(),
                location: sexpr.location.clone(),
            }),
        },
        SExprKind::Keyword(_) | SExprKind::StringLit(_) => Err(unexpected(sexpr, "term")),
        SExprKind::List(items) => to_application(sexpr, items, ctx),
    }
}

fn to_application(
    sexpr: &SExpr,
    items: &[SExpr],
    ctx: &mut TermContext,
) -> Result<Expr, ParseError> {
    let head = items
        .first()
        .and_then(|h| h.as_symbol())
        .ok_or_else(|| unexpected(sexpr, "operator"))?;
    let args = &items[1..];

    match head {
        "not" => {
            let operands = convert_args(args, ctx, 1, sexpr)?;
            Ok(Expr::not(operands.into_iter().next().unwrap()))
        }
        "and" => Ok(Expr::And(convert_all(args, ctx)?)),
        "or" => Ok(Expr::Or(convert_all(args, ctx)?)),
        "=>" => {
            let operands = convert_at_least(args, ctx, 2, sexpr)?;
            // right-associative
            let mut result = operands.last().unwrap().clone();
            for lhs in operands[..operands.len() - 1].iter().rev() {
                result = Expr::implies(lhs.clone(), result);
            }
            Ok(result)
        }
        "=" => {
            let operands = convert_at_least(args, ctx, 2, sexpr)?;
            check_same_sort(&operands, sexpr)?;
            Ok(chain_pairs(&operands, Expr::eq))
        }
        "distinct" => {
            let operands = convert_at_least(args, ctx, 2, sexpr)?;
            check_same_sort(&operands, sexpr)?;
            let mut pairs = Vec::new();
            for i in 0..operands.len() {
                for j in i + 1..operands.len() {
                    pairs.push(Expr::ne(operands[i].clone(), operands[j].clone()));
                }
            }
            Ok(if pairs.len() == 1 {
                pairs.into_iter().next().unwrap()
            } else {
                Expr::And(pairs)
            })
        }
        "<=" | "<" | ">=" | ">" => {
            let operands = convert_at_least(args, ctx, 2, sexpr)?;
            check_int_sorts(&operands, sexpr)?;
            let build = match head {
                "<=" => Expr::le,
                "<" => Expr::lt,
                ">=" => Expr::ge,
                _ => Expr::gt,
            };
            Ok(chain_pairs(&operands, build))
        }
        "+" | "*" => {
            let operands = convert_at_least(args, ctx, 1, sexpr)?;
            check_int_sorts(&operands, sexpr)?;
            if operands.len() == 1 {
                return Ok(operands.into_iter().next().unwrap());
            }
            Ok(if head == "+" {
                Expr::Add(operands)
            } else {
                Expr::Mul(operands)
            })
        }
        "-" => {
            let operands = convert_at_least(args, ctx, 1, sexpr)?;
            check_int_sorts(&operands, sexpr)?;
            let mut iter = operands.into_iter();
            let first = iter.next().unwrap();
            let mut rest = iter.peekable();
            if rest.peek().is_none() {
                return Ok(Expr::neg(first));
            }
            Ok(rest.fold(first, Expr::sub))
        }
        "select" => {
            let operands = convert_args(args, ctx, 2, sexpr)?;
            let mut iter = operands.into_iter();
            Ok(Expr::select(iter.next().unwrap(), iter.next().unwrap()))
        }
        "store" => {
            let operands = convert_args(args, ctx, 3, sexpr)?;
            let mut iter = operands.into_iter();
            Ok(Expr::store(
                iter.next().unwrap(),
                iter.next().unwrap(),
                iter.next().unwrap(),
            ))
        }
        "ite" => {
            let operands = convert_args(args, ctx, 3, sexpr)?;
            let mut iter = operands.into_iter();
            Ok(Expr::ite(
                iter.next().unwrap(),
                iter.next().unwrap(),
                iter.next().unwrap(),
            ))
        }
        "let" => {
            if args.len() != 2 {
                return Err(unexpected(sexpr, "let with bindings and body"));
            }
            let bindings = args[0]
                .as_list()
                .ok_or_else(|| unexpected(&args[0], "binding list"))?;
            let mut frame = HashMap::new();
            for binding in bindings {
                let pair = binding
                    .as_list()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| unexpected(binding, "(name term)"))?;
                let name = symbol_of(&pair[0])?;
                // bindings are parallel: resolved in the outer context
                frame.insert(name, to_expr(&pair[1], ctx)?);
            }
            ctx.lets.push(frame);
            let body = to_expr(&args[1], ctx);
            ctx.lets.pop();
            body
        }
        "!" => {
            // annotation: keep the term, drop the attributes
            let term = args.first().ok_or_else(|| unexpected(sexpr, "term"))?;
            to_expr(term, ctx)
        }
        other => Err(ParseError::UnsupportedOperator {
            operator: other.to_string(),
            location: sexpr.location.clone(),
        }),
    }
}

fn convert_all(args: &[SExpr], ctx: &mut TermContext) -> Result<Vec<Expr>, ParseError> {
    args.iter().map(|a| to_expr(a, ctx)).collect()
}

fn convert_args(
    args: &[SExpr],
    ctx: &mut TermContext,
    arity: usize,
    parent: &SExpr,
) -> Result<Vec<Expr>, ParseError> {
    if args.len() != arity {
        return Err(unexpected(parent, &format!("{} operands", arity)));
    }
    convert_all(args, ctx)
}

fn convert_at_least(
    args: &[SExpr],
    ctx: &mut TermContext,
    minimum: usize,
    parent: &SExpr,
) -> Result<Vec<Expr>, ParseError> {
    if args.len() < minimum {
        return Err(unexpected(parent, &format!("at least {} operands", minimum)));
    }
    convert_all(args, ctx)
}

fn check_same_sort(operands: &[Expr], parent: &SExpr) -> Result<(), ParseError> {
    let first = operands[0].sort();
    if operands.iter().any(|o| o.sort() != first) {
        return Err(ParseError::SortMismatch {
            reason: "operands of mixed sorts".to_string(),
            location: parent.location.clone(),
        });
    }
    Ok(())
}

fn check_int_sorts(operands: &[Expr], parent: &SExpr) -> Result<(), ParseError> {
    if operands.iter().any(|o| o.sort() != Sort::Int) {
        return Err(ParseError::SortMismatch {
            reason: "expected integer operands".to_string(),
            location: parent.location.clone(),
        });
    }
    Ok(())
}

/// Adjacent chaining for n-ary comparisons: `(< a b c)` means a<b and b<c
fn chain_pairs(operands: &[Expr], build: fn(Expr, Expr) -> Expr) -> Expr {
    if operands.len() == 2 {
        return build(operands[0].clone(), operands[1].clone());
    }
    let conjuncts: Vec<Expr> = operands
        .windows(2)
        .map(|w| build(w[0].clone(), w[1].clone()))
        .collect();
    Expr::And(conjuncts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Script {
        parse_script(input, "test.smt2").unwrap()
    }

    #[test]
    fn test_declarations_in_order() {
        let script = parse(
            "(declare-fun x () Int)\n\
             (declare-const b Bool)\n\
             (declare-fun a () (Array Int Int))",
        );
        assert_eq!(
            script.declarations,
            vec![
                ("x".to_string(), Sort::Int),
                ("b".to_string(), Sort::Bool),
                ("a".to_string(), Sort::Array),
            ]
        );
    }

    #[test]
    fn test_simple_formula() {
        let script = parse(
            "(declare-fun x () Int)\n\
             (assert (>= x 0))\n\
             (assert (<= x 10))\n\
             (check-sat)",
        );
        let formula = script.formula();
        assert_eq!(
            formula,
            Expr::And(vec![
                Expr::ge(Expr::int_var("x"), Expr::Int(0)),
                Expr::le(Expr::int_var("x"), Expr::Int(10)),
            ])
        );
    }

    #[test]
    fn test_arithmetic_and_stores() {
        let script = parse(
            "(declare-fun a () (Array Int Int))\n\
             (declare-fun i () Int)\n\
             (assert (= (select (store a i 5) 0) (- i 1)))",
        );
        let a = Expr::array_var("a");
        let i = Expr::int_var("i");
        assert_eq!(
            script.assertions[0],
            Expr::eq(
                Expr::select(Expr::store(a, i.clone(), Expr::Int(5)), Expr::Int(0)),
                Expr::sub(i, Expr::Int(1)),
            )
        );
    }

    #[test]
    fn test_unary_minus_and_nary_sub() {
        let script = parse(
            "(declare-fun x () Int)\n\
             (assert (= (- x) (- x 1 2)))",
        );
        let x = Expr::int_var("x");
        assert_eq!(
            script.assertions[0],
            Expr::eq(
                Expr::neg(x.clone()),
                Expr::sub(Expr::sub(x, Expr::Int(1)), Expr::Int(2)),
            )
        );
    }

    #[test]
    fn test_let_bindings_are_parallel() {
        let script = parse(
            "(declare-fun x () Int)\n\
             (assert (let ((y (+ x 1)) (z x)) (= y z)))",
        );
        let x = Expr::int_var("x");
        assert_eq!(
            script.assertions[0],
            Expr::eq(Expr::add(vec![x.clone(), Expr::Int(1)]), x),
        );
    }

    #[test]
    fn test_distinct_expands_pairwise() {
        let script = parse(
            "(declare-fun x () Int)(declare-fun y () Int)(declare-fun z () Int)\n\
             (assert (distinct x y z))",
        );
        match &script.assertions[0] {
            Expr::And(pairs) => assert_eq!(pairs.len(), 3),
            other => panic!("expected conjunction, got {}", other),
        }
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        let result = parse_script("(assert (= x 1))", "test.smt2");
        assert!(matches!(result, Err(ParseError::UnknownSymbol { .. })));
    }

    #[test]
    fn test_unsupported_operator_is_an_error() {
        let result = parse_script(
            "(declare-fun x () Int)(assert (= (div x 2) 1))",
            "test.smt2",
        );
        assert!(matches!(result, Err(ParseError::UnsupportedOperator { .. })));
    }
}

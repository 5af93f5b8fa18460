//! m-implicant extraction
//!
//! Reduces an NNF formula to a conjunction of literals that the seed model
//! satisfies and that propositionally entails the formula: every `and`
//! contributes all children, every `or` contributes one satisfied child,
//! chosen uniformly at random.

use crate::error::SamplerError;
use crate::expr::Expr;
use crate::oracle::ConcreteModel;
use rand::rngs::StdRng;
use rand::Rng;

/// Extract one implicant of `formula` under `seed`
pub fn extract_implicant(
    formula: &Expr,
    seed: &ConcreteModel,
    rng: &mut StdRng,
) -> Result<Vec<Expr>, SamplerError> {
    let mut literals = Vec::new();
    collect(formula, seed, rng, &mut literals)?;
    Ok(literals)
}

fn collect(
    formula: &Expr,
    seed: &ConcreteModel,
    rng: &mut StdRng,
    out: &mut Vec<Expr>,
) -> Result<(), SamplerError> {
    match formula {
        Expr::Bool(true) => Ok(()),
        Expr::And(args) => {
            for arg in args {
                collect(arg, seed, rng, out)?;
            }
            Ok(())
        }
        Expr::Or(args) => {
            let mut satisfied = Vec::new();
            for arg in args {
                if seed.eval_bool(arg)? {
                    satisfied.push(arg);
                }
            }
            if satisfied.is_empty() {
                return Err(SamplerError::SeedModelMismatch {
                    literal: formula.to_string(),
                });
            }
            let chosen = satisfied[rng.gen_range(0..satisfied.len())];
            collect(chosen, seed, rng, out)
        }
        literal => {
            if !seed.eval_bool(literal)? {
                return Err(SamplerError::SeedModelMismatch {
                    literal: literal.to_string(),
                });
            }
            out.push(literal.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn seed_with(ints: &[(&str, i64)]) -> ConcreteModel {
        let mut model = ConcreteModel::new();
        for (name, value) in ints {
            model.ints.insert(name.to_string(), *value);
        }
        model
    }

    #[test]
    fn test_conjunction_keeps_every_literal() {
        let x = Expr::int_var("x");
        let formula = Expr::And(vec![
            Expr::ge(x.clone(), Expr::Int(0)),
            Expr::le(x.clone(), Expr::Int(10)),
        ]);
        let seed = seed_with(&[("x", 5)]);
        let mut rng = StdRng::seed_from_u64(0);
        let literals = extract_implicant(&formula, &seed, &mut rng).unwrap();
        assert_eq!(literals.len(), 2);
    }

    #[test]
    fn test_disjunction_picks_one_satisfied_child() {
        let x = Expr::int_var("x");
        let sat = Expr::ge(x.clone(), Expr::Int(0));
        let unsat = Expr::le(x.clone(), Expr::Int(-10));
        let formula = Expr::Or(vec![unsat.clone(), sat.clone()]);
        let seed = seed_with(&[("x", 5)]);
        let mut rng = StdRng::seed_from_u64(0);
        let literals = extract_implicant(&formula, &seed, &mut rng).unwrap();
        assert_eq!(literals, vec![sat]);
    }

    #[test]
    fn test_implicant_is_satisfied_and_entails() {
        // (x >= 0 or x <= -10) and (x <= 10 or x = 99)
        let x = Expr::int_var("x");
        let formula = Expr::And(vec![
            Expr::Or(vec![
                Expr::ge(x.clone(), Expr::Int(0)),
                Expr::le(x.clone(), Expr::Int(-10)),
            ]),
            Expr::Or(vec![
                Expr::le(x.clone(), Expr::Int(10)),
                Expr::eq(x.clone(), Expr::Int(99)),
            ]),
        ]);
        let seed = seed_with(&[("x", 7)]);
        for seed_value in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed_value);
            let literals = extract_implicant(&formula, &seed, &mut rng).unwrap();
            // exactly one literal per disjunction
            assert_eq!(literals.len(), 2);
            for literal in &literals {
                assert!(seed.eval_bool(literal).unwrap());
            }
        }
    }

    #[test]
    fn test_unsatisfied_literal_is_reported() {
        let x = Expr::int_var("x");
        let formula = Expr::ge(x, Expr::Int(10));
        let seed = seed_with(&[("x", 5)]);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            extract_implicant(&formula, &seed, &mut rng),
            Err(SamplerError::SeedModelMismatch { .. })
        ));
    }
}

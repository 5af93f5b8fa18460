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

//! Array-equality graph and per-epoch rewriting
//!
//! Each formula-level equality between store-chains is one edge between
//! the chains' root arrays. Edges live once in an arena and are listed in
//! the adjacency of both endpoints, so the graph is symmetric by
//! construction. The per-epoch fields (`in_implicant`, `index_values`) are
//! cleared at epoch start.

use crate::error::SamplerError;
use crate::expr::Expr;
use crate::oracle::ConcreteModel;
use std::collections::{HashMap, HashSet, VecDeque};

pub type EdgeId = usize;

/// Which side of the equality a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Side {
    A,
    B,
}

/// One store write of an equality, evaluated under the epoch's seed model
#[derive(Debug, Clone)]
pub struct IndexValueRecord {
    pub index: Expr,
    pub value: Expr,
    pub concrete: i64,
    pub serial: usize,
    pub side: Side,
}

/// A formula-level equality between two store-chains
#[derive(Debug, Clone)]
pub struct ArrayEqualityEdge {
    pub root_a: String,
    pub root_b: String,
    /// Writes of each side, outermost store first, so the first record of
    /// an index is the write that is semantically visible
    pub a_writes: Vec<(Expr, Expr)>,
    pub b_writes: Vec<(Expr, Expr)>,
    /// The original equality atom
    pub equality: Expr,
    pub in_implicant: bool,
    pub index_values: Vec<IndexValueRecord>,
}

/// Adjacency from array names to the edges touching them
#[derive(Debug, Clone, Default)]
pub struct ArrayEqualityGraph {
    edges: Vec<ArrayEqualityEdge>,
    adjacency: HashMap<String, Vec<EdgeId>>,
}

impl ArrayEqualityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: ArrayEqualityEdge) -> EdgeId {
        let id = self.edges.len();
        let root_a = edge.root_a.clone();
        let root_b = edge.root_b.clone();
        self.edges.push(edge);
        self.adjacency.entry(root_a.clone()).or_default().push(id);
        if root_b != root_a {
            self.adjacency.entry(root_b).or_default().push(id);
        }
        id
    }

    pub fn edge(&self, id: EdgeId) -> &ArrayEqualityEdge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut ArrayEqualityEdge {
        &mut self.edges[id]
    }

    pub fn edges_of(&self, array: &str) -> &[EdgeId] {
        self.adjacency.get(array).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The edge registered for a given equality atom
    pub fn find_edge(&self, equality: &Expr) -> Option<EdgeId> {
        self.edges.iter().position(|e| &e.equality == equality)
    }

    /// Clear the per-epoch fields of every edge
    pub fn reset_epoch(&mut self) {
        for edge in &mut self.edges {
            edge.in_implicant = false;
            edge.index_values.clear();
        }
    }
}

/// Split a store-chain into its root array constant and its writes,
/// outermost store first
pub fn decompose_store_chain(
    term: &Expr,
) -> Result<(String, Vec<(Expr, Expr)>), SamplerError> {
    let mut writes = Vec::new();
    let mut current = term;
    loop {
        match current {
            Expr::ArrayVar(name) => return Ok((name.clone(), writes)),
            Expr::Store(base, index, value) => {
                writes.push((index.as_ref().clone(), value.as_ref().clone()));
                current = base;
            }
            other => {
                return Err(SamplerError::MalformedArrayTerm {
                    term: other.to_string(),
                })
            }
        }
    }
}

/// Scan a formula for array equalities and register one edge each
pub fn build_graph(formula: &Expr) -> Result<ArrayEqualityGraph, SamplerError> {
    let mut atoms = Vec::new();
    formula.visit(&mut |e| {
        if e.is_array_equality() {
            atoms.push(e.clone());
        }
    });

    let mut graph = ArrayEqualityGraph::new();
    for atom in atoms {
        if graph.find_edge(&atom).is_some() {
            continue;
        }
        let (lhs, rhs) = match &atom {
            Expr::Eq(a, b) => (a.as_ref(), b.as_ref()),
            _ => unreachable!("is_array_equality only matches equalities"),
        };
        let (root_a, a_writes) = decompose_store_chain(lhs)?;
        let (root_b, b_writes) = decompose_store_chain(rhs)?;
        graph.add_edge(ArrayEqualityEdge {
            root_a,
            root_b,
            a_writes,
            b_writes,
            equality: atom,
            in_implicant: false,
            index_values: Vec::new(),
        });
    }
    Ok(graph)
}

/// Replace every array-equality conjunct with index-ordering and
/// value-matching constraints over integers and selects, then relate the
/// surviving select-terms across the graph.
pub fn rewrite_array_equalities(
    conjuncts: Vec<Expr>,
    graph: &mut ArrayEqualityGraph,
    seed: &ConcreteModel,
) -> Result<Vec<Expr>, SamplerError> {
    let mut result = Vec::new();
    let mut equalities = Vec::new();
    for conjunct in conjuncts {
        if conjunct.is_array_equality() {
            equalities.push(conjunct);
        } else {
            result.push(conjunct);
        }
    }

    for equality in &equalities {
        let id = graph
            .find_edge(equality)
            .ok_or_else(|| SamplerError::MissingArrayEdge {
                equality: equality.to_string(),
            })?;
        let records = rewrite_one_equality(graph.edge(id), seed, &mut result)?;
        let edge = graph.edge_mut(id);
        edge.in_implicant = true;
        edge.index_values = records;
    }

    let propagated = propagate_selects(&result, graph, seed)?;
    result.extend(propagated);
    Ok(result)
}

/// Emit the constraints of one equality and return the sorted, deduplicated
/// index/value records observed under the seed model.
fn rewrite_one_equality(
    edge: &ArrayEqualityEdge,
    seed: &ConcreteModel,
    out: &mut Vec<Expr>,
) -> Result<Vec<IndexValueRecord>, SamplerError> {
    let mut records = Vec::new();
    for (side, writes) in [(Side::A, &edge.a_writes), (Side::B, &edge.b_writes)] {
        for (serial, (index, value)) in writes.iter().enumerate() {
            records.push(IndexValueRecord {
                index: index.clone(),
                value: value.clone(),
                concrete: seed.eval_int(index)?,
                serial,
                side,
            });
        }
    }
    records.sort_by(|x, y| {
        (x.concrete, x.side, x.serial).cmp(&(y.concrete, y.side, y.serial))
    });

    // ordering constraints preserve the relative order observed under the
    // seed model
    for pair in records.windows(2) {
        if pair[0].concrete < pair[1].concrete {
            out.push(Expr::lt(
                Expr::sub(pair[0].index.clone(), pair[1].index.clone()),
                Expr::Int(0),
            ));
        } else {
            out.push(Expr::eq(pair[0].index.clone(), pair[1].index.clone()));
        }
    }

    // shadowed writes: a later record with the same index on the same side
    // is hidden by the outermost write, which sorts first
    let mut deduped: Vec<IndexValueRecord> = Vec::new();
    for record in records {
        let shadowed = deduped
            .last()
            .is_some_and(|prev| prev.concrete == record.concrete && prev.side == record.side);
        if !shadowed {
            deduped.push(record);
        }
    }

    let mut i = 0;
    while i < deduped.len() {
        let record = &deduped[i];
        let is_final_at_index =
            i + 1 == deduped.len() || deduped[i + 1].concrete > record.concrete;
        if is_final_at_index {
            // the write survives on its side: the opposite array must carry
            // its value at this index
            let opposite = match record.side {
                Side::A => &edge.root_b,
                Side::B => &edge.root_a,
            };
            out.push(Expr::eq(
                Expr::select(Expr::array_var(opposite.clone()), record.index.clone()),
                record.value.clone(),
            ));
            i += 1;
        } else {
            // both sides write the same index: their values must agree
            out.push(Expr::eq(
                record.value.clone(),
                deduped[i + 1].value.clone(),
            ));
            i += 2;
        }
    }
    Ok(deduped)
}

/// BFS over active edges from each select-term's array, pinning indices
/// covered by a store chain and relating the rest across the edge
fn propagate_selects(
    conjuncts: &[Expr],
    graph: &ArrayEqualityGraph,
    seed: &ConcreteModel,
) -> Result<Vec<Expr>, SamplerError> {
    if graph.is_empty() {
        return Ok(Vec::new());
    }

    let mut selects = Vec::new();
    let mut seen = HashSet::new();
    for conjunct in conjuncts {
        conjunct.visit(&mut |e| {
            if let Expr::Select(array, index) = e {
                if let Expr::ArrayVar(name) = array.as_ref() {
                    if seen.insert(e.clone()) {
                        selects.push((name.clone(), index.as_ref().clone()));
                    }
                }
            }
        });
    }

    let mut out = Vec::new();
    for (array, index) in selects {
        let concrete = seed.eval_int(&index)?;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(array.as_str());
        queue.push_back(array.as_str());

        while let Some(current) = queue.pop_front() {
            for &id in graph.edges_of(current) {
                let edge = graph.edge(id);
                if !edge.in_implicant {
                    continue;
                }
                let other = if edge.root_a == current {
                    edge.root_b.as_str()
                } else {
                    edge.root_a.as_str()
                };
                if let Some(record) =
                    edge.index_values.iter().find(|r| r.concrete == concrete)
                {
                    // the index is pinned by a store of this equality; the
                    // value constraint already covers it, do not cross
                    out.push(Expr::eq(index.clone(), record.index.clone()));
                } else if visited.insert(other) {
                    // outside the chain's index union: the arrays agree here
                    out.push(Expr::eq(
                        Expr::select(Expr::array_var(current), index.clone()),
                        Expr::select(Expr::array_var(other), index.clone()),
                    ));
                    queue.push_back(other);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(a: Expr, i: i64, v: i64) -> Expr {
        Expr::store(a, Expr::Int(i), Expr::Int(v))
    }

    #[test]
    fn test_decompose_outermost_first() {
        let chain = store(store(Expr::array_var("a"), 1, 10), 2, 20);
        let (root, writes) = decompose_store_chain(&chain).unwrap();
        assert_eq!(root, "a");
        assert_eq!(
            writes,
            vec![
                (Expr::Int(2), Expr::Int(20)),
                (Expr::Int(1), Expr::Int(10)),
            ]
        );
    }

    #[test]
    fn test_decompose_rejects_non_chain() {
        let term = Expr::ite(
            Expr::bool_var("c"),
            Expr::array_var("a"),
            Expr::array_var("b"),
        );
        assert!(matches!(
            decompose_store_chain(&term),
            Err(SamplerError::MalformedArrayTerm { .. })
        ));
    }

    #[test]
    fn test_graph_symmetry() {
        let eq = Expr::eq(
            store(Expr::array_var("a"), 1, 10),
            Expr::array_var("b"),
        );
        let graph = build_graph(&eq).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges_of("a"), &[0]);
        assert_eq!(graph.edges_of("b"), &[0]);
    }

    #[test]
    fn test_self_equality_single_edge() {
        let eq = Expr::eq(Expr::array_var("a"), Expr::array_var("a"));
        let graph = build_graph(&eq).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges_of("a"), &[0]);
        let edge = graph.edge(0);
        assert!(edge.a_writes.is_empty() && edge.b_writes.is_empty());
    }

    #[test]
    fn test_self_equality_rewrites_to_nothing() {
        let eq = Expr::eq(Expr::array_var("a"), Expr::array_var("a"));
        let mut graph = build_graph(&eq).unwrap();
        let seed = ConcreteModel::new();
        let rewritten = rewrite_array_equalities(vec![eq], &mut graph, &seed).unwrap();
        assert!(rewritten.is_empty());
        assert!(graph.edge(0).in_implicant);
    }

    #[test]
    fn test_distinct_indices_get_order_and_value_constraints() {
        // store(a,1,5) = store(b,2,7) with the indices symbolic
        let i = Expr::int_var("i");
        let j = Expr::int_var("j");
        let eq = Expr::eq(
            Expr::store(Expr::array_var("a"), i.clone(), Expr::Int(5)),
            Expr::store(Expr::array_var("b"), j.clone(), Expr::Int(7)),
        );
        let mut graph = build_graph(&eq).unwrap();
        let mut seed = ConcreteModel::new();
        seed.ints.insert("i".to_string(), 1);
        seed.ints.insert("j".to_string(), 2);

        let rewritten =
            rewrite_array_equalities(vec![eq], &mut graph, &seed).unwrap();
        // ordering: i - j < 0
        assert!(rewritten.contains(&Expr::lt(
            Expr::sub(i.clone(), j.clone()),
            Expr::Int(0)
        )));
        // final writes bind the opposite arrays
        assert!(rewritten.contains(&Expr::eq(
            Expr::select(Expr::array_var("b"), i.clone()),
            Expr::Int(5)
        )));
        assert!(rewritten.contains(&Expr::eq(
            Expr::select(Expr::array_var("a"), j.clone()),
            Expr::Int(7)
        )));
    }

    #[test]
    fn test_shared_index_is_a_value_clash_not_an_index_equality() {
        let i = Expr::int_var("i");
        let j = Expr::int_var("j");
        let v = Expr::int_var("v");
        let w = Expr::int_var("w");
        let eq = Expr::eq(
            Expr::store(Expr::array_var("a"), i.clone(), v.clone()),
            Expr::store(Expr::array_var("b"), j.clone(), w.clone()),
        );
        let mut graph = build_graph(&eq).unwrap();
        let mut seed = ConcreteModel::new();
        seed.ints.insert("i".to_string(), 4);
        seed.ints.insert("j".to_string(), 4);
        seed.ints.insert("v".to_string(), 9);
        seed.ints.insert("w".to_string(), 9);

        let rewritten =
            rewrite_array_equalities(vec![eq], &mut graph, &seed).unwrap();
        // the two sides clash at the shared index: values must agree
        assert!(rewritten.contains(&Expr::eq(v.clone(), w.clone())));
        // no per-side final-write constraint at the shared index
        assert!(!rewritten
            .iter()
            .any(|c| matches!(c, Expr::Eq(lhs, _) if matches!(lhs.as_ref(), Expr::Select(..)))));
        // the ordering constraint for the tie is an index equality
        assert!(rewritten.contains(&Expr::eq(i, j)));
    }

    #[test]
    fn test_shadowed_write_keeps_outermost() {
        // store(store(a,i,1),i,2) = b : only the outer write (value 2) is
        // visible at index i
        let i = Expr::int_var("i");
        let inner = Expr::store(Expr::array_var("a"), i.clone(), Expr::Int(1));
        let eq = Expr::eq(
            Expr::store(inner, i.clone(), Expr::Int(2)),
            Expr::array_var("b"),
        );
        let mut graph = build_graph(&eq).unwrap();
        let mut seed = ConcreteModel::new();
        seed.ints.insert("i".to_string(), 0);

        let rewritten =
            rewrite_array_equalities(vec![eq], &mut graph, &seed).unwrap();
        assert!(rewritten.contains(&Expr::eq(
            Expr::select(Expr::array_var("b"), i.clone()),
            Expr::Int(2)
        )));
        assert!(!rewritten.contains(&Expr::eq(
            Expr::select(Expr::array_var("b"), i),
            Expr::Int(1)
        )));
    }

    #[test]
    fn test_missing_edge_is_an_error() {
        let eq = Expr::eq(Expr::array_var("a"), Expr::array_var("b"));
        let mut graph = ArrayEqualityGraph::new();
        let seed = ConcreteModel::new();
        assert!(matches!(
            rewrite_array_equalities(vec![eq], &mut graph, &seed),
            Err(SamplerError::MissingArrayEdge { .. })
        ));
    }

    #[test]
    fn test_select_propagates_across_active_edge() {
        // a = b active; a select on `a` outside the (empty) index union
        // must be related to `b`
        let eq = Expr::eq(Expr::array_var("a"), Expr::array_var("b"));
        let mut graph = build_graph(&eq).unwrap();
        let mut seed = ConcreteModel::new();
        seed.ints.insert("k".to_string(), 3);

        let select = Expr::select(Expr::array_var("a"), Expr::int_var("k"));
        let conjuncts = vec![eq, Expr::eq(select.clone(), Expr::Int(1))];
        let rewritten =
            rewrite_array_equalities(conjuncts, &mut graph, &seed).unwrap();
        assert!(rewritten.contains(&Expr::eq(
            select,
            Expr::select(Expr::array_var("b"), Expr::int_var("k"))
        )));
    }

    #[test]
    fn test_select_pinned_by_store_does_not_cross() {
        // store(a,i,5) = b active; a select on `a` at the stored index gets
        // an index equality instead of crossing to `b`
        let i = Expr::int_var("i");
        let eq = Expr::eq(
            Expr::store(Expr::array_var("a"), i.clone(), Expr::Int(5)),
            Expr::array_var("b"),
        );
        let mut graph = build_graph(&eq).unwrap();
        let mut seed = ConcreteModel::new();
        seed.ints.insert("i".to_string(), 2);
        seed.ints.insert("k".to_string(), 2);

        let select = Expr::select(Expr::array_var("a"), Expr::int_var("k"));
        let conjuncts = vec![eq, Expr::ge(select.clone(), Expr::Int(0))];
        let rewritten =
            rewrite_array_equalities(conjuncts, &mut graph, &seed).unwrap();
        assert!(rewritten.contains(&Expr::eq(Expr::int_var("k"), i)));
        assert!(!rewritten.contains(&Expr::eq(
            select,
            Expr::select(Expr::array_var("b"), Expr::int_var("k"))
        )));
    }
}

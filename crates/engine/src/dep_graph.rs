//! Dependency graph over computed columns.
//!
//! Nodes are the `(page, column)` pairs that carry a formula. Referenced
//! columns without a formula appear only as edge targets.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "A's formula references B"  (B is a precedent of A)
//! ```
//!
//! Recompute order runs against the edges: B before A. The reverse map
//! answers "what breaks if I delete B?".

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::column_id::ColumnId;
use crate::recalc::CycleReport;

/// Dependency graph for one session, rebuilt from scratch after every
/// structural change.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If B ∈ preds[A] then A ∈ succs[B], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **Nodes own their edges:** every key of `preds` is in `nodes`.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// Columns with a formula, including formulas without references.
    nodes: FxHashSet<ColumnId>,

    /// Precedents: for each formula column A, the columns it references.
    preds: FxHashMap<ColumnId, FxHashSet<ColumnId>>,

    /// Dependents: for each referenced column B, the formula columns referencing it.
    succs: FxHashMap<ColumnId, FxHashSet<ColumnId>>,
}

/// Result of a topological sort. `cycle` is set when some formula columns
/// could not be ordered; those columns are absent from `order`.
#[derive(Debug, Clone, Default)]
pub struct TopoOrder {
    pub order: Vec<ColumnId>,
    pub cycle: Option<CycleReport>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(formula column, referenced columns)` pairs.
    pub fn build<I>(formulas: I) -> Self
    where
        I: IntoIterator<Item = (ColumnId, FxHashSet<ColumnId>)>,
    {
        let mut graph = Self::new();
        for (node, preds) in formulas {
            graph.insert_node(node, preds);
        }
        graph
    }

    /// Register `node` as a formula column referencing `preds`, replacing any
    /// previous edges.
    pub fn insert_node(&mut self, node: ColumnId, preds: FxHashSet<ColumnId>) {
        self.nodes.insert(node.clone());
        self.replace_edges(node, preds);
    }

    /// Replace all outgoing edges of a formula column atomically.
    ///
    /// Pass an empty set to clear them.
    pub fn replace_edges(&mut self, node: ColumnId, new_preds: FxHashSet<ColumnId>) {
        if let Some(old_preds) = self.preds.remove(&node) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&node);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(pred.clone()).or_default().insert(node.clone());
        }
        self.preds.insert(node, new_preds);
    }

    pub fn is_formula_column(&self, column: &ColumnId) -> bool {
        self.nodes.contains(column)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Formula columns in sorted order.
    pub fn formula_nodes(&self) -> Vec<ColumnId> {
        let mut nodes: Vec<ColumnId> = self.nodes.iter().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Columns referenced by `column`'s formula, sorted.
    pub fn precedents(&self, column: &ColumnId) -> Vec<ColumnId> {
        sorted(self.preds.get(column))
    }

    /// Formula columns that reference `column` directly, sorted.
    pub fn dependents(&self, column: &ColumnId) -> Vec<ColumnId> {
        sorted(self.succs.get(column))
    }

    /// Every formula column whose value can change when `column` changes,
    /// sorted. Does not include `column` itself unless it sits on a cycle.
    pub fn transitive_dependents(&self, column: &ColumnId) -> Vec<ColumnId> {
        let mut seen: FxHashSet<&ColumnId> = FxHashSet::default();
        let mut queue: VecDeque<&ColumnId> = VecDeque::new();
        queue.push_back(column);

        while let Some(current) = queue.pop_front() {
            if let Some(deps) = self.succs.get(current) {
                for dep in deps {
                    if seen.insert(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }

        let mut out: Vec<ColumnId> = seen.into_iter().cloned().collect();
        out.sort();
        out
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Depth-first search with an on-stack set. Returns the columns of the
    /// first cycle found, in edge order, starting from the column that
    /// closes it.
    ///
    /// Iterative so that long formula chains cannot overflow the stack.
    pub fn find_cycle(&self) -> Option<Vec<ColumnId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Visit {
            OnStack,
            Done,
        }

        let mut state: FxHashMap<&ColumnId, Visit> = FxHashMap::default();
        let mut roots: Vec<&ColumnId> = self.nodes.iter().collect();
        roots.sort();

        for root in roots {
            if state.contains_key(root) {
                continue;
            }

            // Each frame holds a node and the precedents still to visit.
            let mut stack: Vec<(&ColumnId, Vec<&ColumnId>)> = vec![(root, self.pending(root))];
            state.insert(root, Visit::OnStack);

            loop {
                let Some((node, pending)) = stack.last_mut() else {
                    break;
                };
                let node = *node;

                match pending.pop() {
                    Some(next) => match state.get(next) {
                        Some(Visit::OnStack) => {
                            let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                            return Some(stack[start..].iter().map(|(n, _)| (*n).clone()).collect());
                        }
                        Some(Visit::Done) => {}
                        None => {
                            state.insert(next, Visit::OnStack);
                            stack.push((next, self.pending(next)));
                        }
                    },
                    None => {
                        state.insert(node, Visit::Done);
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    /// Kahn's algorithm: order formula columns so that every column comes
    /// after the formula columns it references.
    ///
    /// In-degree counts only precedents that are themselves formula columns.
    /// The frontier is FIFO and seeded in sorted order, so the result is
    /// deterministic. Columns left unordered (on or downstream of a cycle)
    /// are reported through `TopoOrder::cycle`.
    pub fn topo_order(&self) -> TopoOrder {
        if self.nodes.is_empty() {
            return TopoOrder::default();
        }

        let mut in_degree: FxHashMap<&ColumnId, usize> = FxHashMap::default();
        for node in &self.nodes {
            let count = self
                .preds
                .get(node)
                .map(|preds| preds.iter().filter(|p| self.nodes.contains(*p)).count())
                .unwrap_or(0);
            in_degree.insert(node, count);
        }

        let mut seed: Vec<&ColumnId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&node, _)| node)
            .collect();
        seed.sort();
        let mut frontier: VecDeque<&ColumnId> = seed.into_iter().collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = frontier.pop_front() {
            order.push(node.clone());

            let Some(deps) = self.succs.get(node) else {
                continue;
            };
            let mut ready = Vec::new();
            for dep in deps {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(dep);
                    }
                }
            }
            ready.sort();
            frontier.extend(ready);
        }

        let cycle = if order.len() < self.nodes.len() {
            let ordered: FxHashSet<&ColumnId> = order.iter().collect();
            let mut leftover: Vec<ColumnId> = self
                .nodes
                .iter()
                .filter(|n| !ordered.contains(n))
                .cloned()
                .collect();
            leftover.sort();
            Some(CycleReport::cycle(leftover))
        } else {
            None
        };

        TopoOrder { order, cycle }
    }

    // Precedents in descending order, so popping yields the smallest first.
    fn pending(&self, node: &ColumnId) -> Vec<&ColumnId> {
        let mut next: Vec<&ColumnId> = self
            .preds
            .get(node)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        next.sort_by(|a, b| b.cmp(a));
        next
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (node, preds) in &self.preds {
            assert!(self.nodes.contains(node), "Edges stored for non-node {}", node);
            assert!(!preds.is_empty(), "Empty preds set stored for {}", node);
            for pred in preds {
                assert!(
                    self.succs.get(pred).map_or(false, |s| s.contains(node)),
                    "Missing succ edge: {} should have {} in dependents",
                    pred,
                    node
                );
            }
        }

        for (column, deps) in &self.succs {
            assert!(!deps.is_empty(), "Empty succs set stored for {}", column);
            for dep in deps {
                assert!(
                    self.preds.get(dep).map_or(false, |s| s.contains(column)),
                    "Missing pred edge: {} should have {} in precedents",
                    dep,
                    column
                );
            }
        }
    }
}

fn sorted(set: Option<&FxHashSet<ColumnId>>) -> Vec<ColumnId> {
    let mut out: Vec<ColumnId> = set.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(page: &str, column: &str) -> ColumnId {
        ColumnId::new(page, column)
    }

    fn set(cols: &[ColumnId]) -> FxHashSet<ColumnId> {
        cols.iter().cloned().collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();

        assert_eq!(graph.node_count(), 0);
        assert!(!graph.has_cycle());
        assert!(graph.dependents(&col("A", "x")).is_empty());
        let topo = graph.topo_order();
        assert!(topo.order.is_empty());
        assert!(topo.cycle.is_none());

        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        // A:total = {score}
        let mut graph = DepGraph::new();
        let score = col("A", "score");
        let total = col("A", "total");

        graph.insert_node(total.clone(), set(&[score.clone()]));
        graph.assert_consistent();

        assert!(graph.is_formula_column(&total));
        assert!(!graph.is_formula_column(&score));
        assert_eq!(graph.precedents(&total), vec![score.clone()]);
        assert_eq!(graph.dependents(&score), vec![total]);
    }

    #[test]
    fn test_node_without_refs_is_ordered() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("A", "const"), FxHashSet::default());

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.topo_order().order, vec![col("A", "const")]);
        graph.assert_consistent();
    }

    #[test]
    fn test_rewiring() {
        let mut graph = DepGraph::new();
        let a = col("A", "a");
        let b = col("A", "b");
        let f = col("A", "f");

        graph.insert_node(f.clone(), set(&[a.clone()]));
        graph.insert_node(f.clone(), set(&[b.clone()]));
        graph.assert_consistent();

        assert!(graph.dependents(&a).is_empty());
        assert_eq!(graph.dependents(&b), vec![f]);
    }

    #[test]
    fn test_topo_chain() {
        // c = {b}, b = {a}, a = {raw}
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "c"), set(&[col("P", "b")]));
        graph.insert_node(col("P", "b"), set(&[col("P", "a")]));
        graph.insert_node(col("P", "a"), set(&[col("P", "raw")]));

        let topo = graph.topo_order();
        assert!(topo.cycle.is_none());
        assert_eq!(topo.order, vec![col("P", "a"), col("P", "b"), col("P", "c")]);
    }

    #[test]
    fn test_topo_diamond() {
        //     top
        //    /   \
        //  left  right
        //    \   /
        //    base
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "left"), set(&[col("P", "base")]));
        graph.insert_node(col("P", "right"), set(&[col("P", "base")]));
        graph.insert_node(col("P", "base"), set(&[col("P", "raw")]));
        graph.insert_node(col("P", "top"), set(&[col("P", "left"), col("P", "right")]));

        let order = graph.topo_order().order;
        let pos = |c: &str| order.iter().position(|n| n.column == c).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("base") < pos("left"));
        assert!(pos("base") < pos("right"));
        assert!(pos("left") < pos("top"));
        assert!(pos("right") < pos("top"));
    }

    #[test]
    fn test_topo_cross_page() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("A", "total"), set(&[col("A", "score"), col("B", "bonus")]));
        graph.insert_node(col("B", "bonus"), set(&[col("B", "raw")]));

        assert_eq!(graph.topo_order().order, vec![col("B", "bonus"), col("A", "total")]);
    }

    #[test]
    fn test_topo_stable_order() {
        let build = || {
            let mut graph = DepGraph::new();
            for name in ["e", "d", "c", "b", "a"] {
                graph.insert_node(col("P", name), set(&[col("P", "raw")]));
            }
            graph
        };
        let first = build().topo_order().order;
        for _ in 0..5 {
            assert_eq!(build().topo_order().order, first);
        }
        assert_eq!(first[0], col("P", "a"));
    }

    #[test]
    fn test_cycle_two_columns() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "x"), set(&[col("P", "y")]));
        graph.insert_node(col("P", "y"), set(&[col("P", "x")]));

        assert!(graph.has_cycle());
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle, vec![col("P", "x"), col("P", "y")]);
    }

    #[test]
    fn test_cycle_self_loop() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "x"), set(&[col("P", "x")]));
        assert_eq!(graph.find_cycle(), Some(vec![col("P", "x")]));
    }

    #[test]
    fn test_cycle_across_pages() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("A", "x"), set(&[col("B", "y")]));
        graph.insert_node(col("B", "y"), set(&[col("C", "z")]));
        graph.insert_node(col("C", "z"), set(&[col("A", "x")]));
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_no_cycle_in_diamond() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "l"), set(&[col("P", "b")]));
        graph.insert_node(col("P", "r"), set(&[col("P", "b")]));
        graph.insert_node(col("P", "t"), set(&[col("P", "l"), col("P", "r")]));
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_topo_leftover_on_cycle() {
        // x <-> y cycle, z downstream of y, w independent
        let mut graph = DepGraph::new();
        graph.insert_node(col("P", "x"), set(&[col("P", "y")]));
        graph.insert_node(col("P", "y"), set(&[col("P", "x")]));
        graph.insert_node(col("P", "z"), set(&[col("P", "y")]));
        graph.insert_node(col("P", "w"), set(&[col("P", "raw")]));

        let topo = graph.topo_order();
        assert_eq!(topo.order, vec![col("P", "w")]);
        let report = topo.cycle.unwrap();
        assert_eq!(report.columns, vec![col("P", "x"), col("P", "y"), col("P", "z")]);
    }

    #[test]
    fn test_transitive_dependents() {
        let mut graph = DepGraph::new();
        graph.insert_node(col("A", "b"), set(&[col("A", "a")]));
        graph.insert_node(col("B", "c"), set(&[col("A", "b")]));
        graph.insert_node(col("A", "d"), set(&[col("A", "x")]));

        assert_eq!(
            graph.transitive_dependents(&col("A", "a")),
            vec![col("A", "b"), col("B", "c")]
        );
        assert!(graph.transitive_dependents(&col("B", "c")).is_empty());
    }

    #[test]
    fn test_build_from_pairs() {
        let graph = DepGraph::build(vec![
            (col("A", "t"), set(&[col("A", "s")])),
            (col("A", "u"), set(&[col("A", "t")])),
        ]);
        graph.assert_consistent();
        assert_eq!(graph.formula_nodes(), vec![col("A", "t"), col("A", "u")]);
    }
}

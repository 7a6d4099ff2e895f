//! Dependency graph for formula cells.
//!
//! Tracks precedents (cells a formula depends on) and dependents (cells that
//! depend on a given cell) for invalidation and ordered recomputation.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
//! 2. **No dangling entries:** Empty sets are removed, not stored.
//! 3. **No duplicate edges:** Set semantics enforced by FxHashSet.
//! 4. **Atomic updates:** `replace_edges` is the only mutator that touches both maps.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;
use crate::sheet::SheetId;

#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// Precedents: for each formula cell B, the cells A it depends on.
    preds: FxHashMap<CellId, FxHashSet<CellId>>,

    /// Dependents: for each referenced cell A, the formula cells B that depend on it.
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells this formula cell depends on (incoming edges).
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Cells that depend on this cell (outgoing edges).
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// True if this cell has formula dependencies tracked in the graph.
    pub fn has_precedents(&self, cell: CellId) -> bool {
        self.preds.contains_key(&cell)
    }

    /// Number of cells with precedents tracked.
    pub fn tracked_formula_count(&self) -> usize {
        self.preds.len()
    }

    /// Number of cells referenced by at least one formula.
    pub fn referenced_cell_count(&self) -> usize {
        self.succs.len()
    }

    /// Replace all edges for a formula cell atomically.
    ///
    /// 1. Removes the cell from all its old precedents' successor sets
    /// 2. Clears the cell's precedent set
    /// 3. Adds the cell to all new precedents' successor sets
    /// 4. Sets the cell's new precedent set
    ///
    /// Pass an empty set to clear all edges for this cell.
    pub fn replace_edges(&mut self, formula_cell: CellId, new_preds: FxHashSet<CellId>) {
        if let Some(old_preds) = self.preds.remove(&formula_cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&formula_cell);
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
            self.succs.entry(*pred).or_default().insert(formula_cell);
        }
        self.preds.insert(formula_cell, new_preds);
    }

    /// Clear all edges for a cell (formula removed or cell deleted).
    ///
    /// Only the cell's own precedent edges go away; other formulas that
    /// reference this cell keep their edges, so clearing a precedent still
    /// dirties its dependents.
    pub fn clear_cell(&mut self, cell: CellId) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// Remove all edges involving cells on a deleted sheet.
    pub fn remove_sheet(&mut self, sheet: SheetId) {
        let cells_to_remove: Vec<CellId> = self
            .preds
            .keys()
            .filter(|c| c.sheet == sheet)
            .copied()
            .collect();
        for cell in cells_to_remove {
            self.clear_cell(cell);
        }

        // Cells on this sheet that are only referenced by other sheets.
        let referenced_to_remove: Vec<CellId> = self
            .succs
            .keys()
            .filter(|c| c.sheet == sheet)
            .copied()
            .collect();
        for cell in referenced_to_remove {
            if let Some(dependents) = self.succs.remove(&cell) {
                for dep in dependents {
                    if let Some(preds) = self.preds.get_mut(&dep) {
                        preds.remove(&cell);
                        if preds.is_empty() {
                            self.preds.remove(&dep);
                        }
                    }
                }
            }
        }
    }

    /// The seed cells plus every transitive dependent.
    ///
    /// This is the dirty set for an edit: everything downstream of the
    /// seeds must re-evaluate.
    pub fn dependents_closure(
        &self,
        seeds: impl IntoIterator<Item = CellId>,
    ) -> FxHashSet<CellId> {
        let mut closure = FxHashSet::default();
        let mut stack: Vec<CellId> = seeds.into_iter().collect();
        while let Some(cell) = stack.pop() {
            if !closure.insert(cell) {
                continue;
            }
            if let Some(deps) = self.succs.get(&cell) {
                for &dep in deps {
                    if !closure.contains(&dep) {
                        stack.push(dep);
                    }
                }
            }
        }
        closure
    }

    // =========================================================================
    // Cycle Membership (iterative Tarjan's SCC)
    // =========================================================================

    /// Find the members of true cycles (SCC size > 1, or a self-loop)
    /// within `subset`.
    ///
    /// Only edges with both endpoints in `subset` are considered. Nodes are
    /// visited in sorted order so the output is deterministic. Iterative to
    /// bound stack depth on very deep dependency chains.
    pub fn cycle_members(&self, subset: &FxHashSet<CellId>) -> FxHashSet<CellId> {
        let mut nodes: Vec<CellId> = subset
            .iter()
            .filter(|c| self.preds.contains_key(c))
            .copied()
            .collect();
        if nodes.is_empty() {
            return FxHashSet::default();
        }
        nodes.sort();

        let sorted_neighbours = |cell: CellId| -> Vec<CellId> {
            let mut neighbours: Vec<CellId> = self
                .preds
                .get(&cell)
                .into_iter()
                .flat_map(|s| s.iter().copied())
                .filter(|c| subset.contains(c) && self.preds.contains_key(c))
                .collect();
            neighbours.sort();
            neighbours
        };

        struct DfsFrame {
            cell: CellId,
            neighbours: Vec<CellId>,
            next_idx: usize,
        }

        let mut index_counter: u32 = 0;
        let mut stack: Vec<CellId> = Vec::new();
        let mut on_stack: FxHashSet<CellId> = FxHashSet::default();
        let mut indices: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut lowlinks: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut result: FxHashSet<CellId> = FxHashSet::default();

        for &root in &nodes {
            if indices.contains_key(&root) {
                continue;
            }

            let mut dfs_stack: Vec<DfsFrame> = Vec::new();

            indices.insert(root, index_counter);
            lowlinks.insert(root, index_counter);
            index_counter += 1;
            stack.push(root);
            on_stack.insert(root);
            dfs_stack.push(DfsFrame {
                cell: root,
                neighbours: sorted_neighbours(root),
                next_idx: 0,
            });

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let w = frame.neighbours[frame.next_idx];
                    frame.next_idx += 1;

                    if !indices.contains_key(&w) {
                        indices.insert(w, index_counter);
                        lowlinks.insert(w, index_counter);
                        index_counter += 1;
                        stack.push(w);
                        on_stack.insert(w);
                        dfs_stack.push(DfsFrame {
                            cell: w,
                            neighbours: sorted_neighbours(w),
                            next_idx: 0,
                        });
                    } else if on_stack.contains(&w) {
                        let w_idx = indices[&w];
                        let v_low = lowlinks.get_mut(&frame.cell).unwrap();
                        if w_idx < *v_low {
                            *v_low = w_idx;
                        }
                    }
                } else {
                    let finished = dfs_stack.pop().unwrap();
                    let v = finished.cell;
                    let v_low = lowlinks[&v];
                    let v_idx = indices[&v];

                    if let Some(parent) = dfs_stack.last() {
                        let parent_low = lowlinks.get_mut(&parent.cell).unwrap();
                        if v_low < *parent_low {
                            *parent_low = v_low;
                        }
                    }

                    if v_low == v_idx {
                        let mut scc = Vec::new();
                        loop {
                            let w = stack.pop().unwrap();
                            on_stack.remove(&w);
                            scc.push(w);
                            if w == v {
                                break;
                            }
                        }

                        if scc.len() > 1 {
                            result.extend(scc);
                        } else if scc.len() == 1 {
                            let cell = scc[0];
                            if self.preds.get(&cell).is_some_and(|p| p.contains(&cell)) {
                                result.insert(cell);
                            }
                        }
                    }
                }
            }
        }

        result
    }

    // =========================================================================
    // Topological Ordering (Kahn's algorithm)
    // =========================================================================

    /// Order `cells` so that precedents come before dependents.
    ///
    /// Only edges with both endpoints in `cells` constrain the order; edges
    /// from outside (already-fresh precedents, or cycle members excluded by
    /// the caller) count as satisfied. Ties break ascending by
    /// (sheet, row, col) for determinism.
    ///
    /// The caller must exclude cycle members first (`cycle_members`); any
    /// remaining cell that can't be ordered is returned in the second slot.
    pub fn topo_order(&self, cells: &FxHashSet<CellId>) -> (Vec<CellId>, Vec<CellId>) {
        if cells.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let mut in_degree: FxHashMap<CellId, usize> = FxHashMap::default();
        for &cell in cells {
            let count = self
                .preds
                .get(&cell)
                .map(|preds| preds.iter().filter(|p| cells.contains(p)).count())
                .unwrap_or(0);
            in_degree.insert(cell, count);
        }

        // Sort descending so the smallest CellId pops first.
        let mut queue: Vec<CellId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();
        queue.sort_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(cells.len());

        while let Some(cell) = queue.pop() {
            order.push(cell);

            if let Some(deps) = self.succs.get(&cell) {
                let mut newly_ready = Vec::new();
                for &dep in deps {
                    if cells.contains(&dep) {
                        if let Some(deg) = in_degree.get_mut(&dep) {
                            *deg = deg.saturating_sub(1);
                            if *deg == 0 {
                                newly_ready.push(dep);
                            }
                        }
                    }
                }
                newly_ready.sort();
                for cell in newly_ready.into_iter().rev() {
                    queue.push(cell);
                }
            }
        }

        if order.len() < cells.len() {
            let ordered: FxHashSet<CellId> = order.iter().copied().collect();
            let mut leftover: Vec<CellId> = cells
                .iter()
                .filter(|c| !ordered.contains(c))
                .copied()
                .collect();
            leftover.sort();
            (order, leftover)
        } else {
            (order, Vec::new())
        }
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (formula_cell, preds) in &self.preds {
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(formula_cell)),
                    "Missing succ edge: {:?} should have {:?} in dependents",
                    pred,
                    formula_cell
                );
            }
        }
        for (cell, dependents) in &self.succs {
            for dep in dependents {
                assert!(
                    self.preds.get(dep).is_some_and(|s| s.contains(cell)),
                    "Missing pred edge: {:?} should have {:?} in precedents",
                    dep,
                    cell
                );
            }
        }
        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {:?}", cell);
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "Empty succs set stored for {:?}", cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetId;

    fn cell(sheet: u64, row: usize, col: usize) -> CellId {
        CellId::new(SheetId::from_raw(sheet), row, col)
    }

    fn set(cells: &[CellId]) -> FxHashSet<CellId> {
        cells.iter().copied().collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();
        assert_eq!(graph.tracked_formula_count(), 0);
        assert_eq!(graph.referenced_cell_count(), 0);
        assert!(!graph.has_precedents(cell(1, 0, 0)));
        assert_eq!(graph.precedents(cell(1, 0, 0)).count(), 0);
        assert_eq!(graph.dependents(cell(1, 0, 0)).count(), 0);
        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        // B1 = A1
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);

        graph.replace_edges(b1, set(&[a1]));
        graph.assert_consistent();

        assert!(graph.has_precedents(b1));
        assert!(!graph.has_precedents(a1));
        assert_eq!(graph.precedents(b1).collect::<Vec<_>>(), vec![a1]);
        assert_eq!(graph.dependents(a1).collect::<Vec<_>>(), vec![b1]);
    }

    #[test]
    fn test_rewiring() {
        // B1 = A1, then change to B1 = A2
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let a2 = cell(1, 1, 0);
        let b1 = cell(1, 0, 1);

        graph.replace_edges(b1, set(&[a1]));
        graph.assert_consistent();

        graph.replace_edges(b1, set(&[a2]));
        graph.assert_consistent();

        assert_eq!(graph.precedents(b1).collect::<Vec<_>>(), vec![a2]);
        assert_eq!(graph.dependents(a2).collect::<Vec<_>>(), vec![b1]);
        assert_eq!(graph.dependents(a1).count(), 0);
        assert_eq!(graph.referenced_cell_count(), 1);
    }

    #[test]
    fn test_unwiring() {
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);

        graph.replace_edges(b1, set(&[a1]));
        graph.clear_cell(b1);
        graph.assert_consistent();

        assert!(!graph.has_precedents(b1));
        assert_eq!(graph.dependents(a1).count(), 0);
        assert_eq!(graph.tracked_formula_count(), 0);
        assert_eq!(graph.referenced_cell_count(), 0);
    }

    #[test]
    fn test_clearing_precedent_keeps_dependent_edges() {
        // B1 = A1; clearing A1 (a value cell) must not remove B1's edge.
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);

        graph.replace_edges(b1, set(&[a1]));
        graph.clear_cell(a1); // A1 has no preds; no-op
        graph.assert_consistent();

        assert_eq!(graph.dependents(a1).collect::<Vec<_>>(), vec![b1]);
    }

    #[test]
    fn test_diamond() {
        //     A1
        //    /  \
        //   B1   C1
        //    \  /
        //     D1
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);
        let c1 = cell(1, 0, 2);
        let d1 = cell(1, 0, 3);

        graph.replace_edges(b1, set(&[a1]));
        graph.replace_edges(c1, set(&[a1]));
        graph.replace_edges(d1, set(&[b1, c1]));
        graph.assert_consistent();

        let mut a1_deps: Vec<_> = graph.dependents(a1).collect();
        a1_deps.sort();
        assert_eq!(a1_deps, vec![b1, c1]);
        assert_eq!(graph.tracked_formula_count(), 3);
    }

    #[test]
    fn test_dependents_closure() {
        // A1 → B1 → C1, A1 → D1, unrelated E1
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);
        let c1 = cell(1, 0, 2);
        let d1 = cell(1, 0, 3);
        let e1 = cell(1, 0, 4);

        graph.replace_edges(b1, set(&[a1]));
        graph.replace_edges(c1, set(&[b1]));
        graph.replace_edges(d1, set(&[a1]));
        graph.replace_edges(e1, set(&[cell(1, 9, 9)]));

        let closure = graph.dependents_closure([a1]);
        assert_eq!(closure, set(&[a1, b1, c1, d1]));
    }

    #[test]
    fn test_remove_sheet() {
        // Sheet1: B1 = A1; Sheet2: A1 = Sheet1!B1
        let mut graph = DepGraph::new();
        let s1_a1 = cell(1, 0, 0);
        let s1_b1 = cell(1, 0, 1);
        let s2_a1 = cell(2, 0, 0);

        graph.replace_edges(s1_b1, set(&[s1_a1]));
        graph.replace_edges(s2_a1, set(&[s1_b1]));
        graph.assert_consistent();

        graph.remove_sheet(SheetId::from_raw(1));
        graph.assert_consistent();

        assert!(!graph.has_precedents(s1_b1));
        assert!(!graph.has_precedents(s2_a1));
        assert_eq!(graph.tracked_formula_count(), 0);
        assert_eq!(graph.referenced_cell_count(), 0);
    }

    // =========================================================================
    // Topological ordering
    // =========================================================================

    #[test]
    fn test_topo_empty() {
        let graph = DepGraph::new();
        let (order, leftover) = graph.topo_order(&FxHashSet::default());
        assert!(order.is_empty());
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_topo_chain() {
        // A → B → C → D (A is a value cell)
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);
        let c = cell(1, 0, 2);
        let d = cell(1, 0, 3);

        graph.replace_edges(b, set(&[a]));
        graph.replace_edges(c, set(&[b]));
        graph.replace_edges(d, set(&[c]));

        let (order, leftover) = graph.topo_order(&set(&[b, c, d]));
        assert_eq!(order, vec![b, c, d]);
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_topo_diamond_constraints() {
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);
        let c = cell(1, 0, 2);
        let d = cell(1, 0, 3);

        graph.replace_edges(b, set(&[a]));
        graph.replace_edges(c, set(&[a]));
        graph.replace_edges(d, set(&[b, c]));

        let (order, _) = graph.topo_order(&set(&[b, c, d]));
        let pos = |x: CellId| order.iter().position(|&y| y == x).unwrap();
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_topo_subset_ignores_outside_edges() {
        // C depends on B, but only C is in the subset: its in-degree is 0.
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);
        let c = cell(1, 0, 2);

        graph.replace_edges(b, set(&[a]));
        graph.replace_edges(c, set(&[b]));

        let (order, leftover) = graph.topo_order(&set(&[c]));
        assert_eq!(order, vec![c]);
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_topo_deterministic_tie_break() {
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);
        let b2 = cell(1, 0, 2);
        let b3 = cell(1, 0, 3);

        graph.replace_edges(b3, set(&[a]));
        graph.replace_edges(b1, set(&[a]));
        graph.replace_edges(b2, set(&[a]));

        let subset = set(&[b1, b2, b3]);
        let (order1, _) = graph.topo_order(&subset);
        let (order2, _) = graph.topo_order(&subset);
        assert_eq!(order1, order2);
        assert_eq!(order1, vec![b1, b2, b3]);
    }

    #[test]
    fn test_topo_cycle_leftover() {
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);

        graph.replace_edges(a, set(&[b]));
        graph.replace_edges(b, set(&[a]));

        let (order, leftover) = graph.topo_order(&set(&[a, b]));
        assert!(order.is_empty());
        assert_eq!(leftover, vec![a, b]);
    }

    // =========================================================================
    // Cycle membership
    // =========================================================================

    #[test]
    fn test_cycle_members_two_node() {
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);

        graph.replace_edges(a1, set(&[b1]));
        graph.replace_edges(b1, set(&[a1]));

        let members = graph.cycle_members(&set(&[a1, b1]));
        assert_eq!(members, set(&[a1, b1]));
    }

    #[test]
    fn test_cycle_members_self_loop() {
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        graph.replace_edges(a1, set(&[a1]));

        let members = graph.cycle_members(&set(&[a1]));
        assert_eq!(members, set(&[a1]));
    }

    #[test]
    fn test_cycle_members_downstream_excluded() {
        // A1 ↔ B1 (cycle), C1 = A1 (downstream, not a member)
        let mut graph = DepGraph::new();
        let a1 = cell(1, 0, 0);
        let b1 = cell(1, 0, 1);
        let c1 = cell(1, 0, 2);

        graph.replace_edges(a1, set(&[b1]));
        graph.replace_edges(b1, set(&[a1]));
        graph.replace_edges(c1, set(&[a1]));

        let members = graph.cycle_members(&set(&[a1, b1, c1]));
        assert_eq!(members, set(&[a1, b1]));
    }

    #[test]
    fn test_cycle_members_three_node() {
        // A → B → C → A
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);
        let c = cell(1, 0, 2);

        graph.replace_edges(a, set(&[c]));
        graph.replace_edges(b, set(&[a]));
        graph.replace_edges(c, set(&[b]));

        let members = graph.cycle_members(&set(&[a, b, c]));
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn test_cycle_members_respects_subset() {
        // The cycle exists in the graph but only one member is in the
        // subset, so no cycle is visible within it.
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);

        graph.replace_edges(a, set(&[b]));
        graph.replace_edges(b, set(&[a]));

        let members = graph.cycle_members(&set(&[a]));
        assert!(members.is_empty());
    }

    #[test]
    fn test_cycle_members_none_in_acyclic() {
        let mut graph = DepGraph::new();
        let a = cell(1, 0, 0);
        let b = cell(1, 0, 1);
        let c = cell(1, 0, 2);

        graph.replace_edges(b, set(&[a]));
        graph.replace_edges(c, set(&[b]));

        let members = graph.cycle_members(&set(&[a, b, c]));
        assert!(members.is_empty());
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        // 10k-deep chain; iterative Tarjan and Kahn must both cope.
        let mut graph = DepGraph::new();
        let mut subset = FxHashSet::default();
        for i in 1..10_000 {
            let prev = cell(1, i - 1, 0);
            let cur = cell(1, i, 0);
            graph.replace_edges(cur, set(&[prev]));
            subset.insert(cur);
        }

        assert!(graph.cycle_members(&subset).is_empty());
        let (order, leftover) = graph.topo_order(&subset);
        assert_eq!(order.len(), subset.len());
        assert!(leftover.is_empty());
    }
}

//! Dominator tree and dominance frontiers.
//!
//! Immediate dominators use Cooper, Harvey & Kennedy's iterative
//! algorithm over reverse postorder; frontiers are collected with the
//! usual "runner" walk from each join node's predecessors.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::DfsPostOrder;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};

pub struct Dominators {
    root: NodeIndex,
    /// Immediate dominator of every reachable node except the root.
    idom: FxHashMap<NodeIndex, NodeIndex>,
    children: FxHashMap<NodeIndex, Vec<NodeIndex>>,
    frontier: FxHashMap<NodeIndex, FxHashSet<NodeIndex>>,
}

impl Dominators {
    pub fn compute<N, E>(graph: &StableDiGraph<N, E>, root: NodeIndex) -> Self {
        let mut postorder = Vec::new();
        let mut dfs = DfsPostOrder::new(graph, root);
        while let Some(node) = dfs.next(graph) {
            postorder.push(node);
        }
        let rpo: Vec<NodeIndex> = postorder.into_iter().rev().collect();

        let mut rpo_idx: FxHashMap<NodeIndex, usize> = FxHashMap::default();
        for (i, &n) in rpo.iter().enumerate() {
            rpo_idx.insert(n, i);
        }

        const UNDEFINED: usize = usize::MAX;
        let mut dom: Vec<usize> = vec![UNDEFINED; rpo.len()];
        if !rpo.is_empty() {
            dom[0] = 0;
        }

        let mut changed = true;
        while changed {
            changed = false;
            for i in 1..rpo.len() {
                let mut new_idom = UNDEFINED;
                for pred in graph.neighbors_directed(rpo[i], Direction::Incoming) {
                    let Some(&p) = rpo_idx.get(&pred) else {
                        continue; // unreachable
                    };
                    if dom[p] == UNDEFINED {
                        continue;
                    }
                    new_idom = if new_idom == UNDEFINED {
                        p
                    } else {
                        intersect(&dom, p, new_idom)
                    };
                }
                if new_idom != UNDEFINED && dom[i] != new_idom {
                    dom[i] = new_idom;
                    changed = true;
                }
            }
        }

        let mut idom = FxHashMap::default();
        let mut children: FxHashMap<NodeIndex, Vec<NodeIndex>> = FxHashMap::default();
        for (i, &d) in dom.iter().enumerate().skip(1) {
            if d != UNDEFINED {
                idom.insert(rpo[i], rpo[d]);
                children.entry(rpo[d]).or_default().push(rpo[i]);
            }
        }
        for list in children.values_mut() {
            list.sort_by_key(|n| n.index());
        }

        let mut frontier: FxHashMap<NodeIndex, FxHashSet<NodeIndex>> = FxHashMap::default();
        for &node in &rpo {
            let preds: Vec<NodeIndex> = graph
                .neighbors_directed(node, Direction::Incoming)
                .filter(|p| rpo_idx.contains_key(p))
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let stop = idom.get(&node).copied().unwrap_or(root);
            for pred in preds {
                let mut runner = pred;
                while runner != stop {
                    frontier.entry(runner).or_default().insert(node);
                    match idom.get(&runner) {
                        Some(&up) => runner = up,
                        None => break,
                    }
                }
            }
        }

        Self {
            root,
            idom,
            children,
            frontier,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn idom(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.idom.get(&node).copied()
    }

    /// Whether every path from the root to `b` passes through `a`.
    /// Every node dominates itself.
    pub fn dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(up) => cur = up,
                None => return false,
            }
        }
    }

    /// Children in the dominator tree, ordered by node index.
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_frontier(&self, node: NodeIndex, of: NodeIndex) -> bool {
        self.frontier
            .get(&of)
            .is_some_and(|set| set.contains(&node))
    }

    pub fn frontier(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.frontier.get(&node).into_iter().flatten().copied()
    }
}

/// Walk up the dominator tree from two RPO indices until they meet.
fn intersect(dom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = dom[a];
        }
        while b > a {
            b = dom[b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&'static str], edges: &[(usize, usize)]) -> (StableDiGraph<&'static str, ()>, Vec<NodeIndex>) {
        let mut g = StableDiGraph::default();
        let ids: Vec<NodeIndex> = nodes.iter().map(|n| g.add_node(*n)).collect();
        for &(a, b) in edges {
            g.add_edge(ids[a], ids[b], ());
        }
        (g, ids)
    }

    #[test]
    fn test_diamond() {
        // entry -> A, entry -> B, A -> C, B -> C, C -> exit
        let (g, n) = graph(
            &["entry", "A", "B", "C", "exit"],
            &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)],
        );
        let dom = Dominators::compute(&g, n[0]);
        assert_eq!(dom.idom(n[1]), Some(n[0]));
        assert_eq!(dom.idom(n[2]), Some(n[0]));
        assert_eq!(dom.idom(n[3]), Some(n[0]));
        assert_eq!(dom.idom(n[4]), Some(n[3]));
        assert_eq!(dom.idom(n[0]), None);

        assert!(dom.dominates(n[0], n[4]));
        assert!(dom.dominates(n[3], n[3]));
        assert!(!dom.dominates(n[1], n[3]));

        assert_eq!(dom.children(n[0]), &[n[1], n[2], n[3]]);
        assert!(dom.in_frontier(n[3], n[1]));
        assert!(dom.in_frontier(n[3], n[2]));
        assert_eq!(dom.frontier(n[0]).count(), 0);
    }

    #[test]
    fn test_loop_header_is_in_own_frontier() {
        // entry -> H, H -> B, B -> H, H -> X
        let (g, n) = graph(&["entry", "H", "B", "X"], &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom = Dominators::compute(&g, n[0]);
        assert!(dom.in_frontier(n[1], n[1]));
        assert!(dom.in_frontier(n[1], n[2]));
        assert!(!dom.in_frontier(n[3], n[1]));
        assert_eq!(dom.idom(n[3]), Some(n[1]));
    }

    #[test]
    fn test_unreachable_nodes_are_ignored() {
        let (g, n) = graph(&["entry", "A", "dead"], &[(0, 1), (2, 1)]);
        let dom = Dominators::compute(&g, n[0]);
        assert_eq!(dom.idom(n[1]), Some(n[0]));
        assert_eq!(dom.idom(n[2]), None);
        assert!(!dom.dominates(n[0], n[2]));
        assert!(dom.dominates(n[2], n[2]));
    }
}

use std::collections::HashMap;

use paxlane_core::RecordId;

/// Union-find over record ids. The overlap adjacency is folded into this
/// once per resolution pass, turning cluster membership into a single
/// traversal instead of repeated store re-queries.
#[derive(Debug, Default)]
pub struct UnionFind {
    parent: HashMap<RecordId, RecordId>,
    rank: HashMap<RecordId, u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: RecordId) {
        self.parent.entry(id).or_insert(id);
        self.rank.entry(id).or_insert(0);
    }

    /// Root of `id`, with path halving. Untracked ids are their own root.
    pub fn find(&mut self, id: RecordId) -> RecordId {
        let Some(&first) = self.parent.get(&id) else {
            return id;
        };
        if first == id {
            return id;
        }
        let mut current = id;
        let mut parent = first;
        loop {
            let grandparent = self.parent.get(&parent).copied().unwrap_or(parent);
            if grandparent == parent {
                return parent;
            }
            // Point current to its grandparent, compressing as we walk.
            self.parent.insert(current, grandparent);
            current = grandparent;
            parent = self.parent.get(&current).copied().unwrap_or(current);
            if parent == current {
                return current;
            }
        }
    }

    pub fn union(&mut self, a: RecordId, b: RecordId) {
        self.add(a);
        self.add(b);
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank.get(&root_a).copied().unwrap_or(0);
        let rank_b = self.rank.get(&root_b).copied().unwrap_or(0);
        if rank_a < rank_b {
            self.parent.insert(root_a, root_b);
        } else if rank_a > rank_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_a, root_b);
            self.rank.insert(root_b, rank_b + 1);
        }
    }

    /// All clusters, members sorted ascending, clusters ordered by their
    /// smallest member. Deterministic across runs.
    pub fn clusters(&mut self) -> Vec<Vec<RecordId>> {
        let ids: Vec<RecordId> = self.parent.keys().copied().collect();
        let mut by_root: HashMap<RecordId, Vec<RecordId>> = HashMap::new();
        for id in ids {
            let root = self.find(id);
            by_root.entry(root).or_default().push(id);
        }
        let mut clusters: Vec<Vec<RecordId>> = by_root.into_values().collect();
        for cluster in &mut clusters {
            cluster.sort();
        }
        clusters.sort_by_key(|c| c[0]);
        clusters
    }
}

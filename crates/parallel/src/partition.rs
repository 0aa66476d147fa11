//! Watershed partitioning
//!
//! Splits a routing graph into weakly-connected components. No link
//! crosses two components, so each one can be swept independently; inside
//! a component nodes keep the global topological order.

use runnel_core::{Error, NodeId, Result, RoutingGraph};

/// Union-Find over node ids
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]]; // path halving
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let (root, child) = if self.rank[ra] >= self.rank[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child] = root;
        if self.rank[root] == self.rank[child] {
            self.rank[root] += 1;
        }
    }
}

/// Independent sub-networks of a routing graph
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Node ids of each watershed, in topological order
    watersheds: Vec<Vec<NodeId>>,
    /// Watershed index per node
    label: Vec<usize>,
    /// Position of each node inside its watershed
    slot: Vec<usize>,
}

impl Partition {
    /// Number of watersheds
    pub fn len(&self) -> usize {
        self.watersheds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watersheds.is_empty()
    }

    /// Topologically ordered members of every watershed
    pub fn watersheds(&self) -> &[Vec<NodeId>] {
        &self.watersheds
    }

    /// Watershed index of a node
    pub fn label(&self, node: NodeId) -> Option<usize> {
        self.label.get(node).copied()
    }

    /// Position of every node inside its own watershed, indexed by node id
    pub fn slots(&self) -> &[usize] {
        &self.slot
    }
}

/// Partition `graph` into watersheds.
///
/// `order` must be a topological order of the whole graph; every
/// watershed inherits it restricted to its members. Watersheds are
/// numbered by the first appearance of a member in `order`.
pub fn partition_watersheds(graph: &RoutingGraph, order: &[NodeId]) -> Result<Partition> {
    let n = graph.num_nodes();
    if order.len() != n {
        return Err(Error::SizeMismatch {
            expected: n,
            actual: order.len(),
        });
    }

    let mut uf = UnionFind::new(n);
    for link in graph.links() {
        uf.union(link.upstream(), link.downstream());
    }

    let mut root_label = vec![usize::MAX; n];
    let mut watersheds: Vec<Vec<NodeId>> = Vec::new();
    let mut label = vec![usize::MAX; n];
    let mut slot = vec![usize::MAX; n];

    for &node in order {
        if node >= n {
            return Err(Error::UnknownNode { node, nodes: n });
        }
        if label[node] != usize::MAX {
            return Err(Error::invalid_parameter("order", node, "node appears twice"));
        }
        let root = uf.find(node);
        if root_label[root] == usize::MAX {
            root_label[root] = watersheds.len();
            watersheds.push(Vec::new());
        }
        let w = root_label[root];
        label[node] = w;
        slot[node] = watersheds[w].len();
        watersheds[w].push(node);
    }

    tracing::debug!("partitioned {} nodes into {} watersheds", n, watersheds.len());

    Ok(Partition {
        watersheds,
        label,
        slot,
    })
}

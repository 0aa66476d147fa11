//! Topological routing order
//!
//! Orders nodes so that every node comes after all nodes feeding it.
//!
//! # Algorithm
//! 1. Count incoming links for each node (in-degree)
//! 2. Start from nodes with in-degree 0 (headwaters)
//! 3. Release each downstream node once all its upstream nodes are placed
//!
//! Nodes left unplaced sit on a cycle, which is reported as
//! [`Error::InvalidTopology`].

use runnel_core::{Error, NodeId, Result, RoutingGraph};

/// Upstream-before-downstream node sequence of a routing graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOrder {
    order: Vec<NodeId>,
    /// Position of each node in `order`, indexed by node id
    position: Vec<usize>,
}

impl RoutingOrder {
    /// Compute the routing order of `graph`. O(nodes + links).
    pub fn new(graph: &RoutingGraph) -> Result<Self> {
        let n = graph.num_nodes();
        let links = graph.links();

        // Step 1: in-degree (how many links flow INTO each node)
        let mut in_degree = vec![0_usize; n];
        for link in links {
            in_degree[link.downstream()] += 1;
        }

        // Step 2: headwaters. Pushed in reverse so they pop in id order.
        let mut stack: Vec<NodeId> = (0..n).rev().filter(|&id| in_degree[id] == 0).collect();

        // Step 3: process stack (Kahn's algorithm)
        let mut order = Vec::with_capacity(n);
        while let Some(node) = stack.pop() {
            order.push(node);
            for &l in graph.nodes()[node].outgoing() {
                let down = links[l].downstream();
                in_degree[down] -= 1;
                if in_degree[down] == 0 {
                    stack.push(down);
                }
            }
        }

        if order.len() < n {
            let node = (0..n).find(|&id| in_degree[id] > 0).unwrap_or(0);
            return Err(Error::InvalidTopology { node });
        }

        let mut position = vec![0; n];
        for (k, &node) in order.iter().enumerate() {
            position[node] = k;
        }

        tracing::debug!("routing order computed for {} nodes", n);
        Ok(Self { order, position })
    }

    /// Node ids, upstream first
    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    /// Position of every node in the order, indexed by node id
    pub fn positions(&self) -> &[usize] {
        &self.position
    }

    /// Position of one node in the order
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.position.get(node).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnel_core::{GraphParams, RoutingGraphBuilder};

    #[test]
    fn test_upstream_before_downstream() {
        // 0 -> 2, 1 -> 2 (split 0.5/0.5 from 3), 2 -> 4, 3 -> {0, 1}
        let mut b = RoutingGraphBuilder::new();
        for _ in 0..5 {
            b.add_node(0.0, 1.0).unwrap();
        }
        b.add_link_with_slope(0, 2, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(1, 2, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(2, 4, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(3, 0, 1.0, 0.1, 1.0, 0.5).unwrap();
        b.add_link_with_slope(3, 1, 1.0, 0.1, 1.0, 0.5).unwrap();
        let g = b.build(GraphParams::default()).unwrap();

        let order = RoutingOrder::new(&g).unwrap();
        assert_eq!(order.len(), 5);
        for link in g.links() {
            assert!(
                order.position(link.upstream()) < order.position(link.downstream()),
                "link {} -> {} out of order: {:?}",
                link.upstream(),
                link.downstream(),
                order.as_slice()
            );
        }
        assert_eq!(order.as_slice()[0], 3);
        assert_eq!(order.as_slice()[4], 4);
    }

    #[test]
    fn test_cycle_detected() {
        let mut b = RoutingGraphBuilder::new();
        for _ in 0..4 {
            b.add_node(0.0, 1.0).unwrap();
        }
        b.add_link_with_slope(0, 1, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(1, 2, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(2, 1, 1.0, 0.1, 1.0, 1.0).unwrap();
        let g = b.build(GraphParams::default()).unwrap();

        assert_eq!(RoutingOrder::new(&g), Err(Error::InvalidTopology { node: 1 }));
    }

    #[test]
    fn test_self_link_is_a_cycle() {
        let mut b = RoutingGraphBuilder::new();
        b.add_node(0.0, 1.0).unwrap();
        b.add_link_with_slope(0, 0, 1.0, 0.1, 1.0, 1.0).unwrap();
        let g = b.build(GraphParams::default()).unwrap();

        assert!(matches!(
            RoutingOrder::new(&g),
            Err(Error::InvalidTopology { node: 0 })
        ));
    }

    #[test]
    fn test_empty_graph() {
        let g = RoutingGraphBuilder::new().build(GraphParams::default()).unwrap();
        let order = RoutingOrder::new(&g).unwrap();
        assert!(order.is_empty());
    }
}

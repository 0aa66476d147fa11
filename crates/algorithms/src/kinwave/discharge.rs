//! Discharge calculation
//!
//! Total outflow of a node with effective depth h:
//!
//! ```text
//! Q = α · h^p · K,   K = Σ_links √S_i · width_i
//! ```
//!
//! Each outgoing link carries Q · fraction_i. A node's inflow is the sum
//! of the link discharges arriving at it. Outlets pass on everything they
//! receive: their outflow is what leaves the domain.

use runnel_core::{NodeId, Result, RoutingGraph};

/// Conveyance K = Σ √S·width over a node's outgoing links (m).
/// Links with a zero fraction carry nothing and add nothing.
pub fn node_conveyance(graph: &RoutingGraph, node: NodeId) -> Result<f64> {
    let node = graph.node(node)?;
    Ok(node
        .outgoing()
        .iter()
        .map(|&l| &graph.links()[l])
        .filter(|link| link.fraction() > 0.0)
        .map(|link| link.slope().sqrt() * link.width())
        .sum())
}

/// Conveyance of every node, indexed by node id
pub(crate) fn conveyances(graph: &RoutingGraph) -> Vec<f64> {
    (0..graph.num_nodes())
        .map(|id| node_conveyance(graph, id).unwrap_or(0.0))
        .collect()
}

/// Total outflow Q = α·h^p·K (m³/s)
#[inline]
pub fn node_outflow(alpha: f64, depth: f64, exponent: f64, conveyance: f64) -> f64 {
    if depth <= 0.0 || conveyance == 0.0 {
        return 0.0;
    }
    alpha * depth.powf(exponent) * conveyance
}

/// Discharge fields derived during one step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DischargeFields {
    outflow: Vec<f64>,
    inflow: Vec<f64>,
    link: Vec<f64>,
}

impl DischargeFields {
    /// All-zero fields for `graph`
    pub fn zeros(graph: &RoutingGraph) -> Self {
        Self {
            outflow: vec![0.0; graph.num_nodes()],
            inflow: vec![0.0; graph.num_nodes()],
            link: vec![0.0; graph.num_links()],
        }
    }

    /// Assemble fields from per-node outflow and inflow; link discharges
    /// are the upstream outflow split by fraction.
    pub(crate) fn from_nodes(graph: &RoutingGraph, outflow: Vec<f64>, inflow: Vec<f64>) -> Self {
        let link = graph
            .links()
            .iter()
            .map(|l| outflow[l.upstream()] * l.fraction())
            .collect();
        Self {
            outflow,
            inflow,
            link,
        }
    }

    /// Total outflow per node (m³/s)
    pub fn outflow(&self) -> &[f64] {
        &self.outflow
    }

    /// Total inflow per node (m³/s)
    pub fn inflow(&self) -> &[f64] {
        &self.inflow
    }

    /// Discharge per link (m³/s)
    pub fn link(&self) -> &[f64] {
        &self.link
    }

    /// Discharge leaving the domain through all outlets (m³/s)
    pub fn outlet_discharge(&self, graph: &RoutingGraph) -> f64 {
        graph.outlets().map(|id| self.outflow[id]).sum()
    }
}

//! Downstream sweep
//!
//! Solves the depth of each node in the given order, publishing it before
//! moving on, and pushes the resulting outflow into the inflow of the
//! node's downstream neighbors. Results are written into private buffers;
//! nothing here touches simulation state.

use super::discharge::{self, DischargeFields};
use super::newton;
use super::params::KinwaveParams;
use super::runoff::Runoff;
use super::state::MassBalance;
use runnel_core::{Error, NodeId, Result, RoutingGraph};

/// A node whose Newton solve did not meet tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonConvergence {
    pub node: NodeId,
    pub iterations: usize,
    /// |f(h)| of the depth kept
    pub residual: f64,
    /// Depth kept (last iterate)
    pub depth: f64,
}

/// Read-only inputs shared by every sweep of one step
pub(crate) struct SweepInputs<'a> {
    pub graph: &'a RoutingGraph,
    pub params: &'a KinwaveParams,
    pub conveyance: &'a [f64],
    pub depth: &'a [f64],
    /// Runoff rate per node (m/s)
    pub runoff: &'a [f64],
    pub dt: f64,
}

/// Buffers produced by one sweep, aligned with the order it was given
#[derive(Debug, Default)]
pub(crate) struct Sweep {
    pub depth: Vec<f64>,
    pub outflow: Vec<f64>,
    pub inflow: Vec<f64>,
    pub nonconverged: Vec<NonConvergence>,
}

/// Sweep `order`. `slot[node]` is the node's position in `order` for
/// every node reachable downstream of it.
pub(crate) fn sweep(inputs: &SweepInputs<'_>, order: &[NodeId], slot: &[usize]) -> Sweep {
    let m = order.len();
    let graph = inputs.graph;
    let params = inputs.params;
    let dt = inputs.dt;
    let alpha = params.alpha();
    let p = params.depth_exponent;
    let w = params.weight;

    let mut out = Sweep {
        depth: vec![0.0; m],
        outflow: vec![0.0; m],
        inflow: vec![0.0; m],
        nonconverged: Vec::new(),
    };

    for (k, &id) in order.iter().enumerate() {
        let node = &graph.nodes()[id];
        let area = node.area();
        let h_old = inputs.depth[id];
        let r = inputs.runoff[id];
        let q_in = out.inflow[k];

        if node.is_outlet() {
            // Outlets store nothing: what arrives leaves the domain
            out.depth[k] = 0.0;
            out.outflow[k] = q_in + r * area + h_old * area / dt;
            continue;
        }

        let k_node = inputs.conveyance[id];
        let c = dt / area * alpha * k_node;
        let b = h_old + dt * r + dt / area * q_in;
        let solve = newton::solve_depth(h_old, c, b, params);

        if !solve.converged {
            tracing::warn!(
                "node {}: Newton did not converge after {} iterations (residual {:.3e}), keeping h = {:.6e}",
                id,
                solve.iterations,
                solve.residual,
                solve.depth
            );
            out.nonconverged.push(NonConvergence {
                node: id,
                iterations: solve.iterations,
                residual: solve.residual,
                depth: solve.depth,
            });
        }

        let h = solve.depth.max(0.0);
        out.depth[k] = h;

        let h_eff = w * h + (1.0 - w) * h_old;
        // Never more than the water the node has this step
        let available = (b - h).max(0.0) * area / dt;
        let q = discharge::node_outflow(alpha, h_eff, p, k_node).min(available);
        out.outflow[k] = q;

        for &l in node.outgoing() {
            let link = &graph.links()[l];
            out.inflow[slot[link.downstream()]] += q * link.fraction();
        }
    }

    out
}

/// Volumes moved by a step, from old/new depth and outlet outflow
pub(crate) fn step_balance(
    graph: &RoutingGraph,
    depth_old: &[f64],
    depth_new: &[f64],
    runoff: &[f64],
    outflow: &[f64],
    dt: f64,
) -> MassBalance {
    let mut balance = MassBalance::default();
    for (id, node) in graph.nodes().iter().enumerate() {
        let area = node.area();
        balance.runoff_volume += runoff[id] * area * dt;
        balance.storage_change += (depth_new[id] - depth_old[id]) * area;
        if node.is_outlet() {
            balance.outlet_volume += outflow[id] * dt;
        }
    }
    balance
}

/// Result of [`solve_in_order`], indexed by node id
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub depth: Vec<f64>,
    pub fields: DischargeFields,
    pub nonconverged: Vec<NonConvergence>,
}

/// Run one step's sweep in a caller-chosen node order without touching
/// any simulation state.
///
/// `order` must list every node exactly once but is not checked for
/// topological consistency: a node solved before one of its upstream
/// neighbors simply misses that neighbor's contribution. Use
/// [`KinwaveImplicit`](super::KinwaveImplicit) for real stepping.
pub fn solve_in_order(
    graph: &RoutingGraph,
    params: &KinwaveParams,
    depth: &[f64],
    runoff: &Runoff,
    dt: f64,
    order: &[NodeId],
) -> Result<SweepResult> {
    params.validate()?;
    check_dt(dt)?;
    let n = graph.num_nodes();
    if depth.len() != n {
        return Err(Error::SizeMismatch {
            expected: n,
            actual: depth.len(),
        });
    }
    if order.len() != n {
        return Err(Error::SizeMismatch {
            expected: n,
            actual: order.len(),
        });
    }
    let mut slot = vec![usize::MAX; n];
    for (k, &id) in order.iter().enumerate() {
        if id >= n {
            return Err(Error::UnknownNode { node: id, nodes: n });
        }
        if slot[id] != usize::MAX {
            return Err(Error::invalid_parameter("order", id, "node appears twice"));
        }
        slot[id] = k;
    }
    let runoff = runoff.to_m_per_s(n)?;
    let conveyance = discharge::conveyances(graph);

    let inputs = SweepInputs {
        graph,
        params,
        conveyance: &conveyance,
        depth,
        runoff: &runoff,
        dt,
    };
    let s = sweep(&inputs, order, &slot);

    let mut depth_new = vec![0.0; n];
    let mut outflow = vec![0.0; n];
    let mut inflow = vec![0.0; n];
    scatter(order, &s, &mut depth_new, &mut outflow, &mut inflow);

    Ok(SweepResult {
        depth: depth_new,
        fields: DischargeFields::from_nodes(graph, outflow, inflow),
        nonconverged: s.nonconverged,
    })
}

/// Copy sweep buffers back into node-id space
pub(crate) fn scatter(
    order: &[NodeId],
    s: &Sweep,
    depth: &mut [f64],
    outflow: &mut [f64],
    inflow: &mut [f64],
) {
    for (k, &id) in order.iter().enumerate() {
        depth[id] = s.depth[k];
        outflow[id] = s.outflow[k];
        inflow[id] = s.inflow[k];
    }
}

pub(crate) fn check_dt(dt: f64) -> Result<()> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(Error::invalid_parameter("dt", dt, "must be positive"));
    }
    Ok(())
}

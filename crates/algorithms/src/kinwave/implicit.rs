//! Implicit kinematic-wave overland flow component
//!
//! Owns the routing graph, the solver parameters and the simulation state.
//! A driver calls [`KinwaveImplicit::run_one_step`] with the current runoff
//! and reads the depth and discharge fields between calls.
//!
//! A step is all-or-nothing: inputs are validated first, the sweep writes
//! into scratch buffers, and the state is replaced only once every node
//! has been solved.

use super::discharge::{self, DischargeFields};
use super::order::RoutingOrder;
use super::params::KinwaveParams;
use super::runoff::Runoff;
use super::state::{SimulationState, StepReport};
use super::sweep::{check_dt, scatter, step_balance, sweep, Sweep, SweepInputs};
use runnel_core::{Error, NodeId, Result, RoutingGraph};
use runnel_parallel::{partition_watersheds, ParallelStrategy, Partition, ProcessingMode};

/// Water depth (m)
pub const DEPTH_FIELD: &str = "surface_water__depth";
/// Total inflow discharge (m³/s), what a driver samples as "discharge here"
pub const INFLOW_FIELD: &str = "surface_water_inflow__discharge";
/// Total outflow discharge (m³/s)
pub const OUTFLOW_FIELD: &str = "surface_water__discharge";

/// Derived routing data, rebuilt only on explicit invalidation
#[derive(Debug, Clone)]
struct RoutingCache {
    order: RoutingOrder,
    conveyance: Vec<f64>,
    partition: Option<Partition>,
}

/// Implicit kinematic-wave overland flow over a routing graph
///
/// # Example
///
/// ```
/// use runnel_algorithms::kinwave::{KinwaveImplicit, KinwaveParams, Runoff};
/// use runnel_core::{GraphParams, RoutingGraphBuilder};
///
/// let mut b = RoutingGraphBuilder::new();
/// let hill = b.add_node(1.0, 100.0).unwrap();
/// let outlet = b.add_node(0.9, 100.0).unwrap();
/// b.add_link(hill, outlet, 10.0, 10.0, 1.0).unwrap();
/// let graph = b.build(GraphParams::default()).unwrap();
///
/// let mut kw = KinwaveImplicit::new(graph, KinwaveParams::default()).unwrap();
/// kw.run_one_step(60.0, &Runoff::Uniform(50.0)).unwrap();
/// assert!(kw.depth()[hill] > 0.0);
/// assert!(kw.inflow()[outlet] > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct KinwaveImplicit {
    graph: RoutingGraph,
    params: KinwaveParams,
    mode: ProcessingMode,
    state: SimulationState,
    cache: Option<RoutingCache>,
}

impl KinwaveImplicit {
    /// Create a dry simulation. Fails on invalid parameters or a cyclic
    /// graph before any state exists.
    pub fn new(graph: RoutingGraph, params: KinwaveParams) -> Result<Self> {
        let state = SimulationState::new(&graph);
        Self::with_state(graph, params, state)
    }

    /// Create a simulation starting from a supplied depth field (m)
    pub fn with_initial_depth(graph: RoutingGraph, params: KinwaveParams, depth: Vec<f64>) -> Result<Self> {
        let state = SimulationState::with_depth(&graph, depth)?;
        Self::with_state(graph, params, state)
    }

    fn with_state(graph: RoutingGraph, params: KinwaveParams, state: SimulationState) -> Result<Self> {
        params.validate()?;
        let mut kw = Self {
            graph,
            params,
            mode: ProcessingMode::default(),
            state,
            cache: None,
        };
        kw.ensure_cache()?;
        Ok(kw)
    }

    /// Select how watersheds are scheduled. Nodes inside one watershed are
    /// always solved sequentially.
    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Advance every node by `dt` seconds under the given runoff (mm/hr).
    ///
    /// Fatal errors (bad `dt`, negative or malformed runoff, cyclic graph
    /// after an invalidation) leave the state untouched. Newton
    /// non-convergence is not an error: it is logged and listed in the
    /// report, and the step completes.
    pub fn run_one_step(&mut self, dt: f64, runoff: &Runoff) -> Result<StepReport> {
        check_dt(dt)?;
        let n = self.graph.num_nodes();
        let runoff = runoff.to_m_per_s(n)?;
        self.ensure_cache()?;

        let cache = self.cache.as_ref().ok_or_else(|| Error::Other("routing cache missing".into()))?;
        let inputs = SweepInputs {
            graph: &self.graph,
            params: &self.params,
            conveyance: &cache.conveyance,
            depth: &self.state.depth,
            runoff: &runoff,
            dt,
        };

        let mut depth = vec![0.0; n];
        let mut outflow = vec![0.0; n];
        let mut inflow = vec![0.0; n];
        let mut nonconverged = Vec::new();

        match (&cache.partition, self.mode.is_parallel()) {
            (Some(partition), true) => {
                let slots = partition.slots();
                let sweeps: Vec<Sweep> = self
                    .mode
                    .par_map(partition.watersheds(), |ws| sweep(&inputs, ws, slots))?;
                for (ws, s) in partition.watersheds().iter().zip(sweeps) {
                    scatter(ws, &s, &mut depth, &mut outflow, &mut inflow);
                    nonconverged.extend(s.nonconverged);
                }
            }
            _ => {
                let order = cache.order.as_slice();
                let s = sweep(&inputs, order, cache.order.positions());
                scatter(order, &s, &mut depth, &mut outflow, &mut inflow);
                nonconverged = s.nonconverged;
            }
        }

        let balance = step_balance(&self.graph, &self.state.depth, &depth, &runoff, &outflow, dt);
        let fields = DischargeFields::from_nodes(&self.graph, outflow, inflow);
        self.state.commit(depth, runoff, fields, dt, &balance);

        if !nonconverged.is_empty() {
            tracing::warn!(
                "step to t = {} s: {} node(s) did not converge",
                self.state.time,
                nonconverged.len()
            );
        }
        tracing::debug!(
            "step to t = {} s: runoff {:.4e} m³, outlet {:.4e} m³, storage {:+.4e} m³",
            self.state.time,
            balance.runoff_volume,
            balance.outlet_volume,
            balance.storage_change
        );

        Ok(StepReport {
            dt,
            time: self.state.time,
            balance,
            nonconverged,
        })
    }

    /// Drop the cached routing order. The next step recomputes it (and
    /// fails with `InvalidTopology` there if the graph became cyclic).
    pub fn invalidate_routing_order(&mut self) {
        if self.cache.take().is_some() {
            tracing::debug!("routing order invalidated");
        }
    }

    /// Replace node elevations (terrain change). Link slopes are
    /// re-derived and the routing order is invalidated.
    pub fn set_elevations(&mut self, elevations: &[f64]) -> Result<()> {
        self.graph.set_elevations(elevations)?;
        self.invalidate_routing_order();
        Ok(())
    }

    /// Cached routing order, if currently valid
    pub fn routing_order(&self) -> Option<&RoutingOrder> {
        self.cache.as_ref().map(|c| &c.order)
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    pub fn params(&self) -> &KinwaveParams {
        &self.params
    }

    pub fn processing_mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Water depth per node (m)
    pub fn depth(&self) -> &[f64] {
        &self.state.depth
    }

    /// Total inflow discharge per node (m³/s)
    pub fn inflow(&self) -> &[f64] {
        self.state.fields.inflow()
    }

    /// Total outflow discharge per node (m³/s)
    pub fn outflow(&self) -> &[f64] {
        self.state.fields.outflow()
    }

    /// Discharge fields of the last step
    pub fn discharge(&self) -> &DischargeFields {
        &self.state.fields
    }

    /// Discharge leaving the domain through all outlets (m³/s)
    pub fn outlet_discharge(&self) -> f64 {
        self.state.fields.outlet_discharge(&self.graph)
    }

    /// Look up a node field by name
    pub fn field(&self, name: &str) -> Option<&[f64]> {
        match name {
            DEPTH_FIELD => Some(self.depth()),
            INFLOW_FIELD => Some(self.inflow()),
            OUTFLOW_FIELD => Some(self.outflow()),
            _ => None,
        }
    }

    /// Value of a named field at one node
    pub fn field_at(&self, name: &str, node: NodeId) -> Result<f64> {
        let field = self
            .field(name)
            .ok_or_else(|| Error::invalid_parameter("field", name, "unknown field"))?;
        field.get(node).copied().ok_or(Error::UnknownNode {
            node,
            nodes: field.len(),
        })
    }

    fn ensure_cache(&mut self) -> Result<()> {
        if self.cache.is_none() {
            let order = RoutingOrder::new(&self.graph)?;
            self.cache = Some(RoutingCache {
                conveyance: discharge::conveyances(&self.graph),
                order,
                partition: None,
            });
        }
        if self.mode.is_parallel() {
            if let Some(cache) = self.cache.as_mut() {
                if cache.partition.is_none() {
                    cache.partition = Some(partition_watersheds(&self.graph, cache.order.as_slice())?);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use runnel_core::{GraphParams, RoutingGraphBuilder};

    /// Node 0 (A = 100 m², S = 0.01, width = 10 m) draining to outlet 1
    fn reference_pair() -> RoutingGraph {
        let mut b = RoutingGraphBuilder::new();
        b.add_node(1.0, 100.0).unwrap();
        b.add_node(0.9, 100.0).unwrap();
        b.add_link(0, 1, 10.0, 10.0, 1.0).unwrap();
        b.build(GraphParams::default()).unwrap()
    }

    fn reference_params() -> KinwaveParams {
        KinwaveParams {
            roughness: 0.15,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_step() {
        let mut kw = KinwaveImplicit::new(reference_pair(), reference_params()).unwrap();
        let report = kw.run_one_step(500.0, &Runoff::Uniform(87.0)).unwrap();

        assert!(report.converged());
        assert_relative_eq!(kw.depth()[0], 0.005_815_122_864_146_4, max_relative = 1e-6);
        assert_relative_eq!(kw.inflow()[1], 0.001_253_642_093_837_379, max_relative = 1e-5);
        assert_eq!(kw.depth()[1], 0.0);
        assert_eq!(kw.state().time(), 500.0);
        assert_eq!(kw.state().last_dt(), Some(500.0));
    }

    #[test]
    fn test_named_fields() {
        let mut kw = KinwaveImplicit::new(reference_pair(), reference_params()).unwrap();
        kw.run_one_step(500.0, &Runoff::Uniform(87.0)).unwrap();

        assert_eq!(kw.field(DEPTH_FIELD).unwrap(), kw.depth());
        assert_eq!(kw.field_at(INFLOW_FIELD, 1).unwrap(), kw.inflow()[1]);
        assert!(kw.field("topographic__elevation").is_none());
        assert!(kw.field_at(DEPTH_FIELD, 9).is_err());
    }

    #[test]
    fn test_negative_runoff_leaves_state_untouched() {
        let mut kw = KinwaveImplicit::new(reference_pair(), reference_params()).unwrap();
        kw.run_one_step(100.0, &Runoff::Uniform(20.0)).unwrap();
        let before = kw.state().clone();

        let err = kw.run_one_step(100.0, &Runoff::PerNode(vec![10.0, -1.0])).unwrap_err();
        assert_eq!(
            err,
            Error::NegativeRunoff {
                node: Some(1),
                rate: -1.0
            }
        );
        assert_eq!(kw.state(), &before);

        assert!(kw.run_one_step(-5.0, &Runoff::none()).is_err());
        assert_eq!(kw.state(), &before);
    }

    #[test]
    fn test_cycle_rejected_at_construction() {
        let mut b = RoutingGraphBuilder::new();
        b.add_node(0.0, 1.0).unwrap();
        b.add_node(0.0, 1.0).unwrap();
        b.add_link_with_slope(0, 1, 1.0, 0.1, 1.0, 1.0).unwrap();
        b.add_link_with_slope(1, 0, 1.0, 0.1, 1.0, 1.0).unwrap();
        let g = b.build(GraphParams::default()).unwrap();

        let err = KinwaveImplicit::new(g, KinwaveParams::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidTopology { .. }));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = KinwaveParams {
            roughness: -0.1,
            ..Default::default()
        };
        assert!(KinwaveImplicit::new(reference_pair(), params).is_err());
    }

    #[test]
    fn test_elevation_change_invalidates_order() {
        let mut kw = KinwaveImplicit::new(reference_pair(), reference_params()).unwrap();
        assert!(kw.routing_order().is_some());

        kw.set_elevations(&[2.0, 0.0]).unwrap();
        assert!(kw.routing_order().is_none());
        assert_relative_eq!(kw.graph().links()[0].slope(), 0.2, epsilon = 1e-12);

        kw.run_one_step(10.0, &Runoff::Uniform(10.0)).unwrap();
        assert!(kw.routing_order().is_some());
    }

    #[test]
    fn test_initial_depth_drains_through_outlet() {
        let kw = KinwaveImplicit::with_initial_depth(reference_pair(), reference_params(), vec![0.01, 0.0]);
        let mut kw = kw.unwrap();
        let before = kw.state().stored_volume(kw.graph());
        kw.run_one_step(60.0, &Runoff::none()).unwrap();
        let after = kw.state().stored_volume(kw.graph());

        assert!(after < before);
        let left = kw.state().mass_balance().outlet_volume;
        assert_relative_eq!(before - after, left, max_relative = 1e-4);
    }

    #[test]
    fn test_weighted_step_conserves_mass() {
        // Half-weighted outflow from 0.1 m would exceed the stored 10 m³
        let mut b = RoutingGraphBuilder::new();
        b.add_node(1.0, 100.0).unwrap();
        b.add_node(0.9, 100.0).unwrap();
        b.add_link_with_slope(0, 1, 10.0, 0.01, 10.0, 1.0).unwrap();
        let g = b.build(GraphParams::default()).unwrap();
        let params = KinwaveParams {
            roughness: 0.01,
            weight: 0.5,
            ..Default::default()
        };
        let mut kw = KinwaveImplicit::with_initial_depth(g, params, vec![0.1, 0.0]).unwrap();

        let report = kw.run_one_step(60.0, &Runoff::none()).unwrap();
        assert!(report.converged());
        assert_eq!(kw.depth(), &[0.0, 0.0]);

        let balance = kw.state().mass_balance();
        assert_relative_eq!(balance.outlet_volume, 10.0, max_relative = 1e-12);
        assert_relative_eq!(balance.storage_change, -10.0, max_relative = 1e-12);
        assert!(balance.residual().abs() < 1e-9, "residual {}", balance.residual());
    }

    #[test]
    fn test_iteration_budget_exhausted_step_completes() {
        let params = KinwaveParams {
            max_iterations: 1,
            tolerance: 1e-15,
            abs_tolerance: 0.0,
            ..reference_params()
        };
        let mut kw = KinwaveImplicit::new(reference_pair(), params).unwrap();
        let report = kw.run_one_step(500.0, &Runoff::Uniform(87.0)).unwrap();

        assert!(!report.converged());
        assert_eq!(report.nonconverged.len(), 1);
        let miss = report.nonconverged[0];
        assert_eq!(miss.node, 0);
        assert_eq!(miss.iterations, 1);
        assert_eq!(kw.depth()[0], miss.depth);
        assert!(miss.depth > 0.0);
        assert_eq!(kw.state().time(), 500.0);
        // Mass still closes on the kept iterate
        assert!(kw.state().mass_balance().residual().abs() < 1e-9);
    }
}

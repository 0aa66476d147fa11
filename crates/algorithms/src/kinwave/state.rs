//! Simulation state and step bookkeeping

use super::discharge::DischargeFields;
use super::sweep::NonConvergence;
use runnel_core::{Error, Result, RoutingGraph};

/// Cumulative water volumes (m³)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassBalance {
    /// Runoff volume added to the domain
    pub runoff_volume: f64,
    /// Volume that left through outlets
    pub outlet_volume: f64,
    /// Net change of stored surface water
    pub storage_change: f64,
}

impl MassBalance {
    /// Input − output − storage change. Zero for exact conservation.
    pub fn residual(&self) -> f64 {
        self.runoff_volume - self.outlet_volume - self.storage_change
    }

    /// Residual relative to the runoff volume (or absolute when no runoff)
    pub fn relative_residual(&self) -> f64 {
        if self.runoff_volume > 0.0 {
            self.residual() / self.runoff_volume
        } else {
            self.residual()
        }
    }

    fn accumulate(&mut self, step: &MassBalance) {
        self.runoff_volume += step.runoff_volume;
        self.outlet_volume += step.outlet_volume;
        self.storage_change += step.storage_change;
    }
}

/// Summary of one completed step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Step length (s)
    pub dt: f64,
    /// Elapsed simulation time after the step (s)
    pub time: f64,
    /// Volumes moved during this step
    pub balance: MassBalance,
    /// Nodes whose Newton solve ran out of iterations
    pub nonconverged: Vec<NonConvergence>,
}

impl StepReport {
    /// Whether every node met the Newton tolerance
    pub fn converged(&self) -> bool {
        self.nonconverged.is_empty()
    }
}

/// Mutable state of a simulation, written only by the step solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub(crate) depth: Vec<f64>,
    /// Runoff rate applied in the last step (m/s)
    pub(crate) runoff: Vec<f64>,
    pub(crate) fields: DischargeFields,
    pub(crate) time: f64,
    pub(crate) last_dt: Option<f64>,
    pub(crate) totals: MassBalance,
}

impl SimulationState {
    /// Dry state for `graph`
    pub fn new(graph: &RoutingGraph) -> Self {
        Self {
            depth: vec![0.0; graph.num_nodes()],
            runoff: vec![0.0; graph.num_nodes()],
            fields: DischargeFields::zeros(graph),
            time: 0.0,
            last_dt: None,
            totals: MassBalance::default(),
        }
    }

    /// State starting from a supplied depth field (m)
    pub fn with_depth(graph: &RoutingGraph, depth: Vec<f64>) -> Result<Self> {
        if depth.len() != graph.num_nodes() {
            return Err(Error::SizeMismatch {
                expected: graph.num_nodes(),
                actual: depth.len(),
            });
        }
        if let Some(h) = depth.iter().find(|h| !(h.is_finite() && **h >= 0.0)) {
            return Err(Error::invalid_parameter("depth", h, "must be finite and non-negative"));
        }
        Ok(Self {
            depth,
            ..Self::new(graph)
        })
    }

    /// Water depth per node (m)
    pub fn depth(&self) -> &[f64] {
        &self.depth
    }

    /// Runoff rate applied in the last step per node (m/s)
    pub fn runoff(&self) -> &[f64] {
        &self.runoff
    }

    /// Discharge fields of the last step
    pub fn fields(&self) -> &DischargeFields {
        &self.fields
    }

    /// Elapsed simulation time (s)
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Length of the last completed step (s)
    pub fn last_dt(&self) -> Option<f64> {
        self.last_dt
    }

    /// Volumes accumulated since the simulation started
    pub fn mass_balance(&self) -> &MassBalance {
        &self.totals
    }

    /// Stored surface water volume (m³)
    pub fn stored_volume(&self, graph: &RoutingGraph) -> f64 {
        self.depth
            .iter()
            .zip(graph.nodes())
            .map(|(h, n)| h * n.area())
            .sum()
    }

    pub(crate) fn commit(
        &mut self,
        depth: Vec<f64>,
        runoff: Vec<f64>,
        fields: DischargeFields,
        dt: f64,
        step: &MassBalance,
    ) {
        self.depth = depth;
        self.runoff = runoff;
        self.fields = fields;
        self.time += dt;
        self.last_dt = Some(dt);
        self.totals.accumulate(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnel_core::{GraphParams, RoutingGraphBuilder};

    fn pair() -> RoutingGraph {
        let mut b = RoutingGraphBuilder::new();
        b.add_node(1.0, 10.0).unwrap();
        b.add_node(0.0, 20.0).unwrap();
        b.add_link(0, 1, 1.0, 1.0, 1.0).unwrap();
        b.build(GraphParams::default()).unwrap()
    }

    #[test]
    fn test_initial_depth_validated() {
        let g = pair();
        assert!(SimulationState::with_depth(&g, vec![0.1]).is_err());
        assert!(SimulationState::with_depth(&g, vec![0.1, -0.1]).is_err());
        let s = SimulationState::with_depth(&g, vec![0.1, 0.2]).unwrap();
        assert!((s.stored_volume(&g) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_balance_residual() {
        let b = MassBalance {
            runoff_volume: 10.0,
            outlet_volume: 4.0,
            storage_change: 5.0,
        };
        assert_eq!(b.residual(), 1.0);
        assert_eq!(b.relative_residual(), 0.1);
    }
}
